//! Ogawa container reader.
//!
//! [`IStreams`] owns the bytes (memory-mapped, buffered file or an owned
//! buffer); [`IGroup`] and [`IData`] are cheap handles into it.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
#[cfg(feature = "mmap")]
use memmap2::Mmap;
use parking_lot::Mutex;

use super::format::*;
use crate::util::{Error, Result};

/// Input streams for reading Ogawa data.
pub struct IStreams {
    inner: StreamsInner,
    version: u16,
    frozen: bool,
    size: u64,
}

enum StreamsInner {
    /// Memory-mapped file
    #[cfg(feature = "mmap")]
    Mmap(Mmap),
    /// Buffered file access, one reader at a time
    File(Mutex<File>),
    /// Owned buffer
    Bytes(Vec<u8>),
}

impl IStreams {
    /// Open a file for reading, memory-mapped when the `mmap` feature is on.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_opts(path, cfg!(feature = "mmap"))
    }

    /// Open a file with optional memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(size));
        }

        let inner = Self::map_or_buffer(file, use_mmap)?;
        let mut header = [0u8; HEADER_SIZE];
        read_at(&inner, 0, &mut header)?;
        let (version, frozen) = Self::parse_header(&header)?;

        Ok(Self {
            inner,
            version,
            frozen,
            size,
        })
    }

    #[cfg(feature = "mmap")]
    fn map_or_buffer(file: File, use_mmap: bool) -> Result<StreamsInner> {
        if !use_mmap {
            return Ok(StreamsInner::File(Mutex::new(file)));
        }
        // Safety: the mapping is read-only and never outlives `IStreams`.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
        Ok(StreamsInner::Mmap(mmap))
    }

    #[cfg(not(feature = "mmap"))]
    fn map_or_buffer(file: File, _use_mmap: bool) -> Result<StreamsInner> {
        Ok(StreamsInner::File(Mutex::new(file)))
    }

    /// Wrap an in-memory Ogawa image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (version, frozen) = Self::parse_header(&bytes)?;
        Ok(Self {
            size: bytes.len() as u64,
            inner: StreamsInner::Bytes(bytes),
            version,
            frozen,
        })
    }

    /// Parse and validate the Ogawa header.
    fn parse_header(data: &[u8]) -> Result<(u16, bool)> {
        if data.len() < HEADER_SIZE {
            return Err(Error::UnexpectedEof(data.len() as u64));
        }
        if &data[0..5] != OGAWA_MAGIC {
            return Err(Error::InvalidMagic);
        }
        let frozen = data[FROZEN_OFFSET] == FROZEN_FLAG;
        let version = LittleEndian::read_u16(&data[VERSION_OFFSET..]);
        Ok((version, frozen))
    }

    /// Check if the archive is frozen (finalized).
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Total size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// True when reads do not serialize on a lock.
    pub fn is_lock_free(&self) -> bool {
        !matches!(self.inner, StreamsInner::File(_))
    }

    /// Root group position from the header.
    pub fn root_pos(&self) -> Result<u64> {
        self.read_u64(ROOT_POS_OFFSET as u64)
    }

    /// Read `len` bytes at `pos`.
    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_into(pos, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` from `pos`.
    pub fn read_into(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let end = pos
            .checked_add(buf.len() as u64)
            .ok_or(Error::UnexpectedEof(u64::MAX))?;
        if end > self.size {
            return Err(Error::UnexpectedEof(end));
        }
        read_at(&self.inner, pos, buf)
    }

    /// Read a little-endian u64 at `pos`.
    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(pos, &mut buf)?;
        Ok(LittleEndian::read_u64(&buf))
    }
}

fn read_at(inner: &StreamsInner, pos: u64, buf: &mut [u8]) -> Result<()> {
    let start = pos as usize;
    match inner {
        #[cfg(feature = "mmap")]
        StreamsInner::Mmap(mmap) => copy_range(mmap, start, buf),
        StreamsInner::Bytes(bytes) => copy_range(bytes, start, buf),
        StreamsInner::File(file) => {
            let mut f = file.lock();
            f.seek(SeekFrom::Start(pos))?;
            f.read_exact(buf)?;
            Ok(())
        }
    }
}

fn copy_range(src: &[u8], start: usize, buf: &mut [u8]) -> Result<()> {
    let end = start + buf.len();
    let slice = src
        .get(start..end)
        .ok_or(Error::UnexpectedEof(end as u64))?;
    buf.copy_from_slice(slice);
    Ok(())
}

/// A group in the Ogawa hierarchy.
#[derive(Clone)]
pub struct IGroup {
    streams: Arc<IStreams>,
    pos: u64,
    child_offsets: Vec<u64>,
}

impl IGroup {
    /// Read the group at `pos`. Position 0 is the empty group.
    pub fn new(streams: Arc<IStreams>, pos: u64) -> Result<Self> {
        let num_children = if pos == 0 { 0 } else { streams.read_u64(pos)? };

        // Each child pointer is 8 bytes; reject counts the file cannot hold.
        let table_end = num_children
            .checked_mul(8)
            .and_then(|len| len.checked_add(pos + 8));
        match table_end {
            Some(end) if end <= streams.size() || num_children == 0 => {}
            _ => return Err(Error::UnexpectedEof(streams.size())),
        }

        let child_offsets = if num_children == 0 {
            Vec::new()
        } else {
            let raw = streams.read_bytes(pos + 8, num_children as usize * 8)?;
            let mut offsets = vec![0u64; num_children as usize];
            LittleEndian::read_u64_into(&raw, &mut offsets);
            offsets
        };

        Ok(Self {
            streams,
            pos,
            child_offsets,
        })
    }

    /// Open the group the file header points at.
    pub fn root(streams: Arc<IStreams>) -> Result<Self> {
        let pos = streams.root_pos()?;
        Self::new(streams, pos)
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    #[inline]
    pub fn num_children(&self) -> usize {
        self.child_offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.child_offsets.is_empty()
    }

    #[inline]
    pub fn streams(&self) -> &Arc<IStreams> {
        &self.streams
    }

    fn child_offset(&self, index: usize) -> Result<u64> {
        self.child_offsets.get(index).copied().ok_or_else(|| {
            Error::invalid(format!(
                "child {} out of bounds (count: {})",
                index,
                self.child_offsets.len()
            ))
        })
    }

    /// Check if child at index is a group.
    pub fn is_child_group(&self, index: usize) -> Result<bool> {
        Ok(is_group_offset(self.child_offset(index)?))
    }

    /// Check if child at index is data.
    pub fn is_child_data(&self, index: usize) -> Result<bool> {
        Ok(is_data_offset(self.child_offset(index)?))
    }

    /// Get a child group.
    pub fn group(&self, index: usize) -> Result<IGroup> {
        let offset = self.child_offset(index)?;
        if !is_group_offset(offset) {
            return Err(Error::invalid(format!("child {} is data, expected group", index)));
        }
        IGroup::new(self.streams.clone(), extract_offset(offset))
    }

    /// Get child data.
    pub fn data(&self, index: usize) -> Result<IData> {
        let offset = self.child_offset(index)?;
        if !is_data_offset(offset) {
            return Err(Error::invalid(format!("child {} is a group, expected data", index)));
        }
        IData::new(self.streams.clone(), extract_offset(offset))
    }
}

/// Data block in the Ogawa hierarchy.
pub struct IData {
    streams: Arc<IStreams>,
    pos: u64,
    size: u64,
}

impl IData {
    /// Read the data header at `pos`. Position 0 is empty data.
    pub fn new(streams: Arc<IStreams>, pos: u64) -> Result<Self> {
        let size = if pos == 0 { 0 } else { streams.read_u64(pos)? };
        Ok(Self { streams, pos, size })
    }

    /// Size of the payload in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Read the whole payload.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        if self.size == 0 {
            return Ok(Vec::new());
        }
        if self.size > self.streams.size() {
            return Err(Error::UnexpectedEof(self.pos + self.size));
        }
        self.streams.read_bytes(self.pos + 8, self.size as usize)
    }

    /// Read the payload as UTF-8, stopping at the first NUL.
    pub fn read_string(&self) -> Result<String> {
        let mut bytes = self.read_all()?;
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(nul);
        }
        Ok(String::from_utf8(bytes)?)
    }
}
