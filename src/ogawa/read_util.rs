//! Alembic data layout on top of Ogawa blocks.
//!
//! Parsers for the archive-level time samplings and indexed metadata, the
//! object and property header tables, and sample payloads.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use super::IData;
use crate::core::{MetaData, TimeSampling};
use crate::util::{Error, Result};

/// Time-per-cycle marker for acyclic samplings.
const ACYCLIC_TIME_PER_CYCLE: f64 = -f64::MAX;

/// Every scalar and array sample starts with a 16-byte content key.
pub const SAMPLE_KEY_SIZE: usize = 16;

/// Object header tables end with two 16-byte hashes.
const OBJECT_HASHES_SIZE: usize = 32;

/// POD code for 64-bit floats.
pub const POD_FLOAT64: u8 = 11;

/// Little-endian cursor that reports truncation as a structure error.
struct ByteCursor<'a> {
    inner: Cursor<&'a [u8]>,
    what: &'static str,
}

impl<'a> ByteCursor<'a> {
    fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self {
            inner: Cursor::new(buf),
            what,
        }
    }

    fn has_remaining(&self) -> bool {
        (self.inner.position() as usize) < self.inner.get_ref().len()
    }

    fn truncated(&self) -> Error {
        Error::invalid(format!("{} truncated at byte {}", self.what, self.inner.position()))
    }

    fn u8(&mut self) -> Result<u8> {
        self.inner.read_u8().map_err(|_| self.truncated())
    }

    fn u32(&mut self) -> Result<u32> {
        self.inner.read_u32::<LittleEndian>().map_err(|_| self.truncated())
    }

    fn f64(&mut self) -> Result<f64> {
        self.inner.read_f64::<LittleEndian>().map_err(|_| self.truncated())
    }

    /// Integer whose width is given by a 2-bit size hint.
    fn sized(&mut self, hint: u32) -> Result<u32> {
        let value = match hint {
            0 => self.inner.read_u8().map(u32::from),
            1 => self.inner.read_u16::<LittleEndian>().map(u32::from),
            2 => self.inner.read_u32::<LittleEndian>(),
            _ => return Err(Error::invalid(format!("{}: invalid size hint {}", self.what, hint))),
        };
        value.map_err(|_| self.truncated())
    }

    fn str(&mut self, len: usize) -> Result<&'a str> {
        let buf: &'a [u8] = *self.inner.get_ref();
        let start = self.inner.position() as usize;
        let bytes = buf.get(start..start + len).ok_or_else(|| self.truncated())?;
        self.inner.set_position((start + len) as u64);
        std::str::from_utf8(bytes)
            .map_err(|e| Error::invalid(format!("{}: invalid UTF-8: {}", self.what, e)))
    }
}

/// Read the archive time samplings and their maximum sample counts.
pub fn read_time_samplings(data: &IData) -> Result<Vec<(TimeSampling, u32)>> {
    let buf = data.read_all()?;
    let mut cur = ByteCursor::new(&buf, "time samplings");
    let mut out = Vec::new();

    while cur.has_remaining() {
        let max_sample = cur.u32()?;
        let tpc = cur.f64()?;
        let num_times = cur.u32()? as usize;
        if num_times == 0 {
            return Err(Error::invalid("time sampling with no stored times"));
        }
        let times = (0..num_times).map(|_| cur.f64()).collect::<Result<Vec<_>>>()?;

        let ts = if tpc == ACYCLIC_TIME_PER_CYCLE {
            TimeSampling::acyclic(times)
        } else if num_times == 1 {
            TimeSampling::uniform(tpc, times[0])
        } else {
            TimeSampling::cyclic(tpc, times)
        };
        out.push((ts, max_sample));
    }

    Ok(out)
}

/// Read indexed metadata. Index 0 is always the empty metadata.
pub fn read_indexed_metadata(data: &IData) -> Result<Vec<MetaData>> {
    let buf = data.read_all()?;
    let mut cur = ByteCursor::new(&buf, "indexed metadata");
    let mut out = vec![MetaData::new()];

    while cur.has_remaining() {
        let len = cur.u8()? as usize;
        out.push(MetaData::parse(cur.str(len)?));
    }

    Ok(out)
}

fn lookup_metadata(indexed: &[MetaData], index: usize) -> Result<MetaData> {
    indexed
        .get(index)
        .cloned()
        .ok_or_else(|| Error::invalid(format!("invalid metadata index: {}", index)))
}

/// Parsed object header.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    pub name: String,
    pub full_name: String,
    pub metadata: MetaData,
}

/// Read the child object headers of an object whose full name is `parent_name`.
pub fn read_object_headers(
    data: &IData,
    parent_name: &str,
    indexed: &[MetaData],
) -> Result<Vec<ObjectHeader>> {
    let buf = data.read_all()?;
    if buf.len() <= OBJECT_HASHES_SIZE {
        return Ok(Vec::new());
    }
    let mut cur = ByteCursor::new(&buf[..buf.len() - OBJECT_HASHES_SIZE], "object headers");
    let mut out = Vec::new();

    while cur.has_remaining() {
        let name_len = cur.u32()? as usize;
        if name_len == 0 {
            return Err(Error::invalid("object header with empty name"));
        }
        let name = cur.str(name_len)?.to_string();
        let full_name = if parent_name.is_empty() || parent_name == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent_name, name)
        };

        let metadata = match cur.u8()? {
            0xff => {
                let len = cur.u32()? as usize;
                MetaData::parse(cur.str(len)?)
            }
            index => lookup_metadata(indexed, index as usize)?,
        };

        out.push(ObjectHeader {
            name,
            full_name,
            metadata,
        });
    }

    Ok(out)
}

/// Property kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Compound,
    Scalar,
    Array,
}

/// Parsed property header.
#[derive(Debug, Clone)]
pub struct PropertyHeader {
    pub name: String,
    pub property_type: PropertyType,
    pub metadata: MetaData,
    /// Plain-old-data code (11 = f64)
    pub pod: u8,
    /// Values per element
    pub extent: u8,
    pub time_sampling_index: u32,
    pub num_samples: u32,
    pub first_changed_index: u32,
    pub last_changed_index: u32,
    pub is_homogenous: bool,
}

impl PropertyHeader {
    /// True when every sample is identical and only child 0 is stored.
    pub fn is_constant(&self) -> bool {
        self.first_changed_index == 0 && self.last_changed_index == 0
    }

    /// Ogawa child holding the payload of logical sample `index`.
    ///
    /// Samples before the first change and after the last change are not
    /// stored; they alias the neighbouring stored sample.
    pub fn stored_index(&self, index: usize) -> usize {
        let first = self.first_changed_index as usize;
        let last = self.last_changed_index as usize;
        if self.is_constant() || index < first {
            0
        } else {
            index.min(last) - first + 1
        }
    }
}

/// Read the property header table of a compound property.
pub fn read_property_headers(data: &IData, indexed: &[MetaData]) -> Result<Vec<PropertyHeader>> {
    let buf = data.read_all()?;
    let mut cur = ByteCursor::new(&buf, "property headers");
    let mut out = Vec::new();

    while cur.has_remaining() {
        let info = cur.u32()?;
        let property_type = match info & 0x3 {
            0 => PropertyType::Compound,
            1 => PropertyType::Scalar,
            _ => PropertyType::Array,
        };
        let hint = (info & 0xc) >> 2;

        let mut header = PropertyHeader {
            name: String::new(),
            property_type,
            metadata: MetaData::new(),
            pod: ((info & 0xf0) >> 4) as u8,
            extent: ((info & 0xff000) >> 12) as u8,
            time_sampling_index: 0,
            num_samples: 0,
            first_changed_index: 0,
            last_changed_index: 0,
            is_homogenous: info & 0x400 != 0,
        };

        if property_type != PropertyType::Compound {
            header.num_samples = cur.sized(hint)?;
            (header.first_changed_index, header.last_changed_index) = if info & 0x200 != 0 {
                (cur.sized(hint)?, cur.sized(hint)?)
            } else if info & 0x800 != 0 {
                (0, 0)
            } else {
                (1, header.num_samples.saturating_sub(1))
            };
            if info & 0x100 != 0 {
                header.time_sampling_index = cur.sized(hint)?;
            }
        }

        let name_len = cur.sized(hint)? as usize;
        if name_len == 0 {
            return Err(Error::invalid("property header with empty name"));
        }
        header.name = cur.str(name_len)?.to_string();

        header.metadata = match ((info & 0xff0_0000) >> 20) as usize {
            0xff => {
                let len = cur.sized(hint)? as usize;
                MetaData::parse(cur.str(len)?)
            }
            index => lookup_metadata(indexed, index)?,
        };

        out.push(header);
    }

    Ok(out)
}

/// Strip the content key from a sample payload.
pub fn sample_payload(bytes: &[u8]) -> &[u8] {
    bytes.get(SAMPLE_KEY_SIZE..).unwrap_or(&[])
}

/// Decode little-endian f64 values.
pub fn decode_f64s(bytes: &[u8]) -> Result<Vec<f64>> {
    if bytes.len() % 8 != 0 {
        return Err(Error::invalid(format!(
            "f64 payload of {} bytes is not a multiple of 8",
            bytes.len()
        )));
    }
    #[cfg(target_endian = "little")]
    {
        Ok(bytemuck::pod_collect_to_vec(bytes))
    }
    #[cfg(not(target_endian = "little"))]
    {
        use byteorder::ByteOrder;
        let mut out = vec![0.0; bytes.len() / 8];
        LittleEndian::read_f64_into(bytes, &mut out);
        Ok(out)
    }
}
