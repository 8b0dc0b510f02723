//! All-or-nothing file output.

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::util::{Error, Result};

/// Write `path` through a temporary file in the same directory.
///
/// The temporary file is renamed over `path` only after `write` returned
/// `Ok` and the data reached the disk. On any error it is removed and
/// `path` is left untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let io_err = |e: std::io::Error| Error::write(path, e);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = tempfile::Builder::new()
        .prefix(".abc2jsx-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err)?;

    let mut out = BufWriter::new(tmp);
    write(&mut out)?;
    let tmp = out.into_inner().map_err(|e| io_err(e.into_error()))?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
