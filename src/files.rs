use crate::error::{AppError, Result};
use std::io::Write;
use std::path::Path;

/// Write `data` to a temporary file next to `path`, then rename it into place.
///
/// On failure the temporary file is removed and `path` is left untouched.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| AppError::Internal(format!("No parent directory: {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
