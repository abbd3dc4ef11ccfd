//! Filesystem helpers shared by the config writer, the backup rotator and the
//! key store.
//!
//! Every helper here reports failures as [`FdevError::Io`] with the path and
//! the operation that failed, so callers can surface them as-is.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::error::{FdevError, Result};

/// Owner read/write only.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Owner read/write, world readable.
pub const PUBLIC_FILE_MODE: u32 = 0o644;

/// Owner only.
pub const PRIVATE_DIR_MODE: u32 = 0o700;

/// Set the permission bits of `path`. No-op on non-Unix platforms.
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(FdevError::io("set permissions on", path))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Permission bits of `path`, or `None` when they cannot be read
/// (missing file, non-Unix platform).
#[cfg(unix)]
pub fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
pub fn file_mode(_path: &Path) -> Option<u32> {
    None
}

/// Create `dir` (and parents) and force it to owner-only access.
///
/// The mode is re-applied even when the directory already existed, so a
/// pre-existing, too-open directory gets tightened.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    ensure_dir_with_mode(dir, PRIVATE_DIR_MODE)
}

pub fn ensure_dir_with_mode(dir: &Path, mode: u32) -> Result<()> {
    fs::create_dir_all(dir).map_err(FdevError::io("create directory", dir))?;
    set_mode(dir, mode)
}

/// Copy `src` to `dst` byte for byte, sync the copy to disk and set its mode.
pub fn copy_file_with_mode(src: &Path, dst: &Path, mode: u32) -> Result<()> {
    let mut input = fs::File::open(src).map_err(FdevError::io("open", src))?;

    let mut output = open_for_write(dst, mode).map_err(FdevError::io("create", dst))?;
    io::copy(&mut input, &mut output).map_err(FdevError::io("copy to", dst))?;
    output.sync_all().map_err(FdevError::io("sync", dst))?;
    drop(output);

    set_mode(dst, mode)
}

/// Write `content` to `path` (create or truncate) and set its mode.
pub fn write_file_with_mode(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let mut file = open_for_write(path, mode).map_err(FdevError::io("create", path))?;
    file.write_all(content).map_err(FdevError::io("write", path))?;
    file.sync_all().map_err(FdevError::io("sync", path))?;
    drop(file);

    set_mode(path, mode)
}

/// Remove a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FdevError::io("remove", path)(e)),
    }
}

fn open_for_write(path: &Path, mode: u32) -> io::Result<fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    {
        let _ = mode;
    }

    options.open(path)
}
