// Shelver - platform/fs.rs
//
// Durability primitives the mover is built on: a copy that is on stable
// storage before it returns, and a best-effort directory sync so a completed
// rename survives power loss.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

/// Copy `from` into a *new* file at `to` and `fsync` it.
///
/// Fails with `AlreadyExists` rather than overwriting anything at `to`.
/// Permissions and modification time are carried over from the source.
/// On error a partially written `to` may remain; the caller removes it.
pub fn copy_durably(from: &Path, to: &Path) -> io::Result<u64> {
    let mut reader = File::open(from)?;
    let metadata = reader.metadata()?;

    let mut writer = OpenOptions::new().write(true).create_new(true).open(to)?;
    let bytes = io::copy(&mut reader, &mut writer)?;

    if let Ok(modified) = metadata.modified() {
        // Not every filesystem supports setting times; the copy is still valid.
        if let Err(e) = writer.set_modified(modified) {
            tracing::trace!(file = %to.display(), error = %e, "Cannot preserve mtime");
        }
    }
    writer.sync_all()?;
    drop(writer);

    fs::set_permissions(to, metadata.permissions())?;
    Ok(bytes)
}

/// Flush directory metadata (new or renamed entries) to stable storage.
///
/// Best-effort: failures are logged, never returned. A no-op on platforms
/// where directories cannot be opened as files.
pub fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    {
        match File::open(dir).and_then(|d| d.sync_all()) {
            Ok(()) => {}
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "Directory sync failed");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}
