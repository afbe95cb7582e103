//! Durable sync for WAL files and directories.

use std::fs::File;
use std::io;

/// Block until `file`'s data is on persistent storage.
///
/// - Linux: `fdatasync`
/// - macOS/iOS: `fcntl(F_FULLFSYNC)`; plain fsync stops at the drive cache there
/// - Windows: `FlushFileBuffers`
/// - elsewhere: `File::sync_data`
///
/// Do not call while holding the store's index lock.
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor comes from a live `File`.
        let rc = unsafe { libc::fdatasync(file.as_raw_fd()) };
        if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor comes from a live `File`.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) };
        if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        // SAFETY: the handle comes from a live `File`.
        let rc = unsafe { FlushFileBuffers(file.as_raw_handle() as *mut _) };
        if rc != 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows")))]
    {
        file.sync_data()
    }
}

/// Persist directory entries (renames, unlinks) on platforms that support it.
pub fn sync_dir(dir: &std::path::Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        durable_sync(&File::open(dir)?)
    }

    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_durable_sync_on_written_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hash,name\nabc,Ann\n").unwrap();
        assert!(durable_sync(file.as_file()).is_ok());
    }

    #[test]
    fn test_sync_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(sync_dir(dir.path()).is_ok());
    }
}
