use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::services::error::{PipelineError, PipelineResult};

/// Advisory lock on a staging area, held for one pipeline run.
///
/// Backed by a lock file created with `create_new` that records the holder's
/// PID; the file is removed on drop. A lock left behind by a process that no
/// longer exists (e.g. one killed by an outer timeout) is treated as stale and
/// taken over. Only cooperating `basil-tool` processes respect it.
#[derive(Debug)]
pub struct StagingLock {
    path: PathBuf,
}

impl StagingLock {
    pub fn acquire(path: &Path) -> PipelineResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match Self::try_create(path) {
            Err(PipelineError::StagingLocked { .. }) if Self::holder_is_gone(path) => {
                warn!(path = %path.display(), "Removing stale staging lock");
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                Self::try_create(path)
            }
            other => other,
        }
    }

    fn try_create(path: &Path) -> PipelineResult<Self> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                debug!(path = %path.display(), "Acquired staging lock");
                Ok(Self { path: path.to_path_buf() })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(PipelineError::StagingLocked { path: path.to_path_buf() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// A holder is gone only if the lock names a PID that no longer exists.
    fn holder_is_gone(path: &Path) -> bool {
        let Ok(contents) = fs::read_to_string(path) else {
            return false;
        };
        match contents.trim().parse::<u32>() {
            Ok(pid) if pid > 0 => !is_process_alive(pid),
            _ => false,
        }
    }
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // EPERM means the process exists but belongs to someone else.
    !matches!(kill(Pid::from_raw(raw), None), Err(Errno::ESRCH))
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

impl Drop for StagingLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release staging lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_fails_until_first_is_dropped() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join(".lock");

        let first = StagingLock::acquire(&lock_path).unwrap();
        let err = StagingLock::acquire(&lock_path).unwrap_err();
        assert!(matches!(err, PipelineError::StagingLocked { .. }));

        drop(first);
        assert!(!lock_path.exists());
        StagingLock::acquire(&lock_path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn lock_of_a_dead_process_is_taken_over() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        fs::write(&lock_path, "999999999\n").unwrap();

        let lock = StagingLock::acquire(&lock_path).unwrap();
        let holder = fs::read_to_string(&lock_path).unwrap();
        assert_eq!(holder.trim(), std::process::id().to_string());
        drop(lock);
        assert!(!lock_path.exists());
    }

    #[test]
    fn lock_without_a_pid_is_respected() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        fs::write(&lock_path, "").unwrap();

        let err = StagingLock::acquire(&lock_path).unwrap_err();
        assert!(matches!(err, PipelineError::StagingLocked { .. }));
        assert!(lock_path.exists());
    }

    #[test]
    fn lock_of_a_live_process_is_respected() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        fs::write(&lock_path, format!("{}\n", std::process::id())).unwrap();

        let err = StagingLock::acquire(&lock_path).unwrap_err();
        assert!(matches!(err, PipelineError::StagingLocked { .. }));
    }
}
