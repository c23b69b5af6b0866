// Single-writer lock per (directory, scheme)
// The lock file name is a stable hash of the executable, the scheme
// directory, and the scheme id; its content is the holder's pid. A lock
// left behind by a dead process is reclaimed automatically.

use crate::scheme::SchemePaths;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Another live process already holds the lock. Mapped to exit code 1 by
/// the front end.
#[derive(Debug)]
pub struct LockContention {
    pub path: PathBuf,
    pub pid: u32,
}

impl fmt::Display for LockContention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "already running: pid {} holds lock {}",
            self.pid,
            self.path.display()
        )
    }
}

impl std::error::Error for LockContention {}

/// Held lock; removed from disk on drop
#[derive(Debug)]
pub struct SchemeLock {
    path: PathBuf,
}

impl SchemeLock {
    /// Acquire the lock for a scheme, reclaiming stale locks whose
    /// recorded pid is no longer alive.
    pub fn acquire(paths: &SchemePaths) -> Result<Self> {
        let lock_dir = paths.lock_dir();
        fs::create_dir_all(&lock_dir)
            .with_context(|| format!("failed to create lock directory {}", lock_dir.display()))?;
        let path = lock_dir.join(format!("lincodes_{}", lock_name_hash(paths)));

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())
                        .with_context(|| format!("failed to write lock {}", path.display()))?;
                    return Ok(SchemeLock { path });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(&path)
                        .ok()
                        .and_then(|text| text.trim().parse::<u32>().ok());
                    if let Some(pid) = holder {
                        if pid_is_alive(pid) {
                            return Err(LockContention { path, pid }.into());
                        }
                    }
                    // Dead holder or unreadable content: reclaim and retry
                    fs::remove_file(&path).with_context(|| {
                        format!("failed to remove stale lock {}", path.display())
                    })?;
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to create lock {}", path.display()));
                }
            }
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for SchemeLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Stable hex digest over (executable identity, directory, scheme id)
fn lock_name_hash(paths: &SchemePaths) -> String {
    let exe = std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = fs::canonicalize(paths.dir())
        .unwrap_or_else(|_| paths.dir().to_path_buf())
        .to_string_lossy()
        .into_owned();

    let mut hasher = Sha256::new();
    hasher.update(exe.as_bytes());
    hasher.update([0]);
    hasher.update(dir.as_bytes());
    hasher.update([0]);
    hasher.update(paths.scheme_id().to_le_bytes());

    let digest = hasher.finalize();
    let mut name = String::with_capacity(16);
    for byte in &digest[..8] {
        name.push_str(&format!("{byte:02x}"));
    }
    name
}

fn pid_is_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
    sys.process(pid).is_some()
}
