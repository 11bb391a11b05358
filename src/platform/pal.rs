//! Platform abstraction: mount table access, mount-point verification, and
//! disk usage probing (Linux via `/proc` + `statvfs`, mock for tests).

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{DwError, Result};

/// Disk usage snapshot for a mounted path, in bytes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

/// OS abstraction used by mount resolution and storage sampling.
pub trait Platform: Send + Sync {
    /// Query total/used/free space for a mounted path.
    ///
    /// Returns `DwError::StorageNotFound` if the path does not exist and
    /// `DwError::StorageProbe` for any other probe failure.
    fn disk_usage(&self, path: &Path) -> Result<DiskUsage>;

    /// Raw text of the system mount table, one entry per line.
    fn mount_table(&self) -> Result<String>;

    /// Whether the path exists and is a directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Whether the path is an actual mount point, not merely a directory.
    fn is_mount_point(&self, path: &Path) -> bool;
}

/// Linux platform implementation using `/proc/self/mounts` + `statvfs`.
#[derive(Debug, Default)]
#[cfg(target_os = "linux")]
pub struct LinuxPlatform;

#[cfg(target_os = "linux")]
impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl Platform for LinuxPlatform {
    fn disk_usage(&self, path: &Path) -> Result<DiskUsage> {
        if !path.exists() {
            return Err(DwError::StorageNotFound {
                path: path.to_path_buf(),
            });
        }
        let stat = nix::sys::statvfs::statvfs(path).map_err(|errno| match errno {
            nix::errno::Errno::ENOENT => DwError::StorageNotFound {
                path: path.to_path_buf(),
            },
            other => DwError::StorageProbe {
                path: path.to_path_buf(),
                details: other.to_string(),
            },
        })?;
        let fragment = stat.fragment_size();
        Ok(DiskUsage {
            total_bytes: stat.blocks().saturating_mul(fragment),
            used_bytes: stat
                .blocks()
                .saturating_sub(stat.blocks_free())
                .saturating_mul(fragment),
            free_bytes: stat.blocks_available().saturating_mul(fragment),
        })
    }

    fn mount_table(&self) -> Result<String> {
        std::fs::read_to_string("/proc/self/mounts").map_err(|error| DwError::MountTable {
            details: error.to_string(),
        })
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        use nix::sys::stat::stat;

        let Ok(own) = stat(path) else {
            return false;
        };
        let parent = path.join("..");
        let Ok(above) = stat(&parent) else {
            return false;
        };
        // A mount point sits on a different device than its parent; the
        // filesystem root is its own parent.
        own.st_dev != above.st_dev || own.st_ino == above.st_ino
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(DwError::UnsupportedPlatform {
            details: "only Linux is currently implemented".to_string(),
        })
    }
}

/// Decode octal escape sequences (`\NNN`) used by the Linux kernel in mount
/// table paths (`\040` for space being the common case).
/// Returns a PathBuf via OsString to preserve raw bytes (e.g. invalid UTF-8).
#[must_use]
pub fn unescape_mount_path(raw: &str) -> PathBuf {
    let mut bytes = Vec::with_capacity(raw.len());
    let raw_bytes = raw.as_bytes();
    let mut i = 0;
    while i < raw_bytes.len() {
        if raw_bytes[i] == b'\\' && i + 3 < raw_bytes.len() {
            let a = raw_bytes[i + 1];
            let b = raw_bytes[i + 2];
            let c = raw_bytes[i + 3];
            if (b'0'..=b'7').contains(&a)
                && (b'0'..=b'7').contains(&b)
                && (b'0'..=b'7').contains(&c)
            {
                let val = (a - b'0') * 64 + (b - b'0') * 8 + (c - b'0');
                bytes.push(val);
                i += 4;
                continue;
            }
        }
        bytes.push(raw_bytes[i]);
        i += 1;
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        PathBuf::from(std::ffi::OsString::from_vec(bytes))
    }
    #[cfg(not(unix))]
    {
        // Fallback for non-Unix (though this code is only used on Linux)
        let s = String::from_utf8_lossy(&bytes).into_owned();
        PathBuf::from(s)
    }
}

/// How the mock answers a disk usage probe for a given path.
#[derive(Debug, Clone, Copy)]
pub enum MockUsage {
    /// Probe succeeds with this snapshot.
    Ready(DiskUsage),
    /// Probe fails with `StorageNotFound` (path vanished).
    Missing,
    /// Probe fails with `StorageProbe` (device unreadable).
    Faulty,
}

/// In-memory mock implementation for deterministic tests.
///
/// Mutable through `&self` so tests can change usage answers between poller
/// cycles while the platform is shared behind an `Arc`.
#[derive(Debug, Default)]
pub struct MockPlatform {
    mount_table: Mutex<String>,
    usages: Mutex<HashMap<PathBuf, MockUsage>>,
    dirs: Mutex<HashSet<PathBuf>>,
    mount_points: Mutex<HashSet<PathBuf>>,
}

impl MockPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mount table with raw text.
    pub fn set_mount_table(&self, raw: &str) {
        *self.mount_table.lock() = raw.to_string();
    }

    /// Append a mount entry and register the location as a valid, mounted
    /// directory. Spaces in the location are escaped kernel-style.
    pub fn add_mount(&self, device_node: &str, location: &Path) {
        let escaped = location.to_string_lossy().replace(' ', "\\040");
        let line = format!("{device_node} {escaped} vfat rw,relatime 0 0\n");
        self.mount_table.lock().push_str(&line);
        self.dirs.lock().insert(location.to_path_buf());
        self.mount_points.lock().insert(location.to_path_buf());
    }

    /// Register a directory that is not a mount point.
    pub fn add_plain_dir(&self, location: &Path) {
        self.dirs.lock().insert(location.to_path_buf());
    }

    pub fn set_usage(&self, path: &Path, usage: DiskUsage) {
        self.usages
            .lock()
            .insert(path.to_path_buf(), MockUsage::Ready(usage));
    }

    pub fn set_usage_missing(&self, path: &Path) {
        self.usages
            .lock()
            .insert(path.to_path_buf(), MockUsage::Missing);
    }

    pub fn set_usage_faulty(&self, path: &Path) {
        self.usages
            .lock()
            .insert(path.to_path_buf(), MockUsage::Faulty);
    }
}

impl Platform for MockPlatform {
    fn disk_usage(&self, path: &Path) -> Result<DiskUsage> {
        match self.usages.lock().get(path) {
            Some(MockUsage::Ready(usage)) => Ok(*usage),
            Some(MockUsage::Faulty) => Err(DwError::StorageProbe {
                path: path.to_path_buf(),
                details: "injected probe fault".to_string(),
            }),
            Some(MockUsage::Missing) | None => Err(DwError::StorageNotFound {
                path: path.to_path_buf(),
            }),
        }
    }

    fn mount_table(&self) -> Result<String> {
        Ok(self.mount_table.lock().clone())
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().contains(path)
    }

    fn is_mount_point(&self, path: &Path) -> bool {
        self.mount_points.lock().contains(path)
    }
}
