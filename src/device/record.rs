//! Per-device tracking record: mount resolution and free-space sampling for
//! one attached partition.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::bytes::convert_bytes;
use crate::core::errors::Result;
use crate::daemon::notifications::{NotificationEvent, NotificationManager};
use crate::hotplug::descriptor::DeviceDescriptor;
use crate::platform::pal::{DiskUsage, Platform, unescape_mount_path};

/// State tracked for one device node across poll cycles.
///
/// Created unmounted; [`DeviceRecord::resolve_mount`] upgrades it once the
/// mount table shows the node, and [`DeviceRecord::sample_storage`] then
/// keeps the last two usage snapshots for delta reporting.
pub struct DeviceRecord {
    platform: Arc<dyn Platform>,
    device_node: String,
    fs_label: Option<String>,
    vendor: Option<String>,
    model: Option<String>,
    mount_point: Option<PathBuf>,
    is_mounted: bool,
    storage: Option<DiskUsage>,
    prev_storage: Option<DiskUsage>,
}

impl DeviceRecord {
    #[must_use]
    pub fn new(descriptor: &DeviceDescriptor, platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            device_node: descriptor.device_node.clone(),
            fs_label: descriptor.fs_label.clone(),
            vendor: descriptor.vendor.clone(),
            model: descriptor.model.clone(),
            mount_point: None,
            is_mounted: false,
            storage: None,
            prev_storage: None,
        }
    }

    #[must_use]
    pub fn device_node(&self) -> &str {
        &self.device_node
    }

    #[must_use]
    pub fn mount_point(&self) -> Option<&Path> {
        self.mount_point.as_deref()
    }

    #[must_use]
    pub const fn is_mounted(&self) -> bool {
        self.is_mounted
    }

    #[must_use]
    pub const fn storage(&self) -> Option<&DiskUsage> {
        self.storage.as_ref()
    }

    /// Scan the mount table for this device node and latch the mount point.
    ///
    /// The first field must match the node exactly (`/dev/sdb1` must not be
    /// found via a `/dev/sdb10` entry), and the decoded location only counts
    /// if it is a directory that is actually a mount point. Resolution stops
    /// at the first accepted match; entries for the same node that fail
    /// validation are skipped, since duplicates are common (bind mounts,
    /// btrfs subvolumes) and a later one may be the real mount.
    ///
    /// Returns whether the record is mounted afterwards.
    pub fn resolve_mount(&mut self) -> Result<bool> {
        let table = self.platform.mount_table()?;
        for line in table.lines() {
            let mut fields = line.split_whitespace();
            let (Some(node), Some(raw_location)) = (fields.next(), fields.next()) else {
                continue;
            };
            if node != self.device_node {
                continue;
            }
            let location = unescape_mount_path(raw_location);
            if self.platform.is_dir(&location) && self.platform.is_mount_point(&location) {
                self.mount_point = Some(location);
                self.is_mounted = true;
                break;
            }
        }
        Ok(self.is_mounted)
    }

    /// Probe disk usage at the mount point, shifting the previous snapshot
    /// only when the probe succeeds.
    ///
    /// Unmounted records and a vanished mount point (`StorageNotFound`) are
    /// quiet no-ops; any other probe failure propagates and the caller is
    /// expected to evict the record.
    pub fn sample_storage(&mut self) -> Result<Option<DiskUsage>> {
        if !self.is_mounted {
            return Ok(None);
        }
        let Some(mount_point) = self.mount_point.clone() else {
            return Ok(None);
        };
        match self.platform.disk_usage(&mount_point) {
            Ok(usage) => {
                self.prev_storage = self.storage.take();
                self.storage = Some(usage);
                Ok(Some(usage))
            }
            Err(crate::core::errors::DwError::StorageNotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Free-space delta between the two most recent snapshots, in bytes.
    /// Positive when free space shrank (data written), negative when it
    /// grew. Zero until two samples exist.
    #[must_use]
    pub fn free_space_delta(&self) -> i64 {
        let (Some(previous), Some(current)) = (self.prev_storage, self.storage) else {
            return 0;
        };
        let previous = i64::try_from(previous.free_bytes).unwrap_or(i64::MAX);
        let current = i64::try_from(current.free_bytes).unwrap_or(i64::MAX);
        previous - current
    }

    /// Emit a `DriveModified` notification if the last two samples differ.
    pub fn report_delta(&self, notifier: &NotificationManager) {
        let delta = self.free_space_delta();
        if delta == 0 {
            return;
        }
        let change = if delta > 0 { "Size Added" } else { "Size Removed" };
        notifier.notify(&NotificationEvent::DriveModified {
            device_node: self.device_node.clone(),
            fs_label: self.fs_label.clone(),
            vendor: self.vendor.clone(),
            model: self.model.clone(),
            change: change.to_string(),
            bytes: delta.unsigned_abs(),
        });
    }

    /// One-line description used in eviction notices.
    #[must_use]
    pub fn describe(&self) -> String {
        let label = self.fs_label.as_deref().unwrap_or("-");
        match &self.mount_point {
            Some(mount_point) => format!(
                "{} (label={label}) at {} [{}]",
                self.device_node,
                mount_point.display(),
                self.storage
                    .map_or_else(|| "unsampled".to_string(), |u| convert_bytes(u.free_bytes)),
            ),
            None => format!("{} (label={label}) unmounted", self.device_node),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use super::DeviceRecord;
    use crate::core::errors::DwError;
    use crate::hotplug::descriptor::{DeviceAction, DeviceDescriptor};
    use crate::platform::pal::{DiskUsage, MockPlatform, Platform};

    fn usage(free: u64) -> DiskUsage {
        DiskUsage {
            total_bytes: 8_000_000,
            used_bytes: 8_000_000 - free,
            free_bytes: free,
        }
    }

    fn record_for(node: &str, platform: &Arc<MockPlatform>) -> DeviceRecord {
        let mut descriptor = DeviceDescriptor::new(DeviceAction::Add, node);
        descriptor.fs_label = Some("STICK".to_string());
        DeviceRecord::new(&descriptor, Arc::clone(platform) as Arc<dyn Platform>)
    }

    #[test]
    fn resolve_mount_decodes_escaped_location() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_mount("/dev/sdb1", Path::new("/media/My Drive"));
        let mut record = record_for("/dev/sdb1", &platform);

        assert!(record.resolve_mount().expect("mount table"));
        assert_eq!(record.mount_point(), Some(Path::new("/media/My Drive")));
        assert!(record.is_mounted());
    }

    #[test]
    fn resolve_mount_requires_exact_node_match() {
        let platform = Arc::new(MockPlatform::new());
        platform.add_mount("/dev/sda10", Path::new("/mnt/ten"));
        let mut record = record_for("/dev/sda1", &platform);

        assert!(!record.resolve_mount().expect("mount table"));
        assert!(record.mount_point().is_none());
    }

    #[test]
    fn resolve_mount_rejects_non_mount_point_locations() {
        let platform = Arc::new(MockPlatform::new());
        // Entry present, directory exists, but it is not a mount point.
        platform.set_mount_table("/dev/sdb1 /media/stale vfat rw 0 0\n");
        platform.add_plain_dir(Path::new("/media/stale"));
        let mut record = record_for("/dev/sdb1", &platform);

        assert!(!record.resolve_mount().expect("mount table"));
        assert!(!record.is_mounted());
    }

    #[test]
    fn resolve_mount_skips_invalid_duplicate_entries() {
        let platform = Arc::new(MockPlatform::new());
        // Two entries for the same node: the first decodes to a directory
        // that is not a mount point, the second is the real mount.
        platform.set_mount_table("/dev/sdb1 /media/stale vfat rw 0 0\n");
        platform.add_plain_dir(Path::new("/media/stale"));
        platform.add_mount("/dev/sdb1", Path::new("/media/live"));
        let mut record = record_for("/dev/sdb1", &platform);

        assert!(record.resolve_mount().expect("mount table"));
        assert_eq!(record.mount_point(), Some(Path::new("/media/live")));
    }

    #[test]
    fn sample_storage_is_noop_until_mounted() {
        let platform = Arc::new(MockPlatform::new());
        let mut record = record_for("/dev/sdb1", &platform);
        assert!(record.sample_storage().expect("unmounted").is_none());
        assert_eq!(record.free_space_delta(), 0);
    }

    #[test]
    fn delta_is_zero_until_two_samples_exist() {
        let platform = Arc::new(MockPlatform::new());
        let mount = Path::new("/media/usb0");
        platform.add_mount("/dev/sdb1", mount);
        platform.set_usage(mount, usage(1_000_000));
        let mut record = record_for("/dev/sdb1", &platform);
        record.resolve_mount().expect("mount table");

        record.sample_storage().expect("first sample");
        assert_eq!(record.free_space_delta(), 0);

        platform.set_usage(mount, usage(998_000));
        record.sample_storage().expect("second sample");
        assert_eq!(record.free_space_delta(), 2_000);
    }

    #[test]
    fn delta_sign_tracks_direction_of_change() {
        let platform = Arc::new(MockPlatform::new());
        let mount = Path::new("/media/usb0");
        platform.add_mount("/dev/sdb1", mount);
        let mut record = record_for("/dev/sdb1", &platform);
        record.resolve_mount().expect("mount table");

        platform.set_usage(mount, usage(500));
        record.sample_storage().expect("first sample");
        platform.set_usage(mount, usage(1_500));
        record.sample_storage().expect("second sample");
        // Free space grew, so data was removed.
        assert_eq!(record.free_space_delta(), -1_000);
    }

    #[test]
    fn vanished_mount_keeps_previous_snapshots() {
        let platform = Arc::new(MockPlatform::new());
        let mount = Path::new("/media/usb0");
        platform.add_mount("/dev/sdb1", mount);
        platform.set_usage(mount, usage(4_000));
        let mut record = record_for("/dev/sdb1", &platform);
        record.resolve_mount().expect("mount table");
        record.sample_storage().expect("first sample");

        platform.set_usage_missing(mount);
        assert!(record.sample_storage().expect("transient miss").is_none());
        assert_eq!(record.storage().expect("retained").free_bytes, 4_000);
    }

    #[test]
    fn faulty_probe_propagates_for_eviction() {
        let platform = Arc::new(MockPlatform::new());
        let mount = Path::new("/media/usb0");
        platform.add_mount("/dev/sdb1", mount);
        platform.set_usage_faulty(mount);
        let mut record = record_for("/dev/sdb1", &platform);
        record.resolve_mount().expect("mount table");

        let err = record.sample_storage().expect_err("injected fault");
        assert!(matches!(err, DwError::StorageProbe { .. }));
    }
}
