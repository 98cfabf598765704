//! Naming rules for derived resources and resource id helpers.
//!
//! The derived names are fixed and not configurable:
//!
//! | Resource | Name |
//! |----------|------|
//! | Snapshot | `<disk>-snapshot` |
//! | Zoned disk copy | `<disk>_z_<zone>` |
//!
//! # Example
//!
//! ```
//! use zonemove_common::naming::{snapshot_name, zoned_disk_name};
//! use zonemove_common::Zone;
//!
//! assert_eq!(snapshot_name("osdisk"), "osdisk-snapshot");
//! assert_eq!(zoned_disk_name("osdisk", Zone::Two), "osdisk_z_2");
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MigrateError, MigrateResult};
use crate::types::Zone;

/// Suffix appended to a disk name to form its snapshot name.
pub const SNAPSHOT_SUFFIX: &str = "-snapshot";

/// Infix placed between a disk name and the zone in the zoned copy name.
pub const ZONED_DISK_INFIX: &str = "_z_";

/// Matches a network interface resource id.
static NIC_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^/subscriptions/[^/]+/resourceGroups/[^/]+/providers/Microsoft\.Network/networkInterfaces/[^/]+$",
    )
    .expect("Invalid regex pattern")
});

/// Returns the snapshot name for a disk.
pub fn snapshot_name(disk_name: &str) -> String {
    format!("{}{}", disk_name, SNAPSHOT_SUFFIX)
}

/// Returns the name of the zone-pinned copy of a disk.
pub fn zoned_disk_name(disk_name: &str, zone: Zone) -> String {
    format!("{}{}{}", disk_name, ZONED_DISK_INFIX, zone.as_str())
}

/// Returns the last path segment of a resource id (the resource name).
///
/// ```
/// use zonemove_common::naming::resource_name;
///
/// let id = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/osdisk";
/// assert_eq!(resource_name(id), Some("osdisk"));
/// assert_eq!(resource_name(""), None);
/// ```
pub fn resource_name(id: &str) -> Option<&str> {
    id.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Checks that `id` is a network interface resource id.
pub fn validate_nic_id(id: &str) -> MigrateResult<()> {
    if NIC_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(MigrateError::invalid_resource_id(
            id,
            "expected /subscriptions/<sub>/resourceGroups/<rg>/providers/Microsoft.Network/networkInterfaces/<name>",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_name() {
        assert_eq!(snapshot_name("osdisk"), "osdisk-snapshot");
        assert_eq!(snapshot_name("MyVM_OsDisk_1_abc"), "MyVM_OsDisk_1_abc-snapshot");
    }

    #[test]
    fn test_zoned_disk_name() {
        assert_eq!(zoned_disk_name("data0", Zone::One), "data0_z_1");
        assert_eq!(zoned_disk_name("data1", Zone::Three), "data1_z_3");
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(
            resource_name("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic0/"),
            Some("nic0")
        );
        assert_eq!(resource_name("plain"), Some("plain"));
    }

    #[test]
    fn test_validate_nic_id() {
        assert!(validate_nic_id(
            "/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic0"
        )
        .is_ok());
        // Provider paths come back in mixed case.
        assert!(validate_nic_id(
            "/subscriptions/0000/resourcegroups/RG/providers/microsoft.network/networkinterfaces/nic0"
        )
        .is_ok());
        assert!(validate_nic_id("nic0").is_err());
        assert!(validate_nic_id(
            "/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Compute/disks/d0"
        )
        .is_err());
    }
}
