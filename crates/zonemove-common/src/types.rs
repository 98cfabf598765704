//! Domain types shared by the orchestrator and the control-plane clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Snapshot SKU used for every migration snapshot (zone-redundant storage).
pub const SNAPSHOT_SKU: &str = "Standard_ZRS";

/// Target availability zone within a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
}

impl Zone {
    /// Returns the zone as the provider spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::One => "1",
            Zone::Two => "2",
            Zone::Three => "3",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Zone::One),
            "2" => Ok(Zone::Two),
            "3" => Ok(Zone::Three),
            other => Err(format!("invalid zone '{}': expected 1, 2 or 3", other)),
        }
    }
}

/// Guest operating system family of the OS disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OsType {
    #[default]
    Windows,
    Linux,
}

impl OsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::Windows => "Windows",
            OsType::Linux => "Linux",
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("windows") {
            Ok(OsType::Windows)
        } else if s.eq_ignore_ascii_case("linux") {
            Ok(OsType::Linux)
        } else {
            Err(format!("invalid OS type '{}': expected Windows or Linux", s))
        }
    }
}

/// Host caching mode of an attached disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CachingMode {
    #[default]
    None,
    ReadOnly,
    ReadWrite,
}

impl CachingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachingMode::None => "None",
            CachingMode::ReadOnly => "ReadOnly",
            CachingMode::ReadWrite => "ReadWrite",
        }
    }
}

impl fmt::Display for CachingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the control plane does with an attached disk or NIC when its VM is
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeleteOption {
    #[default]
    Detach,
    Delete,
}

impl DeleteOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteOption::Detach => "Detach",
            DeleteOption::Delete => "Delete",
        }
    }
}

impl fmt::Display for DeleteOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription + resource group every call is made against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceScope {
    pub subscription_id: String,
    pub resource_group: String,
}

impl ResourceScope {
    pub fn new(subscription_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
        }
    }
}

/// Result of binding to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub subscription_id: String,
    pub display_name: String,
    pub state: String,
}

/// OS disk as referenced by a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsDiskRef {
    pub name: String,
    pub managed_disk_id: String,
    pub caching: CachingMode,
    pub size_gb: Option<u32>,
    #[serde(default)]
    pub delete_option: DeleteOption,
}

/// Data disk as referenced by a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDiskRef {
    pub name: String,
    pub lun: u32,
    pub managed_disk_id: String,
    pub caching: CachingMode,
    pub size_gb: Option<u32>,
    #[serde(default)]
    pub delete_option: DeleteOption,
}

/// Network interface as referenced by a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicReference {
    pub id: String,
    pub primary: bool,
    #[serde(default)]
    pub delete_option: DeleteOption,
}

impl NicReference {
    /// NIC that is detached when its VM is deleted.
    pub fn new(id: impl Into<String>, primary: bool) -> Self {
        Self {
            id: id.into(),
            primary,
            delete_option: DeleteOption::Detach,
        }
    }

    pub fn with_delete_option(mut self, delete_option: DeleteOption) -> Self {
        self.delete_option = delete_option;
        self
    }
}

/// Read-only view of an existing virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDescriptor {
    pub id: String,
    pub name: String,
    pub location: String,
    pub zones: Vec<String>,
    pub vm_size: String,
    pub os_type: Option<OsType>,
    pub os_disk: OsDiskRef,
    pub data_disks: Vec<DataDiskRef>,
    pub nics: Vec<NicReference>,
}

impl VmDescriptor {
    /// Returns the NIC flagged primary, if any.
    pub fn primary_nic(&self) -> Option<&NicReference> {
        self.nics.iter().find(|nic| nic.primary)
    }

    /// Names of the disks and NICs the control plane deletes along with
    /// the VM.
    pub fn cascading_deletes(&self) -> Vec<String> {
        let disks = std::iter::once((self.os_disk.name.as_str(), self.os_disk.delete_option))
            .chain(
                self.data_disks
                    .iter()
                    .map(|d| (d.name.as_str(), d.delete_option)),
            );
        let nics = self.nics.iter().map(|nic| {
            (
                crate::naming::resource_name(&nic.id).unwrap_or(nic.id.as_str()),
                nic.delete_option,
            )
        });
        disks
            .chain(nics)
            .filter(|(_, option)| *option == DeleteOption::Delete)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

/// Managed disk details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDescriptor {
    pub id: String,
    pub name: String,
    pub location: String,
    pub zones: Vec<String>,
    pub sku: String,
    pub size_gb: Option<u32>,
}

/// Request to snapshot a managed disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSpec {
    pub name: String,
    pub location: String,
    pub source_disk_id: String,
    pub sku: String,
}

impl SnapshotSpec {
    /// Builds the zone-redundant snapshot request for a disk.
    pub fn for_disk(disk: &DiskDescriptor, location: impl Into<String>) -> Self {
        Self {
            name: crate::naming::snapshot_name(&disk.name),
            location: location.into(),
            source_disk_id: disk.id.clone(),
            sku: SNAPSHOT_SKU.to_string(),
        }
    }
}

/// Snapshot as returned by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDescriptor {
    pub id: String,
    pub name: String,
    pub location: String,
    pub sku: String,
}

/// Request to create a zone-pinned disk from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub name: String,
    pub location: String,
    pub zone: Zone,
    pub sku: String,
    pub source_snapshot_id: String,
}

impl DiskSpec {
    /// Builds the zoned copy request for `source`, fed from `snapshot`.
    pub fn zoned_copy(
        source: &DiskDescriptor,
        snapshot: &SnapshotDescriptor,
        location: impl Into<String>,
        zone: Zone,
    ) -> Self {
        Self {
            name: crate::naming::zoned_disk_name(&source.name, zone),
            location: location.into(),
            zone,
            sku: source.sku.clone(),
            source_snapshot_id: snapshot.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn disk(name: &str) -> DiskDescriptor {
        DiskDescriptor {
            id: format!(
                "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/{}",
                name
            ),
            name: name.to_string(),
            location: "westeurope".to_string(),
            zones: vec![],
            sku: "Premium_LRS".to_string(),
            size_gb: Some(128),
        }
    }

    #[test]
    fn test_zone_parse() {
        assert_eq!("1".parse::<Zone>(), Ok(Zone::One));
        assert_eq!(" 2 ".parse::<Zone>(), Ok(Zone::Two));
        assert_eq!("3".parse::<Zone>(), Ok(Zone::Three));
        assert!("0".parse::<Zone>().is_err());
        assert!("4".parse::<Zone>().is_err());
        assert!("one".parse::<Zone>().is_err());
    }

    #[test]
    fn test_zone_serde() {
        assert_eq!(serde_json::to_string(&Zone::Two).unwrap(), "\"2\"");
        let zone: Zone = serde_json::from_str("\"3\"").unwrap();
        assert_eq!(zone, Zone::Three);
    }

    #[test]
    fn test_os_type_parse() {
        assert_eq!("Windows".parse::<OsType>(), Ok(OsType::Windows));
        assert_eq!("linux".parse::<OsType>(), Ok(OsType::Linux));
        assert_eq!("LINUX".parse::<OsType>(), Ok(OsType::Linux));
        assert!("macos".parse::<OsType>().is_err());
        assert_eq!(OsType::default(), OsType::Windows);
    }

    #[test]
    fn test_caching_mode_strings() {
        assert_eq!(CachingMode::ReadWrite.as_str(), "ReadWrite");
        let mode: CachingMode = serde_json::from_str("\"ReadOnly\"").unwrap();
        assert_eq!(mode, CachingMode::ReadOnly);
    }

    #[test]
    fn test_snapshot_spec_for_disk() {
        let spec = SnapshotSpec::for_disk(&disk("osdisk"), "westeurope");
        assert_eq!(spec.name, "osdisk-snapshot");
        assert_eq!(spec.sku, "Standard_ZRS");
        assert!(spec.source_disk_id.ends_with("/disks/osdisk"));
    }

    #[test]
    fn test_disk_spec_zoned_copy() {
        let source = disk("data0");
        let snapshot = SnapshotDescriptor {
            id: "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/snapshots/data0-snapshot"
                .to_string(),
            name: "data0-snapshot".to_string(),
            location: "westeurope".to_string(),
            sku: SNAPSHOT_SKU.to_string(),
        };
        let spec = DiskSpec::zoned_copy(&source, &snapshot, "westeurope", Zone::Two);
        assert_eq!(spec.name, "data0_z_2");
        assert_eq!(spec.zone, Zone::Two);
        assert_eq!(spec.sku, "Premium_LRS");
        assert_eq!(spec.source_snapshot_id, snapshot.id);
    }

    #[test]
    fn test_cascading_deletes() {
        let mut vm = VmDescriptor {
            id: "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm"
                .to_string(),
            name: "vm".to_string(),
            location: "westeurope".to_string(),
            zones: vec![],
            vm_size: "Standard_B2ms".to_string(),
            os_type: Some(OsType::Linux),
            os_disk: OsDiskRef {
                name: "osdisk".to_string(),
                managed_disk_id: disk("osdisk").id,
                caching: CachingMode::ReadWrite,
                size_gb: Some(30),
                delete_option: DeleteOption::Detach,
            },
            data_disks: vec![DataDiskRef {
                name: "data0".to_string(),
                lun: 0,
                managed_disk_id: disk("data0").id,
                caching: CachingMode::None,
                size_gb: Some(64),
                delete_option: DeleteOption::Detach,
            }],
            nics: vec![NicReference::new(
                "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic0",
                true,
            )],
        };
        assert!(vm.cascading_deletes().is_empty());

        vm.os_disk.delete_option = DeleteOption::Delete;
        vm.nics[0].delete_option = DeleteOption::Delete;
        assert_eq!(vm.cascading_deletes(), vec!["osdisk", "nic0"]);
    }

    #[test]
    fn test_delete_option_defaults_to_detach() {
        let nic: NicReference = serde_json::from_str(r#"{"id":"nic0","primary":true}"#).unwrap();
        assert_eq!(nic.delete_option, DeleteOption::Detach);
        assert_eq!(
            serde_json::to_string(&DeleteOption::Delete).unwrap(),
            "\"Delete\""
        );
    }
}
