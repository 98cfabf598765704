//! In-memory definition of the replacement VM.
//!
//! A [`VmConfig`] is assembled phase by phase and submitted once. The attach
//! methods enforce the local rules the control plane would otherwise reject
//! late: one attachment per LUN, one attachment per NIC, one primary NIC.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateError, MigrateResult};
use crate::naming::validate_nic_id;
use crate::types::{CachingMode, DiskDescriptor, NicReference, OsType, Zone};

/// OS disk attached with "attach" semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsDiskAttachment {
    pub name: String,
    pub managed_disk_id: String,
    pub os_type: OsType,
    pub caching: CachingMode,
}

/// Data disk attached at a fixed LUN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDiskAttachment {
    pub name: String,
    pub lun: u32,
    pub managed_disk_id: String,
    pub caching: CachingMode,
    pub size_gb: Option<u32>,
}

/// Network interface attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicAttachment {
    pub id: String,
    pub primary: bool,
}

/// Replacement VM definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    pub name: String,
    pub location: String,
    pub vm_size: String,
    pub zone: Zone,
    pub os_disk: Option<OsDiskAttachment>,
    pub data_disks: Vec<DataDiskAttachment>,
    pub nics: Vec<NicAttachment>,
}

impl VmConfig {
    /// Creates an empty definition pinned to `zone`.
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        vm_size: impl Into<String>,
        zone: Zone,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            vm_size: vm_size.into(),
            zone,
            os_disk: None,
            data_disks: Vec::new(),
            nics: Vec::new(),
        }
    }

    /// Attaches `disk` as the OS disk, replacing any previous one.
    pub fn set_os_disk(&mut self, disk: &DiskDescriptor, os_type: OsType, caching: CachingMode) {
        debug!(disk = %disk.name, %os_type, "Attaching OS disk");
        self.os_disk = Some(OsDiskAttachment {
            name: disk.name.clone(),
            managed_disk_id: disk.id.clone(),
            os_type,
            caching,
        });
    }

    /// Attaches `disk` as a data disk at `lun`.
    pub fn add_data_disk(
        &mut self,
        disk: &DiskDescriptor,
        lun: u32,
        caching: CachingMode,
    ) -> MigrateResult<()> {
        if self.data_disks.iter().any(|d| d.lun == lun) {
            return Err(MigrateError::conflict("data disk LUN", lun.to_string()));
        }
        debug!(disk = %disk.name, lun, %caching, "Attaching data disk");
        self.data_disks.push(DataDiskAttachment {
            name: disk.name.clone(),
            lun,
            managed_disk_id: disk.id.clone(),
            caching,
            size_gb: disk.size_gb,
        });
        Ok(())
    }

    /// Attaches a network interface, keeping its primary flag.
    pub fn add_nic(&mut self, nic: &NicReference) -> MigrateResult<()> {
        validate_nic_id(&nic.id)?;
        if self
            .nics
            .iter()
            .any(|existing| existing.id.eq_ignore_ascii_case(&nic.id))
        {
            return Err(MigrateError::conflict("network interface", nic.id.clone()));
        }
        if nic.primary && self.nics.iter().any(|existing| existing.primary) {
            return Err(MigrateError::invalid_config(
                "network_interfaces",
                format!("{} is flagged primary but a primary NIC is already attached", nic.id),
            ));
        }
        debug!(nic = %nic.id, primary = nic.primary, "Attaching network interface");
        self.nics.push(NicAttachment {
            id: nic.id.clone(),
            primary: nic.primary,
        });
        Ok(())
    }

    /// NICs as they should be submitted.
    ///
    /// With more than one NIC the provider requires exactly one primary; if
    /// the primary failed to attach, the first remaining NIC takes its place.
    pub fn effective_nics(&self) -> Vec<NicAttachment> {
        let mut nics = self.nics.clone();
        if nics.len() > 1 && !nics.iter().any(|nic| nic.primary) {
            nics[0].primary = true;
        }
        nics
    }

    /// Checks that the definition can be submitted.
    pub fn validate(&self) -> MigrateResult<()> {
        if self.os_disk.is_none() {
            return Err(MigrateError::invalid_config("os_disk", "no OS disk attached"));
        }
        if self.nics.is_empty() {
            return Err(MigrateError::invalid_config(
                "network_interfaces",
                "no network interface attached",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn nic_id(name: &str) -> String {
        format!(
            "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/{}",
            name
        )
    }

    fn disk(name: &str) -> DiskDescriptor {
        DiskDescriptor {
            id: format!(
                "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/{}",
                name
            ),
            name: name.to_string(),
            location: "westeurope".to_string(),
            zones: vec!["1".to_string()],
            sku: "Premium_LRS".to_string(),
            size_gb: Some(64),
        }
    }

    fn config() -> VmConfig {
        VmConfig::new("MyVM", "westeurope", "Standard_D2s_v5", Zone::One)
    }

    #[test]
    fn test_set_os_disk() {
        let mut cfg = config();
        cfg.set_os_disk(&disk("osdisk_z_1"), OsType::Linux, CachingMode::ReadWrite);
        let os = cfg.os_disk.as_ref().unwrap();
        assert_eq!(os.name, "osdisk_z_1");
        assert_eq!(os.os_type, OsType::Linux);
        assert_eq!(os.caching, CachingMode::ReadWrite);
    }

    #[test]
    fn test_add_data_disk_rejects_duplicate_lun() {
        let mut cfg = config();
        cfg.add_data_disk(&disk("data0_z_1"), 0, CachingMode::ReadOnly)
            .unwrap();
        let err = cfg
            .add_data_disk(&disk("data1_z_1"), 0, CachingMode::None)
            .unwrap_err();
        assert!(matches!(err, MigrateError::Conflict { .. }));
        assert_eq!(cfg.data_disks.len(), 1);
        assert_eq!(cfg.data_disks[0].size_gb, Some(64));
    }

    #[test]
    fn test_add_nic_validates_id() {
        let mut cfg = config();
        let err = cfg.add_nic(&NicReference::new("not-a-nic", true)).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidResourceId { .. }));
        assert!(cfg.nics.is_empty());
    }

    #[test]
    fn test_add_nic_rejects_duplicates_and_second_primary() {
        let mut cfg = config();
        cfg.add_nic(&NicReference::new(nic_id("nic0"), true)).unwrap();
        assert!(cfg.add_nic(&NicReference::new(nic_id("nic0"), false)).is_err());
        assert!(cfg.add_nic(&NicReference::new(nic_id("nic1"), true)).is_err());
        cfg.add_nic(&NicReference::new(nic_id("nic1"), false)).unwrap();
        assert_eq!(cfg.nics.len(), 2);
    }

    #[test]
    fn test_effective_nics_promotes_first_when_primary_missing() {
        let mut cfg = config();
        cfg.add_nic(&NicReference::new(nic_id("nic1"), false)).unwrap();
        cfg.add_nic(&NicReference::new(nic_id("nic2"), false)).unwrap();
        let nics = cfg.effective_nics();
        assert!(nics[0].primary);
        assert!(!nics[1].primary);
        // The recorded attachments keep the original flags.
        assert!(!cfg.nics[0].primary);
    }

    #[test]
    fn test_effective_nics_single_nic_untouched() {
        let mut cfg = config();
        cfg.add_nic(&NicReference::new(nic_id("nic0"), false)).unwrap();
        assert!(!cfg.effective_nics()[0].primary);
    }

    #[test]
    fn test_validate() {
        let mut cfg = config();
        assert!(cfg.validate().is_err());
        cfg.set_os_disk(&disk("osdisk_z_1"), OsType::Windows, CachingMode::ReadWrite);
        assert!(cfg.validate().is_err());
        cfg.add_nic(&NicReference::new(nic_id("nic0"), true)).unwrap();
        assert!(cfg.validate().is_ok());
    }
}
