//! Resource Manager wire shapes and conversions to zonemove types.
//!
//! Only the fields the migration reads or writes are modelled; everything
//! else in a payload is ignored on the way in.

use serde::{Deserialize, Serialize};
use serde_json::json;
use zonemove_common::{
    naming, CachingMode, DataDiskRef, DeleteOption, DiskDescriptor, DiskSpec, MigrateError,
    MigrateResult, NicReference, OsDiskRef, OsType, SnapshotDescriptor, SnapshotSpec,
    SubscriptionInfo, VmConfig, VmDescriptor,
};

/// Error envelope: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Body returned by an `Azure-AsyncOperation` status URL.
#[derive(Debug, Clone, Deserialize)]
pub struct AsyncOperationStatus {
    pub status: String,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

impl AsyncOperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "Succeeded" | "Failed" | "Canceled")
    }

    pub fn succeeded(&self) -> bool {
        self.status == "Succeeded"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub state: String,
}

impl From<Subscription> for SubscriptionInfo {
    fn from(sub: Subscription) -> Self {
        SubscriptionInfo {
            subscription_id: sub.subscription_id,
            display_name: sub.display_name,
            state: sub.state,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagedDiskParameters {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sku {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Virtual machines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMachine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub location: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,
    pub properties: VirtualMachineProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineProperties {
    pub hardware_profile: HardwareProfile,
    pub storage_profile: StorageProfile,
    #[serde(default)]
    pub network_profile: NetworkProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub vm_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    pub os_disk: OsDisk,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<OsType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caching: Option<CachingMode>,
    pub create_option: String,
    #[serde(default)]
    pub managed_disk: Option<ManagedDiskParameters>,
    #[serde(
        rename = "diskSizeGB",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub disk_size_gb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_option: Option<DeleteOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub lun: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caching: Option<CachingMode>,
    pub create_option: String,
    #[serde(default)]
    pub managed_disk: Option<ManagedDiskParameters>,
    #[serde(
        rename = "diskSizeGB",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub disk_size_gb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_option: Option<DeleteOption>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterfaceReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterfaceReference {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<NetworkInterfaceReferenceProperties>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceReferenceProperties {
    #[serde(default)]
    pub primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_option: Option<DeleteOption>,
}

fn managed_disk_id(
    vm_name: &str,
    disk: &str,
    managed: Option<ManagedDiskParameters>,
) -> MigrateResult<String> {
    managed.and_then(|m| m.id).ok_or_else(|| {
        MigrateError::invalid_config(
            "storage_profile",
            format!(
                "disk '{}' of VM '{}' is not a managed disk",
                disk, vm_name
            ),
        )
    })
}

impl TryFrom<VirtualMachine> for VmDescriptor {
    type Error = MigrateError;

    fn try_from(vm: VirtualMachine) -> MigrateResult<Self> {
        let id = vm.id.unwrap_or_default();
        let name = match vm.name {
            Some(name) => name,
            None => naming::resource_name(&id).unwrap_or_default().to_string(),
        };
        let storage = vm.properties.storage_profile;

        let os = storage.os_disk;
        let os_managed_id = managed_disk_id(&name, os.name.as_deref().unwrap_or("os"), os.managed_disk)?;
        let os_disk_name = match os.name {
            Some(n) => n,
            None => naming::resource_name(&os_managed_id).unwrap_or_default().to_string(),
        };

        let mut data_disks = Vec::with_capacity(storage.data_disks.len());
        for disk in storage.data_disks {
            let label = disk.name.clone().unwrap_or_else(|| format!("lun{}", disk.lun));
            let managed_id = managed_disk_id(&name, &label, disk.managed_disk)?;
            let disk_name = match disk.name {
                Some(n) => n,
                None => naming::resource_name(&managed_id).unwrap_or_default().to_string(),
            };
            data_disks.push(DataDiskRef {
                name: disk_name,
                lun: disk.lun,
                managed_disk_id: managed_id,
                caching: disk.caching.unwrap_or_default(),
                size_gb: disk.disk_size_gb,
                delete_option: disk.delete_option.unwrap_or_default(),
            });
        }

        let nics = vm
            .properties
            .network_profile
            .network_interfaces
            .into_iter()
            .map(|nic| {
                let props = nic.properties.unwrap_or_default();
                NicReference::new(nic.id, props.primary.unwrap_or(false))
                    .with_delete_option(props.delete_option.unwrap_or_default())
            })
            .collect();

        Ok(VmDescriptor {
            id,
            name,
            location: vm.location,
            zones: vm.zones,
            vm_size: vm.properties.hardware_profile.vm_size,
            os_type: os.os_type,
            os_disk: OsDiskRef {
                name: os_disk_name,
                managed_disk_id: os_managed_id,
                caching: os.caching.unwrap_or_default(),
                size_gb: os.disk_size_gb,
                delete_option: os.delete_option.unwrap_or_default(),
            },
            data_disks,
            nics,
        })
    }
}

impl TryFrom<&VmConfig> for VirtualMachine {
    type Error = MigrateError;

    fn try_from(config: &VmConfig) -> MigrateResult<Self> {
        config.validate()?;
        let os = config
            .os_disk
            .as_ref()
            .ok_or_else(|| MigrateError::invalid_config("os_disk", "no OS disk attached"))?;

        Ok(VirtualMachine {
            id: None,
            name: None,
            location: config.location.clone(),
            zones: vec![config.zone.as_str().to_string()],
            properties: VirtualMachineProperties {
                hardware_profile: HardwareProfile {
                    vm_size: config.vm_size.clone(),
                },
                storage_profile: StorageProfile {
                    os_disk: OsDisk {
                        os_type: Some(os.os_type),
                        name: Some(os.name.clone()),
                        caching: Some(os.caching),
                        create_option: "Attach".to_string(),
                        managed_disk: Some(ManagedDiskParameters {
                            id: Some(os.managed_disk_id.clone()),
                        }),
                        disk_size_gb: None,
                        delete_option: None,
                    },
                    data_disks: config
                        .data_disks
                        .iter()
                        .map(|d| DataDisk {
                            lun: d.lun,
                            name: Some(d.name.clone()),
                            caching: Some(d.caching),
                            create_option: "Attach".to_string(),
                            managed_disk: Some(ManagedDiskParameters {
                                id: Some(d.managed_disk_id.clone()),
                            }),
                            disk_size_gb: None,
                            delete_option: None,
                        })
                        .collect(),
                },
                network_profile: NetworkProfile {
                    network_interfaces: config
                        .effective_nics()
                        .into_iter()
                        .map(|nic| NetworkInterfaceReference {
                            id: nic.id,
                            properties: Some(NetworkInterfaceReferenceProperties {
                                primary: Some(nic.primary),
                                delete_option: None,
                            }),
                        })
                        .collect(),
                },
            },
        })
    }
}

/// PATCH body switching every disk and NIC of `vm` to `Detach`.
///
/// `dataDisks` and `networkInterfaces` replace the stored arrays, so each
/// entry is repeated in full.
pub fn detach_on_delete_patch(vm: &VmDescriptor) -> serde_json::Value {
    let data_disks: Vec<serde_json::Value> = vm
        .data_disks
        .iter()
        .map(|d| {
            json!({
                "lun": d.lun,
                "name": d.name,
                "caching": d.caching,
                "createOption": "Attach",
                "managedDisk": { "id": d.managed_disk_id },
                "deleteOption": DeleteOption::Detach,
            })
        })
        .collect();
    let nics: Vec<serde_json::Value> = vm
        .nics
        .iter()
        .map(|nic| {
            json!({
                "id": nic.id,
                "properties": { "primary": nic.primary, "deleteOption": DeleteOption::Detach },
            })
        })
        .collect();

    json!({
        "properties": {
            "storageProfile": {
                "osDisk": { "deleteOption": DeleteOption::Detach },
                "dataDisks": data_disks,
            },
            "networkProfile": { "networkInterfaces": nics },
        }
    })
}

// ---------------------------------------------------------------------------
// Disks and snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationData {
    pub create_option: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_resource_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_data: Option<CreationData>,
    #[serde(
        rename = "diskSizeGB",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub disk_size_gb: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

/// Managed disk resource; snapshots share the shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub location: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    pub properties: DiskProperties,
}

impl Disk {
    /// Zone-pinned disk copied from a snapshot.
    pub fn from_spec(spec: &DiskSpec) -> Self {
        Disk {
            id: None,
            name: None,
            location: spec.location.clone(),
            zones: vec![spec.zone.as_str().to_string()],
            sku: Some(Sku {
                name: spec.sku.clone(),
            }),
            properties: DiskProperties {
                creation_data: Some(CreationData {
                    create_option: "Copy".to_string(),
                    source_resource_id: Some(spec.source_snapshot_id.clone()),
                }),
                disk_size_gb: None,
                provisioning_state: None,
            },
        }
    }

    /// Snapshot copied from a disk.
    pub fn snapshot_from_spec(spec: &SnapshotSpec) -> Self {
        Disk {
            id: None,
            name: None,
            location: spec.location.clone(),
            zones: Vec::new(),
            sku: Some(Sku {
                name: spec.sku.clone(),
            }),
            properties: DiskProperties {
                creation_data: Some(CreationData {
                    create_option: "Copy".to_string(),
                    source_resource_id: Some(spec.source_disk_id.clone()),
                }),
                disk_size_gb: None,
                provisioning_state: None,
            },
        }
    }

    fn resolved_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .id
                .as_deref()
                .and_then(naming::resource_name)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

impl From<Disk> for DiskDescriptor {
    fn from(disk: Disk) -> Self {
        let name = disk.resolved_name();
        DiskDescriptor {
            id: disk.id.unwrap_or_default(),
            name,
            location: disk.location,
            zones: disk.zones,
            sku: disk.sku.map(|s| s.name).unwrap_or_default(),
            size_gb: disk.properties.disk_size_gb,
        }
    }
}

impl From<Disk> for SnapshotDescriptor {
    fn from(snapshot: Disk) -> Self {
        let name = snapshot.resolved_name();
        SnapshotDescriptor {
            id: snapshot.id.unwrap_or_default(),
            name,
            location: snapshot.location,
            sku: snapshot.sku.map(|s| s.name).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use zonemove_common::Zone;

    const NIC0: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic0";
    const NIC1: &str =
        "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic1";

    fn vm_json() -> serde_json::Value {
        json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/MyVM",
            "name": "MyVM",
            "location": "westeurope",
            "properties": {
                "vmId": "ignored",
                "hardwareProfile": { "vmSize": "Standard_D4s_v5" },
                "storageProfile": {
                    "osDisk": {
                        "osType": "Windows",
                        "name": "osdisk",
                        "caching": "ReadWrite",
                        "createOption": "FromImage",
                        "managedDisk": {
                            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/osdisk",
                            "storageAccountType": "Premium_LRS"
                        },
                        "diskSizeGB": 127,
                        "deleteOption": "Delete"
                    },
                    "dataDisks": [
                        {
                            "lun": 1,
                            "name": "data1",
                            "createOption": "Attach",
                            "managedDisk": { "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/data1" }
                        },
                        {
                            "lun": 0,
                            "name": "data0",
                            "caching": "ReadOnly",
                            "createOption": "Empty",
                            "managedDisk": { "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/data0" },
                            "diskSizeGB": 256
                        }
                    ]
                },
                "networkProfile": {
                    "networkInterfaces": [
                        { "id": NIC0, "properties": { "primary": true, "deleteOption": "Delete" } },
                        { "id": NIC1 }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_vm_descriptor_from_payload() {
        let vm: VirtualMachine = serde_json::from_value(vm_json()).unwrap();
        let desc = VmDescriptor::try_from(vm).unwrap();

        assert_eq!(desc.name, "MyVM");
        assert_eq!(desc.vm_size, "Standard_D4s_v5");
        assert_eq!(desc.os_type, Some(OsType::Windows));
        assert_eq!(desc.os_disk.name, "osdisk");
        assert_eq!(desc.os_disk.caching, CachingMode::ReadWrite);
        assert_eq!(desc.os_disk.size_gb, Some(127));
        assert_eq!(desc.os_disk.delete_option, DeleteOption::Delete);
        assert!(desc.zones.is_empty());

        assert_eq!(desc.data_disks.len(), 2);
        assert_eq!(desc.data_disks[0].name, "data1");
        assert_eq!(desc.data_disks[0].lun, 1);
        assert_eq!(desc.data_disks[0].caching, CachingMode::None);
        assert_eq!(desc.data_disks[1].caching, CachingMode::ReadOnly);
        assert_eq!(desc.data_disks[1].size_gb, Some(256));
        assert_eq!(desc.data_disks[1].delete_option, DeleteOption::Detach);

        assert_eq!(
            desc.nics,
            vec![
                NicReference::new(NIC0, true).with_delete_option(DeleteOption::Delete),
                NicReference::new(NIC1, false)
            ]
        );
        assert_eq!(desc.cascading_deletes(), vec!["osdisk", "nic0"]);
    }

    #[test]
    fn test_detach_on_delete_patch() {
        let vm: VirtualMachine = serde_json::from_value(vm_json()).unwrap();
        let desc = VmDescriptor::try_from(vm).unwrap();

        let body = detach_on_delete_patch(&desc);
        let storage = &body["properties"]["storageProfile"];
        assert_eq!(storage["osDisk"], json!({ "deleteOption": "Detach" }));
        assert_eq!(storage["dataDisks"].as_array().map(Vec::len), Some(2));
        assert_eq!(storage["dataDisks"][1]["lun"], 0);
        assert_eq!(storage["dataDisks"][1]["caching"], "ReadOnly");
        assert_eq!(storage["dataDisks"][1]["deleteOption"], "Detach");
        assert_eq!(
            storage["dataDisks"][1]["managedDisk"]["id"],
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/data0"
        );

        let nics = &body["properties"]["networkProfile"]["networkInterfaces"];
        assert_eq!(nics[0]["id"], NIC0);
        assert_eq!(nics[0]["properties"], json!({ "primary": true, "deleteOption": "Detach" }));
        assert_eq!(nics[1]["properties"]["primary"], false);
    }

    #[test]
    fn test_unmanaged_os_disk_rejected() {
        let mut payload = vm_json();
        payload["properties"]["storageProfile"]["osDisk"]
            .as_object_mut()
            .unwrap()
            .remove("managedDisk");
        let vm: VirtualMachine = serde_json::from_value(payload).unwrap();
        assert!(VmDescriptor::try_from(vm).is_err());
    }

    #[test]
    fn test_vm_body_from_config() {
        let disk = |name: &str| DiskDescriptor {
            id: format!("/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/{}", name),
            name: name.to_string(),
            location: "westeurope".to_string(),
            zones: vec!["2".to_string()],
            sku: "Premium_LRS".to_string(),
            size_gb: Some(128),
        };
        let mut config = VmConfig::new("MyVM", "westeurope", "Standard_D4s_v5", Zone::Two);
        config.set_os_disk(&disk("osdisk_z_2"), OsType::Linux, CachingMode::ReadWrite);
        config
            .add_data_disk(&disk("data0_z_2"), 0, CachingMode::ReadOnly)
            .unwrap();
        config.add_nic(&NicReference::new(NIC0, true)).unwrap();

        let body = serde_json::to_value(VirtualMachine::try_from(&config).unwrap()).unwrap();

        assert_eq!(body["zones"], json!(["2"]));
        assert_eq!(body["location"], "westeurope");
        assert!(body.get("id").is_none());
        let storage = &body["properties"]["storageProfile"];
        assert_eq!(storage["osDisk"]["createOption"], "Attach");
        assert_eq!(storage["osDisk"]["osType"], "Linux");
        assert!(storage["osDisk"].get("deleteOption").is_none());
        assert_eq!(
            storage["osDisk"]["managedDisk"]["id"],
            "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/osdisk_z_2"
        );
        assert_eq!(storage["dataDisks"][0]["lun"], 0);
        assert_eq!(storage["dataDisks"][0]["caching"], "ReadOnly");
        assert_eq!(storage["dataDisks"][0]["createOption"], "Attach");
        assert_eq!(
            body["properties"]["networkProfile"]["networkInterfaces"][0]["properties"]["primary"],
            true
        );
    }

    #[test]
    fn test_snapshot_and_disk_bodies() {
        let snapshot = Disk::snapshot_from_spec(&SnapshotSpec {
            name: "osdisk-snapshot".to_string(),
            location: "westeurope".to_string(),
            source_disk_id: "/disks/osdisk".to_string(),
            sku: "Standard_ZRS".to_string(),
        });
        let body = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(body["sku"]["name"], "Standard_ZRS");
        assert_eq!(body["properties"]["creationData"]["createOption"], "Copy");
        assert_eq!(
            body["properties"]["creationData"]["sourceResourceId"],
            "/disks/osdisk"
        );
        assert!(body.get("zones").is_none());

        let disk = Disk::from_spec(&DiskSpec {
            name: "osdisk_z_3".to_string(),
            location: "westeurope".to_string(),
            zone: Zone::Three,
            sku: "Premium_LRS".to_string(),
            source_snapshot_id: "/snapshots/osdisk-snapshot".to_string(),
        });
        let body = serde_json::to_value(&disk).unwrap();
        assert_eq!(body["zones"], json!(["3"]));
        assert_eq!(body["sku"]["name"], "Premium_LRS");
    }

    #[test]
    fn test_disk_descriptor_from_payload() {
        let disk: Disk = serde_json::from_value(json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/disks/data0_z_1",
            "location": "westeurope",
            "zones": ["1"],
            "sku": { "name": "StandardSSD_LRS", "tier": "Standard" },
            "properties": { "diskSizeGB": 64, "diskState": "Unattached" }
        }))
        .unwrap();
        let desc = DiskDescriptor::from(disk);
        assert_eq!(desc.name, "data0_z_1");
        assert_eq!(desc.zones, vec!["1".to_string()]);
        assert_eq!(desc.sku, "StandardSSD_LRS");
        assert_eq!(desc.size_gb, Some(64));
    }

    #[test]
    fn test_async_operation_status() {
        let status: AsyncOperationStatus =
            serde_json::from_value(json!({ "status": "InProgress" })).unwrap();
        assert!(!status.is_terminal());
        let status: AsyncOperationStatus = serde_json::from_value(json!({
            "status": "Failed",
            "error": { "code": "QuotaExceeded", "message": "no quota" }
        }))
        .unwrap();
        assert!(status.is_terminal());
        assert!(!status.succeeded());
        assert_eq!(status.error.unwrap().code, "QuotaExceeded");
    }
}
