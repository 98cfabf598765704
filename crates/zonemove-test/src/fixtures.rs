//! Test fixtures for migration scenarios
//!
//! A [`VmFixture`] describes a zoneless VM with its managed disks and NICs.
//! Loading it into a [`FakeCloud`](crate::FakeCloud) creates the VM and
//! every disk it references.

use zonemove_common::{
    CachingMode, DataDiskRef, DeleteOption, DiskDescriptor, NicReference, OsDiskRef, OsType, ResourceScope,
    VmDescriptor,
};

pub const SUBSCRIPTION_ID: &str = "00000000-1111-2222-3333-444444444444";
pub const RESOURCE_GROUP: &str = "rg-zonemove";
pub const LOCATION: &str = "westeurope";
pub const DEFAULT_VM_SIZE: &str = "Standard_D4s_v5";
pub const DEFAULT_DISK_SKU: &str = "Premium_LRS";

/// Scope every fixture lives in.
pub fn scope() -> ResourceScope {
    ResourceScope::new(SUBSCRIPTION_ID, RESOURCE_GROUP)
}

fn resource_id(provider: &str, kind: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
        SUBSCRIPTION_ID, RESOURCE_GROUP, provider, kind, name
    )
}

pub fn vm_id(name: &str) -> String {
    resource_id("Microsoft.Compute", "virtualMachines", name)
}

pub fn disk_id(name: &str) -> String {
    resource_id("Microsoft.Compute", "disks", name)
}

pub fn snapshot_id(name: &str) -> String {
    resource_id("Microsoft.Compute", "snapshots", name)
}

pub fn nic_id(name: &str) -> String {
    resource_id("Microsoft.Network", "networkInterfaces", name)
}

/// Managed disk owned by a fixture VM
#[derive(Debug, Clone)]
pub struct DiskFixture {
    pub name: String,
    pub size_gb: u32,
    pub sku: String,
    pub caching: CachingMode,
}

impl DiskFixture {
    pub fn new(name: impl Into<String>, size_gb: u32) -> Self {
        Self {
            name: name.into(),
            size_gb,
            sku: DEFAULT_DISK_SKU.to_string(),
            caching: CachingMode::None,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = sku.into();
        self
    }

    pub fn with_caching(mut self, caching: CachingMode) -> Self {
        self.caching = caching;
        self
    }

    pub fn descriptor(&self) -> DiskDescriptor {
        DiskDescriptor {
            id: disk_id(&self.name),
            name: self.name.clone(),
            location: LOCATION.to_string(),
            zones: Vec::new(),
            sku: self.sku.clone(),
            size_gb: Some(self.size_gb),
        }
    }
}

/// Zoneless VM with its disks and network interfaces
#[derive(Debug, Clone)]
pub struct VmFixture {
    pub name: String,
    pub vm_size: String,
    pub os_type: OsType,
    pub os_disk: DiskFixture,
    pub data_disks: Vec<(u32, DiskFixture)>,
    pub nics: Vec<NicReference>,
    /// Delete option of every disk and NIC reference.
    pub delete_option: DeleteOption,
}

impl VmFixture {
    /// VM with a 127 GB OS disk named `<name>_OsDisk` and no NICs.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            os_disk: DiskFixture::new(format!("{}_OsDisk", name), 127)
                .with_caching(CachingMode::ReadWrite),
            name,
            vm_size: DEFAULT_VM_SIZE.to_string(),
            os_type: OsType::Windows,
            data_disks: Vec::new(),
            nics: Vec::new(),
            delete_option: DeleteOption::Detach,
        }
    }

    pub fn with_size(mut self, vm_size: impl Into<String>) -> Self {
        self.vm_size = vm_size.into();
        self
    }

    pub fn with_os_type(mut self, os_type: OsType) -> Self {
        self.os_type = os_type;
        self
    }

    pub fn with_os_disk(mut self, disk: DiskFixture) -> Self {
        self.os_disk = disk;
        self
    }

    pub fn with_data_disk(mut self, lun: u32, disk: DiskFixture) -> Self {
        self.data_disks.push((lun, disk));
        self
    }

    /// Adds a NIC named `name` in the fixture resource group.
    pub fn with_nic(mut self, name: &str, primary: bool) -> Self {
        self.nics.push(NicReference::new(nic_id(name), primary));
        self
    }

    /// Adds a NIC reference with an arbitrary id.
    pub fn with_nic_id(mut self, id: impl Into<String>, primary: bool) -> Self {
        self.nics.push(NicReference::new(id, primary));
        self
    }

    /// Sets what deleting the VM does to its disks and NICs.
    pub fn with_delete_option(mut self, delete_option: DeleteOption) -> Self {
        self.delete_option = delete_option;
        self
    }

    /// Every managed disk the VM references, OS disk first.
    pub fn disks(&self) -> Vec<DiskDescriptor> {
        std::iter::once(&self.os_disk)
            .chain(self.data_disks.iter().map(|(_, disk)| disk))
            .map(DiskFixture::descriptor)
            .collect()
    }

    pub fn descriptor(&self) -> VmDescriptor {
        VmDescriptor {
            id: vm_id(&self.name),
            name: self.name.clone(),
            location: LOCATION.to_string(),
            zones: Vec::new(),
            vm_size: self.vm_size.clone(),
            os_type: Some(self.os_type),
            os_disk: OsDiskRef {
                name: self.os_disk.name.clone(),
                managed_disk_id: disk_id(&self.os_disk.name),
                caching: self.os_disk.caching,
                size_gb: Some(self.os_disk.size_gb),
                delete_option: self.delete_option,
            },
            data_disks: self
                .data_disks
                .iter()
                .map(|(lun, disk)| DataDiskRef {
                    name: disk.name.clone(),
                    lun: *lun,
                    managed_disk_id: disk_id(&disk.name),
                    caching: disk.caching,
                    size_gb: Some(disk.size_gb),
                    delete_option: self.delete_option,
                })
                .collect(),
            nics: self
                .nics
                .iter()
                .cloned()
                .map(|nic| nic.with_delete_option(self.delete_option))
                .collect(),
        }
    }
}

/// Ready-made VMs
pub mod vm_fixtures {
    use super::*;

    /// `MyVM`: Windows, `osdisk`, `data0` at LUN 0, `data1` at LUN 1 and two
    /// NICs, the first one primary.
    pub fn my_vm() -> VmFixture {
        VmFixture::new("MyVM")
            .with_os_disk(DiskFixture::new("osdisk", 127).with_caching(CachingMode::ReadWrite))
            .with_data_disk(
                0,
                DiskFixture::new("data0", 256).with_caching(CachingMode::ReadOnly),
            )
            .with_data_disk(
                1,
                DiskFixture::new("data1", 512)
                    .with_sku("StandardSSD_LRS")
                    .with_caching(CachingMode::None),
            )
            .with_nic("myvm-nic0", true)
            .with_nic("myvm-nic1", false)
    }

    /// Linux VM with only an OS disk and one NIC.
    pub fn linux_os_only(name: &str) -> VmFixture {
        VmFixture::new(name)
            .with_os_type(OsType::Linux)
            .with_size("Standard_B2ms")
            .with_nic(&format!("{}-nic", name.to_lowercase()), true)
    }

    /// VM with `count` data disks `disk0..disk{count-1}` at matching LUNs.
    pub fn with_data_disks(name: &str, count: u32) -> VmFixture {
        (0..count).fold(
            VmFixture::new(name).with_nic(&format!("{}-nic", name.to_lowercase()), true),
            |vm, lun| vm.with_data_disk(lun, DiskFixture::new(format!("disk{}", lun), 64 + lun)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_my_vm_descriptor() {
        let vm = vm_fixtures::my_vm().descriptor();
        assert_eq!(vm.name, "MyVM");
        assert_eq!(vm.os_disk.name, "osdisk");
        assert_eq!(vm.data_disks.len(), 2);
        assert_eq!(vm.data_disks[1].lun, 1);
        assert_eq!(vm.data_disks[1].caching, CachingMode::None);
        assert_eq!(vm.primary_nic().map(|n| n.id.clone()), Some(nic_id("myvm-nic0")));
    }

    #[test]
    fn test_disks_os_first() {
        let names: Vec<String> = vm_fixtures::my_vm()
            .disks()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["osdisk", "data0", "data1"]);
    }

    #[test]
    fn test_with_data_disks() {
        let vm = vm_fixtures::with_data_disks("Big", 4).descriptor();
        assert_eq!(vm.data_disks.len(), 4);
        assert_eq!(vm.data_disks[3].name, "disk3");
        assert_eq!(vm.data_disks[3].size_gb, Some(67));
    }
}
