//! In-memory control plane
//!
//! [`FakeCloud`] keeps VMs, disks and snapshots in maps and enforces the
//! rules a migration runs into on the real service: names are unique per
//! kind, a disk attached to a VM cannot be deleted or attached twice, a
//! zoned VM only takes disks from its own zone, and deleting a VM also
//! deletes the disks and NICs whose delete option is `Delete`. Every call is
//! recorded and any call can be made to fail.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use zonemove_common::{
    naming, DataDiskRef, DeleteOption, DiskDescriptor, DiskSpec, MigrateError, MigrateResult, NicReference,
    OsDiskRef, ResourceScope, SnapshotDescriptor, SnapshotSpec, SubscriptionInfo, VmConfig,
    VmDescriptor,
};

use crate::fixtures::{self, VmFixture};

/// Control-plane operation, for call recording and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SelectSubscription,
    GetVm,
    PowerOffVm,
    DetachOnDelete,
    DeleteVm,
    CreateVm,
    GetDisk,
    CreateDisk,
    DeleteDisk,
    CreateSnapshot,
    DeleteSnapshot,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SelectSubscription => "select_subscription",
            Operation::GetVm => "get_vm",
            Operation::PowerOffVm => "power_off_vm",
            Operation::DetachOnDelete => "detach_on_delete",
            Operation::DeleteVm => "delete_vm",
            Operation::CreateVm => "create_vm",
            Operation::GetDisk => "get_disk",
            Operation::CreateDisk => "create_disk",
            Operation::DeleteDisk => "delete_disk",
            Operation::CreateSnapshot => "create_snapshot",
            Operation::DeleteSnapshot => "delete_snapshot",
        }
    }
}

/// One recorded call: the operation and the resource name it targeted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Operation,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
struct FakeVm {
    descriptor: VmDescriptor,
    power: PowerState,
}

impl FakeVm {
    fn uses_disk(&self, disk_id: &str) -> bool {
        self.descriptor.os_disk.managed_disk_id.eq_ignore_ascii_case(disk_id)
            || self
                .descriptor
                .data_disks
                .iter()
                .any(|d| d.managed_disk_id.eq_ignore_ascii_case(disk_id))
    }
}

#[derive(Debug, Clone)]
struct FakeSnapshot {
    descriptor: SnapshotDescriptor,
    size_gb: Option<u32>,
}

/// Injected failure: `target` of `None` matches every call of `op`
#[derive(Debug, Clone)]
struct Fault {
    op: Operation,
    target: Option<String>,
}

#[derive(Debug, Default)]
struct CloudState {
    subscriptions: BTreeMap<String, SubscriptionInfo>,
    vms: BTreeMap<String, FakeVm>,
    disks: BTreeMap<String, DiskDescriptor>,
    snapshots: BTreeMap<String, FakeSnapshot>,
    /// Lowercased NIC ids.
    nics: BTreeSet<String>,
    faults: Vec<Fault>,
    calls: Vec<Call>,
}

impl CloudState {
    /// Records the call, then fails it if a fault matches.
    fn enter(&mut self, op: Operation, target: &str) -> MigrateResult<()> {
        debug!(op = op.as_str(), target, "FakeCloud call");
        self.calls.push(Call {
            op,
            target: target.to_string(),
        });
        let faulted = self
            .faults
            .iter()
            .any(|f| f.op == op && f.target.as_deref().map_or(true, |t| t == target));
        if faulted {
            return Err(MigrateError::Api {
                operation: op.as_str().to_string(),
                status: 500,
                code: "InjectedFault".to_string(),
                message: format!("injected failure for {}", target),
            });
        }
        Ok(())
    }

    fn disk_by_id(&self, id: &str) -> Option<&DiskDescriptor> {
        self.disks.values().find(|d| d.id.eq_ignore_ascii_case(id))
    }

    fn snapshot_by_id(&self, id: &str) -> Option<&FakeSnapshot> {
        self.snapshots
            .values()
            .find(|s| s.descriptor.id.eq_ignore_ascii_case(id))
    }

    fn has_nic(&self, id: &str) -> bool {
        self.nics.contains(&id.to_ascii_lowercase())
    }

    fn disk_owner(&self, disk_id: &str) -> Option<&str> {
        self.vms
            .values()
            .find(|vm| vm.uses_disk(disk_id))
            .map(|vm| vm.descriptor.name.as_str())
    }
}

fn rejected(op: Operation, status: u16, code: &str, message: String) -> MigrateError {
    MigrateError::Api {
        operation: op.as_str().to_string(),
        status,
        code: code.to_string(),
        message,
    }
}

/// In-memory [`ComputeApi`](zonemove_common::ComputeApi). Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    /// Empty cloud with the fixture subscription enabled.
    pub fn new() -> Self {
        let cloud = Self::default();
        cloud.add_subscription(fixtures::SUBSCRIPTION_ID, "Enabled");
        cloud
    }

    /// Cloud holding `vm` and its disks.
    pub fn with_vm(vm: &VmFixture) -> Self {
        let cloud = Self::new();
        cloud.add_vm(vm);
        cloud
    }

    pub fn add_subscription(&self, subscription_id: &str, state: &str) {
        self.state.lock().subscriptions.insert(
            subscription_id.to_string(),
            SubscriptionInfo {
                subscription_id: subscription_id.to_string(),
                display_name: format!("Subscription {}", subscription_id),
                state: state.to_string(),
            },
        );
    }

    /// Adds a running VM and every disk it references.
    pub fn add_vm(&self, vm: &VmFixture) {
        let mut state = self.state.lock();
        for disk in vm.disks() {
            state.disks.insert(disk.name.clone(), disk);
        }
        for nic in &vm.nics {
            state.nics.insert(nic.id.to_ascii_lowercase());
        }
        state.vms.insert(
            vm.name.clone(),
            FakeVm {
                descriptor: vm.descriptor(),
                power: PowerState::Running,
            },
        );
    }

    /// Adds a standalone disk.
    pub fn add_disk(&self, disk: DiskDescriptor) {
        self.state.lock().disks.insert(disk.name.clone(), disk);
    }

    /// Makes every call of `op` on `target` fail.
    pub fn fail_on(&self, op: Operation, target: &str) {
        self.state.lock().faults.push(Fault {
            op,
            target: Some(target.to_string()),
        });
    }

    /// Makes every call of `op` fail.
    pub fn fail_all(&self, op: Operation) {
        self.state.lock().faults.push(Fault { op, target: None });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Targets of every recorded call of `op`, in call order.
    pub fn calls_of(&self, op: Operation) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.target.clone())
            .collect()
    }

    pub fn vm(&self, name: &str) -> Option<VmDescriptor> {
        self.state.lock().vms.get(name).map(|vm| vm.descriptor.clone())
    }

    pub fn power_state(&self, name: &str) -> Option<PowerState> {
        self.state.lock().vms.get(name).map(|vm| vm.power)
    }

    pub fn disk(&self, name: &str) -> Option<DiskDescriptor> {
        self.state.lock().disks.get(name).cloned()
    }

    pub fn snapshot(&self, name: &str) -> Option<SnapshotDescriptor> {
        self.state
            .lock()
            .snapshots
            .get(name)
            .map(|s| s.descriptor.clone())
    }

    /// Whether the NIC with resource id `id` exists.
    pub fn nic_exists(&self, id: &str) -> bool {
        self.state.lock().has_nic(id)
    }

    pub fn disk_names(&self) -> Vec<String> {
        self.state.lock().disks.keys().cloned().collect()
    }

    pub fn snapshot_names(&self) -> Vec<String> {
        self.state.lock().snapshots.keys().cloned().collect()
    }
}

#[async_trait]
impl zonemove_common::ComputeApi for FakeCloud {
    async fn select_subscription(&self, subscription_id: &str) -> MigrateResult<SubscriptionInfo> {
        let mut state = self.state.lock();
        state.enter(Operation::SelectSubscription, subscription_id)?;
        match state.subscriptions.get(subscription_id) {
            Some(info) if info.state == "Enabled" => Ok(info.clone()),
            Some(info) => Err(MigrateError::auth(format!(
                "subscription {} is {}",
                subscription_id, info.state
            ))),
            None => Err(MigrateError::auth(format!(
                "subscription {} is not accessible",
                subscription_id
            ))),
        }
    }

    async fn get_vm(&self, _scope: &ResourceScope, name: &str) -> MigrateResult<VmDescriptor> {
        let mut state = self.state.lock();
        state.enter(Operation::GetVm, name)?;
        state
            .vms
            .get(name)
            .map(|vm| vm.descriptor.clone())
            .ok_or_else(|| MigrateError::not_found("virtual machine", name))
    }

    async fn power_off_vm(&self, _scope: &ResourceScope, name: &str) -> MigrateResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::PowerOffVm, name)?;
        let vm = state
            .vms
            .get_mut(name)
            .ok_or_else(|| MigrateError::not_found("virtual machine", name))?;
        vm.power = PowerState::Stopped;
        Ok(())
    }

    async fn detach_on_delete(&self, _scope: &ResourceScope, vm: &VmDescriptor) -> MigrateResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::DetachOnDelete, &vm.name)?;
        let stored = state
            .vms
            .get_mut(&vm.name)
            .ok_or_else(|| MigrateError::not_found("virtual machine", vm.name.clone()))?;

        let descriptor = &mut stored.descriptor;
        descriptor.os_disk.delete_option = DeleteOption::Detach;
        for disk in &mut descriptor.data_disks {
            disk.delete_option = DeleteOption::Detach;
        }
        for nic in &mut descriptor.nics {
            nic.delete_option = DeleteOption::Detach;
        }
        Ok(())
    }

    async fn delete_vm(&self, _scope: &ResourceScope, name: &str) -> MigrateResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::DeleteVm, name)?;
        let Some(vm) = state.vms.remove(name) else {
            return Ok(());
        };

        let vm = vm.descriptor;
        let disk_ids = std::iter::once((&vm.os_disk.managed_disk_id, vm.os_disk.delete_option))
            .chain(
                vm.data_disks
                    .iter()
                    .map(|d| (&d.managed_disk_id, d.delete_option)),
            )
            .filter(|(_, option)| *option == DeleteOption::Delete)
            .map(|(id, _)| id.to_ascii_lowercase())
            .collect::<BTreeSet<_>>();
        state
            .disks
            .retain(|_, disk| !disk_ids.contains(&disk.id.to_ascii_lowercase()));
        for nic in vm.nics.iter().filter(|n| n.delete_option == DeleteOption::Delete) {
            debug!(nic = %nic.id, vm = name, "Deleting NIC with its VM");
            state.nics.remove(&nic.id.to_ascii_lowercase());
        }
        Ok(())
    }

    async fn create_vm(&self, scope: &ResourceScope, config: &VmConfig) -> MigrateResult<VmDescriptor> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateVm, &config.name)?;

        if state.vms.contains_key(&config.name) {
            return Err(MigrateError::conflict("virtual machine", config.name.clone()));
        }
        let os = config
            .os_disk
            .as_ref()
            .ok_or_else(|| MigrateError::invalid_config("os_disk", "no OS disk attached"))?;

        let zone = config.zone.as_str();
        let attached_ids = std::iter::once(&os.managed_disk_id)
            .chain(config.data_disks.iter().map(|d| &d.managed_disk_id));
        for id in attached_ids {
            let disk = state.disk_by_id(id).ok_or_else(|| {
                MigrateError::not_found("disk", naming::resource_name(id).unwrap_or(id.as_str()))
            })?;
            if !disk.zones.is_empty() && !disk.zones.iter().any(|z| z == zone) {
                return Err(rejected(
                    Operation::CreateVm,
                    400,
                    "BadRequest",
                    format!("disk {} is not in zone {}", disk.name, zone),
                ));
            }
            if let Some(owner) = state.disk_owner(id) {
                return Err(rejected(
                    Operation::CreateVm,
                    409,
                    "Conflict",
                    format!("disk {} is already attached to {}", disk.name, owner),
                ));
            }
        }

        for nic in config.effective_nics() {
            if !state.has_nic(&nic.id) {
                return Err(MigrateError::not_found(
                    "network interface",
                    naming::resource_name(&nic.id).unwrap_or(nic.id.as_str()),
                ));
            }
        }

        let size_of = |id: &str| state.disk_by_id(id).and_then(|d| d.size_gb);
        let descriptor = VmDescriptor {
            id: format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines/{}",
                scope.subscription_id, scope.resource_group, config.name
            ),
            name: config.name.clone(),
            location: config.location.clone(),
            zones: vec![zone.to_string()],
            vm_size: config.vm_size.clone(),
            os_type: Some(os.os_type),
            os_disk: OsDiskRef {
                name: os.name.clone(),
                managed_disk_id: os.managed_disk_id.clone(),
                caching: os.caching,
                size_gb: size_of(&os.managed_disk_id),
                delete_option: DeleteOption::Detach,
            },
            data_disks: config
                .data_disks
                .iter()
                .map(|d| DataDiskRef {
                    name: d.name.clone(),
                    lun: d.lun,
                    managed_disk_id: d.managed_disk_id.clone(),
                    caching: d.caching,
                    size_gb: size_of(&d.managed_disk_id),
                    delete_option: DeleteOption::Detach,
                })
                .collect(),
            nics: config
                .effective_nics()
                .into_iter()
                .map(|nic| NicReference::new(nic.id, nic.primary))
                .collect(),
        };

        state.vms.insert(
            config.name.clone(),
            FakeVm {
                descriptor: descriptor.clone(),
                power: PowerState::Running,
            },
        );
        Ok(descriptor)
    }

    async fn get_disk(&self, _scope: &ResourceScope, name: &str) -> MigrateResult<DiskDescriptor> {
        let mut state = self.state.lock();
        state.enter(Operation::GetDisk, name)?;
        state
            .disks
            .get(name)
            .cloned()
            .ok_or_else(|| MigrateError::not_found("disk", name))
    }

    async fn create_disk(&self, scope: &ResourceScope, spec: &DiskSpec) -> MigrateResult<DiskDescriptor> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateDisk, &spec.name)?;

        if state.disks.contains_key(&spec.name) {
            return Err(MigrateError::conflict("disk", spec.name.clone()));
        }
        let size_gb = state
            .snapshot_by_id(&spec.source_snapshot_id)
            .map(|s| s.size_gb)
            .ok_or_else(|| {
                MigrateError::not_found(
                    "snapshot",
                    naming::resource_name(&spec.source_snapshot_id)
                        .unwrap_or(spec.source_snapshot_id.as_str()),
                )
            })?;

        let disk = DiskDescriptor {
            id: format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/disks/{}",
                scope.subscription_id, scope.resource_group, spec.name
            ),
            name: spec.name.clone(),
            location: spec.location.clone(),
            zones: vec![spec.zone.as_str().to_string()],
            sku: spec.sku.clone(),
            size_gb,
        };
        state.disks.insert(spec.name.clone(), disk.clone());
        Ok(disk)
    }

    async fn delete_disk(&self, _scope: &ResourceScope, name: &str) -> MigrateResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::DeleteDisk, name)?;

        let Some(id) = state.disks.get(name).map(|d| d.id.clone()) else {
            return Ok(());
        };
        if let Some(owner) = state.disk_owner(&id) {
            return Err(rejected(
                Operation::DeleteDisk,
                409,
                "OperationNotAllowed",
                format!("disk {} is attached to VM {}", name, owner),
            ));
        }
        state.disks.remove(name);
        Ok(())
    }

    async fn create_snapshot(
        &self,
        scope: &ResourceScope,
        spec: &SnapshotSpec,
    ) -> MigrateResult<SnapshotDescriptor> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateSnapshot, &spec.name)?;

        if state.snapshots.contains_key(&spec.name) {
            return Err(MigrateError::conflict("snapshot", spec.name.clone()));
        }
        let size_gb = state
            .disk_by_id(&spec.source_disk_id)
            .map(|d| d.size_gb)
            .ok_or_else(|| {
                MigrateError::not_found(
                    "disk",
                    naming::resource_name(&spec.source_disk_id)
                        .unwrap_or(spec.source_disk_id.as_str()),
                )
            })?;

        let descriptor = SnapshotDescriptor {
            id: format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Compute/snapshots/{}",
                scope.subscription_id, scope.resource_group, spec.name
            ),
            name: spec.name.clone(),
            location: spec.location.clone(),
            sku: spec.sku.clone(),
        };
        state.snapshots.insert(
            spec.name.clone(),
            FakeSnapshot {
                descriptor: descriptor.clone(),
                size_gb,
            },
        );
        Ok(descriptor)
    }

    async fn delete_snapshot(&self, _scope: &ResourceScope, name: &str) -> MigrateResult<()> {
        let mut state = self.state.lock();
        state.enter(Operation::DeleteSnapshot, name)?;
        state.snapshots.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{scope, vm_fixtures, DiskFixture};
    use pretty_assertions::assert_eq;
    use zonemove_common::{CachingMode, ComputeApi, OsType, Zone};

    fn snapshot_spec(disk: &str) -> SnapshotSpec {
        SnapshotSpec {
            name: naming::snapshot_name(disk),
            location: fixtures::LOCATION.to_string(),
            source_disk_id: fixtures::disk_id(disk),
            sku: "Standard_ZRS".to_string(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_then_zoned_disk() {
        let cloud = FakeCloud::with_vm(&vm_fixtures::my_vm());

        let snapshot = cloud.create_snapshot(&scope(), &snapshot_spec("data0")).await.unwrap();
        let source = cloud.get_disk(&scope(), "data0").await.unwrap();
        let spec = DiskSpec::zoned_copy(&source, &snapshot, fixtures::LOCATION, Zone::Three);
        let disk = cloud.create_disk(&scope(), &spec).await.unwrap();

        assert_eq!(disk.name, "data0_z_3");
        assert_eq!(disk.zones, vec!["3".to_string()]);
        assert_eq!(disk.size_gb, Some(256));
        assert_eq!(disk.sku, "Premium_LRS");
    }

    #[tokio::test]
    async fn test_name_collision_is_conflict() {
        let cloud = FakeCloud::with_vm(&vm_fixtures::my_vm());
        cloud.create_snapshot(&scope(), &snapshot_spec("osdisk")).await.unwrap();

        let err = cloud
            .create_snapshot(&scope(), &snapshot_spec("osdisk"))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Conflict { .. }), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_attached_disk_cannot_be_deleted() {
        let cloud = FakeCloud::with_vm(&vm_fixtures::my_vm());
        let err = cloud.delete_disk(&scope(), "data0").await.unwrap_err();
        assert!(err.to_string().contains("attached to VM MyVM"), "{}", err);

        cloud.delete_vm(&scope(), "MyVM").await.unwrap();
        cloud.delete_disk(&scope(), "data0").await.unwrap();
        assert!(cloud.disk("data0").is_none());
    }

    #[tokio::test]
    async fn test_delete_vm_cascades_by_delete_option() {
        let fixture = vm_fixtures::my_vm().with_delete_option(DeleteOption::Delete);
        let cloud = FakeCloud::with_vm(&fixture);
        let nic0 = fixtures::nic_id("myvm-nic0");
        assert!(cloud.nic_exists(&nic0));

        cloud.delete_vm(&scope(), "MyVM").await.unwrap();

        assert!(cloud.disk("osdisk").is_none());
        assert!(cloud.disk("data0").is_none());
        assert!(!cloud.nic_exists(&nic0));
    }

    #[tokio::test]
    async fn test_detach_on_delete_keeps_dependents() {
        let fixture = vm_fixtures::my_vm().with_delete_option(DeleteOption::Delete);
        let cloud = FakeCloud::with_vm(&fixture);

        cloud.detach_on_delete(&scope(), &fixture.descriptor()).await.unwrap();
        assert!(cloud.vm("MyVM").map(|vm| vm.cascading_deletes().is_empty()).unwrap_or(false));

        cloud.delete_vm(&scope(), "MyVM").await.unwrap();
        assert!(cloud.disk("osdisk").is_some());
        assert!(cloud.disk("data1").is_some());
        assert!(cloud.nic_exists(&fixtures::nic_id("myvm-nic1")));
    }

    #[tokio::test]
    async fn test_create_vm_requires_existing_nic() {
        let cloud = FakeCloud::new();
        let disk = DiskFixture::new("os", 30).descriptor();
        cloud.add_disk(disk.clone());

        let mut config = VmConfig::new("vm", fixtures::LOCATION, "Standard_B2ms", Zone::One);
        config.set_os_disk(&disk, OsType::Linux, CachingMode::ReadWrite);
        config
            .add_nic(&NicReference::new(fixtures::nic_id("ghost-nic"), true))
            .unwrap();

        let err = cloud.create_vm(&scope(), &config).await.unwrap_err();
        assert_eq!(err.to_string(), "network interface 'ghost-nic' not found");
    }

    #[tokio::test]
    async fn test_create_vm_rejects_disk_from_other_zone() {
        let cloud = FakeCloud::new();
        let mut disk = DiskFixture::new("os", 30).descriptor();
        disk.zones = vec!["2".to_string()];
        cloud.add_disk(disk.clone());

        let mut config = VmConfig::new("vm", fixtures::LOCATION, "Standard_B2ms", Zone::One);
        config.set_os_disk(&disk, OsType::Linux, CachingMode::ReadWrite);

        let err = cloud.create_vm(&scope(), &config).await.unwrap_err();
        assert!(err.to_string().contains("not in zone 1"), "{}", err);
    }

    #[tokio::test]
    async fn test_fault_injection_and_call_log() {
        let cloud = FakeCloud::with_vm(&vm_fixtures::my_vm());
        cloud.fail_on(Operation::PowerOffVm, "MyVM");

        assert!(cloud.power_off_vm(&scope(), "MyVM").await.is_err());
        assert_eq!(cloud.power_state("MyVM"), Some(PowerState::Running));
        assert_eq!(cloud.calls_of(Operation::PowerOffVm), vec!["MyVM".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_subscription() {
        let cloud = FakeCloud::new();
        cloud.add_subscription("other", "Disabled");
        let err = cloud.select_subscription("other").await.unwrap_err();
        assert!(matches!(err, MigrateError::Auth { .. }));
        assert!(cloud.select_subscription(fixtures::SUBSCRIPTION_ID).await.is_ok());
    }
}
