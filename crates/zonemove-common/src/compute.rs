//! Control-plane capabilities consumed by the zone migration.
//!
//! The orchestrator never talks HTTP itself; it drives an implementation of
//! [`ComputeApi`]. `zonemove-arm` provides the Azure Resource Manager one and
//! `zonemove-test` an in-memory one.
//!
//! Every method is a single remote attempt. Implementations wait for the
//! operation to reach a terminal state before returning but never retry a
//! failed call.
//!
//! # Example
//!
//! ```ignore
//! use zonemove_common::{ComputeApi, ResourceScope};
//!
//! async fn show(api: &dyn ComputeApi, scope: &ResourceScope) -> zonemove_common::MigrateResult<()> {
//!     let vm = api.get_vm(scope, "MyVM").await?;
//!     println!("{} has {} data disks", vm.name, vm.data_disks.len());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;

use crate::error::MigrateResult;
use crate::types::{
    DiskDescriptor, DiskSpec, ResourceScope, SnapshotDescriptor, SnapshotSpec, SubscriptionInfo,
    VmDescriptor,
};
use crate::vm_config::VmConfig;

/// Operations on VMs, disks and snapshots within one resource group.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Binds to the subscription and confirms it is usable.
    async fn select_subscription(&self, subscription_id: &str) -> MigrateResult<SubscriptionInfo>;

    /// Reads a VM with its disk and NIC references.
    async fn get_vm(&self, scope: &ResourceScope, name: &str) -> MigrateResult<VmDescriptor>;

    /// Powers the VM off without a guest shutdown.
    async fn power_off_vm(&self, scope: &ResourceScope, name: &str) -> MigrateResult<()>;

    /// Sets every disk and NIC of the VM to be detached rather than deleted
    /// when the VM is deleted.
    async fn detach_on_delete(&self, scope: &ResourceScope, vm: &VmDescriptor)
        -> MigrateResult<()>;

    /// Deletes the VM compute resource. Disks and NICs whose delete option
    /// is `Delete` go with it; the rest survive.
    async fn delete_vm(&self, scope: &ResourceScope, name: &str) -> MigrateResult<()>;

    /// Creates a VM from `config`.
    async fn create_vm(&self, scope: &ResourceScope, config: &VmConfig)
        -> MigrateResult<VmDescriptor>;

    /// Reads a managed disk.
    async fn get_disk(&self, scope: &ResourceScope, name: &str) -> MigrateResult<DiskDescriptor>;

    /// Creates a managed disk.
    async fn create_disk(&self, scope: &ResourceScope, spec: &DiskSpec)
        -> MigrateResult<DiskDescriptor>;

    /// Deletes a managed disk.
    async fn delete_disk(&self, scope: &ResourceScope, name: &str) -> MigrateResult<()>;

    /// Creates a snapshot of a managed disk.
    async fn create_snapshot(
        &self,
        scope: &ResourceScope,
        spec: &SnapshotSpec,
    ) -> MigrateResult<SnapshotDescriptor>;

    /// Deletes a snapshot.
    async fn delete_snapshot(&self, scope: &ResourceScope, name: &str) -> MigrateResult<()>;
}
