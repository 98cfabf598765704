//! Common infrastructure for zonemove.
//!
//! This crate holds what the orchestrator and the control-plane clients
//! share:
//!
//! - [`ComputeApi`]: the capabilities the migration consumes
//! - [`types`]: VM, disk, snapshot and NIC descriptors
//! - [`VmConfig`]: the replacement VM definition
//! - [`naming`]: fixed names of derived snapshots and disks
//! - [`error`]: error types
//!
//! # Example
//!
//! ```
//! use zonemove_common::{naming, Zone};
//!
//! let zone: Zone = "2".parse().unwrap();
//! assert_eq!(naming::zoned_disk_name("data0", zone), "data0_z_2");
//! ```

pub mod compute;
pub mod error;
pub mod naming;
pub mod types;
pub mod vm_config;

// Re-export commonly used items at crate root
pub use compute::ComputeApi;
pub use error::{MigrateError, MigrateResult};
pub use types::{
    CachingMode, DataDiskRef, DeleteOption, DiskDescriptor, DiskSpec, NicReference, OsDiskRef, OsType,
    ResourceScope, SnapshotDescriptor, SnapshotSpec, SubscriptionInfo, VmDescriptor, Zone,
    SNAPSHOT_SKU,
};
pub use vm_config::{DataDiskAttachment, NicAttachment, OsDiskAttachment, VmConfig};
