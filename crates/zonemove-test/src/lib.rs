//! Test infrastructure for zonemove
//!
//! Provides:
//! - [`FakeCloud`]: an in-memory [`zonemove_common::ComputeApi`] with call
//!   recording and fault injection
//! - Fixtures for VMs with disks and network interfaces
//! - Verification helpers for the resulting cloud state

mod fake_cloud;
pub mod fixtures;
mod verification;

pub use fake_cloud::{Call, FakeCloud, Operation, PowerState};
pub use fixtures::*;
pub use verification::*;
