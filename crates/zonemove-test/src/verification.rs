//! Verification helpers for the state a migration leaves behind

use thiserror::Error;
use zonemove_common::{DiskDescriptor, SnapshotDescriptor, VmDescriptor, Zone};

use crate::fake_cloud::{FakeCloud, Operation, PowerState};

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected {kind} '{name}' to exist")]
    Missing { kind: String, name: String },

    #[error("Expected {kind} '{name}' to be gone")]
    Unexpected { kind: String, name: String },

    #[error("Value mismatch for {kind} '{name}' {field}: expected '{expected}', got '{actual}'")]
    ValueMismatch {
        kind: String,
        name: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Expected no {op} calls, found {count}")]
    UnexpectedCalls { op: String, count: usize },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

fn missing(kind: &str, name: &str) -> VerificationError {
    VerificationError::Missing {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

fn unexpected(kind: &str, name: &str) -> VerificationError {
    VerificationError::Unexpected {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

/// Cloud state verifier
pub struct CloudVerifier<'a> {
    cloud: &'a FakeCloud,
}

impl<'a> CloudVerifier<'a> {
    pub fn new(cloud: &'a FakeCloud) -> Self {
        Self { cloud }
    }

    pub fn assert_vm_exists(&self, name: &str) -> VerifyResult<VmDescriptor> {
        self.cloud.vm(name).ok_or_else(|| missing("VM", name))
    }

    pub fn assert_vm_absent(&self, name: &str) -> VerifyResult<()> {
        match self.cloud.vm(name) {
            Some(_) => Err(unexpected("VM", name)),
            None => Ok(()),
        }
    }

    pub fn assert_power_state(&self, name: &str, expected: PowerState) -> VerifyResult<()> {
        let actual = self.cloud.power_state(name).ok_or_else(|| missing("VM", name))?;
        if actual != expected {
            return Err(VerificationError::ValueMismatch {
                kind: "VM".to_string(),
                name: name.to_string(),
                field: "power_state".to_string(),
                expected: format!("{:?}", expected),
                actual: format!("{:?}", actual),
            });
        }
        Ok(())
    }

    pub fn assert_disk_exists(&self, name: &str) -> VerifyResult<DiskDescriptor> {
        self.cloud.disk(name).ok_or_else(|| missing("disk", name))
    }

    pub fn assert_disk_absent(&self, name: &str) -> VerifyResult<()> {
        match self.cloud.disk(name) {
            Some(_) => Err(unexpected("disk", name)),
            None => Ok(()),
        }
    }

    /// Verifies the disk exists and is pinned to `zone` only.
    pub fn assert_disk_zone(&self, name: &str, zone: Zone) -> VerifyResult<DiskDescriptor> {
        let disk = self.assert_disk_exists(name)?;
        if disk.zones != [zone.as_str()] {
            return Err(VerificationError::ValueMismatch {
                kind: "disk".to_string(),
                name: name.to_string(),
                field: "zones".to_string(),
                expected: format!("[{}]", zone),
                actual: format!("{:?}", disk.zones),
            });
        }
        Ok(disk)
    }

    pub fn assert_snapshot_exists(&self, name: &str) -> VerifyResult<SnapshotDescriptor> {
        self.cloud.snapshot(name).ok_or_else(|| missing("snapshot", name))
    }

    pub fn assert_snapshot_absent(&self, name: &str) -> VerifyResult<()> {
        match self.cloud.snapshot(name) {
            Some(_) => Err(unexpected("snapshot", name)),
            None => Ok(()),
        }
    }

    pub fn assert_nic_exists(&self, id: &str) -> VerifyResult<()> {
        if self.cloud.nic_exists(id) {
            Ok(())
        } else {
            Err(missing("network interface", id))
        }
    }

    /// Verifies that `op` was never called.
    pub fn assert_not_called(&self, op: Operation) -> VerifyResult<()> {
        let count = self.cloud.calls_of(op).len();
        if count > 0 {
            return Err(VerificationError::UnexpectedCalls {
                op: op.as_str().to_string(),
                count,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::vm_fixtures;

    #[test]
    fn test_verifier_on_seeded_cloud() {
        let cloud = FakeCloud::with_vm(&vm_fixtures::my_vm());
        let verifier = CloudVerifier::new(&cloud);

        assert!(verifier.assert_vm_exists("MyVM").is_ok());
        assert!(verifier.assert_power_state("MyVM", PowerState::Running).is_ok());
        assert!(verifier.assert_disk_exists("data1").is_ok());
        assert!(verifier
            .assert_nic_exists(&crate::fixtures::nic_id("myvm-nic1"))
            .is_ok());
        assert!(verifier.assert_nic_exists("missing-nic").is_err());
        assert!(verifier.assert_snapshot_absent("data1-snapshot").is_ok());
        assert!(verifier.assert_not_called(Operation::CreateVm).is_ok());

        let err = verifier.assert_disk_zone("data1", Zone::One).unwrap_err();
        assert!(matches!(err, VerificationError::ValueMismatch { .. }));
        assert!(verifier.assert_vm_absent("MyVM").is_err());
    }
}
