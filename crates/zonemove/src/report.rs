//! Phases of a migration run and the record kept of them.
//!
//! A run is a forward-only state machine over [`Phase::ALL`]. Each phase
//! ends in a [`PhaseOutcome`] and the [`MigrationReport`] keeps them in
//! order, together with the resources created and deleted along the way.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zonemove_common::{MigrateResult, Zone};

/// Migration phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SelectSubscription,
    ReadSourceVm,
    StopSourceVm,
    MigrateOsDisk,
    MigrateDataDisks,
    DeleteSourceVm,
    BuildVmConfig,
    AttachNics,
    CreateVm,
    CleanupSnapshots,
    CleanupSourceDisks,
}

/// What a failed phase does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Nothing has been changed yet; the run ends.
    Fatal,
    /// Remaining phases are skipped; the migration is left incomplete.
    Halt,
    /// The failure is recorded and the run carries on.
    Continue,
}

impl Phase {
    pub const ALL: [Phase; 11] = [
        Phase::SelectSubscription,
        Phase::ReadSourceVm,
        Phase::StopSourceVm,
        Phase::MigrateOsDisk,
        Phase::MigrateDataDisks,
        Phase::DeleteSourceVm,
        Phase::BuildVmConfig,
        Phase::AttachNics,
        Phase::CreateVm,
        Phase::CleanupSnapshots,
        Phase::CleanupSourceDisks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::SelectSubscription => "select_subscription",
            Phase::ReadSourceVm => "read_source_vm",
            Phase::StopSourceVm => "stop_source_vm",
            Phase::MigrateOsDisk => "migrate_os_disk",
            Phase::MigrateDataDisks => "migrate_data_disks",
            Phase::DeleteSourceVm => "delete_source_vm",
            Phase::BuildVmConfig => "build_vm_config",
            Phase::AttachNics => "attach_nics",
            Phase::CreateVm => "create_vm",
            Phase::CleanupSnapshots => "cleanup_snapshots",
            Phase::CleanupSourceDisks => "cleanup_source_disks",
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        match self {
            Phase::SelectSubscription | Phase::ReadSourceVm => FailurePolicy::Fatal,
            Phase::AttachNics | Phase::CleanupSnapshots | Phase::CleanupSourceDisks => {
                FailurePolicy::Continue
            }
            _ => FailurePolicy::Halt,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a phase ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Succeeded,
    /// Finished, but some items inside the phase failed.
    CompletedWithWarnings { warnings: Vec<String> },
    Failed { reason: String },
    /// Optional phase not requested.
    Skipped,
    /// Not reached because an earlier phase stopped the run.
    NotRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    #[serde(flatten)]
    pub outcome: PhaseOutcome,
    pub elapsed_ms: u64,
}

/// Final status of a run, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    CompletedWithWarnings,
    Halted,
    Fatal,
}

impl RunStatus {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::Fatal => 1,
            RunStatus::Halted | RunStatus::InProgress => 2,
            RunStatus::CompletedWithWarnings => 3,
        }
    }
}

/// Record of one migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub subscription_id: String,
    pub resource_group: String,
    pub vm_name: String,
    pub zone: Zone,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub status: RunStatus,
    pub phases: Vec<PhaseRecord>,
    pub snapshots_created: Vec<String>,
    pub disks_created: Vec<String>,
    pub resources_deleted: Vec<String>,
}

impl MigrationReport {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        vm_name: impl Into<String>,
        zone: Zone,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            vm_name: vm_name.into(),
            zone,
            started_at: Utc::now(),
            finished_at: None,
            elapsed_ms: 0,
            status: RunStatus::InProgress,
            phases: Vec::with_capacity(Phase::ALL.len()),
            snapshots_created: Vec::new(),
            disks_created: Vec::new(),
            resources_deleted: Vec::new(),
        }
    }

    pub fn record(&mut self, phase: Phase, outcome: PhaseOutcome, elapsed: Duration) {
        self.phases.push(PhaseRecord {
            phase,
            outcome,
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    /// Outcome of `phase`, if it has been recorded.
    pub fn outcome(&self, phase: Phase) -> Option<&PhaseOutcome> {
        self.phases
            .iter()
            .find(|r| r.phase == phase)
            .map(|r| &r.outcome)
    }

    /// Warnings collected across all phases.
    pub fn warnings(&self) -> Vec<String> {
        self.phases
            .iter()
            .flat_map(|r| match &r.outcome {
                PhaseOutcome::CompletedWithWarnings { warnings } => warnings.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    /// Derives the final status from the phase outcomes and stamps the end
    /// time.
    pub fn finish(&mut self, elapsed: Duration) {
        self.finished_at = Some(Utc::now());
        self.elapsed_ms = elapsed.as_millis() as u64;
        self.status = self.derive_status();
    }

    fn derive_status(&self) -> RunStatus {
        let mut status = RunStatus::Completed;
        for record in &self.phases {
            match (&record.outcome, record.phase.failure_policy()) {
                (PhaseOutcome::Failed { .. }, FailurePolicy::Fatal) => return RunStatus::Fatal,
                (PhaseOutcome::Failed { .. }, FailurePolicy::Halt) => return RunStatus::Halted,
                (PhaseOutcome::Failed { .. }, FailurePolicy::Continue)
                | (PhaseOutcome::CompletedWithWarnings { .. }, _) => {
                    status = RunStatus::CompletedWithWarnings;
                }
                _ => {}
            }
        }
        status
    }

    /// Writes the report as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> MigrateResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| zonemove_common::MigrateError::internal(format!("serialize report: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
