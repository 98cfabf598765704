//! Zone migrator - moves one VM and its managed disks into an availability zone
//!
//! The migration runs the phases of [`Phase::ALL`] in order against a
//! [`ComputeApi`]. Each phase either succeeds, records warnings, or fails;
//! what a failure does to the rest of the run is given by
//! [`Phase::failure_policy`]. Nothing is retried and nothing is rolled back:
//! a halted run leaves the resources as they were at the failing call, and
//! the report lists what had been created or deleted by then.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};
use zonemove_common::{
    naming, ComputeApi, DiskDescriptor, DiskSpec, MigrateError, MigrateResult, OsType,
    ResourceScope, SnapshotDescriptor, SnapshotSpec, VmConfig, VmDescriptor, Zone,
};

use crate::report::{FailurePolicy, MigrationReport, Phase, PhaseOutcome};

/// Validated inputs of one migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    pub scope: ResourceScope,
    pub vm_name: String,
    pub location: String,
    pub zone: Zone,
    pub os_type: OsType,
    pub cleanup_snapshots: bool,
    pub cleanup_source_disks: bool,
}

impl MigrationRequest {
    pub fn new(
        scope: ResourceScope,
        vm_name: impl Into<String>,
        location: impl Into<String>,
        zone: Zone,
        os_type: OsType,
    ) -> Self {
        Self {
            scope,
            vm_name: vm_name.into(),
            location: location.into(),
            zone,
            os_type,
            cleanup_snapshots: false,
            cleanup_source_disks: false,
        }
    }

    pub fn with_cleanup(mut self, snapshots: bool, source_disks: bool) -> Self {
        self.cleanup_snapshots = snapshots;
        self.cleanup_source_disks = source_disks;
        self
    }

    /// Checks that every identifying field is set.
    pub fn validate(&self) -> MigrateResult<()> {
        let fields = [
            ("subscription_id", &self.scope.subscription_id),
            ("resource_group", &self.scope.resource_group),
            ("vm_name", &self.vm_name),
            ("location", &self.location),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(MigrateError::invalid_config(field, "must not be empty"));
            }
        }
        Ok(())
    }

    /// Whether `phase` is part of this run. Only the cleanup phases are
    /// optional.
    pub fn includes(&self, phase: Phase) -> bool {
        match phase {
            Phase::CleanupSnapshots => self.cleanup_snapshots,
            Phase::CleanupSourceDisks => self.cleanup_source_disks,
            _ => true,
        }
    }
}

/// Source disk together with the snapshot and zoned disk made from it.
#[derive(Debug, Clone)]
struct DiskCopy {
    source: DiskDescriptor,
    snapshot: SnapshotDescriptor,
    zoned: DiskDescriptor,
}

/// Drives migration runs against a control plane.
pub struct ZoneMigrator {
    api: Arc<dyn ComputeApi>,
}

impl ZoneMigrator {
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self { api }
    }

    /// Runs every phase for `request` and returns the finished report.
    ///
    /// Phase failures never surface as `Err`; they are recorded in the
    /// report and reflected in its [`RunStatus`](crate::report::RunStatus).
    pub async fn run(&self, request: &MigrationRequest) -> MigrationReport {
        MigrationRun::new(self.api.as_ref(), request).execute().await
    }
}

/// State carried from phase to phase within one run.
struct MigrationRun<'a> {
    api: &'a dyn ComputeApi,
    request: &'a MigrationRequest,
    report: MigrationReport,
    source: Option<VmDescriptor>,
    os_copy: Option<DiskCopy>,
    data_copies: Vec<DiskCopy>,
    vm_config: Option<VmConfig>,
}

impl<'a> MigrationRun<'a> {
    fn new(api: &'a dyn ComputeApi, request: &'a MigrationRequest) -> Self {
        let report = MigrationReport::new(
            &request.scope.subscription_id,
            &request.scope.resource_group,
            &request.vm_name,
            request.zone,
        );
        Self {
            api,
            request,
            report,
            source: None,
            os_copy: None,
            data_copies: Vec::new(),
            vm_config: None,
        }
    }

    async fn execute(mut self) -> MigrationReport {
        let run_started = Instant::now();
        info!(
            run_id = %self.report.run_id,
            vm = %self.request.vm_name,
            resource_group = %self.request.scope.resource_group,
            zone = %self.request.zone,
            "Starting zone migration"
        );

        let mut stopped = false;
        for phase in Phase::ALL {
            if stopped {
                self.report.record(phase, PhaseOutcome::NotRun, Duration::ZERO);
                continue;
            }
            if !self.request.includes(phase) {
                debug!(%phase, "Phase not requested");
                self.report.record(phase, PhaseOutcome::Skipped, Duration::ZERO);
                continue;
            }

            let started = Instant::now();
            let result = self.run_phase(phase).await;
            let elapsed = started.elapsed();
            let elapsed_ms = elapsed.as_millis() as u64;

            let outcome = match result {
                Ok(warnings) if warnings.is_empty() => {
                    info!(%phase, elapsed_ms, "Phase completed");
                    PhaseOutcome::Succeeded
                }
                Ok(warnings) => {
                    warn!(%phase, elapsed_ms, warnings = warnings.len(), "Phase completed with warnings");
                    PhaseOutcome::CompletedWithWarnings { warnings }
                }
                Err(err) => {
                    match phase.failure_policy() {
                        FailurePolicy::Fatal => {
                            error!(%phase, elapsed_ms, error = %err, "Phase failed, nothing was changed");
                            stopped = true;
                        }
                        FailurePolicy::Halt => {
                            warn!(%phase, elapsed_ms, error = %err, "Phase failed, migration halted");
                            stopped = true;
                        }
                        FailurePolicy::Continue => {
                            warn!(%phase, elapsed_ms, error = %err, "Phase failed, continuing");
                        }
                    }
                    PhaseOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            self.report.record(phase, outcome, elapsed);
        }

        self.report.finish(run_started.elapsed());
        info!(
            run_id = %self.report.run_id,
            status = ?self.report.status,
            elapsed_ms = self.report.elapsed_ms,
            "Zone migration finished"
        );
        self.report
    }

    /// Runs one phase and returns the warnings it collected.
    async fn run_phase(&mut self, phase: Phase) -> MigrateResult<Vec<String>> {
        match phase {
            Phase::SelectSubscription => self.select_subscription().await.map(|_| Vec::new()),
            Phase::ReadSourceVm => self.read_source_vm().await.map(|_| Vec::new()),
            Phase::StopSourceVm => self.stop_source_vm().await.map(|_| Vec::new()),
            Phase::MigrateOsDisk => self.migrate_os_disk().await.map(|_| Vec::new()),
            Phase::MigrateDataDisks => self.migrate_data_disks().await.map(|_| Vec::new()),
            Phase::DeleteSourceVm => self.delete_source_vm().await.map(|_| Vec::new()),
            Phase::BuildVmConfig => self.build_vm_config().await.map(|_| Vec::new()),
            Phase::AttachNics => self.attach_nics(),
            Phase::CreateVm => self.create_vm().await.map(|_| Vec::new()),
            Phase::CleanupSnapshots => self.cleanup_snapshots().await,
            Phase::CleanupSourceDisks => self.cleanup_source_disks().await,
        }
    }

    fn source(&self) -> MigrateResult<&VmDescriptor> {
        self.source
            .as_ref()
            .ok_or_else(|| MigrateError::internal("source VM has not been read"))
    }

    fn copies(&self) -> impl Iterator<Item = &DiskCopy> {
        self.os_copy.iter().chain(self.data_copies.iter())
    }

    #[instrument(skip(self), fields(subscription = %self.request.scope.subscription_id))]
    async fn select_subscription(&mut self) -> MigrateResult<()> {
        let info = self
            .api
            .select_subscription(&self.request.scope.subscription_id)
            .await?;
        info!(name = %info.display_name, state = %info.state, "Subscription selected");
        Ok(())
    }

    #[instrument(skip(self), fields(vm = %self.request.vm_name))]
    async fn read_source_vm(&mut self) -> MigrateResult<()> {
        let request = self.request;
        let vm = self.api.get_vm(&request.scope, &request.vm_name).await?;

        if let Some(reported) = vm.os_type {
            if reported != request.os_type {
                return Err(MigrateError::invalid_config(
                    "os_type",
                    format!(
                        "VM {} runs {} but {} was requested",
                        vm.name, reported, request.os_type
                    ),
                ));
            }
        }
        if normalize_location(&vm.location) != normalize_location(&request.location) {
            return Err(MigrateError::invalid_config(
                "location",
                format!(
                    "VM {} is in {}, cannot move it to {}",
                    vm.name, vm.location, request.location
                ),
            ));
        }
        if vm.zones.iter().any(|z| z == request.zone.as_str()) {
            warn!(zone = %request.zone, "VM is already pinned to the target zone");
        }

        info!(
            size = %vm.vm_size,
            os_disk = %vm.os_disk.name,
            data_disks = vm.data_disks.len(),
            nics = vm.nics.len(),
            "Source VM read"
        );
        for disk in &vm.data_disks {
            debug!(disk = %disk.name, lun = disk.lun, caching = %disk.caching, "Data disk");
        }
        self.source = Some(vm);
        Ok(())
    }

    #[instrument(skip(self), fields(vm = %self.request.vm_name))]
    async fn stop_source_vm(&mut self) -> MigrateResult<()> {
        self.api
            .power_off_vm(&self.request.scope, &self.request.vm_name)
            .await?;
        info!("Source VM powered off");
        Ok(())
    }

    /// Snapshots `disk_name` and creates its zoned copy from the snapshot.
    async fn copy_disk(&mut self, disk_name: &str) -> MigrateResult<DiskCopy> {
        let request = self.request;
        let api = self.api;

        let source = api.get_disk(&request.scope, disk_name).await?;

        let snapshot_spec = SnapshotSpec::for_disk(&source, &request.location);
        let snapshot = api.create_snapshot(&request.scope, &snapshot_spec).await?;
        self.report.snapshots_created.push(snapshot.name.clone());
        info!(disk = %source.name, snapshot = %snapshot.name, sku = %snapshot.sku, "Snapshot created");

        let disk_spec = DiskSpec::zoned_copy(&source, &snapshot, &request.location, request.zone);
        let zoned = api.create_disk(&request.scope, &disk_spec).await?;
        self.report.disks_created.push(zoned.name.clone());
        info!(
            disk = %source.name,
            zoned_disk = %zoned.name,
            zone = %request.zone,
            sku = %zoned.sku,
            "Zoned disk created"
        );

        Ok(DiskCopy {
            source,
            snapshot,
            zoned,
        })
    }

    #[instrument(skip(self))]
    async fn migrate_os_disk(&mut self) -> MigrateResult<()> {
        let os_disk = self.source()?.os_disk.name.clone();
        let copy = self.copy_disk(&os_disk).await?;
        self.os_copy = Some(copy);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn migrate_data_disks(&mut self) -> MigrateResult<()> {
        let data_disks = self.source()?.data_disks.clone();
        if data_disks.is_empty() {
            info!("No data disks to migrate");
        }
        for disk in &data_disks {
            debug!(disk = %disk.name, lun = disk.lun, "Migrating data disk");
            let copy = self.copy_disk(&disk.name).await?;
            self.data_copies.push(copy);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(vm = %self.request.vm_name))]
    async fn delete_source_vm(&mut self) -> MigrateResult<()> {
        let request = self.request;
        let source = self.source()?;
        let cascading = source.cascading_deletes();
        if !cascading.is_empty() {
            info!(resources = ?cascading, "Switching delete options to detach");
            self.api.detach_on_delete(&request.scope, source).await?;
        }
        self.api.delete_vm(&request.scope, &request.vm_name).await?;
        self.report.resources_deleted.push(self.request.vm_name.clone());
        info!("Source VM deleted, its disks are kept");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn build_vm_config(&mut self) -> MigrateResult<()> {
        let request = self.request;
        let source = self.source()?.clone();
        let os_disk = self
            .os_copy
            .as_ref()
            .map(|copy| copy.zoned.clone())
            .ok_or_else(|| MigrateError::internal("OS disk has not been copied"))?;

        let mut config = VmConfig::new(&source.name, &request.location, &source.vm_size, request.zone);
        config.set_os_disk(&os_disk, request.os_type, source.os_disk.caching);

        for data in &source.data_disks {
            let name = naming::zoned_disk_name(&data.name, request.zone);
            let disk = self.api.get_disk(&request.scope, &name).await?;
            config.add_data_disk(&disk, data.lun, data.caching)?;
        }

        info!(
            vm = %config.name,
            size = %config.vm_size,
            zone = %config.zone,
            data_disks = config.data_disks.len(),
            "Replacement VM defined"
        );
        self.vm_config = Some(config);
        Ok(())
    }

    /// Attaches the original NICs. A NIC that cannot be attached is skipped
    /// and reported as a warning.
    fn attach_nics(&mut self) -> MigrateResult<Vec<String>> {
        let nics = self.source()?.nics.clone();
        let config = self
            .vm_config
            .as_mut()
            .ok_or_else(|| MigrateError::internal("replacement VM has not been defined"))?;

        let mut warnings = Vec::new();
        for nic in &nics {
            match config.add_nic(nic) {
                Ok(()) => info!(nic = %nic.id, primary = nic.primary, "Network interface attached"),
                Err(err) => {
                    warn!(nic = %nic.id, error = %err, "Skipping network interface");
                    warnings.push(format!("network interface {}: {}", nic.id, err));
                }
            }
        }
        Ok(warnings)
    }

    #[instrument(skip(self), fields(vm = %self.request.vm_name, zone = %self.request.zone))]
    async fn create_vm(&mut self) -> MigrateResult<()> {
        let config = self
            .vm_config
            .as_ref()
            .ok_or_else(|| MigrateError::internal("replacement VM has not been defined"))?;
        config.validate()?;

        let vm = self.api.create_vm(&self.request.scope, config).await?;
        info!(id = %vm.id, zones = ?vm.zones, "Replacement VM created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cleanup_snapshots(&mut self) -> MigrateResult<Vec<String>> {
        let names: Vec<String> = self.copies().map(|c| c.snapshot.name.clone()).collect();
        let mut warnings = Vec::new();
        for name in names {
            match self.api.delete_snapshot(&self.request.scope, &name).await {
                Ok(()) => {
                    info!(snapshot = %name, "Snapshot deleted");
                    self.report.resources_deleted.push(name);
                }
                Err(err) => {
                    warn!(snapshot = %name, error = %err, "Failed to delete snapshot");
                    warnings.push(format!("snapshot {}: {}", name, err));
                }
            }
        }
        Ok(warnings)
    }

    #[instrument(skip(self))]
    async fn cleanup_source_disks(&mut self) -> MigrateResult<Vec<String>> {
        let names: Vec<String> = self.copies().map(|c| c.source.name.clone()).collect();
        let mut warnings = Vec::new();
        for name in names {
            match self.api.delete_disk(&self.request.scope, &name).await {
                Ok(()) => {
                    info!(disk = %name, "Source disk deleted");
                    self.report.resources_deleted.push(name);
                }
                Err(err) => {
                    warn!(disk = %name, error = %err, "Failed to delete source disk");
                    warnings.push(format!("disk {}: {}", name, err));
                }
            }
        }
        Ok(warnings)
    }
}

/// Region names compare without case or spaces ("West Europe" == "westeurope").
fn normalize_location(location: &str) -> String {
    location
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> MigrationRequest {
        MigrationRequest::new(
            ResourceScope::new("sub-1", "rg-1"),
            "MyVM",
            "westeurope",
            Zone::One,
            OsType::Windows,
        )
    }

    #[test]
    fn test_request_validate() {
        assert!(request().validate().is_ok());

        let mut bad = request();
        bad.vm_name = "  ".to_string();
        match bad.validate() {
            Err(MigrateError::InvalidConfig { field, .. }) => assert_eq!(field, "vm_name"),
            other => panic!("Expected InvalidConfig, got {:?}", other),
        }

        let mut bad = request();
        bad.scope.resource_group.clear();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_cleanup_phases_are_optional() {
        let plain = request();
        assert!(plain.includes(Phase::CreateVm));
        assert!(!plain.includes(Phase::CleanupSnapshots));
        assert!(!plain.includes(Phase::CleanupSourceDisks));

        let cleanup = request().with_cleanup(true, false);
        assert!(cleanup.includes(Phase::CleanupSnapshots));
        assert!(!cleanup.includes(Phase::CleanupSourceDisks));
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("West Europe"), "westeurope");
        assert_eq!(normalize_location("eastus2"), "eastus2");
    }
}
