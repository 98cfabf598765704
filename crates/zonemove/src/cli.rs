//! Command line arguments

use std::path::PathBuf;

use clap::Parser;
use zonemove_common::{MigrateResult, OsType, ResourceScope, Zone};

use crate::config::DEFAULT_CONFIG_PATH;
use crate::migrator::MigrationRequest;

/// Move an Azure VM and its managed disks into an availability zone
#[derive(Parser, Debug, Clone)]
#[command(name = "zonemove")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log file destination
    #[arg(long, default_value = "zonemove.log")]
    pub log_path: PathBuf,

    /// Rotate the log file once it is older than this many days
    #[arg(long, default_value = "5")]
    pub log_rollover: u32,

    /// Subscription holding the VM
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    pub subscription_id: String,

    /// Resource group holding the VM
    #[arg(long)]
    pub resource_group: String,

    /// Name of the VM to move
    #[arg(long)]
    pub vm_name: String,

    /// Region of the VM; snapshots, disks and the new VM are created here
    #[arg(long)]
    pub location: String,

    /// Target availability zone (1, 2 or 3)
    #[arg(long)]
    pub zone: Zone,

    /// OS of the VM (Windows or Linux)
    #[arg(long, default_value = "Windows")]
    pub os_type: OsType,

    /// Delete the snapshots once the new VM is running
    #[arg(long)]
    pub cleanup_snapshots: bool,

    /// Delete the original disks once the new VM is running
    #[arg(long)]
    pub cleanup_source_disks: bool,

    /// TOML settings file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Write the JSON run report here
    #[arg(long)]
    pub report_path: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error or a tracing directive)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Builds the validated migration request.
    pub fn to_request(&self) -> MigrateResult<MigrationRequest> {
        let request = MigrationRequest::new(
            ResourceScope::new(self.subscription_id.trim(), self.resource_group.trim()),
            self.vm_name.trim(),
            self.location.trim(),
            self.zone,
            self.os_type,
        )
        .with_cleanup(self.cleanup_snapshots, self.cleanup_source_disks);
        request.validate()?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REQUIRED: [&str; 11] = [
        "zonemove",
        "--subscription-id",
        "sub-1",
        "--resource-group",
        "rg-1",
        "--vm-name",
        "MyVM",
        "--location",
        "westeurope",
        "--zone",
        "2",
    ];

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(REQUIRED.iter().chain(extra.iter()))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.zone, Zone::Two);
        assert_eq!(args.os_type, OsType::Windows);
        assert_eq!(args.log_path, PathBuf::from("zonemove.log"));
        assert_eq!(args.log_rollover, 5);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(args.log_level, "info");
        assert!(args.report_path.is_none());
        assert!(!args.cleanup_snapshots);
        assert!(!args.cleanup_source_disks);
    }

    #[test]
    fn test_flags() {
        let args = parse(&[
            "--os-type",
            "linux",
            "--cleanup-snapshots",
            "--cleanup-source-disks",
            "--log-rollover",
            "0",
            "--report-path",
            "/tmp/report.json",
        ])
        .unwrap();
        assert_eq!(args.os_type, OsType::Linux);
        assert!(args.cleanup_snapshots);
        assert!(args.cleanup_source_disks);
        assert_eq!(args.log_rollover, 0);
        assert_eq!(args.report_path, Some(PathBuf::from("/tmp/report.json")));
    }

    #[test]
    fn test_rejects_bad_zone() {
        let mut argv: Vec<&str> = REQUIRED.to_vec();
        argv[10] = "4";
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_rejects_bad_os_type() {
        assert!(parse(&["--os-type", "Solaris"]).is_err());
    }

    #[test]
    fn test_to_request() {
        let request = parse(&["--cleanup-snapshots"]).unwrap().to_request().unwrap();
        assert_eq!(request.scope, ResourceScope::new("sub-1", "rg-1"));
        assert_eq!(request.vm_name, "MyVM");
        assert_eq!(request.location, "westeurope");
        assert_eq!(request.zone, Zone::Two);
        assert!(request.cleanup_snapshots);
        assert!(!request.cleanup_source_disks);
    }

    #[test]
    fn test_to_request_rejects_blank_name() {
        let mut argv: Vec<&str> = REQUIRED.to_vec();
        argv[6] = " ";
        let args = Args::try_parse_from(argv).unwrap();
        assert!(args.to_request().is_err());
    }
}
