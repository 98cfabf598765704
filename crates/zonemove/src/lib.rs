//! zonemove - move an Azure VM into an availability zone
//!
//! A VM cannot change zones in place. zonemove stops it, copies every managed
//! disk into the target zone through a zone-redundant snapshot, deletes the
//! VM and creates it again in the zone with the copied disks and its original
//! network interfaces.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`migrator`] | Phase-by-phase migration against a [`zonemove_common::ComputeApi`] |
//! | [`report`] | Phases, failure policy and the run report |
//! | [`cli`] | Command line arguments |
//! | [`config`] | Optional TOML settings file |
//! | [`logging`] | Log file rollover and tracing setup |

pub mod cli;
pub mod config;
pub mod logging;
pub mod migrator;
pub mod report;

pub use cli::Args;
pub use config::{ZonemoveConfig, DEFAULT_CONFIG_PATH};
pub use migrator::{MigrationRequest, ZoneMigrator};
pub use report::{FailurePolicy, MigrationReport, Phase, PhaseOutcome, PhaseRecord, RunStatus};
