//! Azure Resource Manager client for zonemove.
//!
//! Implements [`zonemove_common::ComputeApi`] over the Resource Manager REST
//! API:
//!
//! - [`ArmClient`]: request signing, error mapping, long-running operation
//!   polling
//! - [`Credential`]: static bearer token or service principal
//! - [`ArmConfig`]: endpoint, API versions and polling settings
//!
//! # Example
//!
//! ```ignore
//! use zonemove_arm::{ArmClient, ArmConfig, Credential};
//! use zonemove_common::ComputeApi;
//!
//! let client = ArmClient::new(ArmConfig::default(), Credential::from_env()?)?;
//! let sub = client.select_subscription("0000-1111").await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod models;
pub mod resource_id;

pub use auth::{Credential, TokenProvider};
pub use client::ArmClient;
pub use config::ArmConfig;
