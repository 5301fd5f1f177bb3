//! FreeNAS NFS Provisioner
//!
//! A Kubernetes external provisioner exposing FreeNAS/TrueNAS datasets as
//! NFS-backed persistent volumes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Provision Controller                          │
//! │        (claim / volume watch loops, retry & backoff)              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                     Provisioning Engine                           │
//! │  ┌──────────────┐  ┌────────────────┐  ┌─────────────────────┐   │
//! │  │   Naming     │  │  Configuration │  │  Volume Descriptor  │   │
//! │  │  Derivation  │  │    Resolver    │  │      Builder        │   │
//! │  └──────────────┘  └────────────────┘  └─────────────────────┘   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                       Resource Model                              │
//! │  ┌──────────────┐  ┌────────────────┐  ┌─────────────────────┐   │
//! │  │   Dataset    │  │   NFS Share    │  │     Permission      │   │
//! │  └──────┬───────┘  └───────┬────────┘  └──────────┬──────────┘   │
//! │         └──────────────────┼──────────────────────┘              │
//! │                   ┌────────┴────────┐                            │
//! │                   │ Appliance Client │                           │
//! │                   │  (REST, basic    │                           │
//! │                   │   auth, TLS)     │                           │
//! │                   └─────────────────┘                            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`appliance`]: appliance REST client and typed resource model
//! - [`config`]: per-request configuration resolution
//! - [`provisioner`]: provisioning engine, naming, volume assembly
//! - [`controller`]: claim/volume reconcile loops
//! - [`error`]: error types and handling

pub mod appliance;
pub mod config;
pub mod controller;
pub mod error;
pub mod provisioner;

// Re-export commonly used types
pub use appliance::{ApplianceClient, Dataset, NfsShare, Permission};

pub use config::{DatasetConfig, ProvisionerConfig, ServerConfig, ShareConfig};

pub use controller::{ControllerConfig, ControllerMetrics, ProvisionController};

pub use error::{Error, ErrorAction, Result};

pub use provisioner::{FreenasProvisioner, Provenance, Provisioner, VolumeRequest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
