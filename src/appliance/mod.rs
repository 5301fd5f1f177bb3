//! Remote appliance resource model
//!
//! Typed representations of the FreeNAS/TrueNAS resources the provisioner
//! manages, each with its CRUD operations against the [`ApplianceClient`]:
//! - Dataset: storage container, addressed by pool and hierarchical path
//! - NfsShare: network export exposing one or more filesystem paths
//! - Permission: write-only filesystem permission directive

pub mod client;
pub mod dataset;
pub mod permission;
pub mod share;

pub use client::ApplianceClient;
pub use dataset::Dataset;
pub use permission::Permission;
pub use share::NfsShare;
