//! Provisioning engine
//!
//! Orchestrates the create/verify/delete sequence across appliance
//! resources for a single volume request. The [`Provisioner`] trait is the
//! entire boundary with the orchestration layer: the controller invokes
//! `provision` on claim events and `delete` on released volumes, and owns
//! all retry/backoff behavior.

pub mod engine;
pub mod naming;
pub mod volume;

pub use engine::FreenasProvisioner;
pub use volume::{build_persistent_volume, Provenance};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;

use crate::error::Result;

/// One volume request as handed over by the controller. Ephemeral; exists
/// only for the duration of a single provision call.
#[derive(Debug, Clone)]
pub struct VolumeRequest {
    /// Name for the PersistentVolume object
    pub pv_name: String,
    /// Namespace of the owning claim
    pub pvc_namespace: String,
    /// Name of the owning claim
    pub pvc_name: String,
    /// Storage class the claim was bound to
    pub storage_class: String,
    /// Requested capacity in bytes
    pub capacity_bytes: i64,
    /// Requested access modes
    pub access_modes: Vec<String>,
    /// Reclaim policy for the resulting volume
    pub reclaim_policy: String,
}

/// Capability contract consumed by the external controller.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provision remote storage for a claim and return the volume
    /// descriptor, with provenance metadata embedded for later teardown.
    async fn provision(&self, request: VolumeRequest) -> Result<PersistentVolume>;

    /// Tear down the remote storage a volume points at, honoring the
    /// provenance metadata recorded at provision time.
    async fn delete(&self, volume: &PersistentVolume) -> Result<()>;
}
