//! Volume descriptor assembly and provenance annotations
//!
//! The returned PersistentVolume is the only state that survives between
//! provision and the later delete call, so everything teardown needs is
//! embedded here: the NFS mount path in the volume source, and the
//! [`Provenance`] record in the annotations.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{NFSVolumeSource, PersistentVolume, PersistentVolumeSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::ProvisionerConfig;
use crate::provisioner::VolumeRequest;

// =============================================================================
// Provenance Annotations
// =============================================================================

/// Identity of the agent that provisioned the volume
pub const ANN_IDENTITY: &str = "freenas.org/provisioner-identity";
/// Whether the dataset existed before this provisioner touched it
pub const ANN_DATASET_PRE_EXISTED: &str = "freenas.org/dataset-pre-existed";
/// Whether the share existed before this provisioner touched it
pub const ANN_SHARE_PRE_EXISTED: &str = "freenas.org/share-pre-existed";
/// Remote id the appliance assigned to the share
pub const ANN_SHARE_ID: &str = "freenas.org/share-id";
/// Whether a refquota was applied at provision time
pub const ANN_QUOTA_APPLIED: &str = "freenas.org/quota-applied";
/// Whether a refreservation was applied at provision time
pub const ANN_RESERVATION_APPLIED: &str = "freenas.org/reservation-applied";

/// What provisioning recorded for later teardown: ownership decides whether
/// delete may remove a resource at all, the share id short-circuits the
/// path scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub identity: String,
    pub dataset_pre_existed: bool,
    pub share_pre_existed: bool,
    pub share_id: Option<i64>,
    pub quota_applied: bool,
    pub reservation_applied: bool,
}

impl Provenance {
    /// Encode as volume annotations.
    pub fn to_annotations(&self) -> BTreeMap<String, String> {
        let mut annotations = BTreeMap::new();
        annotations.insert(ANN_IDENTITY.into(), self.identity.clone());
        annotations.insert(
            ANN_DATASET_PRE_EXISTED.into(),
            self.dataset_pre_existed.to_string(),
        );
        annotations.insert(
            ANN_SHARE_PRE_EXISTED.into(),
            self.share_pre_existed.to_string(),
        );
        if let Some(id) = self.share_id {
            annotations.insert(ANN_SHARE_ID.into(), id.to_string());
        }
        annotations.insert(ANN_QUOTA_APPLIED.into(), self.quota_applied.to_string());
        annotations.insert(
            ANN_RESERVATION_APPLIED.into(),
            self.reservation_applied.to_string(),
        );
        annotations
    }

    /// Decode from volume annotations. Missing or malformed entries fall
    /// back to "not pre-existing" so teardown still proceeds for volumes
    /// this provisioner created.
    pub fn from_annotations(annotations: Option<&BTreeMap<String, String>>) -> Self {
        let get = |key: &str| annotations.and_then(|a| a.get(key));
        Self {
            identity: get(ANN_IDENTITY).cloned().unwrap_or_default(),
            dataset_pre_existed: get(ANN_DATASET_PRE_EXISTED)
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            share_pre_existed: get(ANN_SHARE_PRE_EXISTED)
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            share_id: get(ANN_SHARE_ID)
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|id| *id > 0),
            quota_applied: get(ANN_QUOTA_APPLIED)
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            reservation_applied: get(ANN_RESERVATION_APPLIED)
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }
}

// =============================================================================
// Volume Builder
// =============================================================================

/// Assemble the exported network-volume descriptor from the engine's
/// results.
pub fn build_persistent_volume(
    request: &VolumeRequest,
    config: &ProvisionerConfig,
    mount_path: &str,
    provenance: &Provenance,
) -> PersistentVolume {
    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(request.pv_name.clone()),
            annotations: Some(provenance.to_annotations()),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeSpec {
            access_modes: Some(request.access_modes.clone()),
            capacity: Some(BTreeMap::from([(
                "storage".to_string(),
                Quantity(request.capacity_bytes.to_string()),
            )])),
            persistent_volume_reclaim_policy: Some(request.reclaim_policy.clone()),
            storage_class_name: Some(request.storage_class.clone()),
            nfs: Some(NFSVolumeSource {
                server: config.share.host.clone(),
                path: mount_path.to_string(),
                read_only: Some(false),
            }),
            ..PersistentVolumeSpec::default()
        }),
        status: None,
    }
}
