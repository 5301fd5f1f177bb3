//! Dataset and mount path derivation
//!
//! With deterministic naming on, a volume's dataset name is derived from
//! the owning claim's stable identity rather than the one-shot PV name, so
//! re-provisioning the same claim lands on the same dataset and can adopt
//! it. Namespace isolation inserts the claim's namespace as an intermediate
//! dataset level. Teardown reverses the derivation from the stored mount
//! path alone, so the forward and inverse rules here must stay consistent.

use crate::config::DatasetConfig;
use crate::error::{Error, Result};

/// Derived name components for one volume request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeNames {
    /// Intermediate namespace directory, when namespace isolation is on
    pub namespace_dir: Option<String>,
    /// Terminal dataset name
    pub leaf: String,
}

/// Derive the name components for a claim.
pub fn derive(
    config: &DatasetConfig,
    pvc_namespace: &str,
    pvc_name: &str,
    pv_name: &str,
) -> VolumeNames {
    let namespace_dir = config
        .enable_namespaces
        .then(|| pvc_namespace.to_string());

    let leaf = if config.enable_deterministic_names {
        if config.enable_namespaces {
            pvc_name.to_string()
        } else {
            format!("{}-{}", pvc_namespace, pvc_name)
        }
    } else {
        pv_name.to_string()
    };

    VolumeNames { namespace_dir, leaf }
}

/// Join path segments, skipping empty ones. The first segment keeps any
/// leading slash; duplicate separators are collapsed.
pub fn join_path<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut joined = String::new();
    for segment in segments {
        let segment = segment.trim_end_matches('/');
        if segment.is_empty() {
            continue;
        }
        if joined.is_empty() {
            joined.push_str(segment);
        } else {
            joined.push('/');
            joined.push_str(segment.trim_start_matches('/'));
        }
    }
    joined
}

/// Full dataset path below the pool root.
pub fn dataset_path(parent_name: &str, names: &VolumeNames) -> String {
    join_path([
        parent_name,
        names.namespace_dir.as_deref().unwrap_or(""),
        names.leaf.as_str(),
    ])
}

/// Filesystem mount path of the dataset.
pub fn mount_path(parent_mountpoint: &str, names: &VolumeNames) -> String {
    join_path([
        parent_mountpoint,
        names.namespace_dir.as_deref().unwrap_or(""),
        names.leaf.as_str(),
    ])
}

/// Recover the dataset path from a stored mount path. Inverse of
/// [`dataset_path`] composed with [`mount_path`]: the mount path embeds the
/// parent dataset name, and everything after it is the relative dataset
/// path.
pub fn dataset_path_from_mount(parent_name: &str, mount_path: &str) -> Result<String> {
    match mount_path.split_once(parent_name) {
        Some((_, relative)) => Ok(format!("{}{}", parent_name, relative)),
        None => Err(Error::Config(format!(
            "mount path \"{}\" does not contain parent dataset \"{}\"",
            mount_path, parent_name
        ))),
    }
}
