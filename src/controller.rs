//! Provision controller
//!
//! Thin reconciliation plumbing around the [`Provisioner`] capability: one
//! loop watches claims assigned to this provisioner and creates volumes,
//! one watches released volumes and tears them down. All retry/backoff
//! lives here, driven by [`Error::action`]; the engine itself never
//! retries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, DeleteParams, PostParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use prometheus::IntCounter;
use tracing::{debug, info, warn};

use crate::error::{Error, ErrorAction, Result};
use crate::provisioner::volume::ANN_IDENTITY;
use crate::provisioner::{Provisioner, VolumeRequest};

/// Annotation the volume controller sets on claims it hands to an external
/// provisioner; the beta key is still what most clusters write.
const ANN_STORAGE_PROVISIONER: &str = "volume.kubernetes.io/storage-provisioner";
const ANN_STORAGE_PROVISIONER_BETA: &str = "volume.beta.kubernetes.io/storage-provisioner";

// =============================================================================
// Configuration & Metrics
// =============================================================================

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Provisioner name claims are matched against (the storage class's
    /// `provisioner` attribute)
    pub provisioner_name: String,
}

/// Counters exposed on the admin endpoint
pub struct ControllerMetrics {
    pub provisions_total: IntCounter,
    pub deletes_total: IntCounter,
    pub failures_total: IntCounter,
}

impl ControllerMetrics {
    /// Register the counters with the default registry.
    pub fn register() -> Result<Self> {
        let register = |name: &str, help: &str| {
            prometheus::register_int_counter!(name, help)
                .map_err(|err| Error::Internal(format!("metrics registration failed: {}", err)))
        };
        Ok(Self {
            provisions_total: register(
                "freenas_provisioner_provisions_total",
                "Total volumes provisioned",
            )?,
            deletes_total: register(
                "freenas_provisioner_deletes_total",
                "Total volumes deleted",
            )?,
            failures_total: register(
                "freenas_provisioner_failures_total",
                "Total failed reconciliations",
            )?,
        })
    }
}

// =============================================================================
// Controller
// =============================================================================

struct Ctx {
    client: Client,
    provisioner: Arc<dyn Provisioner>,
    config: ControllerConfig,
    metrics: ControllerMetrics,
}

/// Watches claims and volumes and drives the provisioner.
pub struct ProvisionController {
    ctx: Arc<Ctx>,
}

impl ProvisionController {
    pub fn new(
        client: Client,
        provisioner: Arc<dyn Provisioner>,
        config: ControllerConfig,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            ctx: Arc::new(Ctx {
                client,
                provisioner,
                config,
                metrics,
            }),
        }
    }

    /// Run both reconcile loops until shutdown.
    pub async fn run(self) -> Result<()> {
        info!(
            "starting provision controller as \"{}\"",
            self.ctx.config.provisioner_name
        );

        let claims: Api<PersistentVolumeClaim> = Api::all(self.ctx.client.clone());
        let volumes: Api<PersistentVolume> = Api::all(self.ctx.client.clone());

        let claim_loop = Controller::new(claims, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile_claim, error_policy, self.ctx.clone())
            .for_each(|result| async move {
                match result {
                    Ok((object, _)) => debug!("reconciled claim \"{}\"", object.name),
                    Err(err) => debug!("claim reconciliation error: {}", err),
                }
            });

        let volume_loop = Controller::new(volumes, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile_volume, error_policy, self.ctx.clone())
            .for_each(|result| async move {
                match result {
                    Ok((object, _)) => debug!("reconciled volume \"{}\"", object.name),
                    Err(err) => debug!("volume reconciliation error: {}", err),
                }
            });

        tokio::join!(claim_loop, volume_loop);

        info!("provision controller stopped");
        Ok(())
    }
}

/// Provisioner the claim was assigned to, if any.
fn assigned_provisioner(annotations: &BTreeMap<String, String>) -> Option<&str> {
    annotations
        .get(ANN_STORAGE_PROVISIONER)
        .or_else(|| annotations.get(ANN_STORAGE_PROVISIONER_BETA))
        .map(String::as_str)
}

async fn reconcile_claim(
    claim: Arc<PersistentVolumeClaim>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    let Some(spec) = &claim.spec else {
        return Ok(Action::await_change());
    };

    // already bound, or not ours
    if spec.volume_name.is_some() {
        return Ok(Action::await_change());
    }
    if assigned_provisioner(claim.annotations()) != Some(ctx.config.provisioner_name.as_str()) {
        return Ok(Action::await_change());
    }

    let namespace = claim.namespace().unwrap_or_default();
    let name = claim.name_any();
    let uid = claim
        .uid()
        .ok_or_else(|| Error::Internal(format!("claim {}/{} has no uid", namespace, name)))?;
    let pv_name = format!("pvc-{}", uid);

    let volumes: Api<PersistentVolume> = Api::all(ctx.client.clone());
    if volumes.get_opt(&pv_name).await?.is_some() {
        debug!("volume \"{}\" already exists, nothing to do", pv_name);
        return Ok(Action::await_change());
    }

    let storage_class = spec.storage_class_name.clone().ok_or_else(|| {
        Error::Config(format!("claim {}/{} has no storage class", namespace, name))
    })?;
    let capacity = spec
        .resources
        .as_ref()
        .and_then(|resources| resources.requests.as_ref())
        .and_then(|requests| requests.get("storage"))
        .ok_or_else(|| {
            Error::Config(format!("claim {}/{} has no storage request", namespace, name))
        })?;
    let capacity_bytes = parse_quantity(&capacity.0)?;

    let classes: Api<StorageClass> = Api::all(ctx.client.clone());
    let class = classes.get(&storage_class).await?;
    let reclaim_policy = class.reclaim_policy.clone().unwrap_or_else(|| "Delete".into());

    info!(
        "provisioning volume \"{}\" for claim {}/{}",
        pv_name, namespace, name
    );

    let request = VolumeRequest {
        pv_name: pv_name.clone(),
        pvc_namespace: namespace.clone(),
        pvc_name: name.clone(),
        storage_class,
        capacity_bytes,
        access_modes: spec.access_modes.clone().unwrap_or_default(),
        reclaim_policy,
    };

    let mut volume = ctx.provisioner.provision(request).await?;
    if let Some(volume_spec) = volume.spec.as_mut() {
        volume_spec.claim_ref = Some(ObjectReference {
            api_version: Some("v1".into()),
            kind: Some("PersistentVolumeClaim".into()),
            namespace: Some(namespace),
            name: Some(name),
            uid: Some(uid),
            ..ObjectReference::default()
        });
    }

    match volumes.create(&PostParams::default(), &volume).await {
        Ok(_) => {
            ctx.metrics.provisions_total.inc();
            info!("created volume \"{}\"", pv_name);
        }
        // a concurrent reconcile won the race; the volume is there
        Err(kube::Error::Api(response)) if response.code == 409 => {
            debug!("volume \"{}\" already exists", pv_name);
        }
        Err(err) => return Err(err.into()),
    }

    Ok(Action::await_change())
}

async fn reconcile_volume(volume: Arc<PersistentVolume>, ctx: Arc<Ctx>) -> Result<Action> {
    if !volume.annotations().contains_key(ANN_IDENTITY) {
        return Ok(Action::await_change());
    }

    let phase = volume.status.as_ref().and_then(|status| status.phase.as_deref());
    if phase != Some("Released") {
        return Ok(Action::await_change());
    }
    let reclaim_policy = volume
        .spec
        .as_ref()
        .and_then(|spec| spec.persistent_volume_reclaim_policy.as_deref());
    if reclaim_policy != Some("Delete") {
        return Ok(Action::await_change());
    }

    let name = volume.name_any();
    info!("reclaiming released volume \"{}\"", name);

    ctx.provisioner.delete(&volume).await?;

    let volumes: Api<PersistentVolume> = Api::all(ctx.client.clone());
    match volumes.delete(&name, &DeleteParams::default()).await {
        Ok(_) => {
            ctx.metrics.deletes_total.inc();
            info!("deleted volume \"{}\"", name);
        }
        Err(kube::Error::Api(response)) if response.code == 404 => {}
        Err(err) => return Err(err.into()),
    }

    Ok(Action::await_change())
}

fn error_policy<K: ResourceExt>(object: Arc<K>, error: &Error, ctx: Arc<Ctx>) -> Action {
    ctx.metrics.failures_total.inc();
    match error.action() {
        ErrorAction::RequeueWithBackoff => {
            warn!(
                "reconciliation of \"{}\" failed, will retry: {}",
                object.name_any(),
                error
            );
            Action::requeue(Duration::from_secs(15))
        }
        ErrorAction::NoRequeue => {
            warn!(
                "reconciliation of \"{}\" failed permanently: {}",
                object.name_any(),
                error
            );
            Action::await_change()
        }
    }
}

// =============================================================================
// Capacity Parsing
// =============================================================================

/// Parse a Kubernetes resource quantity into bytes.
pub fn parse_quantity(value: &str) -> Result<i64> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::CapacityParse("empty quantity".into()));
    }

    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| Error::CapacityParse(value.to_string()))?;

    let multiplier: f64 = match suffix {
        "" => 1.0,
        "Ki" => (1u64 << 10) as f64,
        "Mi" => (1u64 << 20) as f64,
        "Gi" => (1u64 << 30) as f64,
        "Ti" => (1u64 << 40) as f64,
        "Pi" => (1u64 << 50) as f64,
        "Ei" => (1u64 << 60) as f64,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        _ => {
            return Err(Error::CapacityParse(format!(
                "unknown suffix \"{}\" in \"{}\"",
                suffix, value
            )))
        }
    };

    Ok((number * multiplier).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_quantity_plain_and_binary() {
        assert_eq!(parse_quantity("1073741824").unwrap(), 1 << 30);
        assert_eq!(parse_quantity("8Gi").unwrap(), 8 * (1 << 30) as i64);
        assert_eq!(parse_quantity("512Mi").unwrap(), 512 * (1 << 20) as i64);
        assert_eq!(parse_quantity("1Ti").unwrap(), 1i64 << 40);
    }

    #[test]
    fn test_parse_quantity_decimal_and_fractional() {
        assert_eq!(parse_quantity("5G").unwrap(), 5_000_000_000);
        assert_eq!(parse_quantity("100k").unwrap(), 100_000);
        assert_eq!(parse_quantity("1.5Gi").unwrap(), 3 * (1 << 29) as i64);
    }

    #[test]
    fn test_parse_quantity_rejects_garbage() {
        assert_matches!(parse_quantity(""), Err(Error::CapacityParse(_)));
        assert_matches!(parse_quantity("lots"), Err(Error::CapacityParse(_)));
        assert_matches!(parse_quantity("8Zi"), Err(Error::CapacityParse(_)));
    }

    #[test]
    fn test_assigned_provisioner_prefers_ga_key() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            ANN_STORAGE_PROVISIONER_BETA.to_string(),
            "freenas.org/nfs".to_string(),
        );
        assert_eq!(assigned_provisioner(&annotations), Some("freenas.org/nfs"));

        annotations.insert(
            ANN_STORAGE_PROVISIONER.to_string(),
            "other.example/driver".to_string(),
        );
        assert_eq!(
            assigned_provisioner(&annotations),
            Some("other.example/driver")
        );

        assert_eq!(assigned_provisioner(&BTreeMap::new()), None);
    }
}
