//! Per-request configuration resolution
//!
//! An effective [`ProvisionerConfig`] is recomputed for every provision or
//! delete call by merging, later wins:
//!
//! 1. hard-coded defaults,
//! 2. the storage class's string-typed parameter map,
//! 3. the credential secret, which always overrides class parameters for
//!    connection fields.
//!
//! Boolean parameters are parsed permissively; an unparsable value silently
//! keeps the previous one. Nothing here is persisted between calls.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::ByteString;
use kube::api::Api;
use tracing::debug;

use crate::error::{Error, Result};

// =============================================================================
// Configuration Sections
// =============================================================================

/// Dataset provisioning options
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Parent dataset path; a precondition, never auto-created
    pub parent_name: String,
    /// Apply the requested capacity as refquota
    pub enable_quotas: bool,
    /// Apply the requested capacity as refreservation
    pub enable_reservation: bool,
    /// Insert the PVC namespace as an intermediate dataset level
    pub enable_namespaces: bool,
    /// Derive dataset names from the PVC's stable identity so retries adopt
    pub enable_deterministic_names: bool,
    /// Never delete datasets this provisioner only adopted
    pub retain_pre_existing: bool,
    pub permissions_mode: String,
    pub permissions_user: String,
    pub permissions_group: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            parent_name: "tank".into(),
            enable_quotas: true,
            enable_reservation: true,
            enable_namespaces: true,
            enable_deterministic_names: true,
            retain_pre_existing: true,
            permissions_mode: "0777".into(),
            permissions_user: "root".into(),
            permissions_group: "wheel".into(),
        }
    }
}

/// NFS share options
#[derive(Debug, Clone)]
pub struct ShareConfig {
    /// Host published in the volume descriptor; defaults to the server host
    pub host: String,
    pub alldirs: bool,
    pub allowed_hosts: String,
    pub allowed_networks: String,
    pub maproot_user: String,
    pub maproot_group: String,
    pub mapall_user: String,
    pub mapall_group: String,
    /// Never delete shares this provisioner only adopted
    pub retain_pre_existing: bool,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            alldirs: true,
            allowed_hosts: String::new(),
            allowed_networks: String::new(),
            maproot_user: "root".into(),
            maproot_group: "wheel".into(),
            mapall_user: String::new(),
            mapall_group: String::new(),
            retain_pre_existing: true,
        }
    }
}

/// Appliance connection options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub secret_namespace: String,
    pub secret_name: String,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Skip TLS certificate verification
    pub allow_insecure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            secret_namespace: "kube-system".into(),
            secret_name: "freenas-nfs".into(),
            protocol: "http".into(),
            host: "localhost".into(),
            port: 80,
            username: "root".into(),
            password: String::new(),
            allow_insecure: false,
        }
    }
}

/// Effective per-request configuration
#[derive(Debug, Clone, Default)]
pub struct ProvisionerConfig {
    pub dataset: DatasetConfig,
    pub share: ShareConfig,
    pub server: ServerConfig,
}

// =============================================================================
// Merging
// =============================================================================

/// Permissive boolean parsing for string-typed class parameters.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn merge_bool(target: &mut bool, value: &str) {
    if let Some(parsed) = parse_bool(value) {
        *target = parsed;
    }
}

impl ProvisionerConfig {
    /// Overlay storage-class parameters onto the current values.
    pub fn apply_parameters(&mut self, parameters: &BTreeMap<String, String>) {
        for (key, value) in parameters {
            match key.as_str() {
                // Dataset options
                "datasetParentName" => self.dataset.parent_name = value.clone(),
                "datasetEnableQuotas" => merge_bool(&mut self.dataset.enable_quotas, value),
                "datasetEnableReservation" => {
                    merge_bool(&mut self.dataset.enable_reservation, value)
                }
                "datasetEnableNamespaces" => {
                    merge_bool(&mut self.dataset.enable_namespaces, value)
                }
                "datasetEnableDeterministicNames" => {
                    merge_bool(&mut self.dataset.enable_deterministic_names, value)
                }
                "datasetRetainPreExisting" => {
                    merge_bool(&mut self.dataset.retain_pre_existing, value)
                }
                "datasetPermissionsMode" => self.dataset.permissions_mode = value.clone(),
                "datasetPermissionsUser" => self.dataset.permissions_user = value.clone(),
                "datasetPermissionsGroup" => self.dataset.permissions_group = value.clone(),

                // Share options
                "shareHost" => self.share.host = value.clone(),
                "shareAlldirs" => merge_bool(&mut self.share.alldirs, value),
                "shareAllowedHosts" => self.share.allowed_hosts = value.clone(),
                "shareAllowedNetworks" => self.share.allowed_networks = value.clone(),
                "shareMaprootUser" => self.share.maproot_user = value.clone(),
                "shareMaprootGroup" => self.share.maproot_group = value.clone(),
                "shareMapallUser" => self.share.mapall_user = value.clone(),
                "shareMapallGroup" => self.share.mapall_group = value.clone(),
                "shareRetainPreExisting" => {
                    merge_bool(&mut self.share.retain_pre_existing, value)
                }

                // Server options
                "serverSecretNamespace" => self.server.secret_namespace = value.clone(),
                "serverSecretName" => self.server.secret_name = value.clone(),

                _ => debug!("ignoring unknown storage class parameter \"{}\"", key),
            }
        }
    }

    /// Overlay credential-secret fields. Connection fields from the secret
    /// always win over class parameters.
    pub fn apply_secret(&mut self, data: &BTreeMap<String, ByteString>) {
        for (key, value) in data {
            let value = String::from_utf8_lossy(&value.0).to_string();
            match key.as_str() {
                "protocol" => self.server.protocol = value,
                "host" => self.server.host = value,
                "port" => {
                    if let Ok(port) = value.parse() {
                        self.server.port = port;
                    }
                }
                "username" => self.server.username = value,
                "password" => self.server.password = value,
                "allowInsecure" | "insecure" => merge_bool(&mut self.server.allow_insecure, &value),
                _ => {}
            }
        }
    }

    /// Fill derived values after all overlays are in.
    pub fn finalize(&mut self) {
        if self.share.host.is_empty() {
            self.share.host = self.server.host.clone();
        }
    }

    /// Resolve the effective configuration for a storage class: fetch the
    /// class and the credential secret, then merge. A missing class or
    /// secret aborts resolution before any appliance mutation.
    pub async fn resolve(client: &kube::Client, storage_class: &str) -> Result<Self> {
        let classes: Api<StorageClass> = Api::all(client.clone());
        let class = match classes.get(storage_class).await {
            Ok(class) => class,
            Err(kube::Error::Api(response)) if response.code == 404 => {
                return Err(Error::Config(format!(
                    "storage class \"{}\" not found",
                    storage_class
                )));
            }
            Err(err) => return Err(err.into()),
        };

        let mut config = ProvisionerConfig::default();
        if let Some(parameters) = &class.parameters {
            config.apply_parameters(parameters);
        }

        let secrets: Api<Secret> =
            Api::namespaced(client.clone(), &config.server.secret_namespace);
        let secret = match secrets.get(&config.server.secret_name).await {
            Ok(secret) => secret,
            Err(kube::Error::Api(response)) if response.code == 404 => {
                return Err(Error::Config(format!(
                    "credential secret \"{}/{}\" not found",
                    config.server.secret_namespace, config.server.secret_name
                )));
            }
            Err(err) => return Err(err.into()),
        };
        if let Some(data) = &secret.data {
            config.apply_secret(data);
        }

        config.finalize();
        Ok(config)
    }
}
