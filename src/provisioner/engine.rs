//! FreeNAS provisioning engine
//!
//! Maps one volume request onto an idempotent sequence of appliance
//! operations: parent lookup, optional namespace container, the target
//! dataset, the NFS share, and a permission record. With deterministic
//! naming enabled every ensure step is fetch-or-create, so a retried
//! request adopts whatever a previous, possibly interrupted, run left
//! behind instead of failing on duplicates.
//!
//! Failure of any step aborts the whole operation with the underlying
//! error; resources created by earlier steps are left in place for the
//! controller's retry-from-scratch cycle to adopt. There is no rollback
//! and no internal retry.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use tracing::{debug, info, warn};

use crate::appliance::{ApplianceClient, Dataset, NfsShare, Permission};
use crate::config::ProvisionerConfig;
use crate::error::{Error, Result};
use crate::provisioner::volume::{build_persistent_volume, Provenance};
use crate::provisioner::{naming, Provisioner, VolumeRequest};

/// Provisioner for NFS volumes backed by FreeNAS/TrueNAS datasets.
pub struct FreenasProvisioner {
    kube: Option<kube::Client>,
    identifier: String,
}

impl FreenasProvisioner {
    /// Create a provisioner with the given agent identity. The identity is
    /// embedded in share comments and volume annotations.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            kube: None,
            identifier: identifier.into(),
        }
    }

    /// Attach the Kubernetes client used to resolve storage classes and
    /// credential secrets.
    pub fn with_kube(mut self, client: kube::Client) -> Self {
        self.kube = Some(client);
        self
    }

    /// Agent identity string.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn resolve_config(&self, storage_class: &str) -> Result<ProvisionerConfig> {
        let kube = self
            .kube
            .as_ref()
            .ok_or_else(|| Error::Config("no kubernetes client attached".into()))?;
        ProvisionerConfig::resolve(kube, storage_class).await
    }

    /// Provision against an already-resolved configuration.
    pub async fn provision_with_config(
        &self,
        request: &VolumeRequest,
        config: &ProvisionerConfig,
    ) -> Result<PersistentVolume> {
        let client = ApplianceClient::new(&config.server)?;

        // The parent dataset is a precondition, never auto-created; failing
        // here guarantees no create call has been issued yet.
        let mut parent = Dataset::named(&config.dataset.parent_name);
        parent.fetch(&client).await?;

        let names = naming::derive(
            &config.dataset,
            &request.pvc_namespace,
            &request.pvc_name,
            &request.pv_name,
        );
        let mount_path = naming::mount_path(&parent.mountpoint, &names);
        let dataset_path = naming::dataset_path(&parent.name, &names);

        info!(
            "provisioning dataset \"{}\", NFS share \"{}\"",
            dataset_path, mount_path
        );

        if let Some(namespace_dir) = &names.namespace_dir {
            let mut namespace_dataset = Dataset {
                pool: parent.pool.clone(),
                name: naming::join_path([parent.name.as_str(), namespace_dir.as_str()]),
                comments: "k8s provisioned namespace".into(),
                ..Dataset::default()
            };
            match namespace_dataset.fetch(&client).await {
                Ok(()) => {
                    debug!(
                        "namespace dataset \"{}\" already exists",
                        namespace_dataset.name
                    );
                }
                Err(err) if err.is_not_found() => {
                    info!("creating namespace dataset \"{}\"", namespace_dataset.name);
                    namespace_dataset.create(&client).await?;
                }
                Err(err) => return Err(err),
            }
        }

        let mut dataset = Dataset {
            pool: parent.pool.clone(),
            name: dataset_path.clone(),
            refquota: if config.dataset.enable_quotas {
                request.capacity_bytes
            } else {
                0
            },
            refreservation: if config.dataset.enable_reservation {
                request.capacity_bytes
            } else {
                0
            },
            comments: format!("{}/{}", request.pvc_namespace, request.pvc_name),
            ..Dataset::default()
        };

        let mut dataset_pre_existed = false;
        if config.dataset.enable_deterministic_names {
            match dataset.fetch(&client).await {
                Ok(()) => {
                    dataset_pre_existed = true;
                    info!("dataset \"{}\" already exists, adopting", dataset.name);
                }
                Err(err) if err.is_not_found() => dataset.create(&client).await?,
                Err(err) => return Err(err),
            }
        } else {
            // non-deterministic names cannot be adopted; a retried request
            // will surface the appliance's duplicate-resource conflict
            dataset.create(&client).await?;
        }

        let mut share = NfsShare {
            paths: vec![mount_path.clone()],
            read_only: false,
            alldirs: config.share.alldirs,
            hosts: config.share.allowed_hosts.clone(),
            network: config.share.allowed_networks.clone(),
            maproot_user: config.share.maproot_user.clone(),
            maproot_group: config.share.maproot_group.clone(),
            mapall_user: config.share.mapall_user.clone(),
            mapall_group: config.share.mapall_group.clone(),
            comment: format!("{} ({}): {}", crate::NAME, self.identifier, dataset_path),
            ..NfsShare::default()
        };

        let mut share_pre_existed = false;
        if config.dataset.enable_deterministic_names {
            match share.fetch(&client).await {
                Ok(()) => {
                    share_pre_existed = true;
                    info!("NFS share \"{}\" already exists, adopting", mount_path);
                }
                Err(err) if err.is_not_found() => share.create(&client).await?,
                Err(err) => return Err(err),
            }
        } else {
            share.create(&client).await?;
        }

        debug!(
            "setting permissions on \"{}\": mode {}, owner {}:{}",
            mount_path,
            config.dataset.permissions_mode,
            config.dataset.permissions_user,
            config.dataset.permissions_group
        );
        Permission::unix(
            &mount_path,
            &config.dataset.permissions_mode,
            &config.dataset.permissions_user,
            &config.dataset.permissions_group,
        )
        .apply(&client)
        .await?;

        let provenance = Provenance {
            identity: self.identifier.clone(),
            dataset_pre_existed,
            share_pre_existed,
            share_id: share.id,
            quota_applied: config.dataset.enable_quotas,
            reservation_applied: config.dataset.enable_reservation,
        };

        Ok(build_persistent_volume(request, config, &mount_path, &provenance))
    }

    /// Tear down against an already-resolved configuration.
    ///
    /// Reverses provisioning using only the metadata embedded in the
    /// volume: the mount path identifies the dataset and share, the
    /// provenance record decides ownership. Resources that are already gone
    /// count as successfully deleted.
    pub async fn delete_with_config(
        &self,
        volume: &PersistentVolume,
        config: &ProvisionerConfig,
    ) -> Result<()> {
        let provenance = Provenance::from_annotations(volume.metadata.annotations.as_ref());
        let mount_path = volume
            .spec
            .as_ref()
            .and_then(|spec| spec.nfs.as_ref())
            .map(|nfs| nfs.path.clone())
            .ok_or_else(|| Error::Config("persistent volume has no NFS source".into()))?;

        let client = ApplianceClient::new(&config.server)?;
        let dataset_path =
            naming::dataset_path_from_mount(&config.dataset.parent_name, &mount_path)?;

        info!(
            "tearing down dataset \"{}\", NFS share \"{}\"",
            dataset_path, mount_path
        );

        if provenance.share_pre_existed && config.share.retain_pre_existing {
            debug!("retaining pre-existing NFS share \"{}\"", mount_path);
        } else {
            let mut share = NfsShare {
                id: provenance.share_id,
                paths: vec![mount_path.clone()],
                ..NfsShare::default()
            };
            match share.fetch(&client).await {
                Err(err) if err.is_not_found() => {
                    warn!("NFS share \"{}\" is already gone", mount_path);
                }
                Err(err) => return Err(err),
                Ok(()) => share.delete(&client).await?,
            }
        }

        if provenance.dataset_pre_existed && config.dataset.retain_pre_existing {
            debug!("retaining pre-existing dataset \"{}\"", dataset_path);
        } else {
            let mut dataset = Dataset::named(&dataset_path);
            match dataset.fetch(&client).await {
                Err(err) if err.is_not_found() => {
                    warn!("dataset \"{}\" is already gone", dataset_path);
                }
                Err(err) => return Err(err),
                Ok(()) => dataset.delete(&client).await?,
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Provisioner for FreenasProvisioner {
    async fn provision(&self, request: VolumeRequest) -> Result<PersistentVolume> {
        let config = self.resolve_config(&request.storage_class).await?;
        self.provision_with_config(&request, &config).await
    }

    async fn delete(&self, volume: &PersistentVolume) -> Result<()> {
        let storage_class = volume
            .spec
            .as_ref()
            .and_then(|spec| spec.storage_class_name.clone())
            .ok_or_else(|| Error::Config("persistent volume has no storage class".into()))?;
        let config = self.resolve_config(&storage_class).await?;
        self.delete_with_config(volume, &config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::volume::{
        ANN_DATASET_PRE_EXISTED, ANN_SHARE_ID, ANN_SHARE_PRE_EXISTED,
    };
    use assert_matches::assert_matches;
    use mockito::Matcher;
    use serde_json::json;

    const GIB: i64 = 1024 * 1024 * 1024;

    fn test_config(server: &mockito::ServerGuard) -> ProvisionerConfig {
        let mut config = ProvisionerConfig::default();
        let host_with_port = server.host_with_port();
        let (host, port) = host_with_port.rsplit_once(':').unwrap();
        config.server.protocol = "http".into();
        config.server.host = host.into();
        config.server.port = port.parse().unwrap();
        config.finalize();
        config
    }

    fn test_request() -> VolumeRequest {
        VolumeRequest {
            pv_name: "pvc-8f9a0c1e".into(),
            pvc_namespace: "default".into(),
            pvc_name: "data".into(),
            storage_class: "freenas-nfs".into(),
            capacity_bytes: GIB,
            access_modes: vec!["ReadWriteMany".into()],
            reclaim_policy: "Delete".into(),
        }
    }

    fn parent_body() -> String {
        json!({"name": "tank", "pool": "tank", "mountpoint": "/mnt/tank"}).to_string()
    }

    async fn mock_parent(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/")
            .with_status(200)
            .with_body(parent_body())
            .create_async()
            .await
    }

    /// Listing used by the scan fallback; contains only the parent.
    async fn mock_dataset_listing(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/api/v1.0/storage/dataset/")
            .match_query(Matcher::UrlEncoded("limit".into(), "1000".into()))
            .with_status(200)
            .with_body(json!([{"name": "tank", "pool": "tank", "mountpoint": "/mnt/tank"}]).to_string())
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_provision_creates_everything_fresh() {
        let mut server = mockito::Server::new_async().await;
        mock_parent(&mut server).await;
        mock_dataset_listing(&mut server).await;

        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/data/")
            .with_status(404)
            .create_async()
            .await;

        let create_namespace = server
            .mock("POST", "/api/v1.0/storage/dataset/tank/")
            .match_body(Matcher::PartialJson(json!({
                "name": "default",
                "comments": "k8s provisioned namespace"
            })))
            .with_status(201)
            .with_body(
                json!({"name": "tank/default", "pool": "tank", "mountpoint": "/mnt/tank/default"})
                    .to_string(),
            )
            .create_async()
            .await;
        let create_dataset = server
            .mock("POST", "/api/v1.0/storage/dataset/tank/default/")
            .match_body(Matcher::PartialJson(json!({
                "name": "data",
                "pool": "tank",
                "refquota": "1073741824b",
                "refreservation": "1073741824b"
            })))
            .with_status(201)
            .with_body(
                json!({"name": "data", "pool": "tank", "mountpoint": "/mnt/tank/default/data"})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/sharing/nfs/")
            .match_query(Matcher::UrlEncoded("limit".into(), "1000".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let create_share = server
            .mock("POST", "/api/v1.0/sharing/nfs/")
            .match_body(Matcher::PartialJson(
                json!({"nfs_paths": ["/mnt/tank/default/data"], "nfs_alldirs": true}),
            ))
            .with_status(201)
            .with_body(json!({"id": 17, "nfs_paths": ["/mnt/tank/default/data"]}).to_string())
            .create_async()
            .await;
        let apply_permission = server
            .mock("PUT", "/api/v1.0/storage/permission/")
            .match_body(Matcher::PartialJson(json!({
                "mp_path": "/mnt/tank/default/data",
                "mp_mode": "0777"
            })))
            .with_status(201)
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let config = test_config(&server);
        let pv = provisioner
            .provision_with_config(&test_request(), &config)
            .await
            .unwrap();

        create_namespace.assert_async().await;
        create_dataset.assert_async().await;
        create_share.assert_async().await;
        apply_permission.assert_async().await;

        let annotations = pv.metadata.annotations.unwrap();
        assert_eq!(annotations[ANN_DATASET_PRE_EXISTED], "false");
        assert_eq!(annotations[ANN_SHARE_PRE_EXISTED], "false");
        assert_eq!(annotations[ANN_SHARE_ID], "17");

        let spec = pv.spec.unwrap();
        let nfs = spec.nfs.unwrap();
        assert_eq!(nfs.path, "/mnt/tank/default/data");
        assert_eq!(nfs.server, config.share.host);
    }

    #[tokio::test]
    async fn test_provision_adopts_existing_resources() {
        let mut server = mockito::Server::new_async().await;
        mock_parent(&mut server).await;

        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/")
            .with_status(200)
            .with_body(
                json!({"name": "tank/default", "pool": "tank", "mountpoint": "/mnt/tank/default"})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/data/")
            .with_status(200)
            .with_body(
                json!({"name": "tank/default/data", "pool": "tank", "mountpoint": "/mnt/tank/default/data"})
                    .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/sharing/nfs/")
            .match_query(Matcher::UrlEncoded("limit".into(), "1000".into()))
            .with_status(200)
            .with_body(json!([{"id": 83, "nfs_paths": ["/mnt/tank/default/data"]}]).to_string())
            .create_async()
            .await;
        server
            .mock("PUT", "/api/v1.0/storage/permission/")
            .with_status(201)
            .create_async()
            .await;

        // a second run must not create anything
        let create_dataset = server
            .mock("POST", Matcher::Regex("/api/v1.0/storage/dataset/.*".into()))
            .expect(0)
            .create_async()
            .await;
        let create_share = server
            .mock("POST", "/api/v1.0/sharing/nfs/")
            .expect(0)
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let config = test_config(&server);
        let pv = provisioner
            .provision_with_config(&test_request(), &config)
            .await
            .unwrap();

        create_dataset.assert_async().await;
        create_share.assert_async().await;

        let annotations = pv.metadata.annotations.unwrap();
        assert_eq!(annotations[ANN_DATASET_PRE_EXISTED], "true");
        assert_eq!(annotations[ANN_SHARE_PRE_EXISTED], "true");
        assert_eq!(annotations[ANN_SHARE_ID], "83");
    }

    #[tokio::test]
    async fn test_missing_parent_fails_before_any_create() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/storage/dataset/")
            .match_query(Matcher::UrlEncoded("limit".into(), "1000".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let create_dataset = server
            .mock("POST", Matcher::Regex("/api/v1.0/storage/dataset/.*".into()))
            .expect(0)
            .create_async()
            .await;
        let create_share = server
            .mock("POST", "/api/v1.0/sharing/nfs/")
            .expect(0)
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let config = test_config(&server);
        let err = provisioner
            .provision_with_config(&test_request(), &config)
            .await
            .unwrap_err();

        assert_matches!(err, Error::NotFound { kind: "dataset", .. });
        create_dataset.assert_async().await;
        create_share.assert_async().await;
    }

    #[tokio::test]
    async fn test_degraded_appliance_is_not_treated_as_absent_dataset() {
        let mut server = mockito::Server::new_async().await;
        mock_parent(&mut server).await;

        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;
        let create_dataset = server
            .mock("POST", Matcher::Regex("/api/v1.0/storage/dataset/.*".into()))
            .expect(0)
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let config = test_config(&server);
        let err = provisioner
            .provision_with_config(&test_request(), &config)
            .await
            .unwrap_err();

        assert_eq!(err.remote_status(), Some(500));
        create_dataset.assert_async().await;
    }

    #[tokio::test]
    async fn test_provision_without_quotas_reports_them_unapplied() {
        let mut server = mockito::Server::new_async().await;
        mock_parent(&mut server).await;
        mock_dataset_listing(&mut server).await;

        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/")
            .with_status(200)
            .with_body(json!({"name": "tank/default", "pool": "tank"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/data/")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("POST", "/api/v1.0/storage/dataset/tank/default/")
            .with_status(201)
            .with_body(json!({"name": "data", "pool": "tank"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/sharing/nfs/")
            .match_query(Matcher::UrlEncoded("limit".into(), "1000".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        server
            .mock("POST", "/api/v1.0/sharing/nfs/")
            .with_status(201)
            .with_body(json!({"id": 5, "nfs_paths": ["/mnt/tank/default/data"]}).to_string())
            .create_async()
            .await;
        server
            .mock("PUT", "/api/v1.0/storage/permission/")
            .with_status(201)
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let mut config = test_config(&server);
        config.dataset.enable_quotas = false;
        config.dataset.enable_reservation = false;

        let pv = provisioner
            .provision_with_config(&test_request(), &config)
            .await
            .unwrap();

        let annotations = pv.metadata.annotations.unwrap();
        assert_eq!(annotations["freenas.org/quota-applied"], "false");
        assert_eq!(annotations["freenas.org/reservation-applied"], "false");
    }

    // =========================================================================
    // Delete
    // =========================================================================

    fn released_volume(provenance: &Provenance) -> PersistentVolume {
        let mut config = ProvisionerConfig::default();
        config.share.host = "nfs.example.com".into();
        let mut pv = build_persistent_volume(
            &test_request(),
            &config,
            "/mnt/tank/default/data",
            provenance,
        );
        pv.metadata.name = Some("pvc-8f9a0c1e".into());
        pv
    }

    #[tokio::test]
    async fn test_delete_removes_owned_resources() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1.0/sharing/nfs/83/")
            .with_status(200)
            .with_body(json!({"id": 83, "nfs_paths": ["/mnt/tank/default/data"]}).to_string())
            .create_async()
            .await;
        let delete_share = server
            .mock("DELETE", "/api/v1.0/sharing/nfs/83/")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/data/")
            .with_status(200)
            .with_body(json!({"name": "tank/default/data", "pool": "tank"}).to_string())
            .create_async()
            .await;
        let delete_dataset = server
            .mock("DELETE", "/api/v1.0/storage/dataset/tank/default/data/")
            .with_status(204)
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let config = test_config(&server);
        let volume = released_volume(&Provenance {
            identity: "node-1".into(),
            share_id: Some(83),
            ..Provenance::default()
        });

        provisioner.delete_with_config(&volume, &config).await.unwrap();
        delete_share.assert_async().await;
        delete_dataset.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_retains_adopted_resources() {
        let mut server = mockito::Server::new_async().await;
        // both resources pre-existed and retention is on (the default):
        // no fetch or delete traffic at all is allowed
        let any_share_call = server
            .mock("GET", Matcher::Regex("/api/v1.0/sharing/nfs.*".into()))
            .expect(0)
            .create_async()
            .await;
        let any_dataset_call = server
            .mock("GET", Matcher::Regex("/api/v1.0/storage/dataset.*".into()))
            .expect(0)
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let config = test_config(&server);
        let volume = released_volume(&Provenance {
            identity: "node-1".into(),
            dataset_pre_existed: true,
            share_pre_existed: true,
            share_id: Some(83),
            ..Provenance::default()
        });

        provisioner.delete_with_config(&volume, &config).await.unwrap();
        any_share_call.assert_async().await;
        any_dataset_call.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_removes_adopted_resources_when_retention_is_off() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1.0/sharing/nfs/83/")
            .with_status(200)
            .with_body(json!({"id": 83, "nfs_paths": ["/mnt/tank/default/data"]}).to_string())
            .create_async()
            .await;
        let delete_share = server
            .mock("DELETE", "/api/v1.0/sharing/nfs/83/")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/data/")
            .with_status(200)
            .with_body(json!({"name": "tank/default/data", "pool": "tank"}).to_string())
            .create_async()
            .await;
        let delete_dataset = server
            .mock("DELETE", "/api/v1.0/storage/dataset/tank/default/data/")
            .with_status(204)
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let mut config = test_config(&server);
        config.dataset.retain_pre_existing = false;
        config.share.retain_pre_existing = false;

        let volume = released_volume(&Provenance {
            identity: "node-1".into(),
            dataset_pre_existed: true,
            share_pre_existed: true,
            share_id: Some(83),
            ..Provenance::default()
        });

        provisioner.delete_with_config(&volume, &config).await.unwrap();
        delete_share.assert_async().await;
        delete_dataset.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_tolerates_already_missing_resources() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1.0/sharing/nfs/83/")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/storage/dataset/tank/default/data/")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v1.0/storage/dataset/")
            .match_query(Matcher::UrlEncoded("limit".into(), "1000".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;
        let any_delete = server
            .mock("DELETE", Matcher::Regex("/api/v1.0/.*".into()))
            .expect(0)
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let config = test_config(&server);
        let volume = released_volume(&Provenance {
            identity: "node-1".into(),
            share_id: Some(83),
            ..Provenance::default()
        });

        provisioner.delete_with_config(&volume, &config).await.unwrap();
        any_delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_propagates_remote_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1.0/sharing/nfs/83/")
            .with_status(200)
            .with_body(json!({"id": 83, "nfs_paths": ["/mnt/tank/default/data"]}).to_string())
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/v1.0/sharing/nfs/83/")
            .with_status(500)
            .with_body("cannot remove share")
            .create_async()
            .await;

        let provisioner = FreenasProvisioner::new("node-1");
        let config = test_config(&server);
        let volume = released_volume(&Provenance {
            identity: "node-1".into(),
            share_id: Some(83),
            ..Provenance::default()
        });

        let err = provisioner
            .delete_with_config(&volume, &config)
            .await
            .unwrap_err();
        assert_eq!(err.remote_status(), Some(500));
    }

    #[tokio::test]
    async fn test_delete_rejects_volume_without_nfs_source() {
        let provisioner = FreenasProvisioner::new("node-1");
        let config = ProvisionerConfig::default();
        let mut volume = released_volume(&Provenance::default());
        volume.spec.as_mut().unwrap().nfs = None;

        let err = provisioner
            .delete_with_config(&volume, &config)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Config(_));
    }
}
