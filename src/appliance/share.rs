//! NFS share resource
//!
//! A share exports one or more filesystem paths with host/network access
//! control and squash mapping. The appliance assigns a numeric id on
//! creation; before that, a share can only be matched by exported path,
//! and the API offers no path filter, so lookup scans the full listing.

use serde::{Deserialize, Serialize};

use crate::appliance::ApplianceClient;
use crate::error::{Error, Result};

fn is_false(value: &bool) -> bool {
    !*value
}

/// A network export on the appliance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfsShare {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "nfs_paths")]
    pub paths: Vec<String>,
    #[serde(rename = "nfs_security")]
    pub security: Vec<String>,
    #[serde(rename = "nfs_alldirs", skip_serializing_if = "is_false")]
    pub alldirs: bool,
    #[serde(rename = "nfs_ro", skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(rename = "nfs_quiet", skip_serializing_if = "is_false")]
    pub quiet: bool,
    #[serde(rename = "nfs_hosts", skip_serializing_if = "String::is_empty")]
    pub hosts: String,
    #[serde(rename = "nfs_network", skip_serializing_if = "String::is_empty")]
    pub network: String,
    #[serde(rename = "nfs_maproot_user", skip_serializing_if = "String::is_empty")]
    pub maproot_user: String,
    #[serde(rename = "nfs_maproot_group", skip_serializing_if = "String::is_empty")]
    pub maproot_group: String,
    #[serde(rename = "nfs_mapall_user", skip_serializing_if = "String::is_empty")]
    pub mapall_user: String,
    #[serde(rename = "nfs_mapall_group", skip_serializing_if = "String::is_empty")]
    pub mapall_group: String,
    #[serde(rename = "nfs_comment", skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl NfsShare {
    /// Whether this share exports the given path.
    pub fn contains_path(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Refresh local state from a fetched remote representation.
    pub fn merge_from(&mut self, other: NfsShare) {
        *self = other;
    }

    /// Fetch this share: directly by id when one is known, otherwise by
    /// scanning the share listing for the first exported path.
    pub async fn fetch(&mut self, client: &ApplianceClient) -> Result<()> {
        let Some(id) = self.id else {
            return self.fetch_by_path(client).await;
        };

        let endpoint = format!("/api/v1.0/sharing/nfs/{}/", id);
        match client.get_json::<NfsShare>(&endpoint).await {
            Ok(remote) => {
                self.merge_from(remote);
                Ok(())
            }
            Err(err) if err.remote_status() == Some(404) => Err(Error::NotFound {
                kind: "nfs share",
                name: id.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    /// Scan all shares for the one whose path set contains our first path.
    ///
    /// At most one share is authoritative for a given path, so the first
    /// match wins. Fails with [`Error::NotFound`] when no share exports it.
    pub async fn fetch_by_path(&mut self, client: &ApplianceClient) -> Result<()> {
        let target = self
            .paths
            .first()
            .cloned()
            .ok_or_else(|| Error::Config("share lookup requires an exported path".into()))?;

        let shares: Vec<NfsShare> = client.get_json("/api/v1.0/sharing/nfs/?limit=1000").await?;

        match shares.into_iter().find(|s| s.contains_path(&target)) {
            Some(remote) => {
                self.merge_from(remote);
                Ok(())
            }
            None => Err(Error::NotFound {
                kind: "nfs share",
                name: target,
            }),
        }
    }

    /// Create this share, expecting 201, and adopt the assigned id.
    pub async fn create(&mut self, client: &ApplianceClient) -> Result<()> {
        let remote: NfsShare = client.post_json("/api/v1.0/sharing/nfs/", self).await?;
        self.merge_from(remote);
        Ok(())
    }

    /// Delete this share by id, expecting 204.
    pub async fn delete(&self, client: &ApplianceClient) -> Result<()> {
        let id = self
            .id
            .ok_or_else(|| Error::Config("cannot delete a share without an id".into()))?;
        let endpoint = format!("/api/v1.0/sharing/nfs/{}/", id);
        client.delete_expect_gone(&endpoint).await
    }
}
