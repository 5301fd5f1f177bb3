//! Dataset resource
//!
//! A dataset is a storage container addressed by pool and hierarchical path
//! (`tank/namespace/volume`). The parent of a path must exist before a child
//! can be created. Space statistics (`avail`, `used`, `refer`) are
//! remote-reported and read-only.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::appliance::ApplianceClient;
use crate::error::{Error, Result};

/// A storage dataset on the appliance.
///
/// `name` is the full hierarchical path below the pool root. Quota fields
/// are in bytes; zero means unset.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub name: String,
    pub pool: String,
    pub mountpoint: String,
    pub avail: i64,
    pub used: i64,
    pub refer: i64,
    pub recordsize: i64,
    pub quota: i64,
    pub reservation: i64,
    pub refquota: i64,
    pub refreservation: i64,
    pub comments: String,
}

/// Create-request body. The API wants quota-ish sizes as `"<bytes>b"`
/// strings and rejects unknown zero values, so they are mapped and omitted
/// here rather than on [`Dataset`] itself.
#[derive(Serialize)]
struct DatasetCreateBody<'a> {
    name: &'a str,
    pool: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    comments: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    recordsize: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reservation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refquota: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refreservation: Option<String>,
}

fn byte_size(value: i64) -> Option<String> {
    (value > 0).then(|| format!("{}b", value))
}

impl Dataset {
    /// Dataset known only by path, to be hydrated by [`Dataset::fetch`].
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Refresh local state from a fetched remote representation.
    pub fn merge_from(&mut self, other: Dataset) {
        *self = other;
    }

    /// Fetch this dataset from the appliance.
    ///
    /// Tries the direct path lookup first. Some API builds do not resolve
    /// nested dataset paths on direct GET, so a 404 falls back to scanning
    /// the full dataset listing for a name/pool match; the fallback costs
    /// one extra round trip but is correct on every variant. Fails with
    /// [`Error::NotFound`] when neither strategy finds the dataset.
    pub async fn fetch(&mut self, client: &ApplianceClient) -> Result<()> {
        let endpoint = format!("/api/v1.0/storage/dataset/{}/", self.name);
        match client.get_json::<Dataset>(&endpoint).await {
            Ok(remote) => {
                self.merge_from(remote);
                return Ok(());
            }
            Err(err) if err.remote_status() == Some(404) => {
                debug!("direct lookup of dataset \"{}\" returned 404, scanning listing", self.name);
            }
            Err(err) => return Err(err),
        }
        self.fetch_scan(client).await
    }

    /// List-and-scan lookup: fetch the full dataset listing and linearly
    /// match on path (and pool, when one is already known locally).
    pub async fn fetch_scan(&mut self, client: &ApplianceClient) -> Result<()> {
        let listing: Vec<Dataset> = client
            .get_json("/api/v1.0/storage/dataset/?limit=1000")
            .await?;

        let matched = listing
            .into_iter()
            .find(|d| d.name == self.name && (self.pool.is_empty() || d.pool == self.pool));

        match matched {
            Some(remote) => {
                self.merge_from(remote);
                Ok(())
            }
            None => Err(Error::NotFound {
                kind: "dataset",
                name: self.name.clone(),
            }),
        }
    }

    /// Create this dataset under its parent path, expecting 201.
    ///
    /// The API addresses creation at the parent and wants only the leaf
    /// name in the body; local state is refreshed from the response and the
    /// full path restored afterwards.
    pub async fn create(&mut self, client: &ApplianceClient) -> Result<()> {
        let (parent, leaf) = self.name.rsplit_once('/').ok_or_else(|| {
            Error::Config(format!(
                "dataset \"{}\" has no parent to create it under",
                self.name
            ))
        })?;

        let endpoint = format!("/api/v1.0/storage/dataset/{}/", parent);
        let body = DatasetCreateBody {
            name: leaf,
            pool: &self.pool,
            comments: &self.comments,
            recordsize: (self.recordsize > 0).then_some(self.recordsize),
            quota: byte_size(self.quota),
            reservation: byte_size(self.reservation),
            refquota: byte_size(self.refquota),
            refreservation: byte_size(self.refreservation),
        };

        let full_name = self.name.clone();
        let remote: Dataset = client.post_json(&endpoint, &body).await?;
        self.merge_from(remote);
        // the create response reports the leaf name only
        self.name = full_name;

        Ok(())
    }

    /// Delete this dataset, expecting 204.
    pub async fn delete(&self, client: &ApplianceClient) -> Result<()> {
        let endpoint = format!("/api/v1.0/storage/dataset/{}/", self.name);
        client.delete_expect_gone(&endpoint).await
    }
}
