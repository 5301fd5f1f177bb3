//! Filesystem permission directive
//!
//! A permission record has no independent lifecycle on the appliance: it is
//! applied with last-write-wins semantics after a share is in place, and is
//! never fetched or deleted.

use serde::Serialize;

use crate::appliance::ApplianceClient;
use crate::error::Result;

/// Mode, ownership, and ACL type for a mounted path.
#[derive(Debug, Clone, Serialize)]
pub struct Permission {
    #[serde(rename = "mp_path")]
    pub path: String,
    #[serde(rename = "mp_acl")]
    pub acl: String,
    #[serde(rename = "mp_mode")]
    pub mode: String,
    #[serde(rename = "mp_user")]
    pub user: String,
    #[serde(rename = "mp_group")]
    pub group: String,
}

impl Permission {
    /// A unix-ACL permission record for the given path.
    pub fn unix(path: impl Into<String>, mode: &str, user: &str, group: &str) -> Self {
        Self {
            path: path.into(),
            acl: "unix".into(),
            mode: mode.into(),
            user: user.into(),
            group: group.into(),
        }
    }

    /// Apply this record, expecting 201. Idempotent by construction.
    pub async fn apply(&self, client: &ApplianceClient) -> Result<()> {
        client
            .put_expect_created("/api/v1.0/storage/permission/", self)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use serde_json::json;

    #[test]
    fn test_wire_field_names() {
        let permission = Permission::unix("/mnt/tank/default/data", "0777", "root", "wheel");
        let value = serde_json::to_value(&permission).unwrap();
        assert_eq!(
            value,
            json!({
                "mp_path": "/mnt/tank/default/data",
                "mp_acl": "unix",
                "mp_mode": "0777",
                "mp_user": "root",
                "mp_group": "wheel"
            })
        );
    }

    #[tokio::test]
    async fn test_apply_is_a_put_expecting_201() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/api/v1.0/storage/permission/")
            .match_body(mockito::Matcher::PartialJson(json!({"mp_mode": "0777"})))
            .with_status(201)
            .create_async()
            .await;

        let host_with_port = server.host_with_port();
        let (host, port) = host_with_port.rsplit_once(':').unwrap();
        let client = ApplianceClient::new(&ServerConfig {
            protocol: "http".into(),
            host: host.into(),
            port: port.parse().unwrap(),
            ..ServerConfig::default()
        })
        .unwrap();

        let permission = Permission::unix("/mnt/tank/default/data", "0777", "root", "wheel");
        permission.apply(&client).await.unwrap();
        put.assert_async().await;
    }
}
