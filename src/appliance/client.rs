//! HTTP client for the appliance REST API
//!
//! Thin request/response wrapper over the appliance's versioned JSON API.
//! Owns basic authentication, the TLS-verification bypass, and the base URL.
//! Each operation expects a single success code (200 fetch, 201 create,
//! 204 delete); anything else surfaces as [`Error::Remote`] carrying the
//! appliance's diagnostic body. Connection and TLS failures surface as
//! [`Error::Transport`]. Retrying is the caller's (i.e. the external
//! controller's) job, never this client's.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Client for one appliance, built from the resolved server configuration.
///
/// Carries no cursor or session state; a single instance is safe to share
/// across concurrent provision/delete calls.
#[derive(Debug, Clone)]
pub struct ApplianceClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl ApplianceClient {
    /// Build a client from the resolved server configuration.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.allow_insecure)
            .build()?;

        Ok(Self {
            base_url: format!("{}://{}:{}", config.protocol, config.host, config.port),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, endpoint))
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn expect_status(
        response: reqwest::Response,
        expected: StatusCode,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status != expected {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Remote {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch a resource representation, expecting 200.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        trace!("GET {}", endpoint);
        let response = self.request(Method::GET, endpoint).send().await?;
        let response = Self::expect_status(response, StatusCode::OK).await?;
        Self::decode(response).await
    }

    /// Create a resource, expecting 201 and a representation in the reply.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        trace!("POST {}", endpoint);
        let response = self.request(Method::POST, endpoint).json(body).send().await?;
        let response = Self::expect_status(response, StatusCode::CREATED).await?;
        Self::decode(response).await
    }

    /// Overwrite a resource, expecting 201 and ignoring the reply body.
    pub async fn put_expect_created<B: Serialize>(&self, endpoint: &str, body: &B) -> Result<()> {
        trace!("PUT {}", endpoint);
        let response = self.request(Method::PUT, endpoint).json(body).send().await?;
        Self::expect_status(response, StatusCode::CREATED).await?;
        Ok(())
    }

    /// Delete a resource, expecting 204.
    pub async fn delete_expect_gone(&self, endpoint: &str) -> Result<()> {
        trace!("DELETE {}", endpoint);
        let response = self.request(Method::DELETE, endpoint).send().await?;
        Self::expect_status(response, StatusCode::NO_CONTENT).await?;
        Ok(())
    }
}
