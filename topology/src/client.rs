use crate::config::TopologyService;
use crate::payload::{Edge, EntityType, Node};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opco display name (the two letter code) to the unique id of its node.
pub type OpcoIndex = HashMap<String, String>;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("token endpoint returned HTTP {0}")]
    Status(StatusCode),
    #[error("token endpoint response did not contain a token")]
    MissingToken,
}

#[derive(thiserror::Error, Debug)]
pub enum TopologyFetchError {
    #[error("opco query failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("opco query returned HTTP {0}")]
    Status(StatusCode),
}

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Calls the publisher makes against the topology service.
#[async_trait]
pub trait TopologyApi: Send + Sync {
    async fn fetch_opcos(&self) -> Result<OpcoIndex, TopologyFetchError>;
    async fn create_resource(&self, node: &Node) -> Result<(), PublishError>;
    async fn create_reference(&self, edge: &Edge) -> Result<(), PublishError>;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    api_key: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct OpcoItem {
    name: Option<String>,
    #[serde(rename = "uniqueId")]
    unique_id: Option<String>,
}

#[derive(Deserialize)]
struct OpcoQueryResponse {
    #[serde(rename = "_items")]
    items: Vec<OpcoItem>,
}

pub fn build_http_client(config: &TopologyService) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
}

/// Exchanges the configured credentials for a bearer token.
pub async fn request_token(
    client: &reqwest::Client,
    config: &TopologyService,
) -> Result<String, AuthError> {
    let response = client
        .post(config.auth_url.clone())
        .json(&TokenRequest {
            username: &config.username,
            api_key: &config.api_key,
        })
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AuthError::Status(response.status()));
    }

    response
        .json::<TokenResponse>()
        .await?
        .token
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// HTTP implementation of [`TopologyApi`]. The bearer token is fixed for the
/// lifetime of the client.
pub struct TopologyClient {
    client: reqwest::Client,
    config: TopologyService,
    token: String,
}

impl TopologyClient {
    pub fn new(client: reqwest::Client, config: TopologyService, token: String) -> Self {
        TopologyClient {
            client,
            config,
            token,
        }
    }

    fn post(&self, url: &url::Url) -> reqwest::RequestBuilder {
        self.client
            .post(url.clone())
            .header("accept", "application/json")
            .header("X-TenantID", &self.config.tenant_id)
            .header("JobId", &self.config.job_id)
            .bearer_auth(&self.token)
    }

    async fn send_json<T: Serialize + Sync>(
        &self,
        url: &url::Url,
        payload: &T,
    ) -> Result<(), PublishError> {
        let response = self.post(url).json(payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Status { status, body });
        }

        tracing::debug!(url = %url, status = %status, "Topology service accepted payload");
        Ok(())
    }
}

#[async_trait]
impl TopologyApi for TopologyClient {
    async fn fetch_opcos(&self) -> Result<OpcoIndex, TopologyFetchError> {
        let response = self
            .client
            .get(self.config.query_url.clone())
            .query(&[
                ("_field", "uniqueId"),
                ("_field", "name"),
                ("_type", EntityType::Opco.as_str()),
                ("_include_global_resources", "false"),
                ("_include_count", "false"),
                ("_include_status", "false"),
                ("_include_status_severity", "false"),
                ("_include_metadata", "false"),
                ("_return_composites", "false"),
            ])
            .header("accept", "application/json")
            .header("X-TenantID", &self.config.tenant_id)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TopologyFetchError::Status(response.status()));
        }

        let items = response.json::<OpcoQueryResponse>().await?.items;
        let mut opcos = OpcoIndex::with_capacity(items.len());
        for item in items {
            match (item.name, item.unique_id) {
                (Some(name), Some(unique_id)) => {
                    opcos.insert(name, unique_id);
                }
                (name, _) => {
                    tracing::warn!(name = ?name, "Skipping opco without name or unique id");
                }
            }
        }

        tracing::info!(count = opcos.len(), "Fetched opcos from topology service");
        Ok(opcos)
    }

    async fn create_resource(&self, node: &Node) -> Result<(), PublishError> {
        self.send_json(&self.config.resources_url, node).await
    }

    async fn create_reference(&self, edge: &Edge) -> Result<(), PublishError> {
        self.send_json(&self.config.references_url, edge).await
    }
}
