use serde::Deserialize;
use url::Url;

/// Tenant the topology service files resources under unless overridden.
pub const DEFAULT_TENANT_ID: &str = "cfd95b7e-3bc7-4006-a4a8-a73a79c71255";

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum ObjectStoreType {
    Filesystem { base_dir: String },
    S3 { bucket: String },
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct ObjectStore {
    #[serde(flatten)]
    pub r#type: ObjectStoreType,
}

/// Endpoints and credentials of the external topology service.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct TopologyService {
    /// Token endpoint, receives `{username, api_key}`
    pub auth_url: Url,
    pub username: String,
    pub api_key: String,
    /// Resource query endpoint used for the opco lookup
    pub query_url: Url,
    /// Node upsert endpoint
    pub resources_url: Url,
    /// Edge upsert endpoint
    pub references_url: Url,
    /// Sent as the `JobId` header on every upsert
    pub job_id: String,
    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_tenant_id() -> String {
    DEFAULT_TENANT_ID.to_string()
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    pub object_store: ObjectStore,
    pub topology_service: TopologyService,
    /// Deployment names, one topology tree is assembled per entry
    #[serde(default)]
    pub deployments: Vec<String>,
    /// Environment names looked up inside every deployment
    #[serde(default)]
    pub environments: Vec<String>,
}

/// Splits a comma separated list, trimming entries and dropping empty ones.
pub fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}
