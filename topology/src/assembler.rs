//! Walks the export hierarchy and builds one in-memory topology tree per
//! deployment.
//!
//! Expected layout, relative to the store root:
//!
//! ```text
//! {deployment}/{deployment}.json
//! {deployment}/{environment}/{environment}.json
//! {deployment}/{environment}/virtual-hosts/*.json
//! {deployment}/{environment}/proxies/{proxy}/{proxy}.json
//! {deployment}/{environment}/proxies/{proxy}/target-servers/*.json
//! ```
use crate::normalize::{attribute_str, derive_opco_code, expand_properties};
use crate::object_store::ObjectStore;
use crate::types::{
    Attributes, CountryTopology, Deployment, Environment, Proxy, TargetServer, VirtualHost,
};
use serde_json::Value;
use std::sync::Arc;

const JSON_SUFFIX: &str = ".json";
const VIRTUAL_HOSTS_FOLDER: &str = "virtual-hosts/";
const PROXIES_MARKER: &str = "proxies";
const TARGET_SERVERS_MARKER: &str = "target-servers";

pub struct Assembler {
    store: Arc<dyn ObjectStore>,
}

impl Assembler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Assembler { store }
    }

    /// Assembles every deployment against every environment name. The
    /// result keeps the order of `deployments`.
    pub async fn assemble_all(
        &self,
        deployments: &[String],
        environments: &[String],
    ) -> Vec<CountryTopology> {
        let mut results = Vec::with_capacity(deployments.len());
        for deployment in deployments {
            results.push(self.assemble_country(deployment, environments).await);
        }
        results
    }

    pub async fn assemble_country(
        &self,
        deployment_name: &str,
        environments: &[String],
    ) -> CountryTopology {
        let deployment = self.load_deployment(deployment_name).await;
        let opco = derive_opco_code(deployment_name);
        if opco.is_none() {
            tracing::warn!(
                deployment = %deployment_name,
                "Deployment name does not carry an opco code"
            );
        }

        let mut country = CountryTopology {
            deployment_name: deployment_name.to_string(),
            opco,
            deployment,
            environments: Vec::with_capacity(environments.len()),
        };

        for environment in environments {
            let env = self.load_environment(deployment_name, environment).await;
            tracing::info!(
                deployment = %deployment_name,
                environment = %env.name,
                virtual_hosts = env.virtual_hosts.len(),
                proxies = env.proxies.len(),
                "Assembled environment"
            );
            country.environments.push(env);
        }

        country
    }

    async fn load_deployment(&self, deployment_name: &str) -> Option<Deployment> {
        let key = format!("{deployment_name}/{deployment_name}{JSON_SUFFIX}");
        let mut attributes = self.fetch_document(&key).await?;

        // The environment tree is rebuilt from the folder layout instead.
        attributes.remove("environments");

        Some(Deployment {
            name: attribute_str(&attributes, "name"),
            attributes,
        })
    }

    /// Builds a fresh record for every environment, nothing carries over from
    /// a previously assembled one.
    async fn load_environment(&self, deployment_name: &str, environment: &str) -> Environment {
        let folder = format!("{deployment_name}/{environment}/");
        let key = format!("{folder}{environment}{JSON_SUFFIX}");

        let attributes = match self.fetch_document(&key).await {
            Some(mut attributes) => {
                expand_properties(&mut attributes);
                attributes
            }
            None => Attributes::new(),
        };

        Environment {
            name: attribute_str(&attributes, "name").unwrap_or_else(|| environment.to_string()),
            attributes,
            virtual_hosts: self.load_virtual_hosts(&folder).await,
            proxies: self.load_proxies(&folder).await,
        }
    }

    async fn load_virtual_hosts(&self, environment_folder: &str) -> Vec<VirtualHost> {
        let prefix = format!("{environment_folder}{VIRTUAL_HOSTS_FOLDER}");
        let mut virtual_hosts = Vec::new();

        for key in self.list_keys(&prefix).await {
            if !key.ends_with(JSON_SUFFIX) {
                continue;
            }
            if let Some(mut attributes) = self.fetch_document(&key).await {
                expand_properties(&mut attributes);
                virtual_hosts.push(VirtualHost {
                    name: attribute_str(&attributes, "name"),
                    attributes,
                });
            }
        }

        virtual_hosts
    }

    async fn load_proxies(&self, environment_folder: &str) -> Vec<Proxy> {
        let mut proxies = Vec::new();

        for key in self.list_keys(environment_folder).await {
            if !is_proxy_key(&key) {
                continue;
            }
            let Some(attributes) = self.fetch_document(&key).await else {
                continue;
            };
            let target_servers = self.load_target_servers(&target_servers_folder(&key)).await;

            proxies.push(Proxy {
                name: attribute_str(&attributes, "name"),
                attributes,
                target_servers,
            });
        }

        proxies
    }

    async fn load_target_servers(&self, folder: &str) -> Vec<TargetServer> {
        let mut target_servers = Vec::new();

        for key in self.list_keys(folder).await {
            if !(key.ends_with(JSON_SUFFIX) && key.contains(TARGET_SERVERS_MARKER)) {
                continue;
            }
            if let Some(attributes) = self.fetch_document(&key).await {
                target_servers.push(TargetServer {
                    name: attribute_str(&attributes, "name"),
                    host: attribute_str(&attributes, "host"),
                    attributes,
                });
            }
        }

        target_servers
    }

    /// Fetches a JSON object. Read failures and non-object documents are
    /// logged and treated as missing.
    async fn fetch_document(&self, key: &str) -> Option<Attributes> {
        match self.store.fetch_json(key).await {
            Ok(Value::Object(attributes)) => Some(attributes),
            Ok(other) => {
                tracing::warn!(
                    key = %key,
                    kind = json_kind(&other),
                    "Document is not a JSON object"
                );
                None
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to fetch document");
                None
            }
        }
    }

    async fn list_keys(&self, prefix: &str) -> Vec<String> {
        match self.store.list(prefix).await {
            Ok(entries) => entries.into_iter().map(|e| e.key).collect(),
            Err(e) => {
                tracing::error!(prefix = %prefix, error = %e, "Failed to list objects");
                Vec::new()
            }
        }
    }
}

fn is_proxy_key(key: &str) -> bool {
    key.ends_with(JSON_SUFFIX)
        && key.contains(PROXIES_MARKER)
        && !key.contains(TARGET_SERVERS_MARKER)
}

/// `a/proxies/px1/px1.json` -> `a/proxies/px1/target-servers/`
fn target_servers_folder(proxy_key: &str) -> String {
    match proxy_key.rsplit_once('/') {
        Some((parent, _)) => format!("{parent}/{TARGET_SERVERS_MARKER}/"),
        None => format!("{TARGET_SERVERS_MARKER}/"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
