use serde::Deserialize;
use std::fs::File;
use topology::config::{
    Config as SyncConfig, DEFAULT_TENANT_ID, ObjectStore, ObjectStoreType, TopologyService,
    parse_name_list,
};

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
    #[serde(flatten)]
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from environment style variables returned by `lookup`.
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| optional(name).ok_or(ConfigError::MissingVar(name));
        let url = |name: &'static str| -> Result<url::Url, ConfigError> {
            required(name)?
                .parse()
                .map_err(|e: url::ParseError| ConfigError::InvalidVar {
                    name,
                    reason: e.to_string(),
                })
        };

        let object_store = match optional("OBJECT_STORE_DIR") {
            Some(base_dir) => ObjectStoreType::Filesystem { base_dir },
            None => ObjectStoreType::S3 {
                bucket: required("AWS_BUCKET_NAME")?,
            },
        };

        let accept_invalid_certs = match optional("AIOPS_ACCEPT_INVALID_CERTS") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidVar {
                name: "AIOPS_ACCEPT_INVALID_CERTS",
                reason: format!("expected a boolean, got {raw:?}"),
            })?,
            None => false,
        };

        let topology_service = TopologyService {
            auth_url: url("AIOPS_AUTH_EP")?,
            username: required("AIOPS_AUTH_EP_USER")?,
            api_key: required("AIOPS_AUTH_EP_PW")?,
            query_url: url("AIOPS_TOPO_EP")?,
            resources_url: url("AIOPS_RESOURCES_EP")?,
            references_url: url("AIOPS_REFERENCES_EP")?,
            job_id: required("AIOPS_OBS_JOBNAME")?,
            tenant_id: optional("AIOPS_TENANT_ID").unwrap_or_else(|| DEFAULT_TENANT_ID.into()),
            accept_invalid_certs,
        };

        let metrics = match optional("STATSD_HOST") {
            Some(statsd_host) => {
                let raw_port = required("STATSD_PORT")?;
                let statsd_port = raw_port.trim().parse().map_err(|_| ConfigError::InvalidVar {
                    name: "STATSD_PORT",
                    reason: format!("expected a port number, got {raw_port:?}"),
                })?;
                Some(MetricsConfig {
                    statsd_host,
                    statsd_port,
                })
            }
            None => None,
        };

        Ok(Config {
            metrics,
            logging: optional("SENTRY_DSN").map(|sentry_dsn| LoggingConfig { sentry_dsn }),
            sync: SyncConfig {
                object_store: ObjectStore {
                    r#type: object_store,
                },
                topology_service,
                deployments: optional("APIGW_DEPLOYMENTS")
                    .map(|raw| parse_name_list(&raw))
                    .unwrap_or_default(),
                environments: optional("APIGW_DEPL_ENVS")
                    .map(|raw| parse_name_list(&raw))
                    .unwrap_or_default(),
            },
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}
