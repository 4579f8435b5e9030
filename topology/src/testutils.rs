use crate::client::{OpcoIndex, PublishError, TopologyApi, TopologyFetchError};
use crate::config::TopologyService;
use crate::object_store::FilesystemObjectStore;
use crate::payload::{Edge, Node};
use crate::types::{
    Attributes, CountryTopology, Deployment, Environment, Proxy, TargetServer, VirtualHost,
};
use async_trait::async_trait;
use metrics::{
    Counter, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Writes `(key, document)` pairs below a fresh temp dir and returns a store over it.
pub fn write_objects(objects: &[(&str, Value)]) -> (tempfile::TempDir, FilesystemObjectStore) {
    let dir = tempfile::tempdir().unwrap();
    for (key, document) in objects {
        let path = dir.path().join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, serde_json::to_vec_pretty(document).unwrap()).unwrap();
    }
    let store = FilesystemObjectStore::new(dir.path().to_str().unwrap());
    (dir, store)
}

pub fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

pub fn service_config(base_url: &str) -> TopologyService {
    let url = |path: &str| -> url::Url {
        format!("{}{path}", base_url.trim_end_matches('/'))
            .parse()
            .unwrap()
    };
    TopologyService {
        auth_url: url("/auth"),
        username: "sync".into(),
        api_key: "secret".into(),
        query_url: url("/topology/resources"),
        resources_url: url("/topology/rest/resources"),
        references_url: url("/topology/rest/references"),
        job_id: "apigw-observer".into(),
        tenant_id: "tenant-1".into(),
        accept_invalid_certs: false,
    }
}

fn attributes(value: Value) -> Attributes {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

/// One deployment `apigw-nl` with environment `prod`, virtual host `vh1` and
/// proxy `px1` backed by target server `ts1` on `1.2.3.4`.
pub fn sample_country() -> CountryTopology {
    CountryTopology {
        deployment_name: "apigw-nl".into(),
        opco: Some("NL".into()),
        deployment: Some(Deployment {
            name: Some("apigw-nl".into()),
            attributes: attributes(json!({
                "name": "apigw-nl",
                "createdAt": 1_700_000_000_000_i64,
                "properties": {}
            })),
        }),
        environments: vec![Environment {
            name: "prod".into(),
            attributes: attributes(json!({
                "name": "prod",
                "region": "eu-west-1",
                "createdAt": 1_700_000_000_000_i64
            })),
            virtual_hosts: vec![VirtualHost {
                name: Some("vh1".into()),
                attributes: attributes(json!({"name": "vh1", "port": "443"})),
            }],
            proxies: vec![Proxy {
                name: Some("px1".into()),
                attributes: attributes(json!({
                    "name": "px1",
                    "lastModifiedAt": 1_700_000_000_000_i64
                })),
                target_servers: vec![TargetServer {
                    name: Some("ts1".into()),
                    host: Some("1.2.3.4".into()),
                    attributes: attributes(json!({"name": "ts1", "host": "1.2.3.4"})),
                }],
            }],
        }],
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCall {
    Resource(Node),
    Reference(Edge),
}

/// In-memory [`TopologyApi`] that records every call. Clones share the log.
#[derive(Clone)]
pub struct RecordingTopologyApi {
    // None makes the opco lookup fail
    opcos: Option<OpcoIndex>,
    rejected: HashSet<String>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    opco_fetches: Arc<AtomicUsize>,
}

impl RecordingTopologyApi {
    pub fn new(opcos: Option<OpcoIndex>) -> Self {
        RecordingTopologyApi {
            opcos,
            rejected: HashSet::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            opco_fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Makes the resource call for `unique_id` fail.
    pub fn reject_resource(mut self, unique_id: &str) -> Self {
        self.rejected.insert(unique_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn opco_fetches(&self) -> usize {
        self.opco_fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TopologyApi for RecordingTopologyApi {
    async fn fetch_opcos(&self) -> Result<OpcoIndex, TopologyFetchError> {
        self.opco_fetches.fetch_add(1, Ordering::Relaxed);
        self.opcos
            .clone()
            .ok_or(TopologyFetchError::Status(StatusCode::INTERNAL_SERVER_ERROR))
    }

    async fn create_resource(&self, node: &Node) -> Result<(), PublishError> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall::Resource(node.clone()));
        if self.rejected.contains(&node.unique_id) {
            return Err(PublishError::Status {
                status: StatusCode::BAD_REQUEST,
                body: format!("{} rejected", node.unique_id),
            });
        }
        Ok(())
    }

    async fn create_reference(&self, edge: &Edge) -> Result<(), PublishError> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall::Reference(edge.clone()));
        Ok(())
    }
}

/// Metrics recorder that keeps every histogram sample by metric name.
#[derive(Clone, Default)]
pub struct HistogramRecorder {
    samples: Arc<Mutex<Vec<(String, f64)>>>,
}

impl HistogramRecorder {
    pub fn samples(&self, name: &str) -> Vec<f64> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .collect()
    }
}

struct RecordedHistogram {
    name: String,
    samples: Arc<Mutex<Vec<(String, f64)>>>,
}

impl HistogramFn for RecordedHistogram {
    fn record(&self, value: f64) {
        self.samples.lock().unwrap().push((self.name.clone(), value));
    }
}

impl Recorder for HistogramRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, _key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::noop()
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(RecordedHistogram {
            name: key.name().to_string(),
            samples: self.samples.clone(),
        }))
    }
}
