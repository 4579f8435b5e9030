use serde_json::{Map, Value};

/// Passthrough attributes copied from a source document.
pub type Attributes = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Deployment {
    /// Taken from the document's `name`; aggregates without it are not published.
    pub name: Option<String>,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Environment {
    pub name: String,
    pub attributes: Attributes,
    pub virtual_hosts: Vec<VirtualHost>,
    pub proxies: Vec<Proxy>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VirtualHost {
    pub name: Option<String>,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Proxy {
    pub name: Option<String>,
    pub attributes: Attributes,
    pub target_servers: Vec<TargetServer>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TargetServer {
    pub name: Option<String>,
    /// Backend host, the last segment of the target server's unique id
    pub host: Option<String>,
    pub attributes: Attributes,
}

/// Everything assembled for one configured deployment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CountryTopology {
    /// Name from the run configuration, used for object store paths
    pub deployment_name: String,
    pub opco: Option<String>,
    /// None when the deployment document could not be read
    pub deployment: Option<Deployment>,
    pub environments: Vec<Environment>,
}
