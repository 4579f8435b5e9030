//! Wire format of the topology service's resources and references endpoints.
use crate::types::Attributes;
use serde::Serialize;
use std::fmt;

/// Keys owned by [`Node`] itself, never taken from passthrough attributes.
const RESERVED_KEYS: &[&str] = &["uniqueId", "entityTypes", "matchTokens", "tags"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Opco,
    Deployment,
    Environment,
    Host,
    Application,
    Backend,
}

impl EntityType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Opco => "opco",
            EntityType::Deployment => "deployment",
            EntityType::Environment => "environment",
            EntityType::Host => "host",
            EntityType::Application => "application",
            EntityType::Backend => "backend",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeType {
    /// opco -> deployment
    Manages,
    /// deployment -> environment, proxy -> target server
    RunsOn,
    /// environment -> virtual host
    Contains,
    /// environment -> proxy
    Uses,
}

impl EdgeType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Manages => "manages",
            EdgeType::RunsOn => "runsOn",
            EdgeType::Contains => "contains",
            EdgeType::Uses => "uses",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub unique_id: String,
    pub entity_types: Vec<EntityType>,
    pub match_tokens: Vec<String>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl Node {
    /// Builds a node whose attributes are `context` overlaid with `source`.
    /// The unique id doubles as the only match token.
    pub fn new(
        entity_type: EntityType,
        unique_id: String,
        tags: Vec<String>,
        context: Attributes,
        source: &Attributes,
    ) -> Self {
        let mut attributes = context;
        for (key, value) in source {
            attributes.insert(key.clone(), value.clone());
        }
        for key in RESERVED_KEYS {
            attributes.remove(*key);
        }

        Node {
            match_tokens: vec![unique_id.clone()],
            unique_id,
            entity_types: vec![entity_type],
            tags,
            attributes,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Edge {
    /// Absent when the source node could not be resolved
    #[serde(rename = "_fromUniqueId", skip_serializing_if = "Option::is_none")]
    pub from_unique_id: Option<String>,
    #[serde(rename = "_toUniqueId")]
    pub to_unique_id: String,
    #[serde(rename = "_edgeType")]
    pub edge_type: EdgeType,
}

impl Edge {
    pub fn new(from_unique_id: Option<String>, to_unique_id: String, edge_type: EdgeType) -> Self {
        Edge {
            from_unique_id,
            to_unique_id,
            edge_type,
        }
    }
}
