//! Flattens assembled topology trees into nodes and edges and sends them to
//! the topology service.
//!
//! Calls are strictly ordered: a node is sent before the edge that connects
//! it to its parent, and a parent's edge is sent before any of its children.
//! Each call is attempted once; a failure is logged and recorded in the
//! [`PublishSummary`] but does not stop the traversal.
use crate::client::{OpcoIndex, TopologyApi, TopologyFetchError};
use crate::counter;
use crate::metrics_defs::{REFERENCES_FAILED, REFERENCES_SENT, RESOURCES_FAILED, RESOURCES_SENT};
use crate::normalize::{build_unique_id, format_timestamps};
use crate::payload::{Edge, EdgeType, EntityType, Node};
use crate::types::{Attributes, CountryTopology, Environment, Proxy, TargetServer, VirtualHost};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Resource {
        unique_id: String,
        entity_types: Vec<EntityType>,
    },
    Reference {
        from_unique_id: Option<String>,
        to_unique_id: String,
        edge_type: EdgeType,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Sent,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallRecord {
    pub call: Call,
    pub outcome: Outcome,
}

/// Outcome of every call made during one publish run, in call order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PublishSummary {
    pub records: Vec<CallRecord>,
}

impl PublishSummary {
    pub fn sent(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == Outcome::Sent)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.sent()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CallRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
    }
}

/// Names of the ancestors of the entity being published.
struct Scope<'a> {
    opco: &'a str,
    deployment: &'a str,
    environment: &'a str,
}

impl Scope<'_> {
    fn context(&self) -> Attributes {
        context(&[
            ("opco", self.opco),
            ("environment", self.environment),
            ("deployment", self.deployment),
        ])
    }

    fn unique_id(&self, name: &str) -> String {
        build_unique_id(&[self.opco, self.deployment, self.environment, name])
    }
}

pub struct Publisher<A> {
    api: A,
}

impl<A: TopologyApi> Publisher<A> {
    pub fn new(api: A) -> Self {
        Publisher { api }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Publishes all assembled deployments. Fails only if the opco lookup
    /// fails, in which case nothing is sent.
    pub async fn publish(
        &self,
        countries: &[CountryTopology],
    ) -> Result<PublishSummary, TopologyFetchError> {
        let mut summary = PublishSummary::default();

        if countries.is_empty() {
            tracing::error!("No topology data was assembled, nothing to publish");
            return Ok(summary);
        }
        tracing::info!(count = countries.len(), "Publishing assembled deployments");

        let opcos = self.api.fetch_opcos().await.inspect_err(|e| {
            tracing::error!(error = %e, "Could not load opcos, no topology will be published");
        })?;

        for country in countries {
            self.publish_country(country, &opcos, &mut summary).await;
        }

        tracing::info!(
            sent = summary.sent(),
            failed = summary.failed(),
            "Finished publishing topology"
        );
        Ok(summary)
    }

    async fn publish_country(
        &self,
        country: &CountryTopology,
        opcos: &OpcoIndex,
        summary: &mut PublishSummary,
    ) {
        let Some((deployment, deployment_name)) = country
            .deployment
            .as_ref()
            .and_then(|d| d.name.as_deref().map(|name| (d, name)))
        else {
            tracing::error!(
                deployment = %country.deployment_name,
                opco = ?country.opco,
                "No deployment document found, skipping"
            );
            return;
        };
        let Some(opco) = country.opco.as_deref() else {
            tracing::error!(
                deployment = %deployment_name,
                "Deployment name carries no opco code, skipping"
            );
            return;
        };

        let opco_unique_id = opcos.get(opco).cloned();
        if opco_unique_id.is_none() {
            tracing::warn!(
                opco = %opco,
                deployment = %deployment_name,
                "Opco is unknown to the topology service, its edge will have no source"
            );
        }
        tracing::info!(
            opco = %opco,
            opco_unique_id = ?opco_unique_id,
            deployment = %deployment_name,
            "Working on deployment"
        );

        let deployment_id = build_unique_id(&[opco, deployment_name]);
        let mut attributes = deployment.attributes.clone();
        attributes.remove("properties");
        format_timestamps(&mut attributes);

        let node = Node::new(
            EntityType::Deployment,
            deployment_id.clone(),
            vec![deployment_name.to_string()],
            context(&[("opco", opco)]),
            &attributes,
        );
        self.send_node(&node, summary).await;
        self.send_edge(
            Edge::new(opco_unique_id, deployment_id.clone(), EdgeType::Manages),
            summary,
        )
        .await;

        if country.environments.is_empty() {
            tracing::error!(
                opco = %opco,
                deployment = %deployment_name,
                "No environments assembled for deployment"
            );
            return;
        }

        for environment in &country.environments {
            let scope = Scope {
                opco,
                deployment: deployment_name,
                environment: &environment.name,
            };
            self.publish_environment(&scope, &deployment_id, environment, summary).await;
        }
    }

    async fn publish_environment(
        &self,
        scope: &Scope<'_>,
        deployment_id: &str,
        environment: &Environment,
        summary: &mut PublishSummary,
    ) {
        tracing::info!(
            opco = %scope.opco,
            deployment = %scope.deployment,
            environment = %scope.environment,
            "Working on environment"
        );

        let environment_id =
            build_unique_id(&[scope.opco, scope.deployment, scope.environment]);
        let mut attributes = environment.attributes.clone();
        attributes.remove("proxies");
        attributes.remove("virtual-hosts");
        format_timestamps(&mut attributes);

        let node = Node::new(
            EntityType::Environment,
            environment_id.clone(),
            vec![scope.deployment.to_string(), scope.environment.to_string()],
            context(&[("opco", scope.opco), ("deployment", scope.deployment)]),
            &attributes,
        );
        self.send_node(&node, summary).await;
        self.send_edge(
            Edge::new(
                Some(deployment_id.to_string()),
                environment_id.clone(),
                EdgeType::RunsOn,
            ),
            summary,
        )
        .await;

        if environment.virtual_hosts.is_empty() {
            tracing::warn!(
                deployment = %scope.deployment,
                environment = %scope.environment,
                "No virtual hosts found"
            );
        }
        for virtual_host in &environment.virtual_hosts {
            self.publish_virtual_host(scope, &environment_id, virtual_host, summary)
                .await;
        }

        if environment.proxies.is_empty() {
            tracing::warn!(
                deployment = %scope.deployment,
                environment = %scope.environment,
                "No proxies found"
            );
        }
        for proxy in &environment.proxies {
            self.publish_proxy(scope, &environment_id, proxy, summary).await;
        }
    }

    async fn publish_virtual_host(
        &self,
        scope: &Scope<'_>,
        environment_id: &str,
        virtual_host: &VirtualHost,
        summary: &mut PublishSummary,
    ) {
        let Some(name) = virtual_host.name.as_deref() else {
            tracing::warn!(
                deployment = %scope.deployment,
                environment = %scope.environment,
                "Skipping virtual host without a name"
            );
            return;
        };

        let vhost_id = scope.unique_id(name);
        let node = Node::new(
            EntityType::Host,
            vhost_id.clone(),
            vec![
                scope.deployment.to_string(),
                scope.environment.to_string(),
                name.to_string(),
            ],
            scope.context(),
            &virtual_host.attributes,
        );
        self.send_node(&node, summary).await;
        self.send_edge(
            Edge::new(Some(environment_id.to_string()), vhost_id, EdgeType::Contains),
            summary,
        )
        .await;
    }

    async fn publish_proxy(
        &self,
        scope: &Scope<'_>,
        environment_id: &str,
        proxy: &Proxy,
        summary: &mut PublishSummary,
    ) {
        let Some(name) = proxy.name.as_deref() else {
            tracing::warn!(
                deployment = %scope.deployment,
                environment = %scope.environment,
                "Skipping proxy without a name"
            );
            return;
        };

        let proxy_id = scope.unique_id(name);
        let mut attributes = proxy.attributes.clone();
        attributes.remove("targetServers");
        format_timestamps(&mut attributes);

        let node = Node::new(
            EntityType::Application,
            proxy_id.clone(),
            vec![
                scope.deployment.to_string(),
                scope.environment.to_string(),
                name.to_string(),
            ],
            scope.context(),
            &attributes,
        );
        self.send_node(&node, summary).await;
        self.send_edge(
            Edge::new(
                Some(environment_id.to_string()),
                proxy_id.clone(),
                EdgeType::Uses,
            ),
            summary,
        )
        .await;

        if proxy.target_servers.is_empty() {
            tracing::warn!(
                deployment = %scope.deployment,
                environment = %scope.environment,
                proxy = %name,
                "No target servers found"
            );
        }
        for target_server in &proxy.target_servers {
            self.publish_target_server(scope, name, &proxy_id, target_server, summary)
                .await;
        }
    }

    async fn publish_target_server(
        &self,
        scope: &Scope<'_>,
        proxy_name: &str,
        proxy_id: &str,
        target_server: &TargetServer,
        summary: &mut PublishSummary,
    ) {
        let Some(host) = target_server.host.as_deref() else {
            tracing::warn!(
                deployment = %scope.deployment,
                environment = %scope.environment,
                proxy = %proxy_name,
                target_server = ?target_server.name,
                "Skipping target server without a host"
            );
            return;
        };

        // Keyed by host so proxies sharing a backend resolve to one node.
        let target_server_id = scope.unique_id(host);
        let mut tags = vec![scope.deployment.to_string(), scope.environment.to_string()];
        tags.extend(target_server.name.clone());
        tags.push(proxy_name.to_string());

        let mut context = scope.context();
        context.insert("proxy".into(), Value::String(proxy_name.to_string()));

        let node = Node::new(
            EntityType::Backend,
            target_server_id.clone(),
            tags,
            context,
            &target_server.attributes,
        );
        self.send_node(&node, summary).await;
        self.send_edge(
            Edge::new(Some(proxy_id.to_string()), target_server_id, EdgeType::RunsOn),
            summary,
        )
        .await;
    }

    async fn send_node(&self, node: &Node, summary: &mut PublishSummary) {
        let entity_types = &node.entity_types;
        let outcome = match self.api.create_resource(node).await {
            Ok(()) => {
                counter!(RESOURCES_SENT).increment(1);
                tracing::info!(
                    unique_id = %node.unique_id,
                    entity_types = ?entity_types,
                    "Sent topology node"
                );
                Outcome::Sent
            }
            Err(e) => {
                counter!(RESOURCES_FAILED).increment(1);
                tracing::error!(
                    unique_id = %node.unique_id,
                    entity_types = ?entity_types,
                    error = %e,
                    "Failed to send topology node"
                );
                Outcome::Failed(e.to_string())
            }
        };

        summary.records.push(CallRecord {
            call: Call::Resource {
                unique_id: node.unique_id.clone(),
                entity_types: entity_types.clone(),
            },
            outcome,
        });
    }

    async fn send_edge(&self, edge: Edge, summary: &mut PublishSummary) {
        let outcome = match self.api.create_reference(&edge).await {
            Ok(()) => {
                counter!(REFERENCES_SENT).increment(1);
                tracing::info!(
                    from = ?edge.from_unique_id,
                    to = %edge.to_unique_id,
                    edge_type = %edge.edge_type,
                    "Sent topology edge"
                );
                Outcome::Sent
            }
            Err(e) => {
                counter!(REFERENCES_FAILED).increment(1);
                tracing::error!(
                    from = ?edge.from_unique_id,
                    to = %edge.to_unique_id,
                    edge_type = %edge.edge_type,
                    error = %e,
                    "Failed to send topology edge"
                );
                Outcome::Failed(e.to_string())
            }
        };

        summary.records.push(CallRecord {
            call: Call::Reference {
                from_unique_id: edge.from_unique_id,
                to_unique_id: edge.to_unique_id,
                edge_type: edge.edge_type,
            },
            outcome,
        });
    }
}

fn context(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{RecordedCall, RecordingTopologyApi, sample_country};
    use crate::types::Deployment;
    use serde_json::json;

    fn opcos() -> OpcoIndex {
        OpcoIndex::from([("NL".to_string(), "opco-123".to_string())])
    }

    fn call_log(api: &RecordingTopologyApi) -> Vec<String> {
        api.calls()
            .iter()
            .map(|call| match call {
                RecordedCall::Resource(node) => {
                    format!("node {} {}", node.entity_types[0], node.unique_id)
                }
                RecordedCall::Reference(edge) => format!(
                    "edge {} -{}-> {}",
                    edge.from_unique_id.as_deref().unwrap_or("<none>"),
                    edge.edge_type,
                    edge.to_unique_id
                ),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_publish_order() {
        let publisher = Publisher::new(RecordingTopologyApi::new(Some(opcos())));
        let summary = publisher.publish(&[sample_country()]).await.unwrap();

        assert_eq!(
            call_log(publisher.api()),
            vec![
                "node deployment NL_apigw-nl",
                "edge opco-123 -manages-> NL_apigw-nl",
                "node environment NL_apigw-nl_prod",
                "edge NL_apigw-nl -runsOn-> NL_apigw-nl_prod",
                "node host NL_apigw-nl_prod_vh1",
                "edge NL_apigw-nl_prod -contains-> NL_apigw-nl_prod_vh1",
                "node application NL_apigw-nl_prod_px1",
                "edge NL_apigw-nl_prod -uses-> NL_apigw-nl_prod_px1",
                "node backend NL_apigw-nl_prod_1.2.3.4",
                "edge NL_apigw-nl_prod_px1 -runsOn-> NL_apigw-nl_prod_1.2.3.4",
            ]
        );
        assert_eq!(summary.sent(), 10);
        assert_eq!(summary.failed(), 0);
        assert_eq!(publisher.api().opco_fetches(), 1);
    }

    #[tokio::test]
    async fn test_node_payloads() {
        let publisher = Publisher::new(RecordingTopologyApi::new(Some(opcos())));
        publisher.publish(&[sample_country()]).await.unwrap();

        let nodes: Vec<Value> = publisher
            .api()
            .calls()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Resource(node) => Some(serde_json::to_value(node).unwrap()),
                RecordedCall::Reference(_) => None,
            })
            .collect();

        let deployment = &nodes[0];
        assert_eq!(deployment["opco"], "NL");
        assert_eq!(deployment["tags"], json!(["apigw-nl"]));
        assert_eq!(deployment["createdAt"], "14.11.2023, 22:13:20");
        assert!(deployment.get("properties").is_none());

        let environment = &nodes[1];
        assert_eq!(environment["deployment"], "apigw-nl");
        assert_eq!(environment["region"], "eu-west-1");
        assert_eq!(environment["createdAt"], "14.11.2023, 22:13:20");
        assert!(environment.get("proxies").is_none());
        assert!(environment.get("virtual-hosts").is_none());

        let host = &nodes[2];
        assert_eq!(host["environment"], "prod");
        assert_eq!(host["tags"], json!(["apigw-nl", "prod", "vh1"]));

        let application = &nodes[3];
        assert_eq!(application["matchTokens"], json!(["NL_apigw-nl_prod_px1"]));
        assert_eq!(application["lastModifiedAt"], "14.11.2023, 22:13:20");
        assert!(application.get("targetServers").is_none());

        let backend = &nodes[4];
        assert_eq!(backend["proxy"], "px1");
        assert_eq!(backend["host"], "1.2.3.4");
        assert_eq!(backend["tags"], json!(["apigw-nl", "prod", "ts1", "px1"]));
    }

    #[tokio::test]
    async fn test_unknown_opco_is_not_fatal() {
        let publisher = Publisher::new(RecordingTopologyApi::new(Some(OpcoIndex::new())));
        let summary = publisher.publish(&[sample_country()]).await.unwrap();

        let log = call_log(publisher.api());
        assert_eq!(log[1], "edge <none> -manages-> NL_apigw-nl");
        assert_eq!(log.len(), 10);
        assert_eq!(
            summary.records[1].call,
            Call::Reference {
                from_unique_id: None,
                to_unique_id: "NL_apigw-nl".into(),
                edge_type: EdgeType::Manages,
            }
        );
    }

    #[tokio::test]
    async fn test_failed_calls_do_not_stop_traversal() {
        let api = RecordingTopologyApi::new(Some(opcos()))
            .reject_resource("NL_apigw-nl_prod")
            .reject_resource("NL_apigw-nl_prod_px1");
        let publisher = Publisher::new(api);
        let summary = publisher.publish(&[sample_country()]).await.unwrap();

        // Edges are still attempted after a failed node
        assert_eq!(call_log(publisher.api()).len(), 10);
        assert_eq!(summary.failed(), 2);
        let failed: Vec<_> = summary
            .failures()
            .map(|r| match &r.call {
                Call::Resource { unique_id, .. } => unique_id.as_str(),
                Call::Reference { to_unique_id, .. } => to_unique_id.as_str(),
            })
            .collect();
        assert_eq!(failed, vec!["NL_apigw-nl_prod", "NL_apigw-nl_prod_px1"]);
    }

    #[tokio::test]
    async fn test_opco_lookup_failure_is_fatal() {
        let publisher = Publisher::new(RecordingTopologyApi::new(None));
        let result = publisher.publish(&[sample_country()]).await;

        assert!(result.is_err());
        assert!(publisher.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_skips_lookup() {
        let publisher = Publisher::new(RecordingTopologyApi::new(Some(opcos())));
        let summary = publisher.publish(&[]).await.unwrap();

        assert!(summary.records.is_empty());
        assert_eq!(publisher.api().opco_fetches(), 0);
    }

    #[tokio::test]
    async fn test_publish_is_repeatable() {
        let first = RecordingTopologyApi::new(Some(opcos()));
        let second = RecordingTopologyApi::new(Some(opcos()));
        let input = [sample_country()];

        Publisher::new(first.clone()).publish(&input).await.unwrap();
        Publisher::new(second.clone()).publish(&input).await.unwrap();

        assert_eq!(first.calls(), second.calls());
    }

    #[tokio::test]
    async fn test_skips_incomplete_entities() {
        let mut country = sample_country();
        let env = &mut country.environments[0];
        env.virtual_hosts.clear();
        env.proxies[0].target_servers[0].host = None;

        let no_name = CountryTopology {
            deployment_name: "apigw-be".into(),
            opco: Some("BE".into()),
            deployment: Some(Deployment::default()),
            environments: vec![],
        };
        let missing = CountryTopology {
            deployment_name: "apigw-de".into(),
            opco: Some("DE".into()),
            deployment: None,
            environments: vec![],
        };

        let publisher = Publisher::new(RecordingTopologyApi::new(Some(opcos())));
        publisher
            .publish(&[no_name, country, missing])
            .await
            .unwrap();

        assert_eq!(
            call_log(publisher.api()),
            vec![
                "node deployment NL_apigw-nl",
                "edge opco-123 -manages-> NL_apigw-nl",
                "node environment NL_apigw-nl_prod",
                "edge NL_apigw-nl -runsOn-> NL_apigw-nl_prod",
                "node application NL_apigw-nl_prod_px1",
                "edge NL_apigw-nl_prod -uses-> NL_apigw-nl_prod_px1",
            ]
        );
    }

    #[tokio::test]
    async fn test_deployment_without_environments() {
        let mut country = sample_country();
        country.environments.clear();

        let publisher = Publisher::new(RecordingTopologyApi::new(Some(opcos())));
        let summary = publisher.publish(&[country]).await.unwrap();
        assert_eq!(summary.records.len(), 2);
    }
}
