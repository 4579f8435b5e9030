//! One end-to-end run: assemble every configured deployment from the object
//! store, authenticate, then publish.
use crate::assembler::Assembler;
use crate::client::{self, TopologyClient, TopologyFetchError};
use crate::config::Config;
use crate::get_store;
use crate::histogram;
use crate::metrics_defs::SYNC_DURATION;
use crate::object_store::FetchError;
use crate::publisher::{Outcome, PublishSummary, Publisher};
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("could not open object store: {0}")]
    ObjectStore(#[from] FetchError),
    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error(transparent)]
    TopologyFetch(#[from] TopologyFetchError),
}

pub async fn run(config: &Config) -> Result<PublishSummary, SyncError> {
    let started = Instant::now();

    let store = get_store(&config.object_store.r#type).await?;
    let topology = Assembler::new(store)
        .assemble_all(&config.deployments, &config.environments)
        .await;
    tracing::info!(count = topology.len(), "Assembled deployments");

    let http = client::build_http_client(&config.topology_service)?;
    let token = match client::request_token(&http, &config.topology_service).await {
        Ok(token) => token,
        Err(e) => {
            // Calls will go out unauthenticated and fail individually.
            tracing::error!(error = %e, "Could not obtain topology service token");
            String::new()
        }
    };

    let publisher = Publisher::new(TopologyClient::new(
        http,
        config.topology_service.clone(),
        token,
    ));
    let result = publisher.publish(&topology).await;
    histogram!(SYNC_DURATION).record(started.elapsed().as_secs_f64());
    let summary = result?;

    for record in summary.failures() {
        if let Outcome::Failed(reason) = &record.outcome {
            tracing::warn!(call = ?record.call, reason = %reason, "Topology call failed");
        }
    }
    Ok(summary)
}
