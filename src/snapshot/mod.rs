use crate::event::normalize_record;
use crate::state::{EntityKind, EntityPatch, Reconciler, ReplaceSummary};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

pub mod config;


use config::SnapshotConfig;

/// Entity records fetched in one snapshot pass
#[derive(Clone, Debug)]
pub struct SnapshotBatch {
    /// Valid records, normalised
    pub patches: Vec<EntityPatch>,

    /// Records rejected during normalisation
    pub dropped: usize,

    pub fetched_at: DateTime<Utc>,
}

impl SnapshotBatch {
    pub fn entity_count(&self) -> usize {
        self.patches.len()
    }
}

/// Fetches the initial entity lists over REST.
///
/// A failed fetch leaves the reconciler untouched; callers retry by loading
/// again.
pub struct SnapshotLoader {
    http_client: Client,
    base_url: String,
    auth_token: Option<String>,
    config: SnapshotConfig,
}

impl SnapshotLoader {
    pub fn new(base_url: &str, auth_token: Option<String>, config: SnapshotConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            config,
        })
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// GET one collection and return its raw records
    pub async fn fetch_collection(&self, path: &str) -> Result<Vec<Value>> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http_client.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let body: Value = request
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("{} returned an error status", url))?
            .json()
            .await
            .with_context(|| format!("Failed to decode response from {}", url))?;

        match body {
            Value::Object(mut obj) => match obj.remove("data") {
                Some(Value::Array(records)) => Ok(records),
                _ => Err(anyhow!("{} response has no 'data' array", url)),
            },
            Value::Array(records) => Ok(records),
            _ => Err(anyhow!("Unexpected response shape from {}", url)),
        }
    }

    /// Fetch agents, restaurants and orders.
    ///
    /// All three must succeed; a partial result is never returned.
    pub async fn load(&self) -> Result<SnapshotBatch> {
        let (agents, restaurants, orders) = tokio::try_join!(
            self.fetch_collection(&self.config.agents_path),
            self.fetch_collection(&self.config.restaurants_path),
            self.fetch_collection(&self.config.orders_path),
        )?;

        let mut patches = Vec::with_capacity(agents.len() + restaurants.len() + orders.len());
        let mut dropped = 0;

        for (kind, records) in [
            (EntityKind::Agent, agents),
            (EntityKind::Restaurant, restaurants),
            (EntityKind::Order, orders),
        ] {
            for record in &records {
                match normalize_record(record, kind) {
                    Ok(patch) => patches.push(patch),
                    Err(e) => {
                        warn!(kind = %kind, error = %e, "Dropping malformed snapshot record");
                        dropped += 1;
                    }
                }
            }
        }

        Ok(SnapshotBatch {
            patches,
            dropped,
            fetched_at: Utc::now(),
        })
    }

    /// Load a snapshot and reconcile it into `reconciler`.
    ///
    /// The snapshot ticket is taken before the request goes out so stream
    /// updates arriving mid-fetch win over the snapshot.
    pub async fn load_into(&self, reconciler: &Reconciler) -> Result<ReplaceSummary> {
        let ticket = reconciler.begin_snapshot();

        let batch = match self.load().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Snapshot load failed, keeping current collection");
                return Err(e);
            }
        };

        for _ in 0..batch.dropped {
            reconciler.metrics.record_dropped();
        }

        info!(
            entities = batch.entity_count(),
            dropped = batch.dropped,
            "Snapshot fetched"
        );

        Ok(reconciler.replace_all(ticket, batch.patches))
    }
}
