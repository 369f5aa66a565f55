use crate::flags::{FlagAggregator, FlagError};
use crate::metrics_defs::{STATUS_PUBLISHES, STATUS_QUERIES};
use crate::model::{FlagMap, ModelError, Platform, Status, StatusRecord, ValidPublish};
use crate::resolver;
use crate::store::{StatusHistoryStore, StoreError};
use chrono::{DateTime, Utc};
use shared::counter;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(thiserror::Error, Debug)]
pub enum StatusServiceError {
    #[error("invalid request: {0}")]
    Invalid(#[from] ModelError),

    #[error("status store error: {0}")]
    Store(#[from] StoreError),

    #[error("feature flag error: {0}")]
    Flags(#[from] FlagError),
}

/// Current status of one app version on one platform, plus the flags of the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct AppStatus {
    pub status: Status,
    /// False when no status was ever published and `status` is the default.
    pub found: bool,
    pub flags: FlagMap,
}

struct StatusServiceInner {
    store: Arc<dyn StatusHistoryStore>,
    aggregator: FlagAggregator,
    // Held across stamp and append; the last timestamp handed out.
    last_published_at: Mutex<Option<DateTime<Utc>>>,
}

/// Answers status queries and records new statuses.
#[derive(Clone)]
pub struct StatusService {
    inner: Arc<StatusServiceInner>,
}

impl StatusService {
    pub fn new(store: Arc<dyn StatusHistoryStore>, aggregator: FlagAggregator) -> Self {
        StatusService {
            inner: Arc::new(StatusServiceInner {
                store,
                aggregator,
                last_published_at: Mutex::new(None),
            }),
        }
    }

    /// Resolves the current status and evaluates the flags of `identity` concurrently.
    ///
    /// Fails if either half fails; nothing partial is returned.
    pub async fn query(
        &self,
        version: &str,
        platform: Platform,
        identity: &str,
    ) -> Result<AppStatus, StatusServiceError> {
        if version.trim().is_empty() {
            return Err(ModelError::EmptyVersion.into());
        }

        let resolve_status = async {
            let history = self.inner.store.query_history(version, platform).await?;
            Ok::<_, StatusServiceError>(resolver::resolve(&history))
        };
        let fetch_flags = async {
            Ok::<_, StatusServiceError>(self.inner.aggregator.fetch_all(identity).await?)
        };

        let (resolved, flags) = tokio::try_join!(resolve_status, fetch_flags)?;

        counter!(
            STATUS_QUERIES,
            "platform" => platform.as_str(),
            "found" => if resolved.found { "true" } else { "false" }
        )
        .increment(1);

        Ok(AppStatus {
            status: resolved.status,
            found: resolved.found,
            flags,
        })
    }

    /// Stamps the request with the current time and appends it to the history.
    ///
    /// Publishes are serialized, so stamps follow append order and never go
    /// backwards even if the wall clock does.
    pub async fn publish(&self, request: ValidPublish) -> Result<StatusRecord, StatusServiceError> {
        let mut last_published_at = self.inner.last_published_at.lock().await;
        let published_at = next_publish_time(Utc::now(), *last_published_at);

        let record = StatusRecord::new(
            request.version,
            request.platform,
            request.status,
            published_at,
        );
        self.inner.store.append(record.clone()).await?;
        *last_published_at = Some(published_at);
        drop(last_published_at);

        tracing::info!(
            version = %record.version,
            platform = %record.platform,
            status = %record.status,
            "Published app status"
        );
        counter!(
            STATUS_PUBLISHES,
            "platform" => record.platform.as_str(),
            "status" => record.status.as_str()
        )
        .increment(1);

        Ok(record)
    }
}

fn next_publish_time(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    last.map_or(now, |last| now.max(last))
}
