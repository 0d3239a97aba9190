//! Long-lived retrieval service.
//!
//! [`RetrievalService`] owns the currently published snapshot and answers
//! queries against it. It has exactly two states:
//!
//! - [`ServiceState::Building`]: no index has been published yet.
//! - [`ServiceState::Ready`]: an index is published and serving.
//!
//! The first [`publish`](RetrievalService::publish) moves the service to
//! `Ready`, and it never goes back. A rebuild runs while the previous
//! snapshot keeps serving; publishing swaps the `Arc<Snapshot>` in one
//! step, so every query sees either the old index or the new one.
//!
//! Queries issued while `Building` wait for the first publish, bounded by
//! `[server].ready_timeout_secs`. That wait is the only suspension point in
//! a query; scoring itself runs without holding any lock.

use refdex_core::{Error as CoreError, Snapshot};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::Config;
use crate::pipeline::build_corpus;
use crate::progress::NoProgress;
use crate::query::{query_index, rank_index, QueryResponse, RankResponse};

#[derive(Debug, Clone)]
pub enum ServiceState {
    Building,
    Ready(Arc<Snapshot>),
}

impl ServiceState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ServiceState::Ready(_))
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        match self {
            ServiceState::Ready(snapshot) => Some(Arc::clone(snapshot)),
            ServiceState::Building => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("index is not ready yet (still building)")]
    NotReady,
    #[error(transparent)]
    Query(#[from] CoreError),
}

pub struct RetrievalService {
    config: Config,
    source: PathBuf,
    state: watch::Sender<ServiceState>,
    building: AtomicBool,
}

impl RetrievalService {
    pub fn new(config: Config, source: impl AsRef<Path>) -> Self {
        let (state, _) = watch::channel(ServiceState::Building);
        Self {
            config,
            source: source.as_ref().to_path_buf(),
            state,
            building: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        self.state.borrow().clone()
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    /// Publish a snapshot, replacing whatever was serving before.
    pub fn publish(&self, snapshot: Snapshot) {
        tracing::info!(
            build_id = %snapshot.build_id,
            sections = snapshot.index.section_count(),
            "publishing index"
        );
        self.state.send_replace(ServiceState::Ready(Arc::new(snapshot)));
    }

    /// Wait for a published snapshot.
    pub async fn ready(&self) -> Result<Arc<Snapshot>, ServiceError> {
        let current = self.state.borrow().snapshot();
        if let Some(snapshot) = current {
            return Ok(snapshot);
        }

        let mut rx = self.state.subscribe();
        let timeout = Duration::from_secs(self.config.server.ready_timeout_secs);
        let waited = tokio::time::timeout(timeout, async move {
            match rx.wait_for(ServiceState::is_ready).await {
                Ok(state) => state.snapshot(),
                Err(_) => None,
            }
        })
        .await;

        match waited {
            Ok(Some(snapshot)) => Ok(snapshot),
            _ => Err(ServiceError::NotReady),
        }
    }

    pub async fn query(&self, query: &str, max_tokens: usize) -> Result<QueryResponse, ServiceError> {
        let snapshot = self.ready().await?;
        Ok(query_index(&snapshot.index, &self.config, query, max_tokens, false)?)
    }

    pub async fn rank(&self, query: &str, limit: Option<usize>) -> Result<RankResponse, ServiceError> {
        let snapshot = self.ready().await?;
        Ok(rank_index(&snapshot.index, &self.config, query, limit, false)?)
    }

    /// Build the corpus and publish the result.
    ///
    /// Returns `Ok(None)` without doing anything when another build is
    /// already running, otherwise the new build id.
    pub async fn rebuild(&self) -> anyhow::Result<Option<String>> {
        if self.building.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }
        let guard = BuildGuard(&self.building);

        let result = build_corpus(&self.config.source, &self.source, &NoProgress).await;
        drop(guard);

        let snapshot = result?.into_snapshot(self.source.display().to_string());
        let build_id = snapshot.build_id.clone();
        self.publish(snapshot);
        Ok(Some(build_id))
    }

    /// Run [`rebuild`](Self::rebuild) on a background task.
    pub fn spawn_rebuild(self: &Arc<Self>) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            match service.rebuild().await {
                Ok(Some(build_id)) => tracing::info!(%build_id, "rebuild finished"),
                Ok(None) => tracing::debug!("rebuild already in progress"),
                Err(err) => tracing::error!(error = %format!("{:#}", err), "rebuild failed"),
            }
        });
    }
}

/// Clears the building flag when the rebuild ends, including when its
/// future is dropped mid-build or the build panics.
struct BuildGuard<'a>(&'a AtomicBool);

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdex_core::build_index;
    use std::fs;
    use tempfile::TempDir;

    fn snapshot(text: &str) -> Snapshot {
        Snapshot::new("./docs", build_index([("doc.md", text)]).index, Vec::new())
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.server.ready_timeout_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_starts_building_and_times_out() {
        let service = RetrievalService::new(fast_config(), "./docs");
        assert!(!service.state().is_ready());
        assert!(matches!(
            service.query("anything", 100).await,
            Err(ServiceError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_waiting_query_completes_after_publish() {
        let service = Arc::new(RetrievalService::new(fast_config(), "./docs"));
        let waiter = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.query("circuit", 100).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.publish(snapshot("# Circuit\n\ncircuit breaking"));

        let response = waiter.await.unwrap().unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].heading_path, vec!["Circuit"]);
    }

    #[tokio::test]
    async fn test_publish_swaps_atomically_and_never_regresses() {
        let service = RetrievalService::new(fast_config(), "./docs");
        service.publish(snapshot("# One\n\nalpha"));
        let first = service.ready().await.unwrap();

        service.publish(snapshot("# Two\n\nbeta"));
        assert!(service.state().is_ready());
        let second = service.ready().await.unwrap();
        assert_ne!(first.build_id, second.build_id);

        // A reader holding the old snapshot keeps a consistent view.
        assert_eq!(first.index.sections()[0].heading_path, vec!["One"]);
        assert!(service.query("alpha", 100).await.unwrap().results.is_empty());
        assert_eq!(service.query("beta", 100).await.unwrap().results.len(), 1);
    }

    #[tokio::test]
    async fn test_caller_errors_pass_through() {
        let service = RetrievalService::new(fast_config(), "./docs");
        service.publish(snapshot("# Big\n\none two three four five six"));
        assert!(matches!(
            service.query("...", 100).await,
            Err(ServiceError::Query(CoreError::EmptyQuery))
        ));
        assert!(matches!(
            service.query("one", 2).await,
            Err(ServiceError::Query(CoreError::BudgetTooSmall { minimum: 6, .. }))
        ));
    }

    #[tokio::test]
    async fn test_rebuild_from_disk() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "# Alpha\n\nalpha body").unwrap();
        let service = RetrievalService::new(fast_config(), tmp.path());

        let first = service.rebuild().await.unwrap();
        assert!(first.is_some());
        assert!(!service.is_building());
        assert_eq!(service.rank("alpha", None).await.unwrap().results.len(), 1);

        fs::write(tmp.path().join("b.md"), "# Beta\n\nalpha again").unwrap();
        service.rebuild().await.unwrap();
        assert_eq!(service.rank("alpha", None).await.unwrap().results.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_rebuild_clears_building_flag() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "# Alpha\n\nalpha body").unwrap();
        let service = RetrievalService::new(fast_config(), tmp.path());

        let cancelled = tokio::time::timeout(Duration::ZERO, service.rebuild()).await;
        assert!(cancelled.is_err());
        assert!(!service.is_building());

        assert!(service.rebuild().await.unwrap().is_some());
        assert_eq!(service.rank("alpha", None).await.unwrap().results.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_serving() {
        let tmp = TempDir::new().unwrap();
        let service = RetrievalService::new(fast_config(), tmp.path().join("missing"));
        service.publish(snapshot("# Kept\n\nkept body"));

        assert!(service.rebuild().await.is_err());
        assert!(!service.is_building());
        assert_eq!(service.query("kept", 100).await.unwrap().results.len(), 1);
    }
}
