//! Model provisioning
//!
//! Turns the configured model source into a [`ModelHandle`]. The fetch and
//! load sequence runs at most once per provisioner; every failure degrades to
//! a not-ready handle instead of an error so the bot can keep answering text
//! messages without the vision model.

use crate::config::{ModelConfig, ModelSource};
use crate::fetch::{self, UrlGuard};
use crate::model::ImageModel;
use crate::model_loader;
use chillibot_core::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

#[derive(Clone)]
enum HandleState {
    Ready(Arc<dyn ImageModel>),
    NotReady(Arc<str>),
}

/// Shared reference to the loaded classifier and its readiness
///
/// Cloning is cheap; all clones point at the same model.
#[derive(Clone)]
pub struct ModelHandle {
    state: HandleState,
    weights_path: PathBuf,
    source: ModelSource,
}

impl ModelHandle {
    /// Handle around a loaded model
    pub fn ready(
        model: Arc<dyn ImageModel>,
        weights_path: impl Into<PathBuf>,
        source: ModelSource,
    ) -> Self {
        Self {
            state: HandleState::Ready(model),
            weights_path: weights_path.into(),
            source,
        }
    }

    /// Handle that will never classify
    pub fn not_ready(
        reason: impl Into<String>,
        weights_path: impl Into<PathBuf>,
        source: ModelSource,
    ) -> Self {
        Self {
            state: HandleState::NotReady(Arc::from(reason.into())),
            weights_path: weights_path.into(),
            source,
        }
    }

    /// Whether a model is loaded
    pub fn is_ready(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    /// The loaded model, if any
    pub fn model(&self) -> Option<&Arc<dyn ImageModel>> {
        match &self.state {
            HandleState::Ready(model) => Some(model),
            HandleState::NotReady(_) => None,
        }
    }

    /// Why the model is unavailable
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            HandleState::Ready(_) => None,
            HandleState::NotReady(reason) => Some(&**reason),
        }
    }

    /// Local weights path
    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }

    /// Remote source the weights are expected to come from
    pub fn source(&self) -> &ModelSource {
        &self.source
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("ready", &self.is_ready())
            .field("reason", &self.unavailable_reason())
            .field("weights_path", &self.weights_path)
            .field("source", &self.source)
            .finish()
    }
}

/// Fetches and loads the model once, then hands out clones of the handle
pub struct ModelProvisioner {
    config: ModelConfig,
    client: reqwest::Client,
    guard: UrlGuard,
    handle: OnceCell<ModelHandle>,
}

impl ModelProvisioner {
    /// Create a provisioner that may download from any URL
    pub fn new(config: ModelConfig) -> Result<Self> {
        Self::with_url_guard(config, fetch::allow_all())
    }

    /// Create a provisioner whose downloads, redirects included, must pass
    /// `guard`
    pub fn with_url_guard(config: ModelConfig, guard: UrlGuard) -> Result<Self> {
        let timeout = Duration::from_secs(config.download_timeout_secs);
        let client = fetch::download_client(timeout, guard.clone())?;
        Ok(Self {
            config,
            client,
            guard,
            handle: OnceCell::new(),
        })
    }

    /// Make sure the model is present and loaded
    ///
    /// The first call downloads (if needed) and loads the weights; concurrent
    /// callers wait on that same attempt. Later calls return the cached handle,
    /// ready or not.
    pub async fn ensure_available(&self) -> ModelHandle {
        self.handle.get_or_init(|| self.provision()).await.clone()
    }

    /// The handle from a finished provisioning attempt, if one ran
    pub fn current(&self) -> Option<&ModelHandle> {
        self.handle.get()
    }

    async fn provision(&self) -> ModelHandle {
        let start = Instant::now();
        let path = self.config.local_path.clone();
        let source = self.config.source.clone();

        let fetched = match self.ensure_artifact().await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(error = %e, path = ?path, "Model artifact unavailable, running in degraded mode");
                metrics::counter!("chillibot_model_provision_total", "outcome" => "fetch_failed")
                    .increment(1);
                return ModelHandle::not_ready(e.to_string(), path, source);
            }
        };

        let config = self.config.clone();
        let load_path = path.clone();
        let loaded =
            tokio::task::spawn_blocking(move || model_loader::load_model(&config, &load_path))
                .await
                .map_err(|e| Error::internal(format!("Model load task failed: {}", e)))
                .and_then(|r| r);

        match loaded {
            Ok(model) => {
                info!(
                    path = ?path,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Model ready"
                );
                metrics::counter!("chillibot_model_provision_total", "outcome" => "ready")
                    .increment(1);
                ModelHandle::ready(model, path, source)
            }
            Err(e) => {
                error!(error = %e, path = ?path, "Model failed to load, running in degraded mode");
                metrics::counter!("chillibot_model_provision_total", "outcome" => "load_failed")
                    .increment(1);
                // A bad download must not be mistaken for a cached artifact next start
                if fetched {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!(error = %e, path = ?path, "Failed to remove unusable model artifact");
                    }
                }
                ModelHandle::not_ready(e.to_string(), path, source)
            }
        }
    }

    /// Returns whether the artifact was downloaded by this call
    async fn ensure_artifact(&self) -> Result<bool> {
        let path = &self.config.local_path;
        let present = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if present {
            info!(path = ?path, "Using cached model artifact");
            return Ok(false);
        }

        info!(source = %self.config.source.describe(), path = ?path, "Fetching model artifact");
        let bytes = match &self.config.source {
            ModelSource::Local => {
                return Err(Error::provision(format!(
                    "Model file not found: {:?} and no remote source configured",
                    path
                )))
            }
            ModelSource::Url { url } => {
                fetch::fetch_url(&self.client, &self.guard, url, path).await?
            }
            ModelSource::HuggingFace {
                repo_id,
                filename,
                revision,
            } => fetch::fetch_hf(repo_id, filename, revision.as_deref(), path).await?,
        };
        info!(path = ?path, bytes, "Model artifact downloaded");
        Ok(true)
    }
}
