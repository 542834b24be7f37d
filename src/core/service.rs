//! Transfer service
//!
//! Entry point for the orchestrating manager: accepts [`TransferRequest`]s,
//! runs each one on its own tokio task and keeps a cancellation token per
//! running transfer id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::address::TransferRequest;
use crate::core::config::TransferConfig;
use crate::core::credentials::CredentialProvider;
use crate::core::error::{Error, Result};
use crate::core::pipeline::{TransferOutcome, TransferPipeline};
use crate::core::sink::HttpDataSinkFactory;
use crate::core::source::HttpDataSourceFactory;
use crate::core::stream::ProgressCallback;
use crate::core::transport::HttpTransport;

type Registry = Arc<Mutex<HashMap<String, CancellationToken>>>;

#[derive(Clone)]
pub struct TransferService {
    config: TransferConfig,
    sources: Arc<HttpDataSourceFactory>,
    sinks: Arc<HttpDataSinkFactory>,
    pipeline: Arc<TransferPipeline>,
    active: Registry,
}

impl TransferService {
    pub fn new(config: TransferConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::client(format!("Invalid configuration: {e}")))?;

        let transport = Arc::new(HttpTransport::new(&config)?);
        let sources = HttpDataSourceFactory::new(Arc::clone(&transport), Arc::clone(&credentials));
        let sinks = HttpDataSinkFactory::new(transport, credentials, config.sink_queue_chunks);

        Ok(Self {
            pipeline: Arc::new(TransferPipeline::new(&config)),
            config,
            sources: Arc::new(sources),
            sinks: Arc::new(sinks),
            active: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Report progress of every transfer submitted from now on
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.pipeline = Arc::new(TransferPipeline::new(&self.config).with_progress(progress));
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Check both endpoints of `request` without performing any I/O
    pub fn validate_request(&self, request: &TransferRequest) -> Result<()> {
        if request.id.trim().is_empty() {
            return Err(Error::InvalidAddress("Transfer id must not be empty".to_string()));
        }
        self.sources.validate(request)?;
        self.sinks.validate(request)
    }

    /// Start a transfer. Must be called within a tokio runtime.
    ///
    /// Requests that fail validation, or reuse the id of a running transfer,
    /// resolve immediately to a `Failed` outcome.
    pub fn submit(&self, request: TransferRequest) -> TransferHandle {
        let id = request.id.clone();

        if let Err(e) = self.validate_request(&request) {
            warn!("[{id}] Rejected transfer: {e}");
            return TransferHandle::finished(id, TransferOutcome::rejected(&e));
        }

        let (source, sink) = match (
            self.sources.create_source(&request),
            self.sinks.create_sink(&request),
        ) {
            (Ok(source), Ok(sink)) => (source, sink),
            (Err(e), _) | (_, Err(e)) => {
                warn!("[{id}] Rejected transfer: {e}");
                return TransferHandle::finished(id, TransferOutcome::rejected(&e));
            }
        };

        let token = CancellationToken::new();
        {
            let mut active = lock(&self.active);
            if active.contains_key(&id) {
                let err = Error::client(format!("Transfer {id} is already running"));
                warn!("[{id}] Rejected transfer: {err}");
                return TransferHandle::finished(id, TransferOutcome::rejected(&err));
            }
            active.insert(id.clone(), token.clone());
        }

        info!(
            "[{id}] Starting {:?} transfer {} -> {}",
            request.flow_type,
            request.source.base_url().unwrap_or_default(),
            request.destination.base_url().unwrap_or_default()
        );

        let pipeline = Arc::clone(&self.pipeline);
        let active = Arc::clone(&self.active);
        let task_id = id.clone();
        let join = tokio::spawn(async move {
            let outcome = pipeline.run(&task_id, &source, &sink, &token).await;
            lock(&active).remove(&task_id);
            outcome
        });

        TransferHandle {
            id,
            state: HandleState::Running(join),
        }
    }

    /// Request cancellation of a running transfer. Returns false for unknown ids.
    pub fn cancel(&self, id: &str) -> bool {
        match lock(&self.active).get(id) {
            Some(token) => {
                info!("[{id}] Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        lock(&self.active).contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

enum HandleState {
    Finished(TransferOutcome),
    Running(JoinHandle<TransferOutcome>),
}

/// Handle to a submitted transfer
pub struct TransferHandle {
    id: String,
    state: HandleState,
}

impl TransferHandle {
    fn finished(id: String, outcome: TransferOutcome) -> Self {
        Self {
            id,
            state: HandleState::Finished(outcome),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the transfer's single outcome
    pub async fn outcome(self) -> TransferOutcome {
        match self.state {
            HandleState::Finished(outcome) => outcome,
            HandleState::Running(join) => match join.await {
                Ok(outcome) => outcome,
                Err(e) => TransferOutcome::Failed {
                    kind: crate::core::error::ErrorKind::StreamInterrupted,
                    message: format!("Transfer task ended abnormally: {e}"),
                    attempts: 0,
                },
            },
        }
    }
}
