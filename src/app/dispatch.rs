use crate::app::config::StatusMapping;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::generation::{GenerationRequest, GenerationResult};
use crate::core::model::ModelInfo;
use crate::core::service::InferenceService;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-protocol front of the shared [`InferenceService`]: bounds how many
/// calls run at once and how long a caller waits.
#[derive(Clone)]
pub struct Dispatcher {
    service: Arc<InferenceService>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
    status_mapping: StatusMapping,
}

impl Dispatcher {
    pub fn new(service: Arc<InferenceService>, max_concurrency: usize) -> Self {
        Self {
            service,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            timeout: None,
            status_mapping: StatusMapping::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_status_mapping(mut self, status_mapping: StatusMapping) -> Self {
        self.status_mapping = status_mapping;
        self
    }

    pub fn service(&self) -> &InferenceService {
        &self.service
    }

    pub fn status_mapping(&self) -> StatusMapping {
        self.status_mapping
    }

    pub async fn generate(&self, req: GenerationRequest) -> Result<GenerationResult> {
        bounded(&self.permits, self.timeout, |permit| {
            self.service.generate_holding(req, permit)
        })
        .await
    }

    pub async fn model_info(&self, name: &str) -> Result<ModelInfo> {
        bounded(&self.permits, self.timeout, |permit| {
            self.service.model_info_holding(name, permit)
        })
        .await
    }

    /// Kind reported to the client for `err` under the configured mapping.
    pub fn classify(&self, err: &Error) -> ErrorKind {
        self.status_mapping.classify(err)
    }
}

impl StatusMapping {
    pub fn classify(self, err: &Error) -> ErrorKind {
        match (self, err) {
            (StatusMapping::Typed, err) => err.kind(),
            (StatusMapping::Collapsed, Error::InvalidRequest(_)) => ErrorKind::InvalidRequest,
            (StatusMapping::Collapsed, _) => ErrorKind::Internal,
        }
    }
}

/// Runs `work` once a permit is free, giving up after `timeout`.
///
/// `work` owns the permit. Work that moves it onto the blocking pool keeps
/// the slot occupied until it finishes, even after the caller gave up.
pub async fn bounded<T, F, Fut>(permits: &Arc<Semaphore>, timeout: Option<Duration>, work: F) -> Result<T>
where
    F: FnOnce(OwnedSemaphorePermit) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let guarded = async {
        let permit = Arc::clone(permits)
            .acquire_owned()
            .await
            .map_err(|e| Error::Worker(e.to_string()))?;
        work(permit).await
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, guarded)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => guarded.await,
    }
}
