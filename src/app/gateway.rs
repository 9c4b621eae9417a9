use crate::app::config::GatewayConfig;
use crate::app::dispatch::Dispatcher;
use crate::app::{grpc, http};
use crate::core::model::ModelRuntime;
use crate::core::service::InferenceService;
use crate::infra::CandleRuntime;
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// The process: one inference service shared by an HTTP and a gRPC server.
pub struct Gateway {
    config: GatewayConfig,
    service: Arc<InferenceService>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, runtime: Arc<dyn ModelRuntime>) -> Self {
        let service = InferenceService::new(runtime).with_default_model(config.default_model.clone());
        Self {
            config,
            service: Arc::new(service),
        }
    }

    /// Builds the candle runtime described by `config`.
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        let runtime = CandleRuntime::new(config.models_root(), config.backend)
            .context("initializing model runtime")?
            .with_defaults(config.model_defaults())
            .with_overrides(config.models.clone())
            .with_seed(config.seed);

        Ok(Self::new(config, Arc::new(runtime)))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<InferenceService> {
        &self.service
    }

    pub fn http_dispatcher(&self) -> Dispatcher {
        self.dispatcher(self.config.http_max_concurrency)
    }

    pub fn grpc_dispatcher(&self) -> Dispatcher {
        self.dispatcher(self.config.grpc_workers)
    }

    fn dispatcher(&self, max_concurrency: usize) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.service), max_concurrency)
            .with_timeout(self.config.request_timeout())
            .with_status_mapping(self.config.status_mapping)
    }

    pub async fn preload(&self) -> Result<()> {
        if self.config.preload.is_empty() {
            return Ok(());
        }
        tracing::info!(models = ?self.config.preload, "preloading models");
        self.service
            .registry()
            .preload(&self.config.preload)
            .await
            .context("preloading models")
    }

    /// Binds the configured addresses and serves until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let http_listener = http::bind(self.config.http_addr).await?;
        let grpc_listener = TcpListener::bind(self.config.grpc_addr)
            .await
            .with_context(|| format!("binding gRPC listener on {}", self.config.grpc_addr))?;

        self.run_on(http_listener, grpc_listener, shutdown).await
    }

    pub async fn run_on<F>(self, http_listener: TcpListener, grpc_listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.preload().await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);

        let on_signal = Arc::clone(&stop_tx);
        tokio::spawn(async move {
            shutdown.await;
            tracing::info!("shutdown requested");
            on_signal.send_replace(true);
        });

        // Either server exiting takes the other one down with it.
        let http_server = tokio::spawn(stop_on_exit(
            http::serve(http_listener, self.http_dispatcher(), stopped(stop_rx.clone())),
            Arc::clone(&stop_tx),
        ));
        let grpc_server = tokio::spawn(stop_on_exit(
            grpc::serve(grpc_listener, self.grpc_dispatcher(), stopped(stop_rx)),
            stop_tx,
        ));

        let (http_result, grpc_result) = tokio::join!(http_server, grpc_server);
        http_result?.context("HTTP server")?;
        grpc_result?.context("gRPC server")?;
        Ok(())
    }
}

async fn stop_on_exit<F>(server: F, stop: Arc<watch::Sender<bool>>) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let result = server.await;
    stop.send_replace(true);
    result
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
