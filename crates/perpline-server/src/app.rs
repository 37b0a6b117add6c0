//! Application orchestration.
//!
//! Wires the change feed into the gateway, starts the periodic tasks and
//! the HTTP server, and tears everything down on Ctrl-C.

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use perpline_bridge::EventSink;
use perpline_core::SystemClock;
use perpline_gateway::{create_router, run_heartbeat, run_price_refresh, serve, ApiState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long background tasks get to finish after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Application {
    context: Arc<AppContext>,
    shutdown: CancellationToken,
}

impl Application {
    /// Validate the configuration and build the process context.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let context = AppContext::new(config, Arc::new(SystemClock))?;
        Ok(Self::from_context(context))
    }

    pub fn from_context(context: AppContext) -> Self {
        Self {
            context: Arc::new(context),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Cancelling this token stops the application.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind the configured address and run until Ctrl-C.
    pub async fn run(&self) -> AppResult<()> {
        let address = self.context.config.gateway.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| AppError::Config(format!("Failed to bind {address}: {e}")))?;

        let token = self.shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
            }
            token.cancel();
        });

        self.run_with_listener(listener).await
    }

    /// Run on an already bound listener until the shutdown token fires.
    pub async fn run_with_listener(&self, listener: TcpListener) -> AppResult<()> {
        let ctx = &self.context;
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if let Some(bridge) = &ctx.bridge {
            let sink: Arc<dyn EventSink> = ctx.gateway.clone();
            bridge.subscribe(sink);
            let runner = bridge.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = runner.run().await {
                    error!(error = %e, "Change feed stopped");
                }
            }));
        } else {
            info!("Change feed disabled");
        }

        tasks.push(tokio::spawn(run_heartbeat(
            ctx.gateway.clone(),
            self.shutdown.clone(),
        )));
        tasks.push(tokio::spawn(run_price_refresh(
            ctx.gateway.clone(),
            self.shutdown.clone(),
        )));

        // Upgraded sockets outlive the HTTP server's graceful shutdown.
        let gateway = ctx.gateway.clone();
        let bridge = ctx.bridge.clone();
        let token = self.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            token.cancelled().await;
            if let Some(bridge) = bridge {
                bridge.shutdown();
            }
            gateway.close_all("shutdown");
        }));

        info!(
            watch_list = ctx.config.gateway.watch_list.len(),
            change_feed = ctx.bridge.is_some(),
            "perpline started"
        );

        let router = create_router(ApiState::new(ctx.gateway.clone(), ctx.risk.clone()));
        let served = serve(listener, router, self.shutdown.clone()).await;
        self.shutdown.cancel();

        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Background task did not stop in time");
            }
        }
        info!("perpline stopped");
        served.map_err(AppError::from)
    }
}
