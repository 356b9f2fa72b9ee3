// src/runner.rs
use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{Config, IntakeFailurePolicy};
use crate::error::AppError;
use crate::message::InboundMessage;
use crate::routes;
use crate::services::completion_client::{CompletionClient, OpenAiClient};
use crate::services::reply_dispatcher::{DispatchSettings, ReplyDispatcher};
use crate::services::telegram::TelegramTransport;
use crate::services::transport::ChatTransport;

const INBOUND_QUEUE_CAPACITY: usize = 64;

/// Owns the two long-running loops: chat intake and the liveness server.
pub struct ServiceRunner {
    transport: Arc<dyn ChatTransport>,
    dispatcher: ReplyDispatcher,
    port: u16,
    policy: IntakeFailurePolicy,
}

impl ServiceRunner {
    pub fn new(
        config: &Config,
        transport: Arc<dyn ChatTransport>,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        let dispatcher = ReplyDispatcher::new(
            completion,
            Arc::clone(&transport),
            DispatchSettings::from(config),
        );
        Self {
            transport,
            dispatcher,
            port: config.port,
            policy: config.intake_failure_policy,
        }
    }

    /// Wires the Telegram transport and the OpenAI client.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config,
            Arc::new(TelegramTransport::from_config(config)),
            Arc::new(OpenAiClient::from_config(config)),
        )
    }

    /// Runs until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<(), AppError> {
        self.run_until(shutdown_signal()).await
    }

    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), AppError> {
        tokio::pin!(shutdown);

        let connected = match self.transport.connect().await {
            Ok(name) => {
                info!(bot = %name, "chat transport connected");
                true
            }
            Err(e) => {
                self.intake_down(&format!("chat intake failed to start: {e}"))?;
                false
            }
        };

        let liveness = tokio::spawn(run_liveness(self.port));

        if connected {
            let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
            let intake = Arc::clone(&self.transport).start_intake(inbound_tx);
            let mut dispatch = tokio::spawn(dispatch_loop(inbound_rx, self.dispatcher.clone()));
            info!("bot is running");

            let intake_ended = tokio::select! {
                _ = &mut shutdown => false,
                _ = &mut dispatch => true,
            };
            intake.abort();
            dispatch.abort();

            if intake_ended {
                if let Err(e) = self.intake_down("chat intake stopped unexpectedly") {
                    liveness.abort();
                    return Err(e);
                }
                shutdown.await;
            }
        } else {
            shutdown.await;
        }

        info!("shutting down");
        liveness.abort();
        Ok(())
    }

    /// Applies the intake failure policy: `Err` means the process should exit.
    fn intake_down(&self, reason: &str) -> Result<(), AppError> {
        match self.policy {
            IntakeFailurePolicy::FailFast => {
                error!(severity = "critical", "{reason}; exiting");
                Err(AppError::Intake(reason.to_string()))
            }
            IntakeFailurePolicy::Degrade => {
                error!(severity = "critical", "{reason}; serving liveness only");
                Ok(())
            }
        }
    }
}

/// Handles every inbound message on its own task so one slow completion
/// never holds up another conversation.
pub async fn dispatch_loop(mut inbound_rx: mpsc::Receiver<InboundMessage>, dispatcher: ReplyDispatcher) {
    let mut in_flight = JoinSet::new();
    while let Some(message) = inbound_rx.recv().await {
        let dispatcher = dispatcher.clone();
        in_flight.spawn(async move { dispatcher.handle(message).await });
        while let Some(finished) = in_flight.try_join_next() {
            log_join_result(finished);
        }
    }
    while let Some(finished) = in_flight.join_next().await {
        log_join_result(finished);
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "message handler panicked");
        }
    }
}

/// Bind failures are logged and end only this task; chat handling is unaffected.
async fn run_liveness(port: u16) {
    let listener = match routes::bind(port).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "liveness endpoint unavailable");
            return;
        }
    };
    if let Err(e) = routes::serve(listener).await {
        error!(error = %e, "liveness endpoint stopped");
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix (what container platforms send on stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
