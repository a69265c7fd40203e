//! Classroom Controller
//!
//! Room session and approval-ticket coordinator for virtual classrooms.
//!
//! Startup order matters in two places: the Prometheus recorder is installed
//! before anything records a metric, and the probe listener is bound before
//! the process reports itself as serving.

#![warn(clippy::pedantic)]

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use classroom_controller::actors::{ActorMetrics, RoomControllerHandle, RoomPolicy, RoomServices};
use classroom_controller::config::Config;
use classroom_controller::observability::{
    health_router, init_metrics_recorder, metrics_router, HealthState,
};
use classroom_controller::services::{
    CredentialIssuer, HttpMessagingClient, HttpWhiteboardClient, JwtCredentialIssuer,
    MessagingClient, WhiteboardClient,
};
use classroom_controller::store::{InMemoryRoomStore, RoomStore};
use classroom_controller::tasks::start_ticket_sweep;
use classroom_controller::tickets::TicketStore;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time given to the sweep task and probe server to observe cancellation
/// before room actors are shut down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "classroom_controller=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().inspect_err(|e| {
        error!(error = %e, "Failed to load configuration");
    })?;

    info!(
        instance_id = %config.instance_id,
        health_bind_address = %config.health_bind_address,
        max_seats = config.max_seats,
        ticket_ttl_seconds = config.ticket_ttl_seconds,
        room_max_lifetime_seconds = config.room_max_lifetime_seconds,
        "Starting Classroom Controller"
    );

    let prometheus = init_metrics_recorder().inspect_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
    })?;
    let health = Arc::new(HealthState::new());

    let tickets = Arc::new(TicketStore::new(config.ticket_ttl()));
    let services = build_services(&config, Arc::clone(&tickets))?;
    let controller = RoomControllerHandle::new(
        config.instance_id.clone(),
        services,
        ActorMetrics::new(),
    );
    let shutdown_token = controller.child_token();

    tokio::spawn(start_ticket_sweep(
        Arc::clone(&tickets),
        config.ticket_sweep_interval(),
        shutdown_token.child_token(),
    ));

    let probe_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        format!(
            "Invalid health bind address {}: {e}",
            config.health_bind_address
        )
    })?;
    let listener = TcpListener::bind(probe_addr).await.map_err(|e| {
        error!(error = %e, addr = %probe_addr, "Failed to bind probe listener");
        format!("Failed to bind probe listener to {probe_addr}: {e}")
    })?;
    let app = health_router(Arc::clone(&health)).merge(metrics_router(prometheus));
    tokio::spawn(serve_probes(listener, app, shutdown_token.child_token()));

    health.mark_serving();
    info!(addr = %probe_addr, "Classroom Controller serving");

    let received = shutdown_signal().await;
    info!(signal = received, "Shutdown requested, draining rooms");

    health.mark_draining();
    shutdown_token.cancel();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    if let Err(e) = controller.shutdown().await {
        warn!(error = %e, "Room controller did not shut down cleanly");
    }

    info!("Classroom Controller stopped");
    Ok(())
}

/// Build the collaborator clients and bundle them for the room actors.
fn build_services(
    config: &Config,
    tickets: Arc<TicketStore>,
) -> Result<RoomServices, Box<dyn Error>> {
    let timeout = config.upstream_timeout();

    let messaging: Arc<dyn MessagingClient> = Arc::new(
        HttpMessagingClient::new(&config.messaging_url, config.messaging_api_key.clone(), timeout)
            .inspect_err(|e| error!(error = %e, "Failed to build messaging client"))?,
    );
    let whiteboards: Arc<dyn WhiteboardClient> = Arc::new(
        HttpWhiteboardClient::new(&config.whiteboard_url, timeout)
            .inspect_err(|e| error!(error = %e, "Failed to build whiteboard client"))?,
    );
    // Messaging tokens are minted by the messaging collaborator itself
    let credentials: Arc<dyn CredentialIssuer> = Arc::new(JwtCredentialIssuer::new(
        config.session_token_secret.clone(),
        config.session_token_ttl(),
        Arc::clone(&messaging),
    ));
    let store: Arc<dyn RoomStore> = Arc::new(InMemoryRoomStore::new());

    Ok(RoomServices::new(
        store,
        messaging,
        whiteboards,
        credentials,
        tickets,
        RoomPolicy::from_config(config),
    ))
}

async fn serve_probes(listener: TcpListener, app: axum::Router, shutdown: CancellationToken) {
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    });
    if let Err(e) = server.await {
        error!(error = %e, "Probe server failed");
    }
}

/// Wait for Ctrl+C or SIGTERM and name the one that arrived.
///
/// A handler that cannot be installed is logged and never fires, so the
/// other one still ends the process.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "ctrl_c",
        () = terminate => "sigterm",
    }
}
