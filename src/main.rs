use poll_tally::config::Config;
use poll_tally::routes::router;
use poll_tally::startup::AppState;
use std::process::ExitCode;
use tokio::signal::{
    self,
    unix::{SignalKind, signal},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

#[macro_use]
extern crate tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();

    // initialize tracing
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = dotenv {
        info!("No .env file loaded: {e}");
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();

    info!("Seeding tally cache from store...");
    let (app_state, reconciler) = match AppState::new(&config, shutdown.clone()).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("Startup aborted: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sync_task = {
        let handle = reconciler.spawn();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = match handle.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(format!("reconciler task panicked: {e}")),
            };
            if let Err(e) = &result {
                error!("Reconciler stopped: {e}");
                shutdown.cancel();
            }
            result
        })
    };

    let app = router(app_state);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Unable to bind {}: {e}", config.bind_addr);
            shutdown.cancel();
            let _ = sync_task.await;
            return ExitCode::FAILURE;
        }
    };
    info!("listening on {}", config.bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;
    shutdown.cancel();

    let mut code = ExitCode::SUCCESS;
    if let Err(e) = served {
        error!("Server error: {e}");
        code = ExitCode::FAILURE;
    }

    match sync_task.await {
        Ok(Ok(())) => info!("Server shut down"),
        _ => code = ExitCode::FAILURE,
    }
    code
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        () = shutdown.cancelled() => {},
    }
    shutdown.cancel();
}
