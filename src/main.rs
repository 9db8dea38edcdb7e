// src/main.rs

use axum::serve;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tube_feed::cli::{Cli, Commands, LogFormat};
use tube_feed::{run, setup_configuration, AppError};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!(signal = "Ctrl+C", "Received signal. Initiating graceful shutdown...") },
        () = terminate => { info!(signal = "Terminate", "Received signal. Initiating graceful shutdown...") },
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(true))
            .init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse_args();
    init_tracing(cli.log_format);

    if let Some(Commands::CheckConfig) = cli.command {
        let config = setup_configuration(cli.config)?;
        let rendered = serde_yaml::to_string(&config.redacted())?;
        println!("{rendered}");
        return Ok(());
    }

    let (app, config, state) = run(cli.config, cli.port).await.map_err(|e| {
        eprintln!("Application setup error: {e:?}");
        e
    })?;

    if config.fetcher.enabled {
        state.scheduler.start();
    } else {
        warn!("Background fetcher disabled by configuration");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!(server.address = %addr, error = ?e, "Failed to bind to address. Exiting.");
        AppError::from(e)
    })?;
    info!(server.address = %addr, "Server listening");

    let served = serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.scheduler.stop().await;

    served.map_err(|e| {
        error!(error = ?e, "Server run loop encountered an error. Exiting.");
        AppError::from(e)
    })?;

    info!("Server shut down gracefully.");
    Ok(())
}
