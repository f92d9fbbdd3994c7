use std::process::ExitCode;
use tasknest::{app, config::Settings, telemetry, AppState};
use tokio::signal;
use tower_http::services::ServeDir;

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init();

    // ── Settings ───────────────────────────────────────────────
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(error) => {
            tracing::error!(%error, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    // ── Shared state ───────────────────────────────────────────
    let state = match AppState::from_settings(&settings) {
        Ok(state) => state.into_shared(),
        Err(error) => {
            tracing::error!(%error, "failed to open save file");
            return ExitCode::FAILURE;
        }
    };

    // ── Router ─────────────────────────────────────────────────
    let mut router = app(state);
    if let Some(dir) = &settings.static_dir {
        tracing::info!(dir = %dir.display(), "serving static frontend");
        router = router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    // ── Start ──────────────────────────────────────────────────
    let listener = match tokio::net::TcpListener::bind(settings.bind).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, addr = %settings.bind, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("server running on http://{}", settings.bind);
    tracing::info!("  tasks:  http://{}/api/tasks", settings.bind);
    tracing::info!("  health: http://{}/api/health", settings.bind);

    if let Err(error) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "server error");
        return ExitCode::FAILURE;
    }

    tracing::info!("server stopped");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
