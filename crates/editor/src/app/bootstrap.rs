use tracing::info;
use tracing_subscriber::EnvFilter;
use vtt_engine::{resolve_app_paths, AppPaths, LoopConfig, StartupError};

use super::settings::load_settings;

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) paths: AppPaths,
}

pub(crate) fn build_app() -> Result<AppWiring, StartupError> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "=== VTT Startup ===");

    let paths = resolve_app_paths()?;
    let config = load_settings(&paths.root);
    Ok(AppWiring { config, paths })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
