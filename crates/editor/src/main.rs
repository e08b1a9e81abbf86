mod app;

use tracing::error;
use vtt_engine::run_app;

fn main() {
    let wiring = match app::build_app() {
        Ok(wiring) => wiring,
        Err(err) => {
            error!(error = %err, "startup_failed");
            std::process::exit(1);
        }
    };

    if let Err(err) = run_app(wiring.config, &wiring.paths) {
        error!(error = %err, "startup_failed");
        std::process::exit(1);
    }
}
