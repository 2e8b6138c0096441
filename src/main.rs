//! voxgi headless driver
//!
//! Main entry point that delegates to the app module.

mod app;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting voxgi headless driver...");
    if let Err(e) = app::run_headless() {
        tracing::error!("voxgi failed: {}", e);
        std::process::exit(1);
    }
}
