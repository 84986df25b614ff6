mod config;
mod main_lib;

use config::Config;
use main_lib::{build_state, init_tracing, run, shutdown};

fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();

    // Background refreshes run here; the main thread stays interactive
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("pricecache-refresh")
        .enable_all()
        .build()?;

    let mut state = build_state(&config, runtime.handle().clone())?;
    tracing::info!(
        "Watching {} symbols in {}",
        state.symbols.len(),
        state.scope
    );

    let result = run(&mut state, &config);
    shutdown(&state, &config);
    runtime.shutdown_timeout(config.shutdown_timeout);
    result
}
