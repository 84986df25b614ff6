use std::collections::HashMap;
use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;

use pricecache_core::events::{event_channel, PriceCacheEvent, PriceEventReceiver};
use pricecache_core::prices::{
    Currency, DisplayPrice, PriceCacheService, RefreshScope, RefreshTrigger,
};
use pricecache_market_data::provider::yahoo;
use pricecache_market_data::{BatchPriceSource, YahooBatchSource};
use pricecache_storage_sqlite::{db, ConnectionPool, PriceCacheRepository};
use tokio::runtime::Handle;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub struct AppState {
    pub pool: Arc<ConnectionPool>,
    pub repository: Arc<PriceCacheRepository>,
    pub service: PriceCacheService,
    pub events: PriceEventReceiver,
    pub symbols: Vec<String>,
    pub scope: RefreshScope,
}

pub fn init_tracing() {
    let log_format =
        std::env::var("PRICECACHE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

pub fn build_state(config: &Config, runtime: Handle) -> anyhow::Result<AppState> {
    let db_path = db::init(&config.db_path)?;
    tracing::info!("Database path in use: {}", db_path);

    let pool = Arc::new(ConnectionPool::open(
        &db_path,
        config.cache.pool_size,
        config.cache.acquire_timeout,
    )?);
    db::run_migrations(&pool)?;
    let repository = Arc::new(PriceCacheRepository::new(pool.clone()));

    let base_url = config
        .quote_base_url
        .as_deref()
        .unwrap_or(yahoo::DEFAULT_BASE_URL);
    let source: Arc<dyn BatchPriceSource> = Arc::new(YahooBatchSource::with_options(
        base_url,
        config.cache.request_timeout,
    ));

    let (sink, events) = event_channel();
    let service = PriceCacheService::new(
        config.cache.clone(),
        repository.clone(),
        source,
        Arc::new(sink),
        runtime,
    )?;

    Ok(AppState {
        pool,
        repository,
        service,
        events,
        symbols: config.symbols.clone(),
        scope: RefreshScope::for_currency(&config.view_currency),
    })
}

/// One line typed by the user.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Show,
    Refresh,
    Stats,
    Evict,
    Optimize,
    Add(Vec<String>),
    Remove(Vec<String>),
    Fx(Currency, Currency),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        let mut words = line.split_whitespace();
        let head = words.next()?.to_lowercase();
        let rest: Vec<String> = words.map(|w| w.to_uppercase()).collect();

        let command = match head.as_str() {
            "show" | "s" => Command::Show,
            "refresh" | "r" => Command::Refresh,
            "stats" => Command::Stats,
            "evict" => Command::Evict,
            "optimize" => Command::Optimize,
            "add" if !rest.is_empty() => Command::Add(rest),
            "remove" | "rm" if !rest.is_empty() => Command::Remove(rest),
            "fx" if rest.len() == 2 => {
                Command::Fx(Currency::from(rest[0].as_str()), Currency::from(rest[1].as_str()))
            }
            "quit" | "exit" | "q" => Command::Quit,
            _ => Command::Help,
        };
        Some(command)
    }
}

const HELP: &str = "commands: show | refresh | stats | evict | optimize | add SYM.. | remove SYM.. | fx FROM TO | quit";

/// Reads stdin on its own thread so the main loop never blocks on input.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// The interactive loop: paint, drain events, handle commands.
pub fn run(state: &mut AppState, config: &Config) -> anyhow::Result<()> {
    let commands = spawn_stdin_reader();
    println!("{}", HELP);
    render(state);

    loop {
        for event in state.events.drain() {
            handle_event(state, event);
        }

        let line = match commands.recv_timeout(config.tick) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match Command::parse(&line) {
            None => continue,
            Some(Command::Quit) => break,
            Some(command) => dispatch(state, command),
        }
    }

    Ok(())
}

/// Runs one command; a failing command is reported and the loop goes on.
fn dispatch(state: &mut AppState, command: Command) {
    if let Err(err) = execute(state, command) {
        tracing::error!("Command failed: {:#}", err);
        println!("command failed: {}", err);
    }
}

fn execute(state: &mut AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Show => render(state),
        Command::Refresh => {
            match state.service.force_refresh(&state.scope, &state.symbols) {
                RefreshTrigger::Started => println!("refreshing {}...", state.scope),
                RefreshTrigger::AlreadyRunning => {
                    println!("{} is already refreshing", state.scope)
                }
                RefreshTrigger::Empty => println!("nothing to refresh"),
            }
        }
        Command::Stats => {
            let stats = state.service.cache_stats()?;
            let pool = state.pool.stats();
            println!(
                "ttl hits {} | cached {} (1h: {}, 24h: {}) | pool {}/{} leased, peak {}, overflow {}",
                stats.ttl_summary,
                stats.total_cached,
                stats.fresh_within_1h,
                stats.fresh_within_24h,
                pool.outstanding,
                pool.size,
                pool.peak_outstanding,
                pool.overflow_opened
            );
        }
        Command::Evict => {
            let removed = state.service.evict_stale(&state.symbols)?;
            println!("evicted {} entries", removed);
        }
        Command::Optimize => {
            state.repository.optimize()?;
            println!("database optimized");
        }
        Command::Add(symbols) => {
            for symbol in symbols {
                if !state.symbols.contains(&symbol) {
                    state.symbols.push(symbol);
                }
            }
            render(state);
        }
        Command::Remove(symbols) => {
            state.symbols.retain(|s| !symbols.contains(s));
            render(state);
        }
        Command::Fx(from, to) => {
            let rate = state.service.fx_rate(&from, &to);
            match rate.rate() {
                Some(value) if rate.is_fallback() => {
                    println!("{}/{} = {} (default rate)", from, to, value)
                }
                Some(value) => println!("{}/{} = {}", from, to, value),
                None => println!("{}/{} unavailable", from, to),
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn handle_event(state: &AppState, event: PriceCacheEvent) {
    match &event {
        PriceCacheEvent::PricesUpdated {
            scope,
            updated,
            failed,
        } => {
            tracing::info!(
                "{}: {} updated, {} failed",
                scope,
                updated.len(),
                failed.len()
            );
            if failed.is_empty() {
                println!("{} refreshed", scope);
            } else {
                println!("{} refreshed, no data for {}", scope, failed.join(", "));
            }
        }
        PriceCacheEvent::RefreshFailed { scope, message } => {
            tracing::warn!("{}: refresh failed: {}", scope, message);
            println!("{} could not refresh, showing cached prices", scope);
        }
    }
    if event.scope() == &state.scope {
        repaint(state);
    }
}

/// Paints the table and lets the staleness policy schedule a refresh.
fn render(state: &AppState) {
    let view = state
        .service
        .get_prices_for_display(&state.scope, &state.symbols);
    paint(state, &view);
}

/// Paints the table from what is cached, without scheduling a refresh.
fn repaint(state: &AppState) {
    let view = state.service.peek_prices_for_display(&state.symbols);
    paint(state, &view);
}

fn paint(state: &AppState, view: &HashMap<String, DisplayPrice>) {
    println!("{:<12} {:>14} {:>5} {:>8}  name", "symbol", "price", "ccy", "age");
    for symbol in &state.symbols {
        let Some(row) = view.get(symbol) else { continue };
        let price = row
            .price
            .map(|p| p.round_dp(4).to_string())
            .unwrap_or_else(|| "...".to_string());
        let currency = row
            .currency
            .as_ref()
            .map(|c| c.code().to_string())
            .unwrap_or_default();
        let age = row
            .age_minutes
            .map(|m| format!("{}m", m))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:>14} {:>5} {:>8}  {}",
            symbol,
            price,
            currency,
            age,
            row.display_name.as_deref().unwrap_or("")
        );
    }
}

/// Waits for running refreshes, then closes every pooled connection.
pub fn shutdown(state: &AppState, config: &Config) {
    if !state.service.shutdown(config.shutdown_timeout) {
        tracing::warn!("Closing the pool with refreshes still running");
    }
    state.pool.close_all();
}
