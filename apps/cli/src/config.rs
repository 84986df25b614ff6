use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use pricecache_core::fx::FxFallbackPolicy;
use pricecache_core::prices::Currency;
use pricecache_core::CacheConfig;
use rust_decimal::Decimal;

pub struct Config {
    pub db_path: String,
    pub symbols: Vec<String>,
    pub view_currency: Currency,
    pub quote_base_url: Option<String>,
    pub tick: Duration,
    pub shutdown_timeout: Duration,
    pub cache: CacheConfig,
}

impl Config {
    /// Reads `PRICECACHE_*` variables, loading `.env` first if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut cache = CacheConfig::default();
        if let Some(size) = parse_var::<u32>("PRICECACHE_POOL_SIZE")? {
            cache.pool_size = size;
        }
        if let Some(secs) = parse_var::<u64>("PRICECACHE_ACQUIRE_TIMEOUT_SECS")? {
            cache.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("PRICECACHE_TTL_SECS")? {
            cache.ttl = Duration::from_secs(secs);
        }
        if let Some(minutes) = parse_var::<i64>("PRICECACHE_STALE_MINUTES")? {
            cache.staleness_threshold_minutes = minutes;
        }
        if let Some(attempts) = parse_var::<u32>("PRICECACHE_RETRY_ATTEMPTS")? {
            cache.retry.max_attempts = attempts;
        }
        if let Some(secs) = parse_var::<u64>("PRICECACHE_REQUEST_TIMEOUT_SECS")? {
            cache.request_timeout = Duration::from_secs(secs);
        }
        if let Some(days) = parse_var::<i64>("PRICECACHE_EVICT_DAYS")? {
            cache.eviction_age = chrono::Duration::days(days);
        }
        if let Ok(raw) = std::env::var("PRICECACHE_FX_FALLBACK") {
            cache.fx_fallback = parse_fx_fallback(&raw)?;
        }
        cache.validate()?;

        let symbols = std::env::var("PRICECACHE_SYMBOLS")
            .unwrap_or_else(|_| "AAPL,MSFT".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            db_path: std::env::var("PRICECACHE_DB_PATH")
                .unwrap_or_else(|_| "./db/pricecache.db".to_string()),
            symbols,
            view_currency: std::env::var("PRICECACHE_VIEW_CURRENCY")
                .map(Currency::from)
                .unwrap_or_default(),
            quote_base_url: std::env::var("PRICECACHE_QUOTE_URL").ok(),
            tick: Duration::from_millis(
                parse_var::<u64>("PRICECACHE_TICK_MS")?.unwrap_or(250),
            ),
            shutdown_timeout: Duration::from_secs(
                parse_var::<u64>("PRICECACHE_SHUTDOWN_TIMEOUT_SECS")?.unwrap_or(10),
            ),
            cache,
        })
    }
}

fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        Err(_) => Ok(None),
    }
}

/// Parses `"USDPLN=3.95,EURPLN=4.30"`; `"off"` or empty disables fallbacks.
fn parse_fx_fallback(raw: &str) -> anyhow::Result<FxFallbackPolicy> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("off") {
        return Ok(FxFallbackPolicy::Unavailable);
    }

    let mut rates = Vec::new();
    for item in raw.split(',') {
        let (pair, rate) = item
            .split_once('=')
            .ok_or_else(|| anyhow!("FX fallback '{}' must look like USDPLN=3.95", item))?;
        let pair = pair.trim();
        if pair.len() != 6 || !pair.is_ascii() {
            return Err(anyhow!("FX pair '{}' must be two 3-letter codes", pair));
        }
        let rate = Decimal::from_str(rate.trim())
            .with_context(|| format!("FX fallback rate for {} is not a number", pair))?;
        rates.push((Currency::from(&pair[..3]), Currency::from(&pair[3..]), rate));
    }
    Ok(FxFallbackPolicy::defaults(rates))
}
