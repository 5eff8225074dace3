use std::env;

use chrono::{FixedOffset, NaiveTime};

use crate::error::AppError;
use crate::types::{CandleInterval, ExchangeSegment, SubscriptionInstrument};

/// Application configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hub server host address.
    pub host: String,
    /// Hub server port.
    pub port: u16,
    /// Vendor feed base URL (wss://...).
    pub feed_endpoint: String,
    /// Feed access token supplied by the auth collaborator.
    pub feed_token: String,
    /// Vendor client id.
    pub feed_client_id: String,
    /// Initial subscription set.
    pub subscription_set: Vec<SubscriptionInstrument>,
    /// Candle intervals tracked by the aggregator.
    pub candle_intervals: Vec<CandleInterval>,
    /// Portfolio seed capital.
    pub total_capital: f64,
    /// Daily loss cap as a fraction of capital.
    pub max_daily_loss_pct: f64,
    /// Per-trade risk as a fraction of capital.
    pub risk_pct: f64,
    /// Default stop-loss distance as a fraction of entry.
    pub stop_loss_pct: f64,
    /// Default target distance as a fraction of entry.
    pub target_pct: f64,
    /// Instrument lot size.
    pub lot_size: u32,
    /// Exchange-local market open.
    pub market_open: NaiveTime,
    /// Exchange-local market close.
    pub market_close: NaiveTime,
    /// Exchange-local square-off time for intraday positions.
    pub eod_square_off: NaiveTime,
    /// Exchange-local daily strategy reset.
    pub daily_reset_at: NaiveTime,
    /// Exchange timezone offset (IST by default).
    pub exchange_tz: FixedOffset,
    /// Initial reconnect delay in milliseconds.
    pub reconnect_initial_delay_ms: u64,
    /// Maximum reconnect attempts before giving up.
    pub reconnect_max_attempts: u32,
    /// Keepalive ping interval in seconds.
    pub keepalive_interval_secs: u64,
    /// Redis URL for tick/candle persistence (optional).
    pub redis_url: Option<String>,
    /// SQLite database path.
    pub sqlite_path: String,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_time(key: &str, default: (u32, u32)) -> Result<NaiveTime, AppError> {
    match env::var(key) {
        Ok(v) => NaiveTime::parse_from_str(&v, "%H:%M")
            .map_err(|_| AppError::Config(format!("{key}: expected HH:MM, got {v:?}"))),
        Err(_) => Ok(NaiveTime::from_hms_opt(default.0, default.1, 0).unwrap()),
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Invalid values are a startup failure (process exit code 1), not a
    /// fallback to defaults.
    pub fn from_env() -> Result<Self, AppError> {
        let subscription_set = match env::var("SUBSCRIPTION_SET") {
            Ok(raw) => parse_subscription_set(&raw)?,
            // NSE index feed by default.
            Err(_) => vec![SubscriptionInstrument {
                segment: ExchangeSegment::Index,
                security_id: "13".to_string(),
            }],
        };

        let candle_intervals = match env::var("CANDLE_INTERVALS") {
            Ok(raw) => parse_intervals(&raw)?,
            Err(_) => vec![CandleInterval::OneMinute, CandleInterval::FiveMinute],
        };

        let tz_offset = env::var("EXCHANGE_TZ_OFFSET").unwrap_or_else(|_| "+05:30".to_string());
        let exchange_tz = parse_tz_offset(&tz_offset)
            .ok_or_else(|| AppError::Config(format!("EXCHANGE_TZ_OFFSET: bad offset {tz_offset:?}")))?;

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3001),
            feed_endpoint: env::var("FEED_ENDPOINT").unwrap_or_default(),
            feed_token: env::var("FEED_TOKEN").unwrap_or_default(),
            feed_client_id: env::var("FEED_CLIENT_ID").unwrap_or_default(),
            subscription_set,
            candle_intervals,
            total_capital: env_parse("TOTAL_CAPITAL", 20_000.0),
            max_daily_loss_pct: env_parse("MAX_DAILY_LOSS_PCT", 0.03),
            risk_pct: env_parse("RISK_PCT", 0.01),
            stop_loss_pct: env_parse("STOP_LOSS_PCT", 0.01),
            target_pct: env_parse("TARGET_PCT", 0.03),
            lot_size: env_parse("LOT_SIZE", 75),
            market_open: env_time("MARKET_OPEN", (9, 15))?,
            market_close: env_time("MARKET_CLOSE", (15, 30))?,
            eod_square_off: env_time("EOD_SQUARE_OFF", (15, 20))?,
            daily_reset_at: env_time("DAILY_RESET_AT", (9, 0))?,
            exchange_tz,
            reconnect_initial_delay_ms: env_parse("RECONNECT_INITIAL_DELAY_MS", 5000),
            reconnect_max_attempts: env_parse("RECONNECT_MAX_ATTEMPTS", 5),
            keepalive_interval_secs: env_parse("KEEPALIVE_INTERVAL_SECS", 30),
            redis_url: env::var("REDIS_URL").ok(),
            sqlite_path: env::var("SQLITE_PATH").unwrap_or_else(|_| "paperbull.db".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.total_capital <= 0.0 {
            return Err(AppError::Config("TOTAL_CAPITAL must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.max_daily_loss_pct) {
            return Err(AppError::Config("MAX_DAILY_LOSS_PCT must be within [0, 1]".into()));
        }
        if self.risk_pct <= 0.0 || self.stop_loss_pct <= 0.0 || self.target_pct <= 0.0 {
            return Err(AppError::Config(
                "RISK_PCT, STOP_LOSS_PCT and TARGET_PCT must be positive".into(),
            ));
        }
        if self.lot_size == 0 {
            return Err(AppError::Config("LOT_SIZE must be at least 1".into()));
        }
        if self.market_open >= self.market_close {
            return Err(AppError::Config("MARKET_OPEN must precede MARKET_CLOSE".into()));
        }
        if self.eod_square_off > self.market_close {
            return Err(AppError::Config("EOD_SQUARE_OFF must not pass MARKET_CLOSE".into()));
        }
        if self.subscription_set.is_empty() {
            return Err(AppError::Config("SUBSCRIPTION_SET must not be empty".into()));
        }
        Ok(())
    }

    /// Whether feed credentials are present (required for `serve`).
    pub fn has_feed_credentials(&self) -> bool {
        !self.feed_endpoint.is_empty() && !self.feed_token.is_empty() && !self.feed_client_id.is_empty()
    }

    /// Maximum daily loss in currency units.
    pub fn max_daily_loss(&self) -> f64 {
        self.total_capital * self.max_daily_loss_pct
    }
}

/// Parse `IDX_I:13,NSE_EQ:1333` into subscription instruments.
fn parse_subscription_set(raw: &str) -> Result<Vec<SubscriptionInstrument>, AppError> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|pair| {
            let (segment, id) = pair
                .trim()
                .split_once(':')
                .ok_or_else(|| AppError::Config(format!("SUBSCRIPTION_SET: expected SEGMENT:ID, got {pair:?}")))?;
            let segment = segment
                .parse::<ExchangeSegment>()
                .map_err(|_| AppError::Config(format!("SUBSCRIPTION_SET: unknown segment {segment:?}")))?;
            Ok(SubscriptionInstrument {
                segment,
                security_id: id.to_string(),
            })
        })
        .collect()
}

fn parse_intervals(raw: &str) -> Result<Vec<CandleInterval>, AppError> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<CandleInterval>()
                .map_err(|_| AppError::Config(format!("CANDLE_INTERVALS: unknown interval {s:?}")))
        })
        .collect()
}

/// Parse `+05:30` / `-04:00` into a fixed offset.
fn parse_tz_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => (1, raw),
    };
    let (h, m) = rest.split_once(':')?;
    let secs = sign * (h.parse::<i32>().ok()? * 3600 + m.parse::<i32>().ok()? * 60);
    FixedOffset::east_opt(secs)
}
