//! Time-of-day scheduling: the 09:00 strategy/portfolio daily reset and
//! the 15:20 end-of-day square-off, driven by a 60-second probe evaluated
//! in the exchange timezone.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::services::executor::PaperExecutor;

/// Probe cadence.
const PROBE_SECS: u64 = 60;

pub struct Scheduler {
    exchange_tz: FixedOffset,
    daily_reset_at: NaiveTime,
    eod_square_off: NaiveTime,
    executor: Arc<PaperExecutor>,
    engine_reset_tx: mpsc::Sender<()>,
    last_reset_day: Option<NaiveDate>,
    last_eod_day: Option<NaiveDate>,
}

impl Scheduler {
    pub fn new(
        exchange_tz: FixedOffset,
        daily_reset_at: NaiveTime,
        eod_square_off: NaiveTime,
        executor: Arc<PaperExecutor>,
        engine_reset_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            exchange_tz,
            daily_reset_at,
            eod_square_off,
            executor,
            engine_reset_tx,
            last_reset_day: None,
            last_eod_day: None,
        }
    }

    /// Skip events already in the past at startup so a mid-session restart
    /// does not re-fire them.
    fn prime(&mut self, now: DateTime<FixedOffset>) {
        if now.time() >= self.daily_reset_at {
            self.last_reset_day = Some(now.date_naive());
        }
        if now.time() >= self.eod_square_off {
            self.last_eod_day = Some(now.date_naive());
        }
    }

    /// Decide which events fire at this probe. At most once per day each.
    fn due(&mut self, now: DateTime<FixedOffset>) -> (bool, bool) {
        let today = now.date_naive();
        let time = now.time();

        let reset = time >= self.daily_reset_at && self.last_reset_day != Some(today);
        if reset {
            self.last_reset_day = Some(today);
        }

        let eod = time >= self.eod_square_off && self.last_eod_day != Some(today);
        if eod {
            self.last_eod_day = Some(today);
        }

        (reset, eod)
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.prime(Utc::now().with_timezone(&self.exchange_tz));
        let mut probe = tokio::time::interval(std::time::Duration::from_secs(PROBE_SECS));
        probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = probe.tick() => {
                    let now = Utc::now().with_timezone(&self.exchange_tz);
                    let (reset, eod) = self.due(now);
                    if reset {
                        info!("daily reset fired");
                        self.executor.daily_reset();
                        let _ = self.engine_reset_tx.send(()).await;
                    }
                    if eod {
                        info!("EOD square-off fired");
                        self.executor.square_off_all(now.timestamp_millis()).await;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::EngineEvents;
    use chrono::TimeZone;

    fn config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 0,
            feed_endpoint: String::new(),
            feed_token: String::new(),
            feed_client_id: String::new(),
            subscription_set: vec![crate::types::SubscriptionInstrument {
                segment: crate::types::ExchangeSegment::Index,
                security_id: "13".into(),
            }],
            candle_intervals: vec![crate::types::CandleInterval::OneMinute],
            total_capital: 20_000.0,
            max_daily_loss_pct: 0.03,
            risk_pct: 0.01,
            stop_loss_pct: 0.01,
            target_pct: 0.03,
            lot_size: 75,
            market_open: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            market_close: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            eod_square_off: NaiveTime::from_hms_opt(15, 20, 0).unwrap(),
            daily_reset_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            exchange_tz: FixedOffset::east_opt(5 * 3600 + 1800).unwrap(),
            reconnect_initial_delay_ms: 5000,
            reconnect_max_attempts: 5,
            keepalive_interval_secs: 30,
            redis_url: None,
            sqlite_path: ":memory:".into(),
        }
    }

    fn scheduler() -> (Scheduler, mpsc::Receiver<()>) {
        let config = config();
        let events = EngineEvents::new();
        let executor = PaperExecutor::new(&config, events, None);
        let (tx, rx) = mpsc::channel(4);
        (
            Scheduler::new(
                config.exchange_tz,
                config.daily_reset_at,
                config.eod_square_off,
                executor,
                tx,
            ),
            rx,
        )
    }

    fn ist(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(5 * 3600 + 1800)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 15, h, m, 0)
            .unwrap()
    }

    #[test]
    fn reset_fires_once_per_day() {
        let (mut scheduler, _rx) = scheduler();
        assert_eq!(scheduler.due(ist(8, 59)), (false, false));
        assert_eq!(scheduler.due(ist(9, 0)), (true, false));
        assert_eq!(scheduler.due(ist(9, 1)), (false, false));
        assert_eq!(scheduler.due(ist(10, 0)), (false, false));
    }

    #[test]
    fn eod_fires_once_after_fifteen_twenty() {
        let (mut scheduler, _rx) = scheduler();
        scheduler.due(ist(9, 0));
        assert_eq!(scheduler.due(ist(15, 19)), (false, false));
        assert_eq!(scheduler.due(ist(15, 20)), (false, true));
        assert_eq!(scheduler.due(ist(15, 21)), (false, false));
    }

    #[test]
    fn next_day_fires_again() {
        let (mut scheduler, _rx) = scheduler();
        assert_eq!(scheduler.due(ist(9, 30)), (true, false));

        let next_day = FixedOffset::east_opt(5 * 3600 + 1800)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 16, 9, 30, 0)
            .unwrap();
        assert_eq!(scheduler.due(next_day), (true, false));
    }

    #[test]
    fn prime_skips_past_events() {
        let (mut scheduler, _rx) = scheduler();
        scheduler.prime(ist(12, 0));
        // Reset already in the past, EOD still ahead.
        assert_eq!(scheduler.due(ist(12, 1)), (false, false));
        assert_eq!(scheduler.due(ist(15, 20)), (false, true));
    }
}
