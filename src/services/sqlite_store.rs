//! SQLite persistence for trading entities.
//!
//! Holds everything that must survive a restart: instruments, the
//! portfolio, signals, orders, positions and equity snapshots. Ticks and
//! candles live in Redis with TTLs (`redis_store`). Write failures are the
//! caller's concern: the executor retries position writes, everything else
//! is best-effort.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::types::{
    CloseReason, EquityPoint, ExchangeSegment, Instrument, OrderStatus, PaperOrder, Portfolio,
    Position, PositionSide, PositionStatus, RejectionReason, Signal, SignalSide, SignalStatus,
};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        debug!("in-memory SQLite store initialized");
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS instruments (
                security_id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                exchange_segment TEXT NOT NULL,
                lot_size INTEGER NOT NULL,
                tick_size REAL NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS portfolios (
                user_id TEXT PRIMARY KEY,
                total_capital REAL NOT NULL,
                available_capital REAL NOT NULL,
                used_margin REAL NOT NULL,
                today_pnl REAL NOT NULL,
                total_pnl REAL NOT NULL,
                total_trades INTEGER NOT NULL,
                winning_trades INTEGER NOT NULL,
                losing_trades INTEGER NOT NULL,
                win_rate REAL NOT NULL,
                max_daily_loss REAL NOT NULL,
                current_daily_loss REAL NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                strategy_name TEXT NOT NULL,
                security_id TEXT NOT NULL,
                side TEXT NOT NULL,
                price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                target REAL NOT NULL,
                quantity INTEGER NOT NULL,
                reason TEXT NOT NULL,
                depth_snapshot TEXT NOT NULL,
                quality_score REAL NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                decided_at INTEGER,
                rejection_reason TEXT,
                fill_price REAL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_signals_strategy_time
             ON signals(strategy_name, created_at DESC)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_signals_status ON signals(status)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                signal_id TEXT NOT NULL,
                security_id TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                requested_price REAL NOT NULL,
                fill_price REAL NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                filled_at INTEGER
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_orders_time ON orders(created_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                security_id TEXT NOT NULL,
                strategy_name TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                entry_price REAL NOT NULL,
                current_price REAL NOT NULL,
                stop_loss REAL NOT NULL,
                target REAL NOT NULL,
                unrealized_pnl REAL NOT NULL,
                realized_pnl REAL NOT NULL,
                status TEXT NOT NULL,
                opened_at INTEGER NOT NULL,
                closed_at INTEGER,
                close_reason TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_strategy_time
             ON positions(strategy_name, opened_at DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS equity_snapshots (
                user_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                equity REAL NOT NULL,
                today_pnl REAL NOT NULL,
                open_positions INTEGER NOT NULL,
                PRIMARY KEY (user_id, timestamp)
            )",
            [],
        )?;

        Ok(())
    }

    // ========== Instruments ==========

    pub fn save_instrument(&self, instrument: &Instrument) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO instruments (security_id, symbol, exchange_segment, lot_size, tick_size)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(security_id) DO UPDATE SET
                symbol = excluded.symbol,
                exchange_segment = excluded.exchange_segment,
                lot_size = excluded.lot_size,
                tick_size = excluded.tick_size",
            params![
                instrument.security_id,
                instrument.symbol,
                instrument.exchange_segment.as_str(),
                instrument.lot_size,
                instrument.tick_size,
            ],
        )?;
        Ok(())
    }

    pub fn all_instruments(&self) -> Vec<Instrument> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT security_id, symbol, exchange_segment, lot_size, tick_size FROM instruments",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let rows = stmt.query_map([], |row| {
            let segment: String = row.get(2)?;
            Ok(Instrument {
                security_id: row.get(0)?,
                symbol: row.get(1)?,
                exchange_segment: segment
                    .parse::<ExchangeSegment>()
                    .unwrap_or(ExchangeSegment::Equity),
                lot_size: row.get(3)?,
                tick_size: row.get(4)?,
            })
        });
        match rows {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(_) => Vec::new(),
        }
    }

    // ========== Portfolio ==========

    pub fn save_portfolio(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO portfolios (user_id, total_capital, available_capital, used_margin,
                today_pnl, total_pnl, total_trades, winning_trades, losing_trades, win_rate,
                max_daily_loss, current_daily_loss)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(user_id) DO UPDATE SET
                total_capital = excluded.total_capital,
                available_capital = excluded.available_capital,
                used_margin = excluded.used_margin,
                today_pnl = excluded.today_pnl,
                total_pnl = excluded.total_pnl,
                total_trades = excluded.total_trades,
                winning_trades = excluded.winning_trades,
                losing_trades = excluded.losing_trades,
                win_rate = excluded.win_rate,
                max_daily_loss = excluded.max_daily_loss,
                current_daily_loss = excluded.current_daily_loss",
            params![
                portfolio.user_id,
                portfolio.total_capital,
                portfolio.available_capital,
                portfolio.used_margin,
                portfolio.today_pnl,
                portfolio.total_pnl,
                portfolio.total_trades,
                portfolio.winning_trades,
                portfolio.losing_trades,
                portfolio.win_rate,
                portfolio.max_daily_loss,
                portfolio.current_daily_loss,
            ],
        )?;
        Ok(())
    }

    pub fn get_portfolio(&self, user_id: &str) -> Option<Portfolio> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT user_id, total_capital, available_capital, used_margin, today_pnl,
                total_pnl, total_trades, winning_trades, losing_trades, win_rate,
                max_daily_loss, current_daily_loss
             FROM portfolios WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(Portfolio {
                    user_id: row.get(0)?,
                    total_capital: row.get(1)?,
                    available_capital: row.get(2)?,
                    used_margin: row.get(3)?,
                    today_pnl: row.get(4)?,
                    total_pnl: row.get(5)?,
                    total_trades: row.get(6)?,
                    winning_trades: row.get(7)?,
                    losing_trades: row.get(8)?,
                    win_rate: row.get(9)?,
                    max_daily_loss: row.get(10)?,
                    current_daily_loss: row.get(11)?,
                })
            },
        )
        .ok()
    }

    // ========== Signals ==========

    pub fn save_signal(&self, signal: &Signal) -> Result<(), StoreError> {
        let depth_snapshot = serde_json::to_string(&signal.depth_snapshot)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO signals (id, strategy_name, security_id, side, price, stop_loss,
                target, quantity, reason, depth_snapshot, quality_score, status, created_at,
                decided_at, rejection_reason, fill_price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                decided_at = excluded.decided_at,
                rejection_reason = excluded.rejection_reason,
                fill_price = excluded.fill_price",
            params![
                signal.id,
                signal.strategy_name,
                signal.security_id,
                signal.side.to_string(),
                signal.price,
                signal.stop_loss,
                signal.target,
                signal.quantity,
                signal.reason,
                depth_snapshot,
                signal.quality_score,
                signal.status.to_string(),
                signal.created_at,
                signal.decided_at,
                signal.rejection_reason.map(|r| r.to_string()),
                signal.fill_price,
            ],
        )?;
        Ok(())
    }

    pub fn get_signal(&self, id: &str) -> Option<Signal> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, strategy_name, security_id, side, price, stop_loss, target, quantity,
                reason, depth_snapshot, quality_score, status, created_at, decided_at,
                rejection_reason, fill_price
             FROM signals WHERE id = ?1",
            params![id],
            signal_from_row,
        )
        .ok()
    }

    /// Recent signals for a strategy, newest first.
    pub fn strategy_signals(&self, strategy_name: &str, limit: usize) -> Vec<Signal> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT id, strategy_name, security_id, side, price, stop_loss, target, quantity,
                reason, depth_snapshot, quality_score, status, created_at, decided_at,
                rejection_reason, fill_price
             FROM signals WHERE strategy_name = ?1
             ORDER BY created_at DESC LIMIT ?2",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let result = match stmt.query_map(params![strategy_name, limit], signal_from_row) {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(_) => Vec::new(),
        };
        result
    }

    // ========== Orders ==========

    pub fn save_order(&self, order: &PaperOrder) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO orders (id, signal_id, security_id, side, quantity,
                requested_price, fill_price, status, created_at, filled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                order.id,
                order.signal_id,
                order.security_id,
                order.side.to_string(),
                order.quantity,
                order.requested_price,
                order.fill_price,
                match order.status {
                    OrderStatus::Executed => "executed",
                    OrderStatus::Rejected => "rejected",
                },
                order.created_at,
                order.filled_at,
            ],
        )?;
        Ok(())
    }

    pub fn recent_orders(&self, limit: usize) -> Vec<PaperOrder> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT id, signal_id, security_id, side, quantity, requested_price, fill_price,
                status, created_at, filled_at
             FROM orders ORDER BY created_at DESC LIMIT ?1",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let result = match stmt.query_map(params![limit], |row| {
            let side: String = row.get(3)?;
            let status: String = row.get(7)?;
            Ok(PaperOrder {
                id: row.get(0)?,
                signal_id: row.get(1)?,
                security_id: row.get(2)?,
                side: parse_side(&side),
                quantity: row.get(4)?,
                requested_price: row.get(5)?,
                fill_price: row.get(6)?,
                status: if status == "rejected" {
                    OrderStatus::Rejected
                } else {
                    OrderStatus::Executed
                },
                created_at: row.get(8)?,
                filled_at: row.get(9)?,
            })
        }) {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(_) => Vec::new(),
        };
        result
    }

    // ========== Positions ==========

    pub fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO positions (id, security_id, strategy_name, side, quantity,
                entry_price, current_price, stop_loss, target, unrealized_pnl, realized_pnl,
                status, opened_at, closed_at, close_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                position.id,
                position.security_id,
                position.strategy_name,
                position.side.to_string(),
                position.quantity,
                position.entry_price,
                position.current_price,
                position.stop_loss,
                position.target,
                position.unrealized_pnl,
                position.realized_pnl,
                match position.status {
                    PositionStatus::Open => "open",
                    PositionStatus::Closed => "closed",
                },
                position.opened_at,
                position.closed_at,
                position.close_reason.map(|r| r.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions_where("status = 'open'", 1_000)
    }

    pub fn strategy_positions(&self, strategy_name: &str, limit: usize) -> Vec<Position> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT id, security_id, strategy_name, side, quantity, entry_price, current_price,
                stop_loss, target, unrealized_pnl, realized_pnl, status, opened_at, closed_at,
                close_reason
             FROM positions WHERE strategy_name = ?1 ORDER BY opened_at DESC LIMIT ?2",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let result = match stmt.query_map(params![strategy_name, limit], position_from_row) {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(_) => Vec::new(),
        };
        result
    }

    fn positions_where(&self, predicate: &str, limit: usize) -> Vec<Position> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT id, security_id, strategy_name, side, quantity, entry_price, current_price,
                stop_loss, target, unrealized_pnl, realized_pnl, status, opened_at, closed_at,
                close_reason
             FROM positions WHERE {predicate} ORDER BY opened_at DESC LIMIT {limit}"
        );
        let mut stmt = match conn.prepare(&sql) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let result = match stmt.query_map([], position_from_row) {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(_) => Vec::new(),
        };
        result
    }

    // ========== Equity snapshots ==========

    pub fn save_equity_point(&self, user_id: &str, point: &EquityPoint) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO equity_snapshots
                (user_id, timestamp, equity, today_pnl, open_positions)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                point.timestamp,
                point.equity,
                point.today_pnl,
                point.open_positions,
            ],
        )?;
        Ok(())
    }

    pub fn equity_history(&self, user_id: &str, limit: usize) -> Vec<EquityPoint> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(
            "SELECT timestamp, equity, today_pnl, open_positions
             FROM equity_snapshots WHERE user_id = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        ) {
            Ok(stmt) => stmt,
            Err(_) => return Vec::new(),
        };
        let result = match stmt.query_map(params![user_id, limit], |row| {
            Ok(EquityPoint {
                timestamp: row.get(0)?,
                equity: row.get(1)?,
                today_pnl: row.get(2)?,
                open_positions: row.get(3)?,
            })
        }) {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(_) => Vec::new(),
        };
        result
    }

    /// Drop equity snapshots older than `days`.
    pub fn prune_equity(&self, user_id: &str, days: i64) -> Result<usize, StoreError> {
        let cutoff = chrono::Utc::now().timestamp_millis() - days * 86_400_000;
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM equity_snapshots WHERE user_id = ?1 AND timestamp < ?2",
            params![user_id, cutoff],
        )?;
        Ok(removed)
    }
}

fn parse_side(s: &str) -> SignalSide {
    if s == "SELL" {
        SignalSide::Sell
    } else {
        SignalSide::Buy
    }
}

fn signal_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Signal> {
    let side: String = row.get(3)?;
    let depth_snapshot: String = row.get(9)?;
    let status: String = row.get(11)?;
    let rejection: Option<String> = row.get(14)?;
    Ok(Signal {
        id: row.get(0)?,
        strategy_name: row.get(1)?,
        security_id: row.get(2)?,
        side: parse_side(&side),
        price: row.get(4)?,
        stop_loss: row.get(5)?,
        target: row.get(6)?,
        quantity: row.get(7)?,
        reason: row.get(8)?,
        depth_snapshot: serde_json::from_str(&depth_snapshot).unwrap_or_default(),
        quality_score: row.get(10)?,
        status: match status.as_str() {
            "executed" => SignalStatus::Executed,
            "rejected" => SignalStatus::Rejected,
            "expired" => SignalStatus::Expired,
            _ => SignalStatus::Pending,
        },
        created_at: row.get(12)?,
        decided_at: row.get(13)?,
        rejection_reason: rejection.as_deref().map(parse_rejection),
        fill_price: row.get(15)?,
    })
}

fn parse_rejection(s: &str) -> RejectionReason {
    match s {
        "dailyLossLimit" => RejectionReason::DailyLossLimit,
        "insufficientCapital" => RejectionReason::InsufficientCapital,
        "duplicateOpenPosition" => RejectionReason::DuplicateOpenPosition,
        "executionHalted" => RejectionReason::ExecutionHalted,
        _ => RejectionReason::NoPortfolio,
    }
}

fn position_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Position> {
    let side: String = row.get(3)?;
    let status: String = row.get(11)?;
    let close_reason: Option<String> = row.get(14)?;
    Ok(Position {
        id: row.get(0)?,
        security_id: row.get(1)?,
        strategy_name: row.get(2)?,
        side: if side == "SHORT" {
            PositionSide::Short
        } else {
            PositionSide::Long
        },
        quantity: row.get(4)?,
        entry_price: row.get(5)?,
        current_price: row.get(6)?,
        stop_loss: row.get(7)?,
        target: row.get(8)?,
        unrealized_pnl: row.get(9)?,
        realized_pnl: row.get(10)?,
        status: if status == "closed" {
            PositionStatus::Closed
        } else {
            PositionStatus::Open
        },
        opened_at: row.get(12)?,
        closed_at: row.get(13)?,
        close_reason: close_reason.as_deref().map(|s| match s {
            "target" => CloseReason::Target,
            "eod" => CloseReason::Eod,
            "manual" => CloseReason::Manual,
            _ => CloseReason::Stop,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DepthMetrics;

    fn store() -> SqliteStore {
        SqliteStore::new_in_memory().unwrap()
    }

    fn sample_signal() -> Signal {
        Signal::new(
            "ema_crossover",
            "13",
            SignalSide::Buy,
            110.0,
            108.9,
            113.3,
            75,
            "test",
            DepthMetrics {
                bid_ask_imbalance: 1.4,
                depth_spread: 0.0002,
                order_book_strength: 2_000.0,
                volume_delta: 10.0,
                liquidity_score: 80.0,
            },
            70.0,
            1_000,
        )
    }

    fn sample_position() -> Position {
        Position {
            id: "pos-1".into(),
            security_id: "13".into(),
            strategy_name: "ema_crossover".into(),
            side: PositionSide::Long,
            quantity: 75,
            entry_price: 110.0,
            current_price: 111.0,
            stop_loss: 108.9,
            target: 113.3,
            unrealized_pnl: 75.0,
            realized_pnl: 0.0,
            status: PositionStatus::Open,
            opened_at: 1_000,
            closed_at: None,
            close_reason: None,
        }
    }

    #[test]
    fn signal_roundtrip_with_status_update() {
        let store = store();
        let mut signal = sample_signal();
        store.save_signal(&signal).unwrap();

        signal.status = SignalStatus::Rejected;
        signal.decided_at = Some(2_000);
        signal.rejection_reason = Some(RejectionReason::DailyLossLimit);
        store.save_signal(&signal).unwrap();

        let loaded = store.get_signal(&signal.id).unwrap();
        assert_eq!(loaded.status, SignalStatus::Rejected);
        assert_eq!(loaded.rejection_reason, Some(RejectionReason::DailyLossLimit));
        assert_eq!(loaded.depth_snapshot.order_book_strength, 2_000.0);
        assert_eq!(loaded.quantity, 75);
    }

    #[test]
    fn strategy_signals_newest_first() {
        let store = store();
        for i in 0..5 {
            let mut signal = sample_signal();
            signal.created_at = i * 100;
            store.save_signal(&signal).unwrap();
        }
        let signals = store.strategy_signals("ema_crossover", 3);
        assert_eq!(signals.len(), 3);
        assert!(signals[0].created_at >= signals[1].created_at);
    }

    #[test]
    fn position_roundtrip_and_open_query() {
        let store = store();
        let mut position = sample_position();
        store.save_position(&position).unwrap();
        assert_eq!(store.open_positions().len(), 1);

        position.status = PositionStatus::Closed;
        position.closed_at = Some(2_000);
        position.close_reason = Some(CloseReason::Eod);
        position.realized_pnl = -100.0;
        store.save_position(&position).unwrap();

        assert!(store.open_positions().is_empty());
        let history = store.strategy_positions("ema_crossover", 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].close_reason, Some(CloseReason::Eod));
        assert_eq!(history[0].realized_pnl, -100.0);
    }

    #[test]
    fn portfolio_upsert() {
        let store = store();
        let mut portfolio = Portfolio::new("paper", 20_000.0, 600.0);
        store.save_portfolio(&portfolio).unwrap();

        portfolio.total_trades = 3;
        portfolio.winning_trades = 2;
        portfolio.losing_trades = 1;
        portfolio.recalculate_win_rate();
        store.save_portfolio(&portfolio).unwrap();

        let loaded = store.get_portfolio("paper").unwrap();
        assert_eq!(loaded.total_trades, 3);
        assert!((loaded.win_rate - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn order_roundtrip() {
        let store = store();
        let order = PaperOrder {
            id: "ord-1".into(),
            signal_id: "sig-1".into(),
            security_id: "13".into(),
            side: SignalSide::Sell,
            quantity: 75,
            requested_price: 110.0,
            fill_price: 109.94,
            status: OrderStatus::Executed,
            created_at: 1_000,
            filled_at: Some(1_000),
        };
        store.save_order(&order).unwrap();
        let orders = store.recent_orders(10);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, SignalSide::Sell);
        assert_eq!(orders[0].fill_price, 109.94);
    }

    #[test]
    fn instrument_roundtrip() {
        let store = store();
        store
            .save_instrument(&Instrument {
                security_id: "13".into(),
                symbol: "NIFTY".into(),
                exchange_segment: ExchangeSegment::Index,
                lot_size: 75,
                tick_size: 0.05,
            })
            .unwrap();
        let instruments = store.all_instruments();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].symbol, "NIFTY");
        assert_eq!(instruments[0].exchange_segment, ExchangeSegment::Index);
    }

    #[test]
    fn equity_history_roundtrip() {
        let store = store();
        for i in 0..3 {
            store
                .save_equity_point(
                    "paper",
                    &EquityPoint {
                        timestamp: i * 1_000,
                        equity: 20_000.0 + i as f64,
                        today_pnl: i as f64,
                        open_positions: 1,
                    },
                )
                .unwrap();
        }
        let history = store.equity_history("paper", 10);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].timestamp, 2_000);
    }
}
