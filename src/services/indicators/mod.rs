//! Stateless indicator math over price and candle vectors.
//!
//! Every function degrades to an empty vector (or `None`) when the input
//! is too short; none of them panic on real-world data.

pub mod patterns;

use crate::types::Candle;

/// Direction of an EMA crossover between two aligned series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossover {
    Bullish,
    Bearish,
}

/// Simple moving average. Returns `len - period + 1` values.
pub fn sma(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(prices.len() - period + 1);
    let mut sum: f64 = prices[..period].iter().sum();
    out.push(sum / period as f64);
    for i in period..prices.len() {
        sum += prices[i] - prices[i - period];
        out.push(sum / period as f64);
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period`
/// prices; multiplier `2 / (period + 1)`. Returns `len - period + 1`
/// values.
pub fn ema(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = prices[..period].iter().sum::<f64>() / period as f64;
    let mut out = Vec::with_capacity(prices.len() - period + 1);
    out.push(seed);
    let mut current = seed;
    for &price in &prices[period..] {
        current = (price - current) * multiplier + current;
        out.push(current);
    }
    out
}

/// Wilder RSI: the first average is arithmetic over the first `period`
/// gains/losses, then recursive smoothing. Returns `len - period` values.
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period + 1 {
        return Vec::new();
    }
    let mut gains = Vec::with_capacity(prices.len() - 1);
    let mut losses = Vec::with_capacity(prices.len() - 1);
    for w in prices.windows(2) {
        let change = w[1] - w[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain: f64 = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss: f64 = losses[..period].iter().sum::<f64>() / period as f64;

    let rsi_value = |gain: f64, loss: f64| {
        if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    };

    let mut out = Vec::with_capacity(prices.len() - period);
    out.push(rsi_value(avg_gain, avg_loss));
    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    out
}

/// True range per bar: `max(H-L, |H-prevC|, |L-prevC|)`; the first bar
/// falls back to `H-L`.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                let prev_close = candles[i - 1].close;
                (c.high - c.low)
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs())
            }
        })
        .collect()
}

/// Average true range as an SMA of the true-range series.
pub fn atr(candles: &[Candle], period: usize) -> Vec<f64> {
    sma(&true_range(candles), period)
}

/// MACD output: all three series trimmed to the signal line's length.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdOutput {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD(fast, slow, signal): fast/slow EMA difference, EMA signal line and
/// the histogram. `None` when the input cannot cover the slow EMA plus the
/// signal seed.
pub fn macd(prices: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<MacdOutput> {
    if fast >= slow || prices.len() < slow + signal_period - 1 {
        return None;
    }
    let fast_ema = ema(prices, fast);
    let slow_ema = ema(prices, slow);

    // Align the fast series to the slow series' tail.
    let offset = fast_ema.len() - slow_ema.len();
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, s)| fast_ema[i + offset] - s)
        .collect();

    let signal = ema(&macd_line, signal_period);
    if signal.is_empty() {
        return None;
    }
    let trim = macd_line.len() - signal.len();
    let macd_tail = macd_line[trim..].to_vec();
    let histogram: Vec<f64> = macd_tail
        .iter()
        .zip(signal.iter())
        .map(|(m, s)| m - s)
        .collect();

    Some(MacdOutput {
        macd: macd_tail,
        signal,
        histogram,
    })
}

/// Bollinger band triple, each series `len - period + 1` long.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger(period, k): SMA ± k standard deviations.
pub fn bollinger(prices: &[f64], period: usize, k: f64) -> Option<BollingerBands> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let middle = sma(prices, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());
    for (i, mean) in middle.iter().enumerate() {
        let window = &prices[i..i + period];
        let variance =
            window.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / period as f64;
        let sigma = variance.sqrt();
        upper.push(mean + k * sigma);
        lower.push(mean - k * sigma);
    }
    Some(BollingerBands { upper, middle, lower })
}

/// Wilder ADX: smoothed directional indices, then smoothed DX.
/// Returns an empty vector when fewer than `2 * period` bars are supplied.
pub fn adx(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < 2 * period {
        return Vec::new();
    }

    let n = candles.len() - 1;
    let mut plus_dm = Vec::with_capacity(n);
    let mut minus_dm = Vec::with_capacity(n);
    let mut tr = Vec::with_capacity(n);
    for i in 1..candles.len() {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        let prev_close = candles[i - 1].close;
        tr.push(
            (candles[i].high - candles[i].low)
                .max((candles[i].high - prev_close).abs())
                .max((candles[i].low - prev_close).abs()),
        );
    }

    // Wilder smoothing: seed with the sum of the first period, then
    // smoothed[i] = smoothed[i-1] - smoothed[i-1]/period + value[i].
    let wilder = |values: &[f64]| -> Vec<f64> {
        let mut out = Vec::with_capacity(values.len() - period + 1);
        let mut current: f64 = values[..period].iter().sum();
        out.push(current);
        for &v in &values[period..] {
            current = current - current / period as f64 + v;
            out.push(current);
        }
        out
    };

    let sm_plus = wilder(&plus_dm);
    let sm_minus = wilder(&minus_dm);
    let sm_tr = wilder(&tr);

    let mut dx = Vec::with_capacity(sm_tr.len());
    for i in 0..sm_tr.len() {
        if sm_tr[i] == 0.0 {
            dx.push(0.0);
            continue;
        }
        let plus_di = 100.0 * sm_plus[i] / sm_tr[i];
        let minus_di = 100.0 * sm_minus[i] / sm_tr[i];
        let sum = plus_di + minus_di;
        dx.push(if sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / sum
        });
    }

    if dx.len() < period {
        return Vec::new();
    }
    // First ADX is the arithmetic mean of the first period DX values, then
    // recursive smoothing.
    let mut out = Vec::with_capacity(dx.len() - period + 1);
    let mut current: f64 = dx[..period].iter().sum::<f64>() / period as f64;
    out.push(current);
    for &v in &dx[period..] {
        current = (current * (period - 1) as f64 + v) / period as f64;
        out.push(current);
    }
    out
}

/// Detect a crossover from the last two samples of two aligned series.
pub fn detect_ema_crossover(fast: &[f64], slow: &[f64]) -> Option<Crossover> {
    if fast.len() < 2 || slow.len() < 2 {
        return None;
    }
    let (prev_fast, last_fast) = (fast[fast.len() - 2], fast[fast.len() - 1]);
    let (prev_slow, last_slow) = (slow[slow.len() - 2], slow[slow.len() - 1]);

    if prev_fast <= prev_slow && last_fast > last_slow {
        Some(Crossover::Bullish)
    } else if prev_fast >= prev_slow && last_fast < last_slow {
        Some(Crossover::Bearish)
    } else {
        None
    }
}
