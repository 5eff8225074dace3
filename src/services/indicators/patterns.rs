//! Candlestick pattern detection over the last two candles.

use crate::types::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandlePattern {
    Hammer,
    ShootingStar,
    Doji,
    BullishEngulfing,
    BearishEngulfing,
}

fn body(c: &Candle) -> f64 {
    (c.close - c.open).abs()
}

fn range(c: &Candle) -> f64 {
    c.high - c.low
}

fn upper_wick(c: &Candle) -> f64 {
    c.high - c.open.max(c.close)
}

fn lower_wick(c: &Candle) -> f64 {
    c.open.min(c.close) - c.low
}

/// Doji: the body is at most 10% of the full range.
pub fn is_doji(c: &Candle) -> bool {
    let r = range(c);
    r > 0.0 && body(c) <= r * 0.1
}

/// Hammer: long lower wick (at least twice the body), stunted upper wick.
pub fn is_hammer(c: &Candle) -> bool {
    let b = body(c);
    b > 0.0 && lower_wick(c) >= 2.0 * b && upper_wick(c) <= b
}

/// Shooting star: mirror of the hammer.
pub fn is_shooting_star(c: &Candle) -> bool {
    let b = body(c);
    b > 0.0 && upper_wick(c) >= 2.0 * b && lower_wick(c) <= b
}

/// Bullish engulfing: a down candle followed by an up candle whose body
/// swallows the previous body.
pub fn is_bullish_engulfing(prev: &Candle, current: &Candle) -> bool {
    prev.close < prev.open
        && current.close > current.open
        && current.open <= prev.close
        && current.close >= prev.open
}

pub fn is_bearish_engulfing(prev: &Candle, current: &Candle) -> bool {
    prev.close > prev.open
        && current.close < current.open
        && current.open >= prev.close
        && current.close <= prev.open
}

/// Detect all patterns present on the latest candle (engulfing patterns
/// need the one before it).
pub fn detect_patterns(candles: &[Candle]) -> Vec<CandlePattern> {
    let mut patterns = Vec::new();
    let current = match candles.last() {
        Some(c) => c,
        None => return patterns,
    };

    if is_doji(current) {
        patterns.push(CandlePattern::Doji);
    }
    if is_hammer(current) {
        patterns.push(CandlePattern::Hammer);
    }
    if is_shooting_star(current) {
        patterns.push(CandlePattern::ShootingStar);
    }
    if candles.len() >= 2 {
        let prev = &candles[candles.len() - 2];
        if is_bullish_engulfing(prev, current) {
            patterns.push(CandlePattern::BullishEngulfing);
        }
        if is_bearish_engulfing(prev, current) {
            patterns.push(CandlePattern::BearishEngulfing);
        }
    }
    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandleInterval;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            security_id: "13".into(),
            interval: CandleInterval::FiveMinute,
            open,
            high,
            low,
            close,
            volume: 0,
            avg_imbalance: 1.0,
            avg_spread: 0.0,
            avg_strength: 0.0,
            timestamp: 0,
            is_closed: true,
        }
    }

    #[test]
    fn hammer_has_long_lower_wick() {
        // Body 1, lower wick 3, upper wick 0.5.
        let c = candle(100.0, 101.5, 97.0, 101.0);
        assert!(is_hammer(&c));
        assert!(!is_shooting_star(&c));
    }

    #[test]
    fn shooting_star_is_hammer_mirror() {
        let c = candle(101.0, 104.0, 99.5, 100.0);
        assert!(is_shooting_star(&c));
        assert!(!is_hammer(&c));
    }

    #[test]
    fn doji_has_tiny_body() {
        let c = candle(100.0, 102.0, 98.0, 100.1);
        assert!(is_doji(&c));
        assert!(!is_doji(&candle(100.0, 102.0, 98.0, 101.5)));
    }

    #[test]
    fn bullish_engulfing_swallows_previous_body() {
        let prev = candle(101.0, 101.5, 99.5, 100.0);
        let current = candle(99.8, 102.0, 99.5, 101.5);
        assert!(is_bullish_engulfing(&prev, &current));
        assert!(!is_bearish_engulfing(&prev, &current));
    }

    #[test]
    fn bearish_engulfing_mirror() {
        let prev = candle(100.0, 101.5, 99.8, 101.0);
        let current = candle(101.2, 101.5, 99.0, 99.5);
        assert!(is_bearish_engulfing(&prev, &current));
    }

    #[test]
    fn detect_patterns_combines_checks() {
        let prev = candle(101.0, 101.5, 99.5, 100.0);
        let current = candle(99.8, 102.0, 99.5, 101.5);
        let patterns = detect_patterns(&[prev, current]);
        assert!(patterns.contains(&CandlePattern::BullishEngulfing));
    }

    #[test]
    fn empty_input_yields_no_patterns() {
        assert!(detect_patterns(&[]).is_empty());
    }
}
