//! Fixed-offset little-endian decoding of vendor feed packets.
//!
//! Every frame starts with an 8-byte header; the header's message length
//! covers the whole packet. A single WebSocket frame may carry several
//! packets back to back. All reads are length-validated up front so a
//! truncated frame can never read out of bounds.

use std::fmt;

use crate::types::{DepthLevel, EnrichedTick, PrevClose, QuoteDepth};

pub const HEADER_LEN: usize = 8;

pub const CODE_TICKER: u8 = 2;
pub const CODE_QUOTE: u8 = 4;
pub const CODE_OI: u8 = 5;
pub const CODE_PREV_CLOSE: u8 = 6;
pub const CODE_FULL: u8 = 8;
pub const CODE_BID_DEPTH: u8 = 41;
pub const CODE_DISCONNECT: u8 = 50;
pub const CODE_ASK_DEPTH: u8 = 51;

const FULL_LEN: usize = 162;
const QUOTE_LEN: usize = 50;
const TICKER_LEN: usize = 16;
const PREV_CLOSE_LEN: usize = 16;
const OI_LEN: usize = 12;
const DISCONNECT_LEN: usize = 10;
const DEPTH_LEVEL_LEN: usize = 16;
const MAX_DEPTH_LEVELS: usize = 20;

/// Decoded 8-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub feed_code: u8,
    pub message_length: u16,
    pub exchange_segment: u8,
    pub security_id: u32,
}

impl PacketHeader {
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            feed_code: buf[0],
            message_length: u16::from_le_bytes([buf[1], buf[2]]),
            exchange_segment: buf[3],
            security_id: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

/// Server-initiated termination reason carried in a code-50 packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    DuplicateConnection,
    InvalidToken,
    TokenExpired,
    InvalidClient,
    MaxConnections,
    SubscriptionLimit,
    ClientTimeout,
    ServerMaintenance,
    Unknown(u16),
}

impl DisconnectReason {
    pub fn from_code(code: u16) -> Self {
        match code {
            805 => DisconnectReason::DuplicateConnection,
            806 => DisconnectReason::InvalidToken,
            807 => DisconnectReason::TokenExpired,
            808 => DisconnectReason::InvalidClient,
            809 => DisconnectReason::MaxConnections,
            810 => DisconnectReason::SubscriptionLimit,
            811 => DisconnectReason::ClientTimeout,
            812 => DisconnectReason::ServerMaintenance,
            other => DisconnectReason::Unknown(other),
        }
    }

    /// Auth-class reasons are terminal: reconnecting with the same
    /// credentials cannot succeed.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            DisconnectReason::DuplicateConnection
                | DisconnectReason::InvalidToken
                | DisconnectReason::TokenExpired
                | DisconnectReason::InvalidClient
                | DisconnectReason::MaxConnections
                | DisconnectReason::SubscriptionLimit
        )
    }

    pub fn code(&self) -> u16 {
        match self {
            DisconnectReason::DuplicateConnection => 805,
            DisconnectReason::InvalidToken => 806,
            DisconnectReason::TokenExpired => 807,
            DisconnectReason::InvalidClient => 808,
            DisconnectReason::MaxConnections => 809,
            DisconnectReason::SubscriptionLimit => 810,
            DisconnectReason::ClientTimeout => 811,
            DisconnectReason::ServerMaintenance => 812,
            DisconnectReason::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisconnectReason::DuplicateConnection => "duplicate connection",
            DisconnectReason::InvalidToken => "invalid token",
            DisconnectReason::TokenExpired => "token expired",
            DisconnectReason::InvalidClient => "invalid client id",
            DisconnectReason::MaxConnections => "max connections reached",
            DisconnectReason::SubscriptionLimit => "subscription limit exceeded",
            DisconnectReason::ClientTimeout => "client timeout",
            DisconnectReason::ServerMaintenance => "server maintenance",
            DisconnectReason::Unknown(code) => return write!(f, "unknown reason (code {code})"),
        };
        write!(f, "{} (code {})", s, self.code())
    }
}

/// A decoded vendor packet.
#[derive(Debug, Clone)]
pub enum FeedPacket {
    /// Code 8: quote, totals, OI and five-level depth.
    Full(EnrichedTick),
    /// Code 4: quote and totals, no depth.
    Quote(EnrichedTick),
    /// Code 2: last trade price/time only.
    Ticker(EnrichedTick),
    /// Code 6.
    PrevClose { security_id: String, data: PrevClose },
    /// Code 5.
    OpenInterest { security_id: String, oi: i32 },
    /// Code 41: bid ladder, price-descending.
    BidDepth { security_id: String, levels: Vec<DepthLevel> },
    /// Code 51: ask ladder, price-ascending.
    AskDepth { security_id: String, levels: Vec<DepthLevel> },
    /// Code 50: session terminated by the server.
    Disconnect(DisconnectReason),
}

fn f32_at(buf: &[u8], off: usize) -> f64 {
    f32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]) as f64
}

fn f64_at(buf: &[u8], off: usize) -> f64 {
    f64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}

fn i16_at(buf: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([buf[off], buf[off + 1]])
}

fn i32_at(buf: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Decode a single packet starting at the head of `buf`.
///
/// Returns the packet and its total length on success; `None` on a
/// malformed or unknown frame (the caller counts and drops it).
pub fn decode_packet(buf: &[u8], captured_at: i64) -> Option<(FeedPacket, usize)> {
    let header = PacketHeader::decode(buf)?;
    let len = header.message_length as usize;
    if len < HEADER_LEN || buf.len() < len {
        return None;
    }
    let security_id = header.security_id.to_string();

    let packet = match header.feed_code {
        CODE_FULL => {
            if len < FULL_LEN {
                return None;
            }
            FeedPacket::Full(decode_full(buf, security_id, captured_at))
        }
        CODE_QUOTE => {
            if len < QUOTE_LEN {
                return None;
            }
            FeedPacket::Quote(decode_quote(buf, security_id, captured_at))
        }
        CODE_TICKER => {
            if len < TICKER_LEN {
                return None;
            }
            FeedPacket::Ticker(decode_ticker(buf, security_id, captured_at))
        }
        CODE_PREV_CLOSE => {
            if len < PREV_CLOSE_LEN {
                return None;
            }
            FeedPacket::PrevClose {
                security_id,
                data: PrevClose {
                    prev_close: f32_at(buf, 8),
                    prev_open_interest: i32_at(buf, 12),
                },
            }
        }
        CODE_OI => {
            if len < OI_LEN {
                return None;
            }
            FeedPacket::OpenInterest { security_id, oi: i32_at(buf, 8) }
        }
        CODE_DISCONNECT => {
            if len < DISCONNECT_LEN {
                return None;
            }
            let code = u16::from_le_bytes([buf[8], buf[9]]);
            FeedPacket::Disconnect(DisconnectReason::from_code(code))
        }
        CODE_BID_DEPTH => FeedPacket::BidDepth {
            security_id,
            levels: decode_depth_ladder(&buf[HEADER_LEN..len])?,
        },
        CODE_ASK_DEPTH => FeedPacket::AskDepth {
            security_id,
            levels: decode_depth_ladder(&buf[HEADER_LEN..len])?,
        },
        _ => return None,
    };

    Some((packet, len))
}

/// Decode every packet in a WebSocket frame. Malformed tails are dropped
/// and reported in the second tuple element.
pub fn decode_frame(buf: &[u8], captured_at: i64) -> (Vec<FeedPacket>, u64) {
    let mut packets = Vec::new();
    let mut malformed = 0u64;
    let mut rest = buf;
    while !rest.is_empty() {
        match decode_packet(rest, captured_at) {
            Some((packet, len)) => {
                packets.push(packet);
                rest = &rest[len..];
            }
            None => {
                malformed += 1;
                break;
            }
        }
    }
    (packets, malformed)
}

fn decode_full(buf: &[u8], security_id: String, captured_at: i64) -> EnrichedTick {
    let mut bids = Vec::with_capacity(5);
    let mut asks = Vec::with_capacity(5);
    for level in 0..5 {
        let off = 62 + level * 20;
        let bid_qty = i32_at(buf, off).max(0) as u32;
        let ask_qty = i32_at(buf, off + 4).max(0) as u32;
        let bid_orders = i16_at(buf, off + 8).max(0) as u32;
        let ask_orders = i16_at(buf, off + 10).max(0) as u32;
        let bid_price = f32_at(buf, off + 12);
        let ask_price = f32_at(buf, off + 16);
        if bid_qty > 0 {
            bids.push(DepthLevel { price: bid_price, quantity: bid_qty, orders: bid_orders });
        }
        if ask_qty > 0 {
            asks.push(DepthLevel { price: ask_price, quantity: ask_qty, orders: ask_orders });
        }
    }

    EnrichedTick {
        security_id,
        ltp: f32_at(buf, 8),
        ltq: i16_at(buf, 12) as i32,
        ltt: i32_at(buf, 14) as i64,
        atp: f32_at(buf, 18),
        volume: i32_at(buf, 22) as i64,
        total_sell_qty: i32_at(buf, 26) as i64,
        total_buy_qty: i32_at(buf, 30) as i64,
        open: f32_at(buf, 46),
        close: f32_at(buf, 50),
        high: f32_at(buf, 54),
        low: f32_at(buf, 58),
        depth: QuoteDepth { bids, asks },
        depth_metrics: Default::default(),
        captured_at,
    }
}

fn decode_quote(buf: &[u8], security_id: String, captured_at: i64) -> EnrichedTick {
    EnrichedTick {
        security_id,
        ltp: f32_at(buf, 8),
        ltq: i16_at(buf, 12) as i32,
        ltt: i32_at(buf, 14) as i64,
        atp: f32_at(buf, 18),
        volume: i32_at(buf, 22) as i64,
        total_sell_qty: i32_at(buf, 26) as i64,
        total_buy_qty: i32_at(buf, 30) as i64,
        open: f32_at(buf, 34),
        close: f32_at(buf, 38),
        high: f32_at(buf, 42),
        low: f32_at(buf, 46),
        depth: QuoteDepth::default(),
        depth_metrics: Default::default(),
        captured_at,
    }
}

fn decode_ticker(buf: &[u8], security_id: String, captured_at: i64) -> EnrichedTick {
    let ltp = f32_at(buf, 8);
    EnrichedTick {
        security_id,
        ltp,
        ltq: 0,
        ltt: i32_at(buf, 12) as i64,
        atp: 0.0,
        volume: 0,
        total_sell_qty: 0,
        total_buy_qty: 0,
        open: 0.0,
        close: 0.0,
        high: 0.0,
        low: 0.0,
        depth: QuoteDepth::default(),
        depth_metrics: Default::default(),
        captured_at,
    }
}

/// Decode a 20-level ladder body. Levels with zero quantity terminate the
/// ladder; anything past 20 levels is rejected.
fn decode_depth_ladder(body: &[u8]) -> Option<Vec<DepthLevel>> {
    if body.len() % DEPTH_LEVEL_LEN != 0 {
        return None;
    }
    let count = body.len() / DEPTH_LEVEL_LEN;
    if count > MAX_DEPTH_LEVELS {
        return None;
    }
    let mut levels = Vec::with_capacity(count);
    for i in 0..count {
        let off = i * DEPTH_LEVEL_LEN;
        let price = f64_at(body, off);
        let quantity = u32_at(body, off + 8);
        let orders = u32_at(body, off + 12);
        if quantity == 0 {
            break;
        }
        levels.push(DepthLevel { price, quantity, orders });
    }
    Some(levels)
}

#[cfg(test)]
pub mod testutil {
    //! Byte-level packet builders shared by unit and integration tests.

    use super::*;

    pub fn header(code: u8, len: u16, segment: u8, security_id: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(len as usize);
        buf.push(code);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.push(segment);
        buf.extend_from_slice(&security_id.to_le_bytes());
        buf
    }

    #[allow(clippy::too_many_arguments)]
    pub fn full_packet(
        security_id: u32,
        ltp: f32,
        ltt: i32,
        volume: i32,
        total_sell_qty: i32,
        total_buy_qty: i32,
        ohlc: (f32, f32, f32, f32),
        levels: &[(i32, i32, i16, i16, f32, f32)],
    ) -> Vec<u8> {
        let mut buf = header(CODE_FULL, FULL_LEN as u16, 0, security_id);
        buf.extend_from_slice(&ltp.to_le_bytes());
        buf.extend_from_slice(&10i16.to_le_bytes()); // ltq
        buf.extend_from_slice(&ltt.to_le_bytes());
        buf.extend_from_slice(&ltp.to_le_bytes()); // atp
        buf.extend_from_slice(&volume.to_le_bytes());
        buf.extend_from_slice(&total_sell_qty.to_le_bytes());
        buf.extend_from_slice(&total_buy_qty.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes()); // oi
        buf.extend_from_slice(&0i32.to_le_bytes()); // oi high
        buf.extend_from_slice(&0i32.to_le_bytes()); // oi low
        let (open, close, high, low) = ohlc;
        buf.extend_from_slice(&open.to_le_bytes());
        buf.extend_from_slice(&close.to_le_bytes());
        buf.extend_from_slice(&high.to_le_bytes());
        buf.extend_from_slice(&low.to_le_bytes());
        for i in 0..5 {
            let (bid_qty, ask_qty, bid_orders, ask_orders, bid_price, ask_price) =
                levels.get(i).copied().unwrap_or((0, 0, 0, 0, 0.0, 0.0));
            buf.extend_from_slice(&bid_qty.to_le_bytes());
            buf.extend_from_slice(&ask_qty.to_le_bytes());
            buf.extend_from_slice(&bid_orders.to_le_bytes());
            buf.extend_from_slice(&ask_orders.to_le_bytes());
            buf.extend_from_slice(&bid_price.to_le_bytes());
            buf.extend_from_slice(&ask_price.to_le_bytes());
        }
        assert_eq!(buf.len(), FULL_LEN);
        buf
    }

    pub fn ticker_packet(security_id: u32, ltp: f32, ltt: i32) -> Vec<u8> {
        let mut buf = header(CODE_TICKER, TICKER_LEN as u16, 0, security_id);
        buf.extend_from_slice(&ltp.to_le_bytes());
        buf.extend_from_slice(&ltt.to_le_bytes());
        buf
    }

    pub fn disconnect_packet(code: u16) -> Vec<u8> {
        let mut buf = header(CODE_DISCONNECT, DISCONNECT_LEN as u16, 0, 0);
        buf.extend_from_slice(&code.to_le_bytes());
        buf
    }

    pub fn depth_packet(feed_code: u8, security_id: u32, levels: &[(f64, u32, u32)]) -> Vec<u8> {
        let len = (HEADER_LEN + levels.len() * DEPTH_LEVEL_LEN) as u16;
        let mut buf = header(feed_code, len, 0, security_id);
        for (price, qty, orders) in levels {
            buf.extend_from_slice(&price.to_le_bytes());
            buf.extend_from_slice(&qty.to_le_bytes());
            buf.extend_from_slice(&orders.to_le_bytes());
        }
        buf
    }
}
