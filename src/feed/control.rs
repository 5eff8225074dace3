//! JSON control messages sent to the vendor over the feed socket.

use serde::Serialize;

use crate::error::FeedError;
use crate::types::SubscriptionInstrument;

/// Vendor limit per subscription request.
pub const MAX_INSTRUMENTS_PER_REQUEST: usize = 100;
/// Vendor limit across the quote connection.
pub const MAX_TOTAL_INSTRUMENTS: usize = 5000;
/// Vendor limit on the 20-level depth connection.
pub const MAX_DEPTH_INSTRUMENTS: usize = 50;

pub const REQUEST_CODE_FULL: u8 = 15;
pub const REQUEST_CODE_DEPTH: u8 = 23;
pub const REQUEST_CODE_UNSUBSCRIBE: u8 = 12;

#[derive(Debug, Serialize)]
pub struct SubscribeInstrument {
    #[serde(rename = "ExchangeSegment")]
    pub exchange_segment: String,
    #[serde(rename = "SecurityId")]
    pub security_id: String,
}

#[derive(Debug, Serialize)]
pub struct ControlRequest {
    #[serde(rename = "RequestCode")]
    pub request_code: u8,
    #[serde(rename = "InstrumentCount")]
    pub instrument_count: usize,
    #[serde(rename = "InstrumentList")]
    pub instrument_list: Vec<SubscribeInstrument>,
}

impl ControlRequest {
    fn chunked(
        request_code: u8,
        instruments: &[SubscriptionInstrument],
        max_total: usize,
    ) -> Result<Vec<String>, FeedError> {
        if instruments.len() > max_total {
            return Err(FeedError::SubscriptionLimit {
                requested: instruments.len(),
                max: max_total,
            });
        }
        instruments
            .chunks(MAX_INSTRUMENTS_PER_REQUEST)
            .map(|chunk| {
                let request = ControlRequest {
                    request_code,
                    instrument_count: chunk.len(),
                    instrument_list: chunk
                        .iter()
                        .map(|i| SubscribeInstrument {
                            exchange_segment: i.segment.as_str().to_string(),
                            security_id: i.security_id.clone(),
                        })
                        .collect(),
                };
                Ok(serde_json::to_string(&request)?)
            })
            .collect()
    }

    /// Full-packet subscription frames (RequestCode 15), chunked to the
    /// vendor's per-request limit.
    pub fn subscribe_full(instruments: &[SubscriptionInstrument]) -> Result<Vec<String>, FeedError> {
        Self::chunked(REQUEST_CODE_FULL, instruments, MAX_TOTAL_INSTRUMENTS)
    }

    /// 20-level depth subscription frames (RequestCode 23).
    pub fn subscribe_depth(instruments: &[SubscriptionInstrument]) -> Result<Vec<String>, FeedError> {
        Self::chunked(REQUEST_CODE_DEPTH, instruments, MAX_DEPTH_INSTRUMENTS)
    }

    /// Unsubscribe frames (RequestCode 12).
    pub fn unsubscribe(instruments: &[SubscriptionInstrument]) -> Result<Vec<String>, FeedError> {
        Self::chunked(REQUEST_CODE_UNSUBSCRIBE, instruments, MAX_TOTAL_INSTRUMENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExchangeSegment;

    fn index_instrument() -> SubscriptionInstrument {
        SubscriptionInstrument {
            segment: ExchangeSegment::Index,
            security_id: "13".to_string(),
        }
    }

    #[test]
    fn subscribe_frame_shape() {
        let frames = ControlRequest::subscribe_full(&[index_instrument()]).unwrap();
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["RequestCode"], 15);
        assert_eq!(value["InstrumentCount"], 1);
        assert_eq!(value["InstrumentList"][0]["ExchangeSegment"], "IDX_I");
        assert_eq!(value["InstrumentList"][0]["SecurityId"], "13");
    }

    #[test]
    fn subscriptions_chunk_at_one_hundred() {
        let instruments: Vec<_> = (0..250)
            .map(|i| SubscriptionInstrument {
                segment: ExchangeSegment::Equity,
                security_id: i.to_string(),
            })
            .collect();
        let frames = ControlRequest::subscribe_full(&instruments).unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn depth_subscription_enforces_limit() {
        let instruments: Vec<_> = (0..51)
            .map(|i| SubscriptionInstrument {
                segment: ExchangeSegment::Equity,
                security_id: i.to_string(),
            })
            .collect();
        assert!(ControlRequest::subscribe_depth(&instruments).is_err());
    }

    #[test]
    fn unsubscribe_uses_code_12() {
        let frames = ControlRequest::unsubscribe(&[index_instrument()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["RequestCode"], 12);
    }
}
