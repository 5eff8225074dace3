//! Vendor market-feed client: binary framing, subscription control,
//! reconnection and keepalive.

mod client;
mod control;
mod packet;
mod replay;

pub use client::{FeedClient, FeedHandle, FeedMode};
pub use control::{ControlRequest, SubscribeInstrument, MAX_DEPTH_INSTRUMENTS, MAX_INSTRUMENTS_PER_REQUEST, MAX_TOTAL_INSTRUMENTS};
pub use packet::{DisconnectReason, FeedPacket, PacketHeader};
pub use replay::{encode_dump, write_dump, ReplayReader, ReplayRecord};
