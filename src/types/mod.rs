mod candle;
mod instrument;
mod signal;
mod tick;
mod trading;
mod ws;

pub use candle::*;
pub use instrument::*;
pub use signal::*;
pub use tick::*;
pub use trading::*;
pub use ws::*;
