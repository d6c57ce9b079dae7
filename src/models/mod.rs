pub mod candle;
pub mod intervals;
pub mod orderbook;
pub mod symbols;

// Re-export the wire types for convenient access (e.g. `use crate::models::Candle`).
pub use candle::{merge_candles, Candle, CandlestickResponse};
pub use orderbook::{parse_f64, AskBid, DepthSnapshot, OrderBookApi, OrderBookInternal, ZERO_SIZE};
