//! Out-of-band voice datagram relay and frame-rate budgeting.
//!
//! The primary audio path runs over the voice WebSocket; this crate
//! adds the lower-latency UDP path plus the sliding-window bucket the
//! gateway uses to cap inbound frame throughput per connection.

pub mod budget;
pub mod datagram;

pub use budget::RateWindow;
pub use datagram::{
    DatagramHeader, DatagramRelay, DatagramTable, ForwardHeader, RelayError, SessionToken,
};
