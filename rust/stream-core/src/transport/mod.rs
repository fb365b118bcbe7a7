// rust/stream-core/src/transport/mod.rs

//! Request/reply channel to the remote dataset server.
//!
//! Each message travels as a frame: a 4-byte big-endian length followed by
//! that many payload bytes. The client side strictly alternates one request
//! with one reply. With the `zmq` feature, a ZeroMQ REQ socket can carry
//! the same exchange to a REP server instead.

mod channel;
mod endpoint;
#[cfg(feature = "zmq")]
mod zmq_channel;

pub use channel::{read_frame, write_frame, Channel, FramedChannel};
pub use endpoint::{connect, Endpoint, TransportKind};
#[cfg(feature = "zmq")]
pub use zmq_channel::ZmqChannel;
