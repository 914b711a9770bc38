//! Push-Stream Multiplexing
//!
//! Maintains the single live push connection to the server and fans decoded
//! frames out onto the event bus.
//!
//! ## Architecture
//!
//! - **StreamMultiplexer**: connection lifecycle, renewal, frame dispatch
//! - **StreamTransport / SseTransport**: the wire seam and its HTTP
//!   server-sent-events implementation
//! - **SseDecoder**: incremental `text/event-stream` framing
//!
//! ## Endpoint shape
//!
//! One connection carries all watched buckets: `/values/<b1>/<b2>/.../`,
//! each name followed by `/`, in registry order. The protocol has no
//! incremental subscribe, so a changed set always means a full renewal.

mod error;
mod multiplexer;
mod sse;
mod transport;

pub use error::{FrameError, TransportError};
pub use multiplexer::{
    decode_frame, stream_path, ConnectionState, ReconnectPolicy, StreamMultiplexer, VALUES_PATH,
};
pub use sse::SseDecoder;
pub use transport::{FrameResult, FrameStream, SseTransport, StreamTransport};

#[cfg(test)]
pub(crate) use transport::mock::MockTransport;
