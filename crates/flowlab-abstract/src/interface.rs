use crate::packet::{Address, SimTime, SocketId};
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Handle to a scheduled timer, used to cancel it before it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

impl EventId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Failures reported by the transport. Returned as values; never retried by
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("unknown socket {0}")]
    UnknownSocket(u32),
    #[error("application has no socket")]
    NoSocket,
    #[error("socket {0} is not bound")]
    NotBound(u32),
    #[error("socket {0} is not connected")]
    NotConnected(u32),
    #[error("socket {0} is closed")]
    Closed(u32),
}

/// The capabilities the simulation engine offers to an application while one
/// of its callbacks runs: a clock, timers and a byte-stream transport.
pub trait SimContext {
    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Schedule `on_timer(timer_id)` on the calling application after `delay`.
    fn schedule_after(&mut self, delay: Duration, timer_id: u32) -> EventId;

    /// Cancel a scheduled timer. Once this returns the timer never fires.
    /// Cancelling an event that already fired is a no-op.
    fn cancel(&mut self, event: EventId);

    /// Bind the socket to an ephemeral local port.
    fn bind(&mut self, socket: &SocketId) -> Result<Address, TransportError>;

    fn connect(&mut self, socket: &SocketId, peer: Address) -> Result<(), TransportError>;

    /// Queue `payload` for transmission; returns the number of bytes accepted.
    fn send(&mut self, socket: &SocketId, payload: Bytes) -> Result<usize, TransportError>;

    /// Close the socket. Closing an already closed socket is a no-op.
    fn close(&mut self, socket: &SocketId);

    /// Record a numeric sample for the run report.
    fn record_metric(&mut self, _name: &str, _value: f64) {}
}

/// An application installed on a simulated node. The engine calls `start` and
/// `stop` at the configured times and `on_timer` for every timer that was not
/// cancelled.
pub trait Application {
    fn start(&mut self, ctx: &mut dyn SimContext) -> Result<(), TransportError>;

    fn stop(&mut self, ctx: &mut dyn SimContext);

    fn on_timer(&mut self, ctx: &mut dyn SimContext, timer_id: u32) -> Result<(), TransportError>;
}
