//! The contract between the benchmark harness and a bus transport.
//!
//! A bus is a many-to-many, best-effort message transport: every listener
//! receives broadcasts from any peer it has dialed (links are
//! bidirectional), with no delivery guarantee, no flush on close, and no
//! acknowledgements. The harness consumes nothing beyond the primitive set
//! below; every other program sharing a transport with the harness — the
//! one-shot request/reply, publish/subscribe, push/pull and survey demos —
//! is a plain loop over the same primitives.
//!
//! Every operation reports its status as an [`std::io::Result`]; the
//! harness treats any non-success as fatal, so implementations should not
//! retry internally once traffic has started.

use std::io;

/// A factory for bus sockets.
///
/// One transport instance is shared across all participant threads; every
/// thread opens its own socket and never hands the handle to another
/// thread.
pub trait Transport: Clone + Send + 'static {
    type Socket: BusSocket;

    /// Opens a new, unconnected bus socket.
    fn open(&self) -> io::Result<Self::Socket>;
}

/// One participant's handle on the bus.
///
/// Closing is dropping the socket; whatever is still buffered at that point
/// is lost.
pub trait BusSocket: Send + 'static {
    /// Starts listening for peers on `addr`.
    fn listen(&mut self, addr: &str) -> io::Result<()>;

    /// Connects to the peer listening on `addr`.
    fn dial(&mut self, addr: &str) -> io::Result<()>;

    /// Broadcasts `message` to every connected peer, best effort.
    fn send(&mut self, message: &[u8]) -> io::Result<()>;

    /// Blocks until the next message arrives.
    fn recv(&mut self) -> io::Result<Vec<u8>>;
}
