//! Throughput benchmarking harness for many-to-many broadcast ("bus")
//! transports.
//!
//! A bus delivers every broadcast to every peer a participant has dialed,
//! with no delivery guarantee, no flush on close, and no acknowledgements.
//! That makes "how fast is it" surprisingly hard to answer: a receiver that
//! closes as soon as it is satisfied loses whatever is still buffered, and
//! a sender that stops at a fixed count may stop before anyone has seen
//! enough. This crate measures anyway.
//!
//! - [topology] resolves an address template into a fully connected mesh in
//!   which every unordered pair of participants is dialed exactly once.
//! - [bench] drives one timed sender plus one receiver worker thread per
//!   remaining position, using sequence-stamped messages, a per-worker
//!   one-shot completion [signal], and a reserved termination marker for a
//!   two-phase shutdown.
//! - [metrics] turns the observations into throughput figures.
//!
//! The harness is generic over the [transport] contract. Two transports
//! are included: [inproc] for in-process benchmarking and tests, and [udp]
//! for unicast UDP meshes.
//!
//! # Important Notes
//! <div class="warning">
//! The mesh join and the two-phase shutdown rely on fixed-duration pauses
//! instead of synchronization barriers. Under load or packet loss these
//! can be insufficient, producing either a permanent hang (the marker is
//! never seen) or silent message loss at close. This is a documented
//! property of the design, not a bug to work around in a transport.
//! </div>

pub(crate) mod protocol;
pub(crate) mod utils;

pub mod bench;
pub mod inproc;
pub mod metrics;
pub mod signal;
pub mod topology;
pub mod transport;
pub mod udp;
