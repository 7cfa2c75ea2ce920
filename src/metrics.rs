//! Throughput figures for a completed benchmark run.

use std::{
    fmt::{self, Display},
    time::Duration,
};

/// The result of one benchmark run.
///
/// Computed from the run's observations alone, with no further state: the
/// message count is the number of payload messages actually sent, which can
/// exceed the requested count when the sender overshoots before observing
/// completion. The requested count plays no part in the figures.
#[derive(Debug, Clone)]
pub struct ThroughputReport {
    /// Time from just before the first send until every receiver's
    /// completion signal was observed set.
    pub elapsed: Duration,
    /// Payload messages actually sent within `elapsed`.
    pub messages: u64,
    /// Size in bytes of every payload message.
    pub message_size: usize,
    /// Bus participants, including the sender.
    pub participants: usize,
    pub messages_per_sec: f64,
    pub kilobytes_per_sec: f64,
}

impl ThroughputReport {
    pub fn compute(
        elapsed: Duration,
        messages: u64,
        message_size: usize,
        participants: usize,
    ) -> Self {
        let seconds = elapsed.as_secs_f64();
        let messages_per_sec = messages as f64 / seconds;
        let kilobytes_per_sec = messages as f64 * message_size as f64 / 1024.0 / seconds;
        Self {
            elapsed,
            messages,
            message_size,
            participants,
            messages_per_sec,
            kilobytes_per_sec,
        }
    }
}

impl Display for ThroughputReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Time:       {}", self.elapsed.as_secs_f64())?;
        writeln!(f, "msgs/sec:   {}", self.messages_per_sec)?;
        writeln!(f, "KB/sec:     {}", self.kilobytes_per_sec)
    }
}
