//! The benchmark harness: one timed sender plus a population of receiver
//! workers.
//!
//! The bus gives no delivery guarantee, no flush on close, and no
//! acknowledgements, so the harness cannot simply send a fixed count and
//! close. Instead every payload message carries a sequence number, every
//! receiver raises a one-shot [completion signal](crate::signal) once its
//! observed high-water count reaches the configured threshold, and the
//! sender keeps transmitting until it has observed every signal —
//! overshooting the requested count if it has to. Shutdown is two-phase: a
//! completed receiver keeps draining until a reserved termination marker
//! arrives, then pauses before closing, so that in-flight traffic is not
//! torn down with the socket.
//!
//! # Example
//! ```no_run
//! use busbar::{bench, inproc::InprocTransport};
//!
//! let config = bench::BenchConfig::new(100_000, 64, 4);
//! let report = bench::run(InprocTransport::new(), "inproc://bus%d", config)?;
//! print!("{report}");
//! # Ok::<(), busbar::bench::BenchError>(())
//! ```

use std::{
    io,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crate::{
    metrics::ThroughputReport,
    protocol::{self, MESSAGE_HEADER_SIZE, TERMINATION_MARKER},
    signal::{completion_signal, CompletionSetter},
    topology::{Topology, TopologyError},
    transport::{BusSocket, Transport},
};

/// Indicates an error within the benchmark configuration.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A message must at least hold the 4-byte sequence header.
    #[error("Message size too small (minimum is 4)")]
    MessageSizeTooSmall,

    /// The all-ones sequence value is reserved for the termination marker.
    #[error("Message count too large (the all-ones sequence value is reserved)")]
    MessageCountTooLarge,
}

/// Parameters of one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// The sequence high water every receiver must observe before it
    /// signals completion.
    pub message_count: u32,

    /// Size in bytes of every payload message, including the 4-byte
    /// sequence header.
    pub message_size: usize,

    /// Number of bus participants including the timed sender; must be at
    /// least 2.
    pub participants: usize,

    /// Pause between starting to listen and dialing out, giving the other
    /// participants time to begin listening.
    ///
    /// This and the other three pauses are heuristics standing in for
    /// synchronization barriers. Under load they can be too short, which
    /// shows up as a hung run or as silent loss at close.
    pub listen_grace: Duration,

    /// Pause between dialing and the first message, letting the mesh
    /// converge.
    pub dial_grace: Duration,

    /// Sender-side pause between observing every completion signal and
    /// emitting the termination marker.
    pub marker_quiescence: Duration,

    /// Receiver-side pause between observing the marker and closing the
    /// socket.
    pub close_quiescence: Duration,
}

impl BenchConfig {
    /// A configuration with the default grace and quiescence pauses.
    pub fn new(message_count: u32, message_size: usize, participants: usize) -> Self {
        Self {
            message_count,
            message_size,
            participants,
            listen_grace: Duration::from_secs(2),
            dial_grace: Duration::from_secs(3),
            marker_quiescence: Duration::from_secs(1),
            close_quiescence: Duration::from_secs(1),
        }
    }

    /// Validates the configuration.
    ///
    /// See [`ConfigError`] for details. The participant count is validated
    /// by [`Topology::resolve`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.message_size < MESSAGE_HEADER_SIZE {
            return Err(ConfigError::MessageSizeTooSmall);
        }

        if self.message_count == TERMINATION_MARKER {
            return Err(ConfigError::MessageCountTooLarge);
        }
        Ok(())
    }
}

/// Indicates a failed benchmark run.
///
/// Transport failures are fatal to the run: a retry would corrupt the
/// timing window, so reliability lives in the protocol design (thresholds,
/// the drain phase, the quiescence pauses) rather than in the call layer.
#[derive(thiserror::Error, Debug)]
pub enum BenchError {
    /// The configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The mesh description is invalid.
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    /// Failed to open a bus socket.
    #[error("Unable to open bus socket: {0}")]
    Open(#[source] io::Error),

    /// Failed to listen on the participant's own address.
    #[error("Bus participant not able to listen on {addr}: {err}")]
    Listen {
        addr: String,
        #[source]
        err: io::Error,
    },

    /// Failed to dial another participant.
    #[error("Unable to dial bus participant {addr}: {err}")]
    Dial {
        addr: String,
        #[source]
        err: io::Error,
    },

    /// Failed to send a message on the bus.
    #[error("Failed to send message on the bus: {0}")]
    Send(#[source] io::Error),

    /// Failed to receive a message from the bus.
    #[error("Unable to receive a message from the bus: {0}")]
    Recv(#[source] io::Error),

    /// The sender exhausted the payload sequence space before every
    /// receiver completed.
    #[error("Payload sequence numbers exhausted before all receivers completed")]
    SequenceExhausted,

    /// A receiver worker panicked.
    #[error("A receiver worker panicked")]
    WorkerPanicked,
}

/// Runs the benchmark and reports its throughput.
///
/// Spawns one receiver worker thread per position 1 and up, joins the mesh
/// as position 0, drives the timed loop, and joins every worker before
/// returning. Timing starts just before the first send and stops the
/// instant every completion signal has been observed set.
///
/// A transport failure on a worker thread terminates the process after one
/// diagnostic line: a dead receiver can never satisfy the sender, and the
/// timing window is already lost.
pub fn run<T: Transport>(
    transport: T,
    template: &str,
    config: BenchConfig,
) -> Result<ThroughputReport, BenchError> {
    config.validate()?;
    let topology = Arc::new(Topology::resolve(template, config.participants)?);

    let mut socket = transport.open().map_err(BenchError::Open)?;

    // The workers must be running before our own mesh join, which blocks in
    // the grace pauses waiting for everyone to listen.
    let mut watchers = Vec::with_capacity(topology.participants() - 1);
    let mut workers = Vec::with_capacity(topology.participants() - 1);
    for position in 1..topology.participants() {
        let (setter, watcher) = completion_signal();
        watchers.push(watcher);

        let transport = transport.clone();
        let topology = topology.clone();
        let config = config.clone();
        workers.push(thread::spawn(move || {
            if let Err(err) = receiver_worker(&transport, &topology, position, &config, setter) {
                tracing::error!(position, %err, "receiver worker failed");
                std::process::exit(1);
            }
        }));
    }

    join_mesh(&mut socket, &topology, 0, &config)?;

    let mut message = vec![0u8; config.message_size];
    let mut next_seq: u32 = 0;
    let start = Instant::now();
    loop {
        if next_seq == TERMINATION_MARKER {
            return Err(BenchError::SequenceExhausted);
        }
        protocol::stamp_seq(&mut message, next_seq);
        socket.send(&message).map_err(BenchError::Send)?;
        next_seq += 1;

        let mut all_set = true;
        for watcher in &mut watchers {
            all_set &= watcher.poll();
        }
        if all_set {
            break;
        }
    }
    let elapsed = start.elapsed();
    let sent = u64::from(next_seq);
    tracing::debug!(sent, ?elapsed, "every receiver signaled completion");

    // The marker can still overtake, or be dropped alongside, messages a
    // lagging receiver has not seen yet; the pause only narrows that
    // window.
    thread::sleep(config.marker_quiescence);
    protocol::stamp_seq(&mut message, TERMINATION_MARKER);
    socket.send(&message).map_err(BenchError::Send)?;

    for worker in workers {
        worker.join().map_err(|_| BenchError::WorkerPanicked)?;
    }

    Ok(ThroughputReport::compute(
        elapsed,
        sent,
        config.message_size,
        config.participants,
    ))
}

/// Listen on the own address, pause, dial per the plan, pause again.
fn join_mesh<S: BusSocket>(
    socket: &mut S,
    topology: &Topology,
    position: usize,
    config: &BenchConfig,
) -> Result<(), BenchError> {
    let addr = topology.address(position);
    socket.listen(addr).map_err(|err| BenchError::Listen {
        addr: addr.to_owned(),
        err,
    })?;
    thread::sleep(config.listen_grace);

    for peer in topology.dial_plan(position) {
        let addr = topology.address(peer);
        socket.dial(addr).map_err(|err| BenchError::Dial {
            addr: addr.to_owned(),
            err,
        })?;
    }
    thread::sleep(config.dial_grace);
    Ok(())
}

/// The body of one receiver worker thread.
///
/// Three phases. MEASURING: track the highest payload sequence seen; loss
/// shows up as gaps, never reordering, so the high water is the count the
/// sender must have reached. Signal completion once it reaches the
/// threshold. DRAINING: keep consuming until the termination marker
/// arrives; closing earlier would drop messages still buffered in the
/// transport and could leave the marker unobserved, which the sender
/// depends on as its cue that closing is safe. TERMINATING: pause, then
/// drop the socket.
fn receiver_worker<T: Transport>(
    transport: &T,
    topology: &Topology,
    position: usize,
    config: &BenchConfig,
    completion: CompletionSetter,
) -> Result<(), BenchError> {
    let mut socket = transport.open().map_err(BenchError::Open)?;
    join_mesh(&mut socket, topology, position, config)?;

    let mut high_water: u64 = 0;
    while high_water < u64::from(config.message_count) {
        let message = socket.recv().map_err(BenchError::Recv)?;
        match protocol::decode_seq(&message) {
            // The marker is out of band, never a payload sequence number.
            Some(TERMINATION_MARKER) => {}
            Some(seq) => high_water = high_water.max(u64::from(seq) + 1),
            None => tracing::debug!(position, len = message.len(), "discarding undersized message"),
        }
    }
    completion.set();
    tracing::trace!(position, high_water, "threshold reached, draining");

    loop {
        let message = socket.recv().map_err(BenchError::Recv)?;
        if protocol::decode_seq(&message) == Some(TERMINATION_MARKER) {
            break;
        }
    }

    tracing::trace!(position, "marker observed, closing");
    thread::sleep(config.close_quiescence);
    drop(socket);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        inproc::{InprocSocket, InprocTransport},
        test::{init_logger, Result},
        udp::UdpTransport,
    };
    use crossbeam::channel::{unbounded, Receiver, Sender};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn quick_config(message_count: u32, message_size: usize, participants: usize) -> BenchConfig {
        BenchConfig {
            listen_grace: Duration::from_millis(20),
            dial_grace: Duration::from_millis(20),
            marker_quiescence: Duration::from_millis(10),
            close_quiescence: Duration::from_millis(10),
            ..BenchConfig::new(message_count, message_size, participants)
        }
    }

    #[test]
    fn a_thousand_messages_across_four_participants() -> Result<()> {
        init_logger();

        let config = quick_config(1000, 64, 4);
        let report = run(InprocTransport::new(), "inproc://bus%d", config)?;

        // Completing requires sequence 999, so at least the requested count
        // went out; the loop may have overshot while polling.
        assert!(report.messages >= 1000);
        assert_eq!(report.message_size, 64);
        assert_eq!(report.participants, 4);

        let seconds = report.elapsed.as_secs_f64();
        assert!(seconds > 0.0);
        let expected_kb = report.messages as f64 * 64.0 / 1024.0 / seconds;
        assert!((report.kilobytes_per_sec - expected_kb).abs() < 1e-9);
        let expected_msgs = report.messages as f64 / seconds;
        assert!((report.messages_per_sec - expected_msgs).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn the_harness_runs_over_udp_loopback() -> Result<()> {
        init_logger();

        // Wider graces than the inproc tests: the sender learns of the
        // last position's dial from its queued HELLO, which must land
        // before the first send.
        let mut config = quick_config(200, 32, 3);
        config.listen_grace = Duration::from_millis(50);
        config.dial_grace = Duration::from_millis(150);

        let report = run(UdpTransport::default(), &crate::test::udp_template(), config)?;
        assert!(report.messages >= 200);
        Ok(())
    }

    #[test]
    fn two_participants_degenerate_to_a_single_link() -> Result<()> {
        init_logger();

        let config = quick_config(100, 16, 2);
        let report = run(InprocTransport::new(), "inproc://duo%d", config)?;
        assert!(report.messages >= 100);
        Ok(())
    }

    #[test]
    fn a_zero_threshold_completes_without_counting_the_marker() -> Result<()> {
        init_logger();

        // The workers signal before receiving anything; the first (and
        // possibly only) message they see may be the marker itself.
        let config = quick_config(0, 8, 3);
        let report = run(InprocTransport::new(), "inproc://idle%d", config)?;
        assert!(report.messages >= 1);
        Ok(())
    }

    #[test]
    fn an_invalid_message_size_is_rejected_before_any_socket_opens() {
        let config = quick_config(10, 3, 2);
        match run(InprocTransport::new(), "inproc://tiny%d", config) {
            Err(BenchError::Config(ConfigError::MessageSizeTooSmall)) => {}
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    #[test]
    fn a_reserved_message_count_is_rejected() {
        let config = quick_config(TERMINATION_MARKER, 8, 2);
        match run(InprocTransport::new(), "inproc://max%d", config) {
            Err(BenchError::Config(ConfigError::MessageCountTooLarge)) => {}
            other => panic!("expected a config error, got {other:?}"),
        }
    }

    /// Hands a worker a fixed message script, then blocks forever.
    #[derive(Clone)]
    struct ScriptedTransport {
        script: Sender<Vec<u8>>,
        messages: Receiver<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(script: &[Vec<u8>]) -> Self {
            let (tx, rx) = unbounded();
            for message in script {
                tx.send(message.clone()).unwrap();
            }
            Self {
                script: tx,
                messages: rx,
            }
        }
    }

    impl Transport for ScriptedTransport {
        type Socket = ScriptedSocket;

        fn open(&self) -> io::Result<Self::Socket> {
            Ok(ScriptedSocket {
                _script: self.script.clone(),
                messages: self.messages.clone(),
            })
        }
    }

    struct ScriptedSocket {
        // Keeps the channel open so an exhausted script blocks like an
        // idle bus instead of disconnecting.
        _script: Sender<Vec<u8>>,
        messages: Receiver<Vec<u8>>,
    }

    impl BusSocket for ScriptedSocket {
        fn listen(&mut self, _addr: &str) -> io::Result<()> {
            Ok(())
        }

        fn dial(&mut self, _addr: &str) -> io::Result<()> {
            Ok(())
        }

        fn send(&mut self, _message: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn recv(&mut self) -> io::Result<Vec<u8>> {
            self.messages
                .recv()
                .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    fn stamped(seq: u32, size: usize) -> Vec<u8> {
        let mut message = vec![0u8; size];
        protocol::stamp_seq(&mut message, seq);
        message
    }

    #[test]
    fn a_worker_tolerates_markers_at_any_point() -> Result<()> {
        init_logger();

        // A marker before the threshold is ignored; a second one after the
        // first is never read because the worker has already closed.
        let mut script = vec![stamped(TERMINATION_MARKER, 16)];
        script.extend((0..5).map(|seq| stamped(seq, 16)));
        script.push(stamped(TERMINATION_MARKER, 16));
        script.push(stamped(TERMINATION_MARKER, 16));

        let transport = ScriptedTransport::new(&script);
        let topology = Topology::resolve("inproc://scripted%d", 2)?;
        let config = quick_config(5, 16, 2);
        let (setter, mut watcher) = completion_signal();

        receiver_worker(&transport, &topology, 1, &config, setter)?;
        assert!(watcher.poll());
        Ok(())
    }

    #[test]
    fn a_worker_signals_only_at_the_threshold() -> Result<()> {
        init_logger();

        // Sequence gaps are loss, not reordering: 0..3 plus 9 gives a high
        // water of 10, enough for a threshold of 10.
        let mut script: Vec<_> = (0..4).map(|seq| stamped(seq, 16)).collect();
        script.push(stamped(9, 16));
        script.push(stamped(TERMINATION_MARKER, 16));

        let transport = ScriptedTransport::new(&script);
        let topology = Topology::resolve("inproc://gaps%d", 2)?;
        let config = quick_config(10, 16, 2);
        let (setter, mut watcher) = completion_signal();

        receiver_worker(&transport, &topology, 1, &config, setter)?;
        assert!(watcher.poll());
        Ok(())
    }

    /// Wraps the in-process transport and silently drops every message
    /// past a sequence cutoff on the socket listening on one victim
    /// address — including the termination marker.
    #[derive(Clone)]
    struct LossyTransport {
        inner: InprocTransport,
        victim: String,
        drop_after: u32,
    }

    struct LossySocket {
        inner: InprocSocket,
        lossy: bool,
        victim: String,
        drop_after: u32,
    }

    impl Transport for LossyTransport {
        type Socket = LossySocket;

        fn open(&self) -> io::Result<Self::Socket> {
            Ok(LossySocket {
                inner: self.inner.open()?,
                lossy: false,
                victim: self.victim.clone(),
                drop_after: self.drop_after,
            })
        }
    }

    impl BusSocket for LossySocket {
        fn listen(&mut self, addr: &str) -> io::Result<()> {
            self.lossy = addr == self.victim;
            self.inner.listen(addr)
        }

        fn dial(&mut self, addr: &str) -> io::Result<()> {
            self.inner.dial(addr)
        }

        fn send(&mut self, message: &[u8]) -> io::Result<()> {
            // Paced, so the permanently stuck run stays cheap while the
            // test (and the rest of the suite) keeps running.
            thread::sleep(Duration::from_micros(50));
            self.inner.send(message)
        }

        fn recv(&mut self) -> io::Result<Vec<u8>> {
            loop {
                let message = self.inner.recv()?;
                if self.lossy {
                    match protocol::decode_seq(&message) {
                        Some(seq) if seq > self.drop_after => continue,
                        _ => {}
                    }
                }
                return Ok(message);
            }
        }
    }

    #[test]
    fn losing_one_worker_hangs_the_run_forever() {
        init_logger();

        // One worker stops seeing traffic after sequence 500 of 1000. Its
        // completion signal can never be set, so the sender loops
        // indefinitely: the accepted cost of a transport with no
        // acknowledgements.
        let transport = LossyTransport {
            inner: InprocTransport::new(),
            victim: "inproc://lossy1".to_string(),
            drop_after: 500,
        };
        let config = quick_config(1000, 64, 3);

        let finished = Arc::new(AtomicBool::new(false));
        let observer = finished.clone();
        thread::spawn(move || {
            let _ = run(transport, "inproc://lossy%d", config);
            observer.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(400));
        assert!(
            !finished.load(Ordering::SeqCst),
            "the run completed despite a receiver that can never reach its threshold",
        );
        // The run and its threads stay blocked by design; they are left
        // behind for the process to clean up at exit.
    }
}
