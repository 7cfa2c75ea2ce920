//! Unicast UDP bus transport.
//!
//! Addresses have the form `udp://host:port` (IPv4). Listening binds the
//! socket; dialing announces this socket to the listener with a HELLO frame
//! so that broadcasts flow in both directions over the pair. Sending
//! unicasts a DATA frame to every known peer. There is no acknowledgement,
//! no retransmission, and no flush on close — exactly the best-effort bus
//! the harness is designed to measure.

use std::{
    io::{self, IoSlice},
    net::SocketAddr,
};

use ahash::HashSet;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::{
    protocol::{self, Data, FrameKindData, Hello, FRAME_PAYLOAD_OFFSET},
    transport::{BusSocket, Transport},
};

/// Payload ceiling keeping a frame within a typical 1500-byte MTU.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1471;

/// A UDP bus transport instance.
#[derive(Clone)]
pub struct UdpTransport {
    max_message_size: usize,
}

impl UdpTransport {
    /// A transport whose sockets can receive messages up to
    /// `max_message_size` bytes. Larger incoming datagrams are truncated by
    /// the OS and will fail to decode.
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl Transport for UdpTransport {
    type Socket = UdpBusSocket;

    fn open(&self) -> io::Result<Self::Socket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        Ok(UdpBusSocket {
            socket,
            peers: HashSet::default(),
            recv_buffer_size: FRAME_PAYLOAD_OFFSET + self.max_message_size,
            drained_pending: false,
        })
    }
}

fn parse_addr(addr: &str) -> io::Result<SocketAddr> {
    let stripped = addr.strip_prefix("udp://").unwrap_or(addr);
    stripped.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid udp address: {addr}"),
        )
    })
}

/// One participant's socket on a UDP bus.
pub struct UdpBusSocket {
    socket: Socket,
    peers: HashSet<SockAddr>,
    recv_buffer_size: usize,
    drained_pending: bool,
}

impl UdpBusSocket {
    fn send_frame_to<T: FrameKindData>(
        &self,
        kind_data: &T,
        payload: &[u8],
        addr: &SockAddr,
    ) -> io::Result<()> {
        let kind = [T::kind()];
        let bufs = [
            IoSlice::new(&kind),
            IoSlice::new(kind_data.as_bytes()),
            IoSlice::new(payload),
        ];

        let sent_bytes = self.socket.send_to_vectored(&bufs, addr)?;
        debug_assert_eq!(sent_bytes, 1 + std::mem::size_of::<T>() + payload.len());
        Ok(())
    }

    fn recv_frame(&self, buffer: &mut [u8]) -> io::Result<(usize, SockAddr)> {
        let buffer = unsafe {
            std::mem::transmute::<&mut [u8], &mut [std::mem::MaybeUninit<u8>]>(buffer)
        };
        self.socket.recv_from(buffer)
    }

    /// Registers HELLO frames queued while this socket was not receiving.
    ///
    /// A socket that only ever sends (the timed sender) would otherwise
    /// never learn about the peers that dialed it. Any payload frames
    /// queued alongside are discarded, which the bus contract permits.
    fn drain_pending_frames(&mut self) -> io::Result<()> {
        self.socket.set_nonblocking(true)?;
        let mut buffer = vec![0u8; self.recv_buffer_size];
        let result = loop {
            match self.recv_frame(&mut buffer) {
                Ok((size, addr)) => {
                    if buffer[..size].first() == Some(&protocol::kind::HELLO) {
                        self.peers.insert(addr);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        self.socket.set_nonblocking(false)?;
        result
    }
}

impl BusSocket for UdpBusSocket {
    fn listen(&mut self, addr: &str) -> io::Result<()> {
        let addr = parse_addr(addr)?;
        self.socket.bind(&addr.into())
    }

    fn dial(&mut self, addr: &str) -> io::Result<()> {
        let addr: SockAddr = parse_addr(addr)?.into();
        self.send_frame_to(&Hello {}, &[], &addr)?;
        self.peers.insert(addr);
        Ok(())
    }

    fn send(&mut self, message: &[u8]) -> io::Result<()> {
        if !self.drained_pending {
            // The mesh is fixed once traffic starts, so one drain suffices.
            self.drain_pending_frames()?;
            self.drained_pending = true;
        }

        for addr in &self.peers {
            self.send_frame_to(&Data {}, message, addr)?;
        }
        Ok(())
    }

    fn recv(&mut self) -> io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; self.recv_buffer_size];
        loop {
            let (size, addr) = self.recv_frame(&mut buffer)?;
            match buffer[..size].first() {
                Some(&protocol::kind::HELLO) => {
                    self.peers.insert(addr);
                }
                Some(&protocol::kind::DATA) => {
                    return Ok(buffer[FRAME_PAYLOAD_OFFSET..size].to_vec());
                }
                _ => tracing::debug!(size, "discarding unknown datagram"),
            }
        }
    }
}
