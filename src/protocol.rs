use zerocopy::{byteorder::network_endian::*, AsBytes, FromBytes, FromZeroes, Unaligned};

pub type SequenceNumber = U32;

/// Reserved sequence value signaling that no further payload messages will
/// be sent. Configuration validation keeps it out of the payload range.
pub const TERMINATION_MARKER: u32 = u32::MAX;

pub type FrameKind = u8;

pub mod kind {
    use super::FrameKind;

    pub const HELLO: FrameKind = 0;
    pub const DATA: FrameKind = 1;
}

pub const FRAME_PAYLOAD_OFFSET: usize = 1 + std::mem::size_of::<Data>();

pub trait FrameKindData: AsBytes + FromBytes + FromZeroes + Unaligned {
    fn kind() -> FrameKind;
}

macro_rules! impl_frame_data {
    ($kind:ident) => {
        paste::paste! {
            impl FrameKindData for $kind {
                fn kind() -> FrameKind {
                    kind::[< $kind:snake:upper >]
                }
            }
        }
    };
}

/// Announces a dialing socket to a listener, establishing the reverse
/// direction of the link.
#[derive(Debug, FromBytes, AsBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct Hello {}
impl_frame_data!(Hello);

/// Carries one payload message.
#[derive(Debug, FromBytes, AsBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct Data {}
impl_frame_data!(Data);

/// Leading header of every payload message on the bus.
#[derive(Debug, FromBytes, AsBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct MessageHeader {
    pub seq: SequenceNumber,
}

pub const MESSAGE_HEADER_SIZE: usize = std::mem::size_of::<MessageHeader>();

/// Stamps `seq` into the leading header of `message`.
///
/// The buffer must be at least `MESSAGE_HEADER_SIZE` bytes.
pub fn stamp_seq(message: &mut [u8], seq: u32) {
    message[..MESSAGE_HEADER_SIZE].copy_from_slice(SequenceNumber::new(seq).as_bytes());
}

/// Decodes the leading sequence number of a received message, or `None` if
/// the message cannot hold a header.
pub fn decode_seq(message: &[u8]) -> Option<u32> {
    MessageHeader::ref_from_prefix(message).map(|header| header.seq.get())
}
