//! The originator message (OGM) header, the only routing control message in
//! the protocol. Fixed 12 byte wire size, multi-byte fields in network byte
//! order.

use bytes::{Buf, BufMut};
use tracing::trace;

use crate::{address::Address, sequence_number::SeqNo};

use super::{DecodeError, BATMAN_VERSION};

/// Flag bit set on an OGM which was rebroadcast by a direct neighbour of its
/// originator.
pub const FLAG_DIRECTLINK: u8 = 0x40;
/// Flag bit set on an OGM which travelled over a link that is not known to be
/// bidirectional. Such messages are only useful as echo evidence for their
/// originator.
pub const FLAG_UNIDIRECTIONAL: u8 = 0x20;
/// Mask to apply to received flags, leaving only the valid flag bits.
const FLAG_MASK: u8 = FLAG_DIRECTLINK | FLAG_UNIDIRECTIONAL;

/// Wire size of an encoded [`OriginatorMessage`].
pub const OGM_WIRE_SIZE: usize = 12;

/// An originator message as it travels on the wire, minus the version octet
/// which is validated on decode and fixed on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OriginatorMessage {
    /// Flags set on the message, see [`FLAG_DIRECTLINK`] and
    /// [`FLAG_UNIDIRECTIONAL`].
    flags: u8,
    /// Remaining hops this message may be rebroadcast.
    ttl: u8,
    /// Gateway class advertised by the originator, 0 when the originator does
    /// not offer gateway service.
    gw_flags: u8,
    /// Sequence number of the emission.
    seqno: SeqNo,
    /// Tunnel port for the advertised gateway service.
    gw_port: u16,
    /// The node which authored this message. Not necessarily the node we got
    /// it from.
    originator: Address,
}

impl OriginatorMessage {
    /// Create a new `OriginatorMessage` with no flags and no gateway
    /// advertisement.
    pub fn new(originator: Address, seqno: SeqNo, ttl: u8) -> Self {
        Self {
            flags: 0,
            ttl,
            gw_flags: 0,
            seqno,
            gw_port: 0,
            originator,
        }
    }

    /// Attach a gateway advertisement to this message.
    pub fn with_gateway(mut self, gw_flags: u8, gw_port: u16) -> Self {
        self.gw_flags = gw_flags;
        self.gw_port = gw_port;
        self
    }

    /// The node which authored this message.
    pub fn originator(&self) -> Address {
        self.originator
    }

    /// The sequence number of this emission.
    pub fn seqno(&self) -> SeqNo {
        self.seqno
    }

    /// Remaining hop count.
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    /// Overwrite the remaining hop count.
    pub fn set_ttl(&mut self, ttl: u8) {
        self.ttl = ttl;
    }

    /// Advertised gateway class, 0 if none.
    pub fn gw_flags(&self) -> u8 {
        self.gw_flags
    }

    /// Advertised gateway tunnel port.
    pub fn gw_port(&self) -> u16 {
        self.gw_port
    }

    /// Checks if the direct link flag is set.
    pub fn is_directlink(&self) -> bool {
        self.flags & FLAG_DIRECTLINK != 0
    }

    /// Checks if the unidirectional flag is set.
    pub fn is_unidirectional(&self) -> bool {
        self.flags & FLAG_UNIDIRECTIONAL != 0
    }

    /// Set the direct link flag.
    pub fn set_directlink(&mut self) {
        self.flags |= FLAG_DIRECTLINK;
    }

    /// Clear the direct link flag.
    pub fn clear_directlink(&mut self) {
        self.flags &= !FLAG_DIRECTLINK;
    }

    /// Set the unidirectional flag.
    pub fn set_unidirectional(&mut self) {
        self.flags |= FLAG_UNIDIRECTIONAL;
    }

    /// Construct an `OriginatorMessage` from wire bytes, advancing `src` past
    /// the consumed header.
    pub fn from_bytes(src: &mut bytes::BytesMut) -> Result<Self, DecodeError> {
        if src.remaining() < OGM_WIRE_SIZE {
            return Err(DecodeError::InvalidHeader);
        }

        let version = src.get_u8();
        if version != BATMAN_VERSION {
            trace!(version, "Dropping originator message with wrong version");
            return Err(DecodeError::InvalidHeader);
        }

        let flags = src.get_u8() & FLAG_MASK;
        let ttl = src.get_u8();
        let gw_flags = src.get_u8();
        let seqno = src.get_u16().into();
        let gw_port = src.get_u16();
        let originator = src.get_u32().into();

        Ok(OriginatorMessage {
            flags,
            ttl,
            gw_flags,
            seqno,
            gw_port,
            originator,
        })
    }

    /// Encode this `OriginatorMessage` as part of a datagram.
    pub fn write_bytes(&self, dst: &mut bytes::BytesMut) {
        dst.put_u8(BATMAN_VERSION);
        dst.put_u8(self.flags);
        dst.put_u8(self.ttl);
        dst.put_u8(self.gw_flags);
        dst.put_u16(self.seqno.into());
        dst.put_u16(self.gw_port);
        dst.put_u32(self.originator.into());
    }
}
