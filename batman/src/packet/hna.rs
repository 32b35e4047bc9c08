//! Host network announcements (HNA). An originator appends these to its OGMs
//! to advertise that it can deliver traffic to attached networks, e.g. a
//! subnet behind a gateway. 5 bytes on the wire: the network address followed
//! by the netmask bit count.

use core::fmt;

use bytes::{Buf, BufMut};

use crate::address::Address;

use super::DecodeError;

/// Wire size of an encoded [`HnaAnnouncement`].
pub const HNA_WIRE_SIZE: usize = 5;

/// An error returned when creating a new [`HnaAnnouncement`] with an invalid
/// prefix length. The maximum prefix length for the 32-bit address space is
/// 32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixLenError;

/// A single announced network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnaAnnouncement {
    /// The announced network address.
    network: Address,
    /// Size of the network prefix in bits.
    prefix_len: u8,
}

impl HnaAnnouncement {
    /// Create a new `HnaAnnouncement` for the given network and prefix
    /// length.
    pub fn new(network: Address, prefix_len: u8) -> Result<Self, PrefixLenError> {
        if prefix_len > 32 {
            return Err(PrefixLenError);
        }
        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// The announced network address.
    pub fn network(&self) -> Address {
        self.network
    }

    /// Size of the network prefix in bits.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// The netmask expanded from the prefix bit count.
    pub fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix_len as u32)
        }
    }

    /// Checks if the given address falls inside the announced network.
    pub fn contains(&self, address: Address) -> bool {
        let mask = self.mask();
        u32::from(address) & mask == u32::from(self.network) & mask
    }

    /// Construct an `HnaAnnouncement` from wire bytes, advancing `src` past
    /// the consumed record.
    pub fn from_bytes(src: &mut bytes::BytesMut) -> Result<Self, DecodeError> {
        if src.remaining() < HNA_WIRE_SIZE {
            return Err(DecodeError::Truncated);
        }

        let network = src.get_u32().into();
        let prefix_len = src.get_u8();
        if prefix_len > 32 {
            return Err(DecodeError::InvalidHeader);
        }

        Ok(HnaAnnouncement {
            network,
            prefix_len,
        })
    }

    /// Encode this `HnaAnnouncement` as part of a datagram.
    pub fn write_bytes(&self, dst: &mut bytes::BytesMut) {
        dst.put_u32(self.network.into());
        dst.put_u8(self.prefix_len);
    }
}

impl fmt::Display for HnaAnnouncement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl fmt::Display for PrefixLenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invalid prefix length for a 32-bit address")
    }
}

impl std::error::Error for PrefixLenError {}
