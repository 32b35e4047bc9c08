//! Wire format of the routing control traffic. A datagram carries exactly one
//! [`OriginatorMessage`], optionally followed by any number of
//! [`HnaAnnouncement`] records. All multi-byte fields are in network byte
//! order.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub use hna::{HnaAnnouncement, PrefixLenError, HNA_WIRE_SIZE};
pub use ogm::{OriginatorMessage, FLAG_DIRECTLINK, FLAG_UNIDIRECTIONAL, OGM_WIRE_SIZE};

mod hna;
mod ogm;

/// The protocol version implemented by this crate. Datagrams with any other
/// version are rejected on decode.
pub const BATMAN_VERSION: u8 = 4;

/// The UDP port control datagrams are exchanged on.
pub const BATMAN_PORT: u16 = 4305;

/// An error while decoding a received datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The originator message header is malformed: the buffer is too short or
    /// carries an unsupported version.
    InvalidHeader,
    /// The datagram ends in the middle of a host network announcement record.
    Truncated,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidHeader => f.write_str("invalid originator message header"),
            DecodeError::Truncated => f.write_str("truncated host network announcement"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// A full control datagram: one originator message plus the trailing host
/// network announcements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub ogm: OriginatorMessage,
    pub hna: Vec<HnaAnnouncement>,
}

impl Packet {
    /// Create a new `Packet` carrying only an originator message.
    pub fn new(ogm: OriginatorMessage) -> Self {
        Self {
            ogm,
            hna: Vec::new(),
        }
    }

    /// Create a new `Packet` with host network announcements attached.
    pub fn with_hna(ogm: OriginatorMessage, hna: Vec<HnaAnnouncement>) -> Self {
        Self { ogm, hna }
    }

    /// Calculates the size on the wire of this `Packet`.
    pub fn wire_size(&self) -> usize {
        OGM_WIRE_SIZE + self.hna.len() * HNA_WIRE_SIZE
    }

    /// Construct a `Packet` from wire bytes. The entire buffer must be
    /// consumed by the decode, trailing partial records fail with
    /// [`DecodeError::Truncated`].
    pub fn from_bytes(src: &mut BytesMut) -> Result<Self, DecodeError> {
        let ogm = OriginatorMessage::from_bytes(src)?;

        let mut hna = Vec::new();
        while src.has_remaining() {
            hna.push(HnaAnnouncement::from_bytes(src)?);
        }

        Ok(Packet { ogm, hna })
    }

    /// Encode this `Packet` into the provided buffer.
    pub fn write_bytes(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_size());
        self.ogm.write_bytes(dst);
        for hna in &self.hna {
            hna.write_bytes(dst);
        }
    }

    /// Encode this `Packet` into a fresh byte vector, ready to hand to the
    /// broadcast sink.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        self.write_bytes(&mut buf);
        buf.to_vec()
    }
}

/// A codec which can send and receive whole control datagrams, e.g. through
/// [`UdpFramed`](https://docs.rs/tokio-util/latest/tokio_util/udp/struct.UdpFramed.html).
#[derive(Debug, Clone, Default)]
pub struct Codec;

impl Codec {
    /// Create a new `Codec`.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for Codec {
    type Item = Packet;

    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        match Packet::from_bytes(src) {
            Ok(packet) => Ok(Some(packet)),
            Err(e) => {
                // Leave the buffer in a clean state for the next datagram.
                src.clear();
                Err(io::Error::new(io::ErrorKind::InvalidData, e))
            }
        }
    }
}

impl Encoder<Packet> for Codec {
    type Error = io::Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_bytes(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::codec::{Decoder, Encoder};

    use crate::address::Address;

    use super::{HnaAnnouncement, OriginatorMessage, Packet};

    #[test]
    fn roundtrip_bare_ogm() {
        let packet = Packet::new(OriginatorMessage::new(
            Address::new(0x0a000001),
            12.into(),
            64,
        ));

        let mut buf = bytes::BytesMut::new();
        packet.write_bytes(&mut buf);
        assert_eq!(buf.len(), packet.wire_size());

        let decoded = Packet::from_bytes(&mut buf);
        assert_eq!(decoded, Ok(packet));
    }

    #[test]
    fn roundtrip_with_hna_records() {
        let packet = Packet::with_hna(
            OriginatorMessage::new(Address::new(0x0a000001), 400.into(), 64).with_gateway(6, 4306),
            vec![
                HnaAnnouncement::new(Address::new(0xc0a80a00), 24)
                    .expect("24 is a valid prefix size; qed"),
                HnaAnnouncement::new(Address::new(0x0a500000), 16)
                    .expect("16 is a valid prefix size; qed"),
            ],
        );

        let mut buf = bytes::BytesMut::new();
        packet.write_bytes(&mut buf);
        assert_eq!(buf.len(), 12 + 2 * 5);

        let decoded = Packet::from_bytes(&mut buf);
        assert_eq!(decoded, Ok(packet));
    }

    #[test]
    fn partial_hna_record_is_truncated() {
        let packet = Packet::with_hna(
            OriginatorMessage::new(Address::new(0x0a000001), 400.into(), 64),
            vec![HnaAnnouncement::new(Address::new(0xc0a80a00), 24)
                .expect("24 is a valid prefix size; qed")],
        );

        let mut buf = bytes::BytesMut::new();
        packet.write_bytes(&mut buf);
        buf.truncate(15);

        assert_eq!(
            Packet::from_bytes(&mut buf),
            Err(super::DecodeError::Truncated)
        );
    }

    #[test]
    fn codec_roundtrip() {
        let mut codec = super::Codec::new();
        let mut buf = bytes::BytesMut::new();

        let packet = Packet::with_hna(
            OriginatorMessage::new(Address::new(0x0a000003), 7.into(), 32),
            vec![HnaAnnouncement::new(Address::new(0x0a140000), 16)
                .expect("16 is a valid prefix size; qed")],
        );

        codec
            .encode(packet.clone(), &mut buf)
            .expect("Encoding into a buffer can never fail; qed");
        let received = codec
            .decode(&mut buf)
            .expect("Can decode the previously encoded value")
            .expect("A whole datagram is present in the buffer");
        assert_eq!(packet, received);
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_empty_datagram_yields_nothing() {
        let mut codec = super::Codec::new();
        let mut buf = bytes::BytesMut::new();

        assert!(matches!(codec.decode(&mut buf), Ok(None)));
    }

    #[test]
    fn codec_clears_buffer_on_garbage() {
        let mut codec = super::Codec::new();
        let mut buf = bytes::BytesMut::from(&[9u8; 20][..]);

        assert!(codec.decode(&mut buf).is_err());
        assert!(buf.is_empty());
    }
}
