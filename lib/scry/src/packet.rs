//! Packet framing. Every message travels in a framed packet: a 16-byte
//! header in network byte order, a bounded payload and, unless suppressed, a
//! trailing 16-bit CRC over header and payload.

use crate::crc::crc16;
use crate::error::{Error, WireResult};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

/// Identifies the start of every packet.
pub const PACKET_MARKER: u32 = 0x03e5_5e30;
/// Marker bytes as they appear on the wire.
pub const PACKET_MARKER_BYTES: [u8; 4] = [0x03, 0xe5, 0x5e, 0x30];

pub const PROTOCOL_VERSION_MAJOR: u16 = 0;
pub const PROTOCOL_VERSION_MINOR: u16 = 3;

pub const PACKET_HEADER_SIZE: usize = 16;
pub const PACKET_CRC_SIZE: usize = 2;
/// Hard payload bound imposed by the 16-bit payload size field.
pub const MAX_PAYLOAD_SIZE: usize = 0xffff;

/// Packet flag: no CRC follows the payload.
pub const PF_NO_CRC: u8 = 1;

// Header byte offsets.
const OFS_MARKER: usize = 0;
const OFS_VERSION_MAJOR: usize = 4;
const OFS_VERSION_MINOR: usize = 6;
const OFS_ROUTING_ID: usize = 8;
const OFS_MESSAGE_ID: usize = 10;
const OFS_PAYLOAD_SIZE: usize = 12;
const OFS_PAYLOAD_OFFSET: usize = 14;
const OFS_FLAGS: usize = 15;

/// Decoded form of the 16-byte packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub routing_id: u16,
    pub message_id: u16,
    pub payload_size: u16,
    pub payload_offset: u8,
    pub flags: u8,
}

impl PacketHeader {
    /// Parses a header from the leading bytes of `bytes`. Validates the
    /// marker and protocol version only; payload bounds and CRC are the
    /// reader's concern.
    pub fn read(bytes: &[u8]) -> WireResult<PacketHeader> {
        if bytes.len() < PACKET_HEADER_SIZE {
            return Err(Error::Truncated);
        }
        if BigEndian::read_u32(&bytes[OFS_MARKER..]) != PACKET_MARKER {
            return Err(Error::BadMarker);
        }
        let header = PacketHeader {
            version_major: BigEndian::read_u16(&bytes[OFS_VERSION_MAJOR..]),
            version_minor: BigEndian::read_u16(&bytes[OFS_VERSION_MINOR..]),
            routing_id: BigEndian::read_u16(&bytes[OFS_ROUTING_ID..]),
            message_id: BigEndian::read_u16(&bytes[OFS_MESSAGE_ID..]),
            payload_size: BigEndian::read_u16(&bytes[OFS_PAYLOAD_SIZE..]),
            payload_offset: bytes[OFS_PAYLOAD_OFFSET],
            flags: bytes[OFS_FLAGS],
        };
        if header.version_major != PROTOCOL_VERSION_MAJOR
            || header.version_minor != PROTOCOL_VERSION_MINOR
        {
            return Err(Error::BadVersion);
        }
        Ok(header)
    }

    /// True when a CRC trails the payload.
    #[inline]
    pub fn has_crc(&self) -> bool {
        self.flags & PF_NO_CRC == 0
    }

    /// Total packet size implied by this header, including header and CRC.
    #[inline]
    pub fn packet_size(&self) -> usize {
        PACKET_HEADER_SIZE
            + self.payload_size as usize
            + if self.has_crc() { PACKET_CRC_SIZE } else { 0 }
    }
}

/// Builds one packet at a time into an owned, bounded buffer.
///
/// The writer is reset with a routing and message id, filled with scalar and
/// array writes (host to network conversion applied), then `finalise` patches
/// the payload size and appends the CRC. A write past the payload bound fails
/// that write and invalidates the packet until the next `reset`.
pub struct PacketWriter {
    buf: Vec<u8>,
    max_payload: usize,
    valid: bool,
    finalised: bool,
}

impl PacketWriter {
    /// Creates a writer bounded by `buffer_size` total packet bytes. The
    /// payload bound is the lesser of the 16-bit wire limit and what the
    /// buffer can hold after header and CRC.
    pub fn new(buffer_size: usize) -> PacketWriter {
        let capacity = buffer_size.max(PACKET_HEADER_SIZE + PACKET_CRC_SIZE);
        let max_payload =
            (capacity - PACKET_HEADER_SIZE - PACKET_CRC_SIZE).min(MAX_PAYLOAD_SIZE);
        PacketWriter {
            buf: Vec::with_capacity(capacity),
            max_payload,
            valid: false,
            finalised: false,
        }
    }

    /// Starts a new packet for the given routing and message ids.
    pub fn reset(&mut self, routing_id: u16, message_id: u16) {
        self.buf.clear();
        self.buf
            .write_u32::<BigEndian>(PACKET_MARKER)
            .expect("header write");
        self.buf
            .write_u16::<BigEndian>(PROTOCOL_VERSION_MAJOR)
            .expect("header write");
        self.buf
            .write_u16::<BigEndian>(PROTOCOL_VERSION_MINOR)
            .expect("header write");
        self.buf
            .write_u16::<BigEndian>(routing_id)
            .expect("header write");
        self.buf
            .write_u16::<BigEndian>(message_id)
            .expect("header write");
        // Payload size patched by finalise().
        self.buf.write_u16::<BigEndian>(0).expect("header write");
        self.buf.write_u8(0).expect("header write");
        self.buf.write_u8(0).expect("header write");
        self.valid = true;
        self.finalised = false;
    }

    #[inline]
    pub fn routing_id(&self) -> u16 {
        BigEndian::read_u16(&self.buf[OFS_ROUTING_ID..])
    }

    #[inline]
    pub fn message_id(&self) -> u16 {
        BigEndian::read_u16(&self.buf[OFS_MESSAGE_ID..])
    }

    /// Payload bytes written so far.
    #[inline]
    pub fn payload_size(&self) -> usize {
        self.buf.len().saturating_sub(PACKET_HEADER_SIZE)
    }

    /// Payload bytes still available before the packet bound.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.max_payload - self.payload_size()
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    fn check(&mut self, bytes: usize) -> WireResult<()> {
        if !self.valid || self.finalised {
            return Err(Error::InvalidPacket);
        }
        if bytes > self.remaining() {
            self.valid = false;
            return Err(Error::Truncated);
        }
        Ok(())
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> WireResult<()> {
        self.check(1)?;
        self.buf.write_u8(value).expect("payload write");
        Ok(())
    }

    #[inline]
    pub fn write_i8(&mut self, value: i8) -> WireResult<()> {
        self.check(1)?;
        self.buf.write_i8(value).expect("payload write");
        Ok(())
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) -> WireResult<()> {
        self.check(2)?;
        self.buf.write_u16::<BigEndian>(value).expect("payload write");
        Ok(())
    }

    #[inline]
    pub fn write_i16(&mut self, value: i16) -> WireResult<()> {
        self.check(2)?;
        self.buf.write_i16::<BigEndian>(value).expect("payload write");
        Ok(())
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) -> WireResult<()> {
        self.check(4)?;
        self.buf.write_u32::<BigEndian>(value).expect("payload write");
        Ok(())
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) -> WireResult<()> {
        self.check(4)?;
        self.buf.write_i32::<BigEndian>(value).expect("payload write");
        Ok(())
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) -> WireResult<()> {
        self.check(8)?;
        self.buf.write_u64::<BigEndian>(value).expect("payload write");
        Ok(())
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) -> WireResult<()> {
        self.check(8)?;
        self.buf.write_i64::<BigEndian>(value).expect("payload write");
        Ok(())
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) -> WireResult<()> {
        self.check(4)?;
        self.buf.write_f32::<BigEndian>(value).expect("payload write");
        Ok(())
    }

    #[inline]
    pub fn write_f64(&mut self, value: f64) -> WireResult<()> {
        self.check(8)?;
        self.buf.write_f64::<BigEndian>(value).expect("payload write");
        Ok(())
    }

    /// Writes raw bytes without byte order conversion.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> WireResult<()> {
        self.check(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes `count` zero bytes, for reserved fields.
    pub fn write_padding(&mut self, count: usize) -> WireResult<()> {
        self.check(count)?;
        self.buf.resize(self.buf.len() + count, 0);
        Ok(())
    }

    /// Patches the payload size into the header and appends the CRC. The
    /// writer must not be touched again until the next `reset`.
    pub fn finalise(&mut self) -> WireResult<()> {
        if !self.valid || self.finalised {
            return Err(Error::InvalidPacket);
        }
        let payload = self.payload_size();
        BigEndian::write_u16(&mut self.buf[OFS_PAYLOAD_SIZE..OFS_PAYLOAD_OFFSET], payload as u16);
        let crc = crc16(&self.buf);
        self.buf.write_u16::<BigEndian>(crc).expect("crc write");
        self.finalised = true;
        Ok(())
    }

    /// The assembled packet bytes: header, payload, and CRC once finalised.
    #[inline]
    pub fn packet_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn packet_size(&self) -> usize {
        self.buf.len()
    }
}

/// Bounded reader over one packet's bytes. Construction validates the header
/// and, when present, the CRC; reads never cross the payload boundary.
#[derive(Debug)]
pub struct PacketReader<'a> {
    header: PacketHeader,
    payload: &'a [u8],
    cursor: usize,
    valid: bool,
}

impl<'a> PacketReader<'a> {
    pub fn new(packet: &'a [u8]) -> WireResult<PacketReader<'a>> {
        let header = PacketHeader::read(packet)?;
        if packet.len() < header.packet_size() {
            return Err(Error::Truncated);
        }
        let payload_end = PACKET_HEADER_SIZE + header.payload_size as usize;
        if header.has_crc() {
            let stored = BigEndian::read_u16(&packet[payload_end..]);
            if stored != crc16(&packet[..payload_end]) {
                return Err(Error::BadCrc);
            }
        }
        Ok(PacketReader {
            header,
            payload: &packet[PACKET_HEADER_SIZE..payload_end],
            cursor: 0,
            valid: true,
        })
    }

    #[inline]
    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    #[inline]
    pub fn routing_id(&self) -> u16 {
        self.header.routing_id
    }

    #[inline]
    pub fn message_id(&self) -> u16 {
        self.header.message_id
    }

    /// Unread payload bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.cursor
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    fn take(&mut self, bytes: usize) -> WireResult<&'a [u8]> {
        if !self.valid {
            return Err(Error::InvalidPacket);
        }
        if bytes > self.remaining() {
            self.valid = false;
            return Err(Error::Truncated);
        }
        let slice = &self.payload[self.cursor..self.cursor + bytes];
        self.cursor += bytes;
        Ok(slice)
    }

    /// Looks ahead without consuming.
    pub fn peek_bytes(&self, bytes: usize) -> WireResult<&'a [u8]> {
        if bytes > self.remaining() {
            return Err(Error::Truncated);
        }
        Ok(&self.payload[self.cursor..self.cursor + bytes])
    }

    #[inline]
    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    pub fn read_i8(&mut self) -> WireResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    #[inline]
    pub fn read_u16(&mut self) -> WireResult<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    #[inline]
    pub fn read_i16(&mut self) -> WireResult<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> WireResult<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    #[inline]
    pub fn read_i32(&mut self) -> WireResult<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    #[inline]
    pub fn read_u64(&mut self) -> WireResult<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    #[inline]
    pub fn read_i64(&mut self) -> WireResult<i64> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    #[inline]
    pub fn read_f32(&mut self) -> WireResult<f32> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    #[inline]
    pub fn read_f64(&mut self) -> WireResult<f64> {
        Ok(BigEndian::read_f64(self.take(8)?))
    }

    /// Reads raw bytes without byte order conversion.
    pub fn read_bytes(&mut self, bytes: usize) -> WireResult<&'a [u8]> {
        self.take(bytes)
    }
}
