//! Collated packets: an outer packet whose payload is a sequence of whole
//! inner packets, optionally run through a streaming gzip compressor.
//!
//! Two construction paths exist. The bounded form respects the 16-bit wire
//! payload limit and is the only form live TCP connections can produce. The
//! file stream form may exceed the limit; it then must carry `NoCrc` since
//! the CRC position cannot be derived from the 16-bit payload size field,
//! and readers rely on the uncompressed byte count in the collated header.

use crate::error::{Error, WireResult};
use crate::messages::ROUTING_COLLATED_PACKET;
use crate::packet::{
    PacketHeader, MAX_PAYLOAD_SIZE, PACKET_CRC_SIZE, PACKET_HEADER_SIZE, PACKET_MARKER,
    PF_NO_CRC, PROTOCOL_VERSION_MAJOR, PROTOCOL_VERSION_MINOR,
};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_derive::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Collated packet flag: the inner concatenation is gzip compressed.
pub const COLLATED_COMPRESS: u16 = 1;

/// Collated message header bytes: flags, reserved, uncompressed byte count.
const COLLATED_MESSAGE_SIZE: usize = 2 + 2 + 4;

/// Target compression levels for collated payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    None,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl CompressionLevel {
    fn to_gzip(self) -> Compression {
        match self {
            CompressionLevel::None => Compression::new(0),
            CompressionLevel::Low => Compression::new(3),
            CompressionLevel::Medium => Compression::new(6),
            CompressionLevel::High => Compression::new(8),
            CompressionLevel::VeryHigh => Compression::new(9),
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> CompressionLevel {
        CompressionLevel::Medium
    }
}

/// Accumulates whole inner packets into one outer collated packet.
pub struct CollatedPacket {
    inner: Vec<u8>,
    finalised_buffer: Vec<u8>,
    compress: bool,
    level: CompressionLevel,
    max_inner: usize,
    finalised: bool,
}

impl CollatedPacket {
    /// A bounded collator for live connections. The inner accumulation is
    /// capped so the outer payload always fits the 16-bit wire limit, even
    /// when compression fails to shrink the data.
    pub fn new(compress: bool) -> CollatedPacket {
        CollatedPacket {
            inner: Vec::new(),
            finalised_buffer: Vec::new(),
            compress,
            level: CompressionLevel::default(),
            max_inner: MAX_PAYLOAD_SIZE - COLLATED_MESSAGE_SIZE,
            finalised: false,
        }
    }

    /// The file stream form: no accumulation bound. When the payload exceeds
    /// the 16-bit limit the finalised packet carries `NoCrc` and stores the
    /// truncated low 16 bits in the payload size field.
    pub fn for_file_stream(compress: bool) -> CollatedPacket {
        CollatedPacket {
            max_inner: u32::MAX as usize,
            ..CollatedPacket::new(compress)
        }
    }

    pub fn set_compression_level(&mut self, level: CompressionLevel) {
        self.level = level;
    }

    #[inline]
    pub fn compression_enabled(&self) -> bool {
        self.compress
    }

    #[inline]
    pub fn is_finalised(&self) -> bool {
        self.finalised
    }

    /// Uncompressed inner bytes accumulated so far.
    #[inline]
    pub fn collated_bytes(&self) -> usize {
        self.inner.len()
    }

    /// Inner bytes still accepted before the accumulation bound.
    #[inline]
    pub fn available_bytes(&self) -> usize {
        self.max_inner - self.inner.len()
    }

    /// Appends one whole packet. Returns the byte count accepted, or
    /// `OversizedPacket` when the packet does not fit the current bound.
    pub fn add(&mut self, packet: &[u8]) -> WireResult<usize> {
        if self.finalised {
            return Err(Error::InvalidPacket);
        }
        if packet.len() < PACKET_HEADER_SIZE {
            return Err(Error::Truncated);
        }
        if packet.len() > self.available_bytes() {
            return Err(Error::OversizedPacket);
        }
        self.inner.extend_from_slice(packet);
        Ok(packet.len())
    }

    /// The raw, uncompressed inner packet concatenation.
    #[inline]
    pub fn collated_data(&self) -> &[u8] {
        &self.inner
    }

    /// Builds the outer packet: compresses the accumulation when enabled and
    /// beneficial, then frames it with header, collated message and CRC.
    pub fn finalise(&mut self) -> WireResult<()> {
        if self.finalised {
            return Err(Error::InvalidPacket);
        }

        let mut flags = 0u16;
        let data = if self.compress && !self.inner.is_empty() {
            let mut encoder = GzEncoder::new(Vec::new(), self.level.to_gzip());
            encoder.write_all(&self.inner)?;
            let compressed = encoder.finish()?;
            if compressed.len() < self.inner.len() {
                flags |= COLLATED_COMPRESS;
                compressed
            } else {
                self.inner.clone()
            }
        } else {
            self.inner.clone()
        };

        let payload_size = COLLATED_MESSAGE_SIZE + data.len();
        let oversize = payload_size > MAX_PAYLOAD_SIZE;
        if oversize && self.max_inner <= MAX_PAYLOAD_SIZE {
            return Err(Error::OversizedPacket);
        }

        let buf = &mut self.finalised_buffer;
        buf.clear();
        buf.write_u32::<BigEndian>(PACKET_MARKER).expect("header write");
        buf.write_u16::<BigEndian>(PROTOCOL_VERSION_MAJOR).expect("header write");
        buf.write_u16::<BigEndian>(PROTOCOL_VERSION_MINOR).expect("header write");
        buf.write_u16::<BigEndian>(ROUTING_COLLATED_PACKET).expect("header write");
        buf.write_u16::<BigEndian>(0).expect("header write");
        buf.write_u16::<BigEndian>((payload_size & 0xffff) as u16).expect("header write");
        buf.write_u8(0).expect("header write");
        buf.write_u8(if oversize { PF_NO_CRC } else { 0 }).expect("header write");
        buf.write_u16::<BigEndian>(flags).expect("message write");
        buf.write_u16::<BigEndian>(0).expect("message write");
        buf.write_u32::<BigEndian>(self.inner.len() as u32).expect("message write");
        buf.extend_from_slice(&data);
        if !oversize {
            let crc = crate::crc::crc16(buf);
            buf.write_u16::<BigEndian>(crc).expect("crc write");
        }
        self.finalised = true;
        Ok(())
    }

    /// The finalised outer packet bytes.
    pub fn buffer(&self) -> &[u8] {
        &self.finalised_buffer
    }

    /// Clears all state for reuse.
    pub fn reset(&mut self) {
        self.inner.clear();
        self.finalised_buffer.clear();
        self.finalised = false;
    }
}

/// Splits a concatenation of whole packets into individual packet slices,
/// using each header's payload size and CRC flag.
pub fn split_packets(data: &[u8]) -> WireResult<Vec<&[u8]>> {
    let mut packets = Vec::new();
    let mut cursor = 0usize;
    while cursor + PACKET_HEADER_SIZE <= data.len() {
        let header = PacketHeader::read(&data[cursor..])?;
        let size = header.packet_size();
        if cursor + size > data.len() {
            return Err(Error::Truncated);
        }
        packets.push(&data[cursor..cursor + size]);
        cursor += size;
    }
    if cursor != data.len() {
        return Err(Error::Truncated);
    }
    Ok(packets)
}

/// Expands a collated packet into its inner packets, decompressing when the
/// payload is compressed. Accepts both the bounded and the file oversize
/// forms; the caller must supply the complete packet bytes.
pub fn decode_collated(packet: &[u8]) -> WireResult<Vec<Vec<u8>>> {
    let header = PacketHeader::read(packet)?;
    if header.routing_id != ROUTING_COLLATED_PACKET {
        return Err(Error::InvalidPacket);
    }

    let payload = if header.has_crc() {
        let payload_end = PACKET_HEADER_SIZE + header.payload_size as usize;
        if packet.len() < payload_end + PACKET_CRC_SIZE {
            return Err(Error::Truncated);
        }
        let stored = BigEndian::read_u16(&packet[payload_end..]);
        if stored != crate::crc::crc16(&packet[..payload_end]) {
            return Err(Error::BadCrc);
        }
        &packet[PACKET_HEADER_SIZE..payload_end]
    } else {
        // Oversize form: the payload size field is unreliable, the payload
        // runs to the end of the supplied bytes.
        &packet[PACKET_HEADER_SIZE..]
    };

    if payload.len() < COLLATED_MESSAGE_SIZE {
        return Err(Error::Truncated);
    }
    let flags = BigEndian::read_u16(&payload[0..2]);
    let uncompressed = BigEndian::read_u32(&payload[4..8]) as usize;
    let data = &payload[COLLATED_MESSAGE_SIZE..];

    let expanded;
    let raw = if flags & COLLATED_COMPRESS != 0 {
        let mut decoder = flate2::read::GzDecoder::new(data);
        let mut out = Vec::with_capacity(uncompressed);
        decoder.read_to_end(&mut out)?;
        expanded = out;
        &expanded[..]
    } else {
        data
    };
    if raw.len() != uncompressed {
        return Err(Error::Truncated);
    }

    Ok(split_packets(raw)?.into_iter().map(<[u8]>::to_vec).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ControlMessage, Message, ROUTING_CONTROL};
    use crate::packet::PacketWriter;

    fn control_packet(value32: u32) -> Vec<u8> {
        let mut writer = PacketWriter::new(256);
        writer.reset(ROUTING_CONTROL, 1);
        ControlMessage { control_flags: 0, value32, value64: 0 }
            .write(&mut writer)
            .unwrap();
        writer.finalise().unwrap();
        writer.packet_bytes().to_vec()
    }

    #[test]
    fn test_uncompressed_roundtrip_preserves_bytes() {
        let first = control_packet(1);
        let second = control_packet(2);

        let mut collated = CollatedPacket::new(false);
        collated.add(&first).unwrap();
        collated.add(&second).unwrap();
        collated.finalise().unwrap();

        let inner = decode_collated(collated.buffer()).unwrap();
        assert_eq!(inner, vec![first, second]);
    }

    #[test]
    fn test_compressed_roundtrip() {
        let packets: Vec<Vec<u8>> = (0..100).map(control_packet).collect();

        let mut collated = CollatedPacket::new(true);
        for packet in &packets {
            collated.add(packet).unwrap();
        }
        collated.finalise().unwrap();

        // Repetitive control packets compress well.
        assert!(collated.buffer().len() < collated.collated_bytes());

        let inner = decode_collated(collated.buffer()).unwrap();
        assert_eq!(inner, packets);
    }

    #[test]
    fn test_add_rejects_oversize() {
        let mut collated = CollatedPacket::new(false);
        let packet = control_packet(0);
        let mut added = 0usize;
        loop {
            match collated.add(&packet) {
                Ok(count) => added += count,
                Err(err) => {
                    assert_eq!(err, Error::OversizedPacket);
                    break;
                }
            }
        }
        assert_eq!(added, collated.collated_bytes());
        assert!(packet.len() > collated.available_bytes());
    }

    #[test]
    fn test_bounded_finalise_always_fits_wire_limit() {
        let mut collated = CollatedPacket::new(false);
        let packet = control_packet(7);
        while collated.add(&packet).is_ok() {}
        collated.finalise().unwrap();
        let header = PacketHeader::read(collated.buffer()).unwrap();
        assert!(header.has_crc());
        assert_eq!(header.packet_size(), collated.buffer().len());
    }

    #[test]
    fn test_file_stream_oversize_drops_crc() {
        let mut collated = CollatedPacket::for_file_stream(false);
        let packet = control_packet(3);
        let mut total = 0usize;
        while total <= MAX_PAYLOAD_SIZE {
            collated.add(&packet).unwrap();
            total += packet.len();
        }
        collated.finalise().unwrap();

        let header = PacketHeader::read(collated.buffer()).unwrap();
        assert!(!header.has_crc());

        let inner = decode_collated(collated.buffer()).unwrap();
        assert_eq!(inner.len(), total / packet.len());
        assert!(inner.iter().all(|bytes| bytes == &packet));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut collated = CollatedPacket::new(false);
        collated.add(&control_packet(1)).unwrap();
        collated.finalise().unwrap();
        collated.reset();
        assert_eq!(collated.collated_bytes(), 0);
        assert!(!collated.is_finalised());
        collated.add(&control_packet(2)).unwrap();
        collated.finalise().unwrap();
        assert_eq!(decode_collated(collated.buffer()).unwrap().len(), 1);
    }

    #[test]
    fn test_split_rejects_partial_packet() {
        let mut data = control_packet(1);
        let partial = control_packet(2);
        data.extend_from_slice(&partial[..10]);
        assert_eq!(split_packets(&data).unwrap_err(), Error::Truncated);
    }
}
