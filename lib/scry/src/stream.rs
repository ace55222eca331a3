//! Reads a recorded packet stream: scans to the next packet marker
//! (tolerating arbitrary leading bytes), validates framing, and expands
//! collated packets - including the file-only oversize form - into the
//! logical message sequence.

use crate::collate::{decode_collated, COLLATED_COMPRESS};
use crate::crc::crc16;
use crate::error::{Error, WireResult};
use crate::messages::ROUTING_COLLATED_PACKET;
use crate::packet::{
    PacketHeader, PACKET_CRC_SIZE, PACKET_HEADER_SIZE, PACKET_MARKER_BYTES,
};
use byteorder::{BigEndian, ByteOrder};
use std::collections::VecDeque;
use std::io::{BufReader, Read};

pub struct PacketStreamReader<R: Read> {
    reader: BufReader<R>,
    pending: VecDeque<Vec<u8>>,
}

impl<R: Read> PacketStreamReader<R> {
    pub fn new(source: R) -> PacketStreamReader<R> {
        PacketStreamReader {
            reader: BufReader::new(source),
            pending: VecDeque::new(),
        }
    }

    /// Returns the next logical packet, or `None` at end of stream. Collated
    /// packets are expanded into their inner packets; packets with a bad CRC
    /// are discarded and scanning resumes at the next marker.
    pub fn next_packet(&mut self) -> WireResult<Option<Vec<u8>>> {
        loop {
            if let Some(packet) = self.pending.pop_front() {
                return Ok(Some(packet));
            }

            if !self.scan_to_marker()? {
                return Ok(None);
            }

            let mut packet = Vec::with_capacity(PACKET_HEADER_SIZE);
            packet.extend_from_slice(&PACKET_MARKER_BYTES);
            packet.resize(PACKET_HEADER_SIZE, 0);
            self.read_exact(&mut packet[PACKET_MARKER_BYTES.len()..])?;
            let header = PacketHeader::read(&packet)?;

            if header.routing_id == ROUTING_COLLATED_PACKET && !header.has_crc() {
                // The oversize file form: the payload size field is
                // unreliable, the collated header bounds the data.
                self.read_oversize_collated(&mut packet)?;
                self.pending.extend(decode_collated(&packet)?);
                continue;
            }

            let body = header.payload_size as usize
                + if header.has_crc() { PACKET_CRC_SIZE } else { 0 };
            let header_end = packet.len();
            packet.resize(header_end + body, 0);
            self.read_exact(&mut packet[header_end..])?;

            if header.has_crc() {
                let payload_end = PACKET_HEADER_SIZE + header.payload_size as usize;
                let stored = BigEndian::read_u16(&packet[payload_end..]);
                if stored != crc16(&packet[..payload_end]) {
                    // Drop the damaged packet and resume at the next marker.
                    continue;
                }
            }

            if header.routing_id == ROUTING_COLLATED_PACKET {
                self.pending.extend(decode_collated(&packet)?);
                continue;
            }

            return Ok(Some(packet));
        }
    }

    /// Consumes bytes until the packet marker has been read. Returns false
    /// at end of stream.
    fn scan_to_marker(&mut self) -> WireResult<bool> {
        let mut matched = 0usize;
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(false),
                Ok(_) => {}
                Err(err) => return Err(err.into()),
            }
            if byte[0] == PACKET_MARKER_BYTES[matched] {
                matched += 1;
                if matched == PACKET_MARKER_BYTES.len() {
                    return Ok(true);
                }
            } else {
                // A mismatch can still begin a new marker.
                matched = usize::from(byte[0] == PACKET_MARKER_BYTES[0]);
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> WireResult<()> {
        self.reader.read_exact(buf).map_err(|_| Error::Truncated)
    }

    /// Reads the body of an oversize collated packet: the 8 byte collated
    /// message bounds the data, either by the uncompressed byte count or by
    /// the gzip stream itself.
    fn read_oversize_collated(&mut self, packet: &mut Vec<u8>) -> WireResult<()> {
        let message_at = packet.len();
        packet.resize(message_at + 8, 0);
        self.read_exact(&mut packet[message_at..])?;
        let flags = BigEndian::read_u16(&packet[message_at..]);
        let uncompressed = BigEndian::read_u32(&packet[message_at + 4..]) as usize;

        if flags & COLLATED_COMPRESS != 0 {
            // The gzip stream consumes exactly its own compressed bytes from
            // the buffered reader; rebuild the packet uncompressed.
            let mut data = Vec::with_capacity(uncompressed);
            let mut decoder = flate2::bufread::GzDecoder::new(&mut self.reader);
            decoder
                .read_to_end(&mut data)
                .map_err(|_| Error::Truncated)?;
            if data.len() != uncompressed {
                return Err(Error::Truncated);
            }
            BigEndian::write_u16(
                &mut packet[message_at..message_at + 2],
                flags & !COLLATED_COMPRESS,
            );
            packet.extend_from_slice(&data);
        } else {
            let data_at = packet.len();
            packet.resize(data_at + uncompressed, 0);
            self.read_exact(&mut packet[data_at..])?;
        }
        Ok(())
    }
}
