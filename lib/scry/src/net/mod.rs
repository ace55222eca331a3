//! The server side transport: per connection outbound pipelines, the TCP and
//! file stream connection variants, the connection monitor and the fan-out
//! server.

pub mod connection;
pub mod file;
pub mod monitor;
pub mod server;
pub mod tcp;

pub use connection::Connection;
pub use file::FileConnection;
pub use monitor::{ConnectionMonitor, MonitorMode};
pub use server::Server;
pub use tcp::TcpConnection;

use crate::error::WireResult;
use crate::messages::Message;
use crate::packet::PacketWriter;
use std::io;

/// The byte sink under a connection: a TCP stream or a file.
pub(crate) trait Sink: Send {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn close(&mut self);
    fn address(&self) -> String;
    fn port(&self) -> u16;
}

/// Packs an arbitrary message into a standalone packet.
pub fn pack_message<M: Message>(
    routing_id: u16,
    message_id: u16,
    message: &M,
) -> WireResult<Vec<u8>> {
    let mut writer = PacketWriter::new(1024);
    writer.reset(routing_id, message_id);
    message.write(&mut writer)?;
    writer.finalise()?;
    Ok(writer.packet_bytes().to_vec())
}

/// Packs and sends an arbitrary message through a connection. Returns the
/// bytes sent, negative on failure.
pub fn send_message<M: Message>(
    connection: &dyn Connection,
    routing_id: u16,
    message_id: u16,
    message: &M,
    allow_collation: bool,
) -> i32 {
    match pack_message(routing_id, message_id, message) {
        Ok(bytes) => connection.send(&bytes, allow_collation),
        Err(_) => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{CategoryNameMessage, ROUTING_CATEGORY};
    use crate::packet::PacketReader;

    #[test]
    fn test_pack_message_frames_payload() {
        let message = CategoryNameMessage {
            category_id: 2,
            parent_id: 0,
            default_active: true,
            name: "walls".to_string(),
        };
        let bytes = pack_message(ROUTING_CATEGORY, 0, &message).unwrap();
        let mut reader = PacketReader::new(&bytes).unwrap();
        assert_eq!(reader.routing_id(), ROUTING_CATEGORY);
        assert_eq!(CategoryNameMessage::read(&mut reader).unwrap(), message);
    }
}
