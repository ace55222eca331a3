//! The live TCP connection variant. Sockets are blocking with no delay so
//! shape bursts leave promptly; a failed write marks the connection lost and
//! the monitor reaps it on its next tick.

use super::connection::{BaseConnection, Connection};
use super::Sink;
use crate::collate::CollatedPacket;
use crate::messages::ServerInfoMessage;
use crate::resource::Resource;
use crate::settings::ServerSettings;
use crate::shapes::Shape;
use ember::logging::{self, Logger};
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

pub(crate) struct TcpSink {
    stream: Option<TcpStream>,
    peer: SocketAddr,
}

impl Sink for TcpSink {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &mut self.stream {
            Some(stream) => stream.write_all(bytes),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn address(&self) -> String {
        self.peer.ip().to_string()
    }

    fn port(&self) -> u16 {
        self.peer.port()
    }
}

pub struct TcpConnection {
    base: BaseConnection<TcpSink>,
}

impl TcpConnection {
    /// Wraps an accepted client socket. Disables Nagle and leaves writes
    /// blocking without a timeout.
    pub(crate) fn new<'a, L: Into<Option<&'a Logger>>>(
        stream: TcpStream,
        settings: &ServerSettings,
        log: L,
    ) -> io::Result<TcpConnection> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(false)?;
        stream.set_write_timeout(None)?;
        let log = logging::child_of(log);
        logging::debug!(log, "client connected"; "peer" => %peer);
        Ok(TcpConnection {
            base: BaseConnection::new(
                settings,
                TcpSink {
                    stream: Some(stream),
                    peer,
                },
                log,
            ),
        })
    }
}

impl Connection for TcpConnection {
    fn address(&self) -> String {
        self.base.address()
    }

    fn port(&self) -> u16 {
        self.base.port()
    }

    fn is_connected(&self) -> bool {
        self.base.is_connected()
    }

    fn close(&self) {
        self.base.close();
    }

    fn set_active(&self, active: bool) {
        self.base.set_active(active);
    }

    fn active(&self) -> bool {
        self.base.active()
    }

    fn send_server_info(&self, info: &ServerInfoMessage) -> bool {
        self.base.send_server_info(info)
    }

    fn send(&self, bytes: &[u8], allow_collation: bool) -> i32 {
        self.base.send(bytes, allow_collation)
    }

    fn send_collated(&self, collated: &CollatedPacket) -> i32 {
        self.base.send_collated(collated)
    }

    fn create(&self, shape: &Shape) -> i32 {
        self.base.create(shape)
    }

    fn update(&self, shape: &Shape) -> i32 {
        self.base.update(shape)
    }

    fn destroy(&self, shape: &Shape) -> i32 {
        self.base.destroy(shape)
    }

    fn update_frame(&self, dt: f32, flush: bool) -> i32 {
        self.base.update_frame(dt, flush)
    }

    fn update_transfers(&self, byte_limit: u32) -> i32 {
        self.base.update_transfers(byte_limit)
    }

    fn reference_resource(&self, resource: &Arc<dyn Resource>) -> u32 {
        self.base.reference_resource(resource)
    }

    fn release_resource(&self, resource: &Arc<dyn Resource>) -> u32 {
        self.base.release_resource(resource)
    }
}
