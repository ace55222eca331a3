//! The file stream connection variant: the same pipeline as TCP writing a
//! recording instead of a socket. The stream opens with the server info
//! packet followed by a frame count placeholder; closing patches the
//! placeholder with the real frame count.
//!
//! This is also the only path allowed to emit oversize collated packets.

use super::connection::{BaseConnection, Connection};
use super::Sink;
use crate::collate::CollatedPacket;
use crate::error::{Error, WireResult};
use crate::messages::{ControlId, ControlMessage, Message, ServerInfoMessage, ROUTING_CONTROL};
use crate::packet::PacketWriter;
use crate::resource::Resource;
use crate::settings::ServerSettings;
use crate::shapes::Shape;
use ember::logging::{self, Logger};
use ember::time::timestamp_secs;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Builds the frame count control packet written at stream start and
/// patched on close. Fixed size, so the patch overwrites in place.
fn frame_count_packet(frame_count: u32) -> WireResult<Vec<u8>> {
    let mut writer = PacketWriter::new(256);
    writer.reset(ROUTING_CONTROL, ControlId::FrameCount.into());
    ControlMessage {
        control_flags: 0,
        value32: frame_count,
        value64: 0,
    }
    .write(&mut writer)?;
    writer.finalise()?;
    Ok(writer.packet_bytes().to_vec())
}

pub(crate) struct FileSink {
    file: Option<File>,
    path: String,
    frame_count_at: Option<u64>,
}

impl FileSink {
    /// Writes the frame count placeholder at the current position,
    /// remembering the offset for the close time patch.
    fn write_frame_count_placeholder(&mut self) -> WireResult<()> {
        let file = self.file.as_mut().ok_or(Error::ConnectionLost)?;
        let offset = file.stream_position()?;
        file.write_all(&frame_count_packet(0)?)?;
        self.frame_count_at = Some(offset);
        Ok(())
    }

    /// Seeks back and overwrites the placeholder with the final count, then
    /// flushes and closes the file.
    fn finalise(&mut self, frame_count: u32) -> WireResult<()> {
        let file = match &mut self.file {
            Some(file) => file,
            None => return Ok(()),
        };
        file.flush()?;
        if let Some(offset) = self.frame_count_at {
            let end = file.stream_position()?;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&frame_count_packet(frame_count)?)?;
            file.seek(SeekFrom::Start(end))?;
            file.set_len(end)?;
            file.flush()?;
        }
        self.file = None;
        Ok(())
    }
}

impl Sink for FileSink {
    fn write_all_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.write_all(bytes),
            None => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    fn close(&mut self) {
        // Dropped without finalise when the connection is torn down early;
        // the frame count then stays at the placeholder value.
        if let Some(file) = self.file.take() {
            let _ = (&file).flush();
        }
    }

    fn address(&self) -> String {
        self.path.clone()
    }

    fn port(&self) -> u16 {
        0
    }
}

/// A recording of the connection stream, replayable through
/// `PacketStreamReader`.
pub struct FileConnection {
    base: BaseConnection<FileSink>,
    frame_count: AtomicU32,
}

impl FileConnection {
    pub fn create<'a, P: AsRef<Path>, L: Into<Option<&'a Logger>>>(
        path: P,
        settings: &ServerSettings,
        log: L,
    ) -> WireResult<FileConnection> {
        let path_text = path.as_ref().display().to_string();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let log = logging::child_of(log);
        logging::debug!(log, "file stream opened";
                        "path" => &path_text,
                        "started_at" => timestamp_secs());
        Ok(FileConnection {
            base: BaseConnection::new(
                settings,
                FileSink {
                    file: Some(file),
                    path: path_text,
                    frame_count_at: None,
                },
                log,
            ),
            frame_count: AtomicU32::new(0),
        })
    }

    #[inline]
    pub fn filename(&self) -> String {
        self.base.address()
    }

    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.frame_count.load(Ordering::SeqCst)
    }

    /// Writes a finalised collated packet straight to the recording. This
    /// path accepts the oversize file stream form that live connections
    /// must never produce.
    pub fn send_oversize(&self, collated: &CollatedPacket) -> i32 {
        if !self.base.active() {
            return 0;
        }
        if !collated.is_finalised() {
            return -1;
        }
        // Keep stream order against any pending collated data.
        if self.base.flush_collation().is_err() {
            return -1;
        }
        match self.base.write_direct(collated.buffer()) {
            Ok(count) => count.min(i32::MAX as usize) as i32,
            Err(_) => -1,
        }
    }
}

impl Connection for FileConnection {
    fn address(&self) -> String {
        self.base.address()
    }

    fn port(&self) -> u16 {
        0
    }

    fn is_connected(&self) -> bool {
        self.base.is_connected()
    }

    fn close(&self) {
        let _ = self.base.flush_collation();
        let frame_count = self.frame_count.load(Ordering::SeqCst);
        if self.base.with_sink(|sink| sink.finalise(frame_count)).is_err() {
            logging::warn!(self.base.log(), "file stream finalise failed";
                           "path" => self.base.address());
        }
        self.base.close();
    }

    fn set_active(&self, active: bool) {
        self.base.set_active(active);
    }

    fn active(&self) -> bool {
        self.base.active()
    }

    /// Sends the server info, then plants the frame count placeholder the
    /// close time patch rewrites.
    fn send_server_info(&self, info: &ServerInfoMessage) -> bool {
        if !self.base.send_server_info(info) {
            return false;
        }
        self.base
            .with_sink(|sink| sink.write_frame_count_placeholder())
            .is_ok()
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
        self.frame_count.fetch_add(1, Ordering::SeqCst);
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

impl Drop for FileConnection {
    fn drop(&mut self) {
        if self.base.is_connected() {
            Connection::close(self);
        }
    }
}
