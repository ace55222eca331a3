//! The per connection outbound pipeline shared by the TCP and file stream
//! variants: a packet assembly buffer behind the packet lock, the collator
//! and sink behind the send lock, and the refcounted resource registry
//! behind its own lock. Lock order is packet before send; the resource lock
//! never wraps either.

use super::Sink;
use crate::collate::{split_packets, CollatedPacket};
use crate::error::{Error, WireResult};
use crate::messages::{
    ControlId, ControlMessage, Message, ServerInfoMessage, CF_FRAME_PERSIST, ROUTING_CONTROL,
    ROUTING_SERVER_INFO,
};
use crate::packet::PacketWriter;
use crate::resource::{Resource, ResourcePacker};
use crate::settings::ServerSettings;
use crate::shapes::{DataProgress, Shape};
use ember::logging::{self, Logger};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const SECONDS_TO_MICROSECONDS: f64 = 1e6;

/// A single client of the server: every call packs messages and delivers
/// them to this connection's byte sink. Byte count returns are negative on
/// failure and zero when the endpoint is inactive.
pub trait Connection: Send + Sync {
    fn address(&self) -> String;
    fn port(&self) -> u16;
    fn is_connected(&self) -> bool;
    fn close(&self);
    fn set_active(&self, active: bool);
    fn active(&self) -> bool;

    /// Sends the server info message as a standalone, uncollated packet.
    fn send_server_info(&self, info: &ServerInfoMessage) -> bool;

    /// Sends pre-packed packet bytes, optionally through the collator.
    fn send(&self, bytes: &[u8], allow_collation: bool) -> i32;

    /// Fans a finalised, uncompressed collated packet out as individual
    /// sends of its inner packets.
    fn send_collated(&self, collated: &CollatedPacket) -> i32;

    fn create(&self, shape: &Shape) -> i32;
    fn update(&self, shape: &Shape) -> i32;
    fn destroy(&self, shape: &Shape) -> i32;

    /// Ends the frame: emits the frame control message and flushes the
    /// collator. `flush` clear requests transient persistence.
    fn update_frame(&self, dt: f32, flush: bool) -> i32;

    /// Advances queued resource transfers under a byte budget (zero for
    /// unlimited).
    fn update_transfers(&self, byte_limit: u32) -> i32;

    fn reference_resource(&self, resource: &Arc<dyn Resource>) -> u32;
    fn release_resource(&self, resource: &Arc<dyn Resource>) -> u32;
}

struct PacketState {
    writer: PacketWriter,
    server_info: ServerInfoMessage,
    seconds_to_time_unit: f64,
}

struct SendState<S: Sink> {
    sink: S,
    collation: CollatedPacket,
}

struct ResourceInfo {
    resource: Arc<dyn Resource>,
    reference_count: u32,
    started: bool,
    sent: bool,
}

struct ResourceState {
    registry: HashMap<u64, ResourceInfo>,
    queue: VecDeque<u64>,
    packer: ResourcePacker,
}

/// Pipeline state shared by the connection variants, generic over the sink.
pub(crate) struct BaseConnection<S: Sink> {
    packet: Mutex<PacketState>,
    send: Mutex<SendState<S>>,
    resources: Mutex<ResourceState>,
    server_flags: u32,
    active: AtomicBool,
    connected: AtomicBool,
    log: Logger,
}

impl<S: Sink> BaseConnection<S> {
    pub(crate) fn new(settings: &ServerSettings, sink: S, log: Logger) -> BaseConnection<S> {
        let server_info = ServerInfoMessage::default();
        let mut collation = CollatedPacket::new(settings.compress());
        collation.set_compression_level(settings.compression_level);
        BaseConnection {
            packet: Mutex::new(PacketState {
                writer: PacketWriter::new(usize::from(settings.client_buffer_size)),
                seconds_to_time_unit: seconds_to_time_unit(&server_info),
                server_info,
            }),
            send: Mutex::new(SendState { sink, collation }),
            resources: Mutex::new(ResourceState {
                registry: HashMap::new(),
                queue: VecDeque::new(),
                packer: ResourcePacker::new(),
            }),
            server_flags: settings.flags,
            active: AtomicBool::new(true),
            connected: AtomicBool::new(true),
            log,
        }
    }

    #[inline]
    pub(crate) fn log(&self) -> &Logger {
        &self.log
    }

    #[inline]
    pub(crate) fn active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn address(&self) -> String {
        self.send.lock().sink.address()
    }

    pub(crate) fn port(&self) -> u16 {
        self.send.lock().sink.port()
    }

    pub(crate) fn close(&self) {
        let mut send = self.send.lock();
        let _ = self.flush_collation_locked(&mut send);
        send.sink.close();
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Runs a closure against the locked sink. Used by the file variant for
    /// stream bootstrap and finalisation.
    pub(crate) fn with_sink<T>(&self, op: impl FnOnce(&mut S) -> T) -> T {
        let mut send = self.send.lock();
        op(&mut send.sink)
    }

    /// Flushes any pending collated data to the sink.
    pub(crate) fn flush_collation(&self) -> WireResult<()> {
        let mut send = self.send.lock();
        self.flush_collation_locked(&mut send)
    }

    /// Writes bytes straight to the sink, bypassing the collator.
    pub(crate) fn write_direct(&self, bytes: &[u8]) -> WireResult<usize> {
        let mut send = self.send.lock();
        self.write_to_sink(&mut send, bytes)
    }

    pub(crate) fn send_server_info(&self, info: &ServerInfoMessage) -> bool {
        if !self.active() {
            return false;
        }
        let mut state = self.packet.lock();
        state.server_info = *info;
        state.seconds_to_time_unit = seconds_to_time_unit(info);

        if !self.is_connected() {
            return false;
        }
        state.writer.reset(ROUTING_SERVER_INFO, 0);
        if info.write(&mut state.writer).is_err() || state.writer.finalise().is_err() {
            return false;
        }
        // No collation or compression for this message.
        let mut send = self.send.lock();
        self.write_to_sink(&mut send, state.writer.packet_bytes()).is_ok()
    }

    pub(crate) fn send(&self, bytes: &[u8], allow_collation: bool) -> i32 {
        if !self.active() {
            return 0;
        }
        match self.write_packet(bytes, allow_collation) {
            Ok(count) => count.min(i32::MAX as usize) as i32,
            Err(_) => -1,
        }
    }

    pub(crate) fn send_collated(&self, collated: &CollatedPacket) -> i32 {
        if !self.active() {
            return 0;
        }
        // Compression is not reversible on this fan-out path.
        if !collated.is_finalised() || collated.compression_enabled() {
            return -1;
        }
        // Hold the packet lock so the inner sequence is not interleaved.
        let _guard = self.packet.lock();
        let packets = match split_packets(collated.collated_data()) {
            Ok(packets) => packets,
            Err(_) => return -1,
        };
        let mut sent: i64 = 0;
        for packet in packets {
            if self.write_packet(packet, true).is_err() {
                return -1;
            }
            sent += packet.len() as i64;
        }
        sent.min(i64::from(i32::MAX)) as i32
    }

    pub(crate) fn create(&self, shape: &Shape) -> i32 {
        if !self.active() {
            return 0;
        }
        let mut state = self.packet.lock();
        if shape.write_create(&mut state.writer).is_err() || state.writer.finalise().is_err() {
            return -1;
        }
        if self.write_packet(state.writer.packet_bytes(), true).is_err() {
            return -1;
        }
        let mut total = state.writer.packet_size() as i64;

        // Complex shapes stream their data messages in the same critical
        // section, keeping the create and data sequence contiguous.
        if shape.is_complex() {
            let mut progress = DataProgress::default();
            loop {
                let more = match shape.write_data(&mut state.writer, &mut progress) {
                    Ok(more) => more,
                    Err(_) => return -1,
                };
                if state.writer.finalise().is_err()
                    || self.write_packet(state.writer.packet_bytes(), true).is_err()
                {
                    return -1;
                }
                total += state.writer.packet_size() as i64;
                if !more {
                    break;
                }
            }
        }

        if !shape.skip_resources() {
            self.queue_resources(shape);
        }

        if total > i64::from(i32::MAX) {
            logging::warn!(self.log, "large byte transfer for shape";
                           "routing_id" => shape.routing_id(),
                           "object_id" => shape.object_id(),
                           "bytes" => total);
            total = i64::from(i32::MAX);
        }
        total as i32
    }

    pub(crate) fn update(&self, shape: &Shape) -> i32 {
        if !self.active() {
            return 0;
        }
        let mut state = self.packet.lock();
        if shape.write_update(&mut state.writer).is_err() || state.writer.finalise().is_err() {
            return -1;
        }
        match self.write_packet(state.writer.packet_bytes(), true) {
            Ok(_) => state.writer.packet_size() as i32,
            Err(_) => -1,
        }
    }

    pub(crate) fn destroy(&self, shape: &Shape) -> i32 {
        if !self.active() {
            return 0;
        }
        let mut state = self.packet.lock();

        // Transient shapes never see a destroy call, so persistent release
        // is the only resource path here.
        if shape.object_id() != 0 && !shape.skip_resources() {
            for resource in shape.enumerate_resources() {
                self.release_key(&mut state, resource.unique_key());
            }
        }

        if shape.write_destroy(&mut state.writer).is_err() || state.writer.finalise().is_err() {
            return -1;
        }
        match self.write_packet(state.writer.packet_bytes(), true) {
            Ok(_) => state.writer.packet_size() as i32,
            Err(_) => -1,
        }
    }

    pub(crate) fn update_frame(&self, dt: f32, flush: bool) -> i32 {
        if !self.active() {
            return 0;
        }
        let mut state = self.packet.lock();

        let ticks = (f64::from(dt) * state.seconds_to_time_unit).round();
        let value32 = if ticks > f64::from(u32::MAX) {
            logging::warn!(self.log, "frame time overflows the tick field, clamping"; "dt" => dt);
            u32::MAX
        } else if ticks < 0.0 {
            0
        } else {
            ticks as u32
        };

        let message = ControlMessage {
            control_flags: if flush { 0 } else { CF_FRAME_PERSIST },
            value32,
            value64: 0,
        };
        state.writer.reset(ROUTING_CONTROL, ControlId::Frame.into());
        if message.write(&mut state.writer).is_err() || state.writer.finalise().is_err() {
            return -1;
        }
        let allow_collation = self.server_flags & crate::settings::SF_NAKED_FRAME_MESSAGE == 0;
        let wrote = match self.write_packet(state.writer.packet_bytes(), allow_collation) {
            Ok(_) => state.writer.packet_size() as i32,
            Err(_) => -1,
        };
        let _ = self.flush_collation();
        wrote
    }

    pub(crate) fn update_transfers(&self, byte_limit: u32) -> i32 {
        if !self.active() {
            return 0;
        }
        let mut state = self.packet.lock();
        let mut resources = self.resources.lock();
        let mut transferred: u32 = 0;

        loop {
            if byte_limit > 0 && transferred >= byte_limit {
                break;
            }

            if !resources.packer.is_valid() {
                // Start the next queued transfer. Stale keys released in the
                // meantime simply fall through.
                match resources.queue.pop_front() {
                    Some(key) => {
                        let next = resources.registry.get_mut(&key).map(|info| {
                            info.started = true;
                            Arc::clone(&info.resource)
                        });
                        if let Some(resource) = next {
                            resources.packer.transfer(resource);
                        }
                        continue;
                    }
                    None => break,
                }
            }

            let budget = if byte_limit > 0 { byte_limit - transferred } else { 0 };
            let wrote = match resources.packer.next_packet(&mut state.writer, budget) {
                Ok(wrote) => wrote,
                Err(_) => return -1,
            };
            if !wrote {
                break;
            }
            if state.writer.finalise().is_err()
                || self.write_packet(state.writer.packet_bytes(), true).is_err()
            {
                return -1;
            }
            transferred += state.writer.packet_size() as u32;

            if !resources.packer.is_valid() {
                if let Some(key) = resources.packer.last_completed_key() {
                    if let Some(info) = resources.registry.get_mut(&key) {
                        info.sent = true;
                    }
                }
            }
        }

        transferred.min(i32::MAX as u32) as i32
    }

    pub(crate) fn reference_resource(&self, resource: &Arc<dyn Resource>) -> u32 {
        if !self.active() {
            return 0;
        }
        self.reference_resource_arc(Arc::clone(resource))
    }

    pub(crate) fn release_resource(&self, resource: &Arc<dyn Resource>) -> u32 {
        if !self.active() {
            return 0;
        }
        let mut state = self.packet.lock();
        self.release_key(&mut state, resource.unique_key())
    }

    /// The refcount currently held for a resource; zero when unknown.
    pub(crate) fn resource_reference_count(&self, key: u64) -> u32 {
        self.resources
            .lock()
            .registry
            .get(&key)
            .map_or(0, |info| info.reference_count)
    }

    fn reference_resource_arc(&self, resource: Arc<dyn Resource>) -> u32 {
        let mut resources = self.resources.lock();
        let key = resource.unique_key();
        if let Some(info) = resources.registry.get_mut(&key) {
            info.reference_count += 1;
            return info.reference_count;
        }
        resources.registry.insert(
            key,
            ResourceInfo {
                resource,
                reference_count: 1,
                started: false,
                sent: false,
            },
        );
        resources.queue.push_back(key);
        1
    }

    /// Releases one reference. On the last release of a started or sent
    /// resource a destroy message is emitted. The caller holds the packet
    /// lock through `state`.
    fn release_key(&self, state: &mut PacketState, key: u64) -> u32 {
        let mut resources = self.resources.lock();
        let info = match resources.registry.get_mut(&key) {
            Some(info) => info,
            // Unknown resources release as a no-op.
            None => return 0,
        };
        if info.reference_count > 1 {
            info.reference_count -= 1;
            return info.reference_count;
        }

        let emit = info.started || info.sent;
        let resource = Arc::clone(&info.resource);
        resources.registry.remove(&key);
        if resources
            .packer
            .resource()
            .map_or(false, |current| current.unique_key() == key)
        {
            // A release racing the in-flight transfer severs it.
            resources.packer.cancel();
        }
        drop(resources);

        if emit
            && resource.write_destroy(&mut state.writer).is_ok()
            && state.writer.finalise().is_ok()
        {
            let _ = self.write_packet(state.writer.packet_bytes(), true);
        }
        0
    }

    fn queue_resources(&self, shape: &Shape) {
        if shape.is_transient() {
            // Transient shapes must find their resources already present.
            let resources = self.resources.lock();
            for resource in shape.enumerate_resources() {
                if !resources.registry.contains_key(&resource.unique_key()) {
                    logging::warn!(self.log, "transient shape references missing resource";
                                   "routing_id" => shape.routing_id(),
                                   "resource_type" => resource.type_id(),
                                   "resource_id" => resource.id());
                }
            }
            return;
        }
        for resource in shape.enumerate_resources() {
            self.reference_resource_arc(resource);
        }
    }

    /// The send path of §connection pipeline: flush-on-demand, collate when
    /// allowed, fall back to a direct write for oversize packets.
    fn write_packet(&self, bytes: &[u8], allow_collation: bool) -> WireResult<usize> {
        let mut send = self.send.lock();
        let collate = self.server_flags & crate::settings::SF_COLLATE != 0;

        if collate && !allow_collation {
            self.flush_collation_locked(&mut send)?;
        }
        if !collate || !allow_collation {
            return self.write_to_sink(&mut send, bytes);
        }

        if bytes.len() >= send.collation.available_bytes() {
            self.flush_collation_locked(&mut send)?;
        }
        match send.collation.add(bytes) {
            Ok(count) => Ok(count),
            Err(Error::OversizedPacket) => {
                // Too big to collate at all; send uncollated.
                self.flush_collation_locked(&mut send)?;
                self.write_to_sink(&mut send, bytes)
            }
            Err(err) => Err(err),
        }
    }

    fn flush_collation_locked(&self, send: &mut SendState<S>) -> WireResult<()> {
        if send.collation.collated_bytes() == 0 {
            return Ok(());
        }
        send.collation.finalise()?;
        let SendState { sink, collation } = send;
        let result = sink.write_all_bytes(collation.buffer());
        collation.reset();
        result.map_err(|err| self.sink_failed(err))
    }

    fn write_to_sink(&self, send: &mut SendState<S>, bytes: &[u8]) -> WireResult<usize> {
        match send.sink.write_all_bytes(bytes) {
            Ok(()) => Ok(bytes.len()),
            Err(err) => Err(self.sink_failed(err)),
        }
    }

    fn sink_failed(&self, err: std::io::Error) -> Error {
        self.connected.store(false, Ordering::SeqCst);
        logging::warn!(self.log, "sink write failed, dropping connection"; "error" => %err);
        Error::ConnectionLost
    }
}

#[inline]
fn seconds_to_time_unit(info: &ServerInfoMessage) -> f64 {
    SECONDS_TO_MICROSECONDS
        / if info.time_unit != 0 {
            info.time_unit as f64
        } else {
            1.0
        }
}
