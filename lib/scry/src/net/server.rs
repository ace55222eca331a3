//! The fan-out server: every shape, resource and frame call is forwarded to
//! each committed connection. Return values sum the per connection byte
//! counts and are negated when any child fails; an inactive server answers
//! zero to everything.

use super::monitor::{ConnectionMonitor, MonitorMode};
use super::Connection;
use crate::collate::CollatedPacket;
use crate::messages::ServerInfoMessage;
use crate::resource::Resource;
use crate::settings::ServerSettings;
use crate::shapes::Shape;
use ember::logging::{self, Logger};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type ConnectionCallback = Box<dyn Fn(&Server, &Arc<dyn Connection>) + Send + Sync>;

struct ServerInner {
    settings: ServerSettings,
    server_info: ServerInfoMessage,
    connections: Mutex<Vec<Arc<dyn Connection>>>,
    callback: Mutex<Option<ConnectionCallback>>,
    active: AtomicBool,
    log: Logger,
}

#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
    monitor: ConnectionMonitor,
}

impl Server {
    pub fn new<'a, L: Into<Option<&'a Logger>>>(
        settings: ServerSettings,
        server_info: Option<ServerInfoMessage>,
        log: L,
    ) -> Server {
        let log = logging::child_of(log);
        let monitor = ConnectionMonitor::new(settings.clone(), log.clone());
        Server {
            inner: Arc::new(ServerInner {
                settings,
                server_info: server_info.unwrap_or_default(),
                connections: Mutex::new(Vec::new()),
                callback: Mutex::new(None),
                active: AtomicBool::new(true),
                log,
            }),
            monitor,
        }
    }

    #[inline]
    pub fn settings(&self) -> &ServerSettings {
        &self.inner.settings
    }

    #[inline]
    pub fn server_info(&self) -> &ServerInfoMessage {
        &self.inner.server_info
    }

    #[inline]
    pub fn connection_monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    #[inline]
    pub fn set_active(&self, active: bool) {
        self.inner.active.store(active, Ordering::SeqCst);
    }

    #[inline]
    pub fn active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Invoked for each newly committed connection, after its server info
    /// message, so the embedder can replay scene state to the newcomer.
    pub fn set_connection_callback<F>(&self, callback: F)
    where
        F: Fn(&Server, &Arc<dyn Connection>) + Send + Sync + 'static,
    {
        *self.inner.callback.lock() = Some(Box::new(callback));
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    pub fn connection(&self, index: usize) -> Option<Arc<dyn Connection>> {
        self.inner.connections.lock().get(index).cloned()
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.connections.lock().is_empty()
    }

    /// Stops the monitor and closes every connection.
    pub fn close(&self) {
        self.monitor.stop();
        self.monitor.join();
        for connection in self.inner.connections.lock().iter() {
            connection.close();
        }
    }

    fn fan_out<F: FnMut(&Arc<dyn Connection>) -> i32>(&self, mut op: F) -> i32 {
        if !self.active() {
            return 0;
        }
        let connections = self.inner.connections.lock();
        let mut transferred: i64 = 0;
        let mut error = false;
        for connection in connections.iter() {
            let txc = op(connection);
            if txc >= 0 {
                transferred += i64::from(txc);
            } else {
                error = true;
            }
        }
        let transferred = transferred.min(i64::from(i32::MAX)) as i32;
        if error {
            -transferred
        } else {
            transferred
        }
    }

    pub fn create(&self, shape: &Shape) -> i32 {
        self.fan_out(|connection| connection.create(shape))
    }

    pub fn update(&self, shape: &Shape) -> i32 {
        self.fan_out(|connection| connection.update(shape))
    }

    pub fn destroy(&self, shape: &Shape) -> i32 {
        self.fan_out(|connection| connection.destroy(shape))
    }

    /// Ends the frame on every connection. In asynchronous mode newly
    /// accepted connections commit after the frame so their callback replay
    /// does not double up with buffered creates.
    pub fn update_frame(&self, dt: f32, flush: bool) -> i32 {
        let result = self.fan_out(|connection| connection.update_frame(dt, flush));
        if self.monitor.mode() == MonitorMode::Asynchronous {
            self.monitor.commit_connections(self);
        }
        result
    }

    pub fn update_transfers(&self, byte_limit: u32) -> i32 {
        self.fan_out(|connection| connection.update_transfers(byte_limit))
    }

    pub fn send(&self, bytes: &[u8], allow_collation: bool) -> i32 {
        self.fan_out(|connection| connection.send(bytes, allow_collation))
    }

    pub fn send_collated(&self, collated: &CollatedPacket) -> i32 {
        self.fan_out(|connection| connection.send_collated(collated))
    }

    /// References a resource on every connection. Returns the count from the
    /// last connection.
    pub fn reference_resource(&self, resource: &Arc<dyn Resource>) -> u32 {
        if !self.active() {
            return 0;
        }
        let connections = self.inner.connections.lock();
        let mut last = 0;
        for connection in connections.iter() {
            last = connection.reference_resource(resource);
        }
        last
    }

    pub fn release_resource(&self, resource: &Arc<dyn Resource>) -> u32 {
        if !self.active() {
            return 0;
        }
        let connections = self.inner.connections.lock();
        let mut last = 0;
        for connection in connections.iter() {
            last = connection.release_resource(resource);
        }
        last
    }

    /// Swaps in the monitored connection set. New connections get the server
    /// info message and the connection callback, outside the connection list
    /// lock so callbacks can use the server freely.
    pub(crate) fn update_connections(&self, connections: Vec<Arc<dyn Connection>>) {
        if !self.active() {
            return;
        }
        let fresh: Vec<Arc<dyn Connection>> = {
            let mut current = self.inner.connections.lock();
            let fresh = connections
                .iter()
                .filter(|connection| {
                    !current.iter().any(|existing| Arc::ptr_eq(existing, connection))
                })
                .cloned()
                .collect();
            *current = connections;
            fresh
        };

        for connection in &fresh {
            logging::debug!(self.inner.log, "committing connection"; "address" => connection.address());
            connection.send_server_info(&self.inner.server_info);
            let callback = self.inner.callback.lock();
            if let Some(callback) = callback.as_ref() {
                callback(self, connection);
            }
        }
    }
}
