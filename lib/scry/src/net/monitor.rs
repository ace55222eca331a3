//! Accepts new client connections and expires dead ones. Synchronous mode
//! has the host thread drive `monitor_connections` each tick; asynchronous
//! mode runs a dedicated thread on a sleep tick. Either way the host calls
//! `commit_connections` to publish the connection set to the server.

use super::file::FileConnection;
use super::server::Server;
use super::tcp::TcpConnection;
use super::Connection;
use crate::error::{Error, WireResult};
use crate::settings::ServerSettings;
use ember::logging::{self, Logger};
use parking_lot::Mutex;
use std::io;
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    None,
    Synchronous,
    Asynchronous,
}

/// Monitor error codes, readable through `last_error_code`.
pub const ME_NONE: i32 = 0;
pub const ME_LISTEN_FAILURE: i32 = 1;
pub const ME_TIMEOUT: i32 = 2;

struct MonitorInner {
    settings: ServerSettings,
    log: Logger,
    listener: Mutex<Option<TcpListener>>,
    listen_port: AtomicU16,
    connections: Mutex<Vec<Arc<dyn Connection>>>,
    expired: Mutex<Vec<Arc<dyn Connection>>>,
    mode: Mutex<MonitorMode>,
    running: AtomicBool,
    quit: AtomicBool,
    error: AtomicI32,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorInner {
    fn listen(&self) -> bool {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return true;
        }

        let first = self.settings.listen_port;
        let last = first.saturating_add(self.settings.port_range);
        for port in first..=last {
            match TcpListener::bind(("0.0.0.0", port)) {
                Ok(socket) => {
                    if socket.set_nonblocking(true).is_err() {
                        continue;
                    }
                    logging::info!(self.log, "listening"; "port" => port);
                    self.listen_port.store(port, Ordering::SeqCst);
                    *listener = Some(socket);
                    return true;
                }
                Err(err) => {
                    logging::debug!(self.log, "listen attempt failed";
                                    "port" => port, "error" => %err);
                }
            }
        }
        false
    }

    fn stop_listening(&self) {
        self.listen_port.store(0, Ordering::SeqCst);
        for connection in self.connections.lock().iter() {
            connection.close();
        }
        *self.listener.lock() = None;
    }

    /// One monitor tick: reap dead connections, accept at most one new one.
    fn monitor_connections(&self) {
        {
            let mut connections = self.connections.lock();
            let mut expired = self.expired.lock();
            connections.retain(|connection| {
                if connection.is_connected() {
                    true
                } else {
                    logging::warn!(self.log, "client dropped"; "address" => connection.address());
                    expired.push(Arc::clone(connection));
                    false
                }
            });
        }

        let accepted = {
            let listener = self.listener.lock();
            match listener.as_ref() {
                Some(listener) => match listener.accept() {
                    Ok((stream, _)) => Some(stream),
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => None,
                    Err(err) => {
                        logging::warn!(self.log, "accept failed"; "error" => %err);
                        None
                    }
                },
                None => None,
            }
        };

        if let Some(stream) = accepted {
            match TcpConnection::new(stream, &self.settings, &self.log) {
                Ok(connection) => {
                    self.connections.lock().push(Arc::new(connection));
                }
                Err(err) => {
                    logging::warn!(self.log, "client socket setup failed"; "error" => %err);
                }
            }
        }
    }

    fn monitor_thread(&self) {
        if !self.listen() {
            self.error.store(ME_LISTEN_FAILURE, Ordering::SeqCst);
            self.stop_listening();
            return;
        }
        self.running.store(true, Ordering::SeqCst);

        let tick = Duration::from_millis(self.settings.monitor_tick_ms);
        while !self.quit.load(Ordering::SeqCst) {
            self.monitor_connections();
            thread::sleep(tick);
        }

        self.running.store(false, Ordering::SeqCst);
        self.stop_listening();
        *self.mode.lock() = MonitorMode::None;
    }
}

#[derive(Clone)]
pub struct ConnectionMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectionMonitor {
    pub(crate) fn new(settings: ServerSettings, log: Logger) -> ConnectionMonitor {
        ConnectionMonitor {
            inner: Arc::new(MonitorInner {
                settings,
                log,
                listener: Mutex::new(None),
                listen_port: AtomicU16::new(0),
                connections: Mutex::new(Vec::new()),
                expired: Mutex::new(Vec::new()),
                mode: Mutex::new(MonitorMode::None),
                running: AtomicBool::new(false),
                quit: AtomicBool::new(false),
                error: AtomicI32::new(ME_NONE),
                thread: Mutex::new(None),
            }),
        }
    }

    pub fn mode(&self) -> MonitorMode {
        *self.inner.mode.lock()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// The bound listen port, zero while not listening.
    #[inline]
    pub fn port(&self) -> u16 {
        self.inner.listen_port.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn last_error_code(&self) -> i32 {
        self.inner.error.load(Ordering::SeqCst)
    }

    pub fn clear_error_code(&self) -> i32 {
        self.inner.error.swap(ME_NONE, Ordering::SeqCst)
    }

    /// Starts monitoring in the requested mode. A monitor already started in
    /// a different mode refuses.
    pub fn start(&self, mode: MonitorMode) -> bool {
        let current = *self.inner.mode.lock();
        if mode == MonitorMode::None || (current != MonitorMode::None && current != mode) {
            return false;
        }
        if current == mode {
            return true;
        }

        match mode {
            MonitorMode::Synchronous => {
                if self.inner.listen() {
                    self.inner.running.store(true, Ordering::SeqCst);
                    *self.inner.mode.lock() = MonitorMode::Synchronous;
                } else {
                    self.inner.error.store(ME_LISTEN_FAILURE, Ordering::SeqCst);
                    self.inner.stop_listening();
                }
            }
            MonitorMode::Asynchronous => {
                self.join();
                self.inner.quit.store(false, Ordering::SeqCst);
                let inner = Arc::clone(&self.inner);
                *self.inner.thread.lock() = Some(thread::spawn(move || inner.monitor_thread()));

                // Wait for the thread to come up or fail.
                let start = Instant::now();
                let timeout = Duration::from_millis(u64::from(self.inner.settings.async_timeout_ms));
                while !self.is_running()
                    && self.last_error_code() == ME_NONE
                    && start.elapsed() <= timeout
                {
                    thread::yield_now();
                }
                if self.is_running() {
                    *self.inner.mode.lock() = MonitorMode::Asynchronous;
                } else if self.last_error_code() == ME_NONE {
                    self.inner.error.store(ME_TIMEOUT, Ordering::SeqCst);
                }
            }
            MonitorMode::None => {}
        }

        self.mode() != MonitorMode::None
    }

    pub fn stop(&self) {
        match self.mode() {
            MonitorMode::Synchronous => {
                self.inner.running.store(false, Ordering::SeqCst);
                self.inner.stop_listening();
                *self.inner.mode.lock() = MonitorMode::None;
            }
            MonitorMode::Asynchronous => {
                self.inner.quit.store(true, Ordering::SeqCst);
            }
            MonitorMode::None => {}
        }
    }

    /// Waits for the asynchronous monitor thread to wind down after `stop`.
    pub fn join(&self) {
        let handle = self.inner.thread.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Blocks until at least one connection is pending or the timeout
    /// expires. Returns the pending connection count.
    pub fn wait_for_connection(&self, timeout_ms: u32) -> i32 {
        let count = self.inner.connections.lock().len();
        if count > 0 {
            return count as i32;
        }

        // An asynchronous monitor may still be starting up.
        if self.mode() == MonitorMode::Asynchronous {
            while !self.is_running() && self.mode() != MonitorMode::None {
                thread::yield_now();
            }
        }

        let start = Instant::now();
        let timeout = Duration::from_millis(u64::from(timeout_ms));
        let mut count = 0usize;
        while self.is_running() && count == 0 && start.elapsed() < timeout {
            if self.mode() == MonitorMode::Synchronous {
                self.inner.monitor_connections();
            } else {
                thread::yield_now();
            }
            count = self.inner.connections.lock().len();
        }
        count as i32
    }

    /// One synchronous tick. Asynchronous mode runs this on its own thread.
    pub fn monitor_connections(&self) {
        self.inner.monitor_connections();
    }

    /// Opens a file backed connection participating in the same fan-out as
    /// TCP clients once committed.
    pub fn open_file_stream<P: AsRef<Path>>(&self, path: P) -> WireResult<Arc<FileConnection>> {
        let connection = Arc::new(FileConnection::create(
            path,
            &self.inner.settings,
            &self.inner.log,
        )?);
        if !connection.is_connected() {
            return Err(Error::ConnectionLost);
        }
        self.inner
            .connections
            .lock()
            .push(Arc::clone(&connection) as Arc<dyn Connection>);
        Ok(connection)
    }

    /// Publishes the monitored connection set to the server, which sends
    /// server info to newcomers and invokes the connection callback.
    pub fn commit_connections(&self, server: &Server) {
        let snapshot = self.inner.connections.lock().clone();
        server.update_connections(snapshot);
        self.inner.expired.lock().clear();
    }
}
