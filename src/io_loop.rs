//! The connection's io thread.
//!
//! One poll loop owns the socket, both staging buffers, the frame parser
//! and the liveness/backoff deadlines. Public handles reach it through
//! the shared frame queue plus the waker. Everything stateful about the
//! wire happens here, on one thread.

use crate::buffer::Buffer;
use crate::connection::Connection;
use crate::connection_status::ConnectionState;
use crate::error::{Error, ErrorKind, Result};
use crate::frame::{AMQPFrame, gen_frame};
use crate::heartbeat::HeartbeatState;
use crate::parser::FrameParser;
use crate::recovery::{RecoveryConfig, RecoverySupervisor};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use parking_lot::Mutex;
use std::io;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, trace};

const SOCKET: Token = Token(1);
const WAKER: Token = Token(2);

const FRAMES_STORAGE: usize = 32;

/// Join handle for the io thread, shared by the connection handles.
#[derive(Clone, Default)]
pub(crate) struct IoLoopHandle {
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl IoLoopHandle {
    pub(crate) fn register(&self, handle: JoinHandle<()>) {
        *self.handle.lock() = Some(handle);
    }

    pub(crate) fn wait(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // called from a consumer delegate on the loop itself
                return;
            }
            let _ = handle.join();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    TcpConnecting { deadline: Option<Instant> },
    Running,
    Backoff { until: Instant },
    Stopped,
}

pub(crate) struct IoLoop {
    connection: Connection,
    recovery: RecoverySupervisor,
    poll: Poll,
    socket: Option<TcpStream>,
    phase: Phase,
    parser: FrameParser,
    receive_buffer: Buffer,
    send_buffer: Buffer,
    frame_size: usize,
    host_index: usize,
    can_read: bool,
    can_write: bool,
    transport_alive: bool,
    observed_ready: bool,
}

impl IoLoop {
    /// Spawns the io thread for `connection` and returns immediately; the
    /// caller waits on the connect waiter for the handshake outcome.
    pub(crate) fn start(connection: Connection, recovery: RecoveryConfig) -> Result<()> {
        let poll = Poll::new().map_err(Error::from)?;
        let waker = mio::Waker::new(poll.registry(), WAKER).map_err(Error::from)?;
        connection.waker().register(waker);
        let frame_max = connection.configuration().frame_max();
        let frame_size = std::cmp::max(8192, frame_max as usize);
        let host_index = initial_host_index(
            connection.properties().host_preference,
            connection.properties().hosts.len(),
        );
        let io_loop = IoLoop {
            connection: connection.clone(),
            recovery: RecoverySupervisor::new(recovery),
            poll,
            socket: None,
            phase: Phase::Stopped,
            parser: FrameParser::new(frame_max),
            receive_buffer: Buffer::with_capacity(FRAMES_STORAGE * frame_size),
            send_buffer: Buffer::with_capacity(FRAMES_STORAGE * frame_size),
            frame_size,
            host_index,
            can_read: false,
            can_write: false,
            transport_alive: false,
            observed_ready: false,
        };
        let handle = thread::Builder::new()
            .name("io_loop".to_string())
            .spawn(move || io_loop.run())
            .map_err(Error::from)?;
        connection.io_handle().register(handle);
        Ok(())
    }

    fn run(mut self) {
        if let Err(e) = self.start_connect() {
            self.handle_error(e);
        }
        let mut events = Events::with_capacity(1024);
        while self.should_continue() {
            if let Err(e) = self.do_run(&mut events) {
                self.handle_error(e);
            }
        }
        self.shutdown();
    }

    fn should_continue(&self) -> bool {
        self.phase != Phase::Stopped && !self.connection.killswitch().killed()
    }

    fn start_connect(&mut self) -> Result<()> {
        let properties = self.connection.properties();
        let host = properties.hosts[self.host_index % properties.hosts.len()].clone();
        let port = properties.port();
        debug!(%host, port, "connecting");
        self.connection
            .status()
            .set_state(ConnectionState::Connecting);
        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(Error::from)?
            .next()
            .ok_or_else(|| {
                Error::from(ErrorKind::IOError(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no address found for {}", host),
                )))
            })?;
        let mut socket = TcpStream::connect(addr).map_err(Error::from)?;
        if properties.no_delay {
            let _ = socket.set_nodelay(true);
        }
        self.poll
            .registry()
            .register(&mut socket, SOCKET, Interest::READABLE | Interest::WRITABLE)
            .map_err(Error::from)?;
        self.socket = Some(socket);
        self.transport_alive = true;
        self.can_read = false;
        self.can_write = false;
        self.parser = FrameParser::new(self.connection.configuration().frame_max());
        self.phase = Phase::TcpConnecting {
            deadline: properties.connection_timeout.map(|t| Instant::now() + t),
        };
        Ok(())
    }

    fn poll_timeout(&self) -> Option<Duration> {
        let now = Instant::now();
        match self.phase {
            Phase::TcpConnecting { deadline } => {
                deadline.map(|deadline| deadline.saturating_duration_since(now))
            }
            Phase::Backoff { until } => Some(until.saturating_duration_since(now)),
            Phase::Running => self.connection.heartbeat_timer().poll_timeout(),
            Phase::Stopped => Some(Duration::ZERO),
        }
    }

    fn do_run(&mut self, events: &mut Events) -> Result<()> {
        let timeout = self.poll_timeout();
        trace!(?timeout, phase = ?self.phase, "io_loop poll");
        if let Err(e) = self.poll.poll(events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(e.into());
        }
        for event in events.iter() {
            match event.token() {
                SOCKET => {
                    if event.is_readable() {
                        self.can_read = true;
                    }
                    if event.is_writable() {
                        self.can_write = true;
                    }
                }
                WAKER => {}
                _ => {}
            }
        }

        match self.phase {
            Phase::TcpConnecting { deadline } => {
                if (self.can_write || self.can_read) && self.check_connected()? {
                    self.phase = Phase::Running;
                    self.connection.on_transport_connected();
                } else if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    self.connection.events_sender().timeout();
                    return Err(ErrorKind::ConnectTimeout.into());
                }
            }
            Phase::Backoff { until } => {
                if Instant::now() >= until {
                    debug!("reconnect backoff elapsed");
                    self.start_connect()?;
                }
            }
            Phase::Running | Phase::Stopped => {}
        }

        if self.phase == Phase::Running {
            self.work()?;
        }
        Ok(())
    }

    fn check_connected(&mut self) -> Result<bool> {
        let socket = match &self.socket {
            Some(socket) => socket,
            None => return Ok(false),
        };
        if let Some(e) = socket.take_error().map_err(Error::from)? {
            return Err(e.into());
        }
        match socket.peer_addr() {
            Ok(peer) => {
                debug!(%peer, "connected");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Buffers grow and the parser limit moves when Connection.Tune
    /// renegotiates the frame size.
    fn ensure_setup(&mut self) {
        let frame_max = self.connection.configuration().frame_max();
        if frame_max as usize > self.frame_size {
            self.frame_size = frame_max as usize;
            self.receive_buffer.grow(FRAMES_STORAGE * self.frame_size);
            self.send_buffer.grow(FRAMES_STORAGE * self.frame_size);
        }
        self.parser.set_max_frame_size(frame_max);
    }

    fn work(&mut self) -> Result<()> {
        self.ensure_setup();
        match self
            .connection
            .heartbeat_timer()
            .poll(self.transport_alive)
        {
            HeartbeatState::SendHeartbeat => {
                debug!("send heartbeat");
                self.connection.frames().push(AMQPFrame::Heartbeat(0));
            }
            HeartbeatState::Dead(grace) => {
                return Err(ErrorKind::MissingHeartbeat(grace).into());
            }
            HeartbeatState::Idle => {}
        }

        let mut progress = true;
        while progress && !self.connection.killswitch().killed() {
            progress = false;
            if self.can_write
                && (self.send_buffer.available_data() > 0
                    || self.connection.frames().has_pending())
            {
                progress |= self.write_to_stream()?;
            }
            if self.can_read {
                progress |= self.read_from_stream()?;
            }
        }
        Ok(())
    }

    fn serialize(&mut self) -> Result<()> {
        let flow = !self.connection.status().blocked();
        while self.send_buffer.available_data() < self.frame_size {
            match self.connection.frames().pop(flow) {
                Some(frame) => {
                    trace!(channel = frame.channel_id(), ?frame, "will write to buffer");
                    gen_frame(&frame, &mut self.send_buffer)?;
                }
                None => break,
            }
        }
        Ok(())
    }

    fn write_to_stream(&mut self) -> Result<bool> {
        self.serialize()?;
        let mut wrote = false;
        while self.can_write && self.send_buffer.available_data() > 0 {
            let socket = match &mut self.socket {
                Some(socket) => socket,
                None => break,
            };
            match self.send_buffer.write_to(socket) {
                Ok(0) => break,
                Ok(sz) => {
                    trace!(bytes = sz, "wrote");
                    wrote = true;
                    self.connection.heartbeat_timer().update_last_write();
                    self.serialize()?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.can_write = false,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if wrote
            && self.send_buffer.available_data() == 0
            && !self.connection.frames().has_pending()
        {
            self.connection.events_sender().drain();
        }
        self.send_buffer.shift_unless_available(self.frame_size);
        Ok(wrote)
    }

    fn read_from_stream(&mut self) -> Result<bool> {
        let mut read = false;
        while self.can_read {
            let socket = match &mut self.socket {
                Some(socket) => socket,
                None => break,
            };
            match self.receive_buffer.read_from(socket) {
                Ok(0) => {
                    self.transport_alive = false;
                    self.can_read = false;
                    if self.connection.killswitch().killed()
                        || self.connection.status().disconnected()
                    {
                        return Ok(read);
                    }
                    self.connection.events_sender().end();
                    self.parse_frames()?;
                    // No explicit refusal exists in AMQP: a transport that
                    // ends before ready is read as the broker rejecting
                    // our credentials.
                    return Err(if self.connection.status().ready_emitted() {
                        ErrorKind::IOError(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "transport ended",
                        ))
                        .into()
                    } else {
                        ErrorKind::AuthenticationFailure.into()
                    });
                }
                Ok(sz) => {
                    trace!(bytes = sz, "read");
                    read = true;
                    self.connection.heartbeat_timer().update_last_read();
                    self.connection.events_sender().data(sz);
                    self.parse_frames()?;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.can_read = false,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(read)
    }

    fn parse_frames(&mut self) -> Result<()> {
        while let Some(frame) = self.parser.parse(&mut self.receive_buffer)? {
            self.connection.handle_frame(frame)?;
            self.after_dispatch();
        }
        self.receive_buffer.shift_unless_available(self.frame_size);
        Ok(())
    }

    /// A dispatched frame may have moved the handshake forward.
    fn after_dispatch(&mut self) {
        self.ensure_setup();
        if self.connection.status().ready() && !self.observed_ready {
            self.observed_ready = true;
            self.recovery.reset();
            if self.recovery.reconnect_enabled() {
                self.connection.channels().recover_all();
            }
        }
    }

    /// Spec'd teardown order: timers, transport, parser, channels and
    /// consumers; then either schedule a backoff retry or go terminal.
    fn handle_error(&mut self, error: Error) {
        error!(%error, "connection error");
        self.connection.heartbeat_timer().cancel();
        if self.socket.is_some() {
            // best-effort flush of any close-ok answer before teardown
            let _ = self.write_to_stream();
        }
        self.drop_transport();
        self.parser = FrameParser::new(self.connection.configuration().frame_max());
        let pending = self.receive_buffer.available_data();
        self.receive_buffer.consume(pending);
        let pending = self.send_buffer.available_data();
        self.send_buffer.consume(pending);
        self.connection.channels().set_connection_error(error.clone());
        self.connection.events_sender().error(error.clone());
        self.connection.status().unblock();
        self.connection.status().clear_ready_emitted();
        self.observed_ready = false;

        let recover =
            !self.connection.killswitch().killed() && self.recovery.should_recover(&error);
        if recover {
            self.connection
                .status()
                .set_state(ConnectionState::Disconnected);
            let hosts = self.connection.properties().hosts.len();
            self.host_index = (self.host_index + 1) % hosts;
            let delay = self.recovery.next_backoff();
            debug!(?delay, "scheduling reconnect");
            self.phase = Phase::Backoff {
                until: Instant::now() + delay,
            };
        } else {
            if let Some(waiter) = self.connection.status().take_connect_waiter() {
                let _ = waiter.send(Err(error));
            }
            self.connection.status().set_state(ConnectionState::Failed);
            self.connection.events_sender().closed();
            self.phase = Phase::Stopped;
        }
    }

    fn drop_transport(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = self.poll.registry().deregister(&mut socket);
        }
        self.transport_alive = false;
        self.can_read = false;
        self.can_write = false;
    }

    fn shutdown(&mut self) {
        debug!("io_loop shutting down");
        self.connection.heartbeat_timer().cancel();
        self.drop_transport();
        self.connection
            .channels()
            .set_connection_error(ErrorKind::NotConnected.into());
        let status = self.connection.status();
        if !status.disconnected() && !status.failed() {
            status.set_state(ConnectionState::Disconnected);
            self.connection.events_sender().closed();
        }
    }
}

fn initial_host_index(preference: Option<usize>, hosts: usize) -> usize {
    match preference {
        // clamped to the last valid index
        Some(preference) => preference.min(hosts.saturating_sub(1)),
        None => {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.subsec_nanos())
                .unwrap_or(0);
            nanos as usize % hosts.max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_preference_is_clamped() {
        assert_eq!(initial_host_index(Some(0), 3), 0);
        assert_eq!(initial_host_index(Some(7), 3), 2);
    }

    #[test]
    fn random_pick_stays_in_range() {
        for _ in 0..32 {
            assert!(initial_host_index(None, 3) < 3);
        }
    }
}
