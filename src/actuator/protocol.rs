//! Serial actuator protocol: discovery, handshake, command/response
//! exchange and the asynchronous button-state listener.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::packet::{
    ButtonEvent, LogicalButton, PacketDecoder, OP_PING, PING_ACK,
};
use super::packet;
use super::transport::{SerialTransport, TransportFactory};
use crate::config::ActuatorConfig;
use crate::error::ActuatorError;

/// Textual identity query sent to general-purpose devices
const VERSION_QUERY: &str = "version";

/// Vendor marker accepted as proof of identity in a version response
const VENDOR_MARKER: char = '#';

/// Capacity of the listener→consumer event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Refuses a second concurrent session anywhere in the process
static SESSION_LIVE: AtomicBool = AtomicBool::new(false);

/// Flavor of device expected on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceProfile {
    /// Text command/response protocol with version handshake and optional
    /// baud renegotiation
    #[default]
    General,
    /// Microcontroller emulating a pointing device; binary ping handshake
    /// and fixed 3-byte packets
    HardwareEmu,
}

/// Lifecycle of one actuator connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unbound,
    Discovering,
    HandshakeInFlight,
    Connected,
    /// Connected and at least one command has been exchanged
    Active,
    Faulted,
    Closed,
}

impl SessionState {
    fn is_open(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Active)
    }
}

/// Re-raises the listener pause flag cleared on drop, so the listener
/// resumes on every exit path of a command exchange.
struct PauseGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PauseGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One handshake-confirmed connection to an external actuator device.
///
/// Created by successful discovery; at most one session is live per
/// process. The negotiated baud rate is immutable for the session's
/// lifetime. Any I/O failure faults the session; callers must reopen
/// explicitly, there is no automatic reconnection.
pub struct ActuatorSession {
    port_name: String,
    baud: u32,
    profile: DeviceProfile,
    command_timeout: Duration,
    gap_timeout: Duration,
    /// `None` once the session is closed and the endpoint released
    channel: Arc<Mutex<Option<Box<dyn SerialTransport>>>>,
    state: Arc<Mutex<SessionState>>,
    listener_paused: Arc<AtomicBool>,
    button_mask: Arc<AtomicU8>,
    events: Receiver<ButtonEvent>,
    listener: Option<JoinHandle<()>>,
}

impl ActuatorSession {
    /// Walk every serial endpoint until one passes the handshake for the
    /// configured device profile.
    pub fn discover(
        factory: &dyn TransportFactory,
        config: &ActuatorConfig,
    ) -> Result<Self, ActuatorError> {
        Self::discover_with_handle(
            factory,
            config,
            Arc::new(Mutex::new(SessionState::Unbound)),
        )
    }

    /// [`discover`](Self::discover) with a caller-supplied state handle.
    ///
    /// The handle tracks the lifecycle as discovery progresses
    /// (Unbound → Discovering → HandshakeInFlight → Connected) and is
    /// shared with the returned session; on failure it reverts to Unbound.
    pub fn discover_with_handle(
        factory: &dyn TransportFactory,
        config: &ActuatorConfig,
        state: Arc<Mutex<SessionState>>,
    ) -> Result<Self, ActuatorError> {
        if SESSION_LIVE.swap(true, Ordering::SeqCst) {
            return Err(ActuatorError::SessionBusy);
        }
        let result = Self::discover_inner(factory, config, &state);
        if result.is_err() {
            *state.lock() = SessionState::Unbound;
            SESSION_LIVE.store(false, Ordering::SeqCst);
        }
        result
    }

    fn discover_inner(
        factory: &dyn TransportFactory,
        config: &ActuatorConfig,
        state: &Arc<Mutex<SessionState>>,
    ) -> Result<Self, ActuatorError> {
        *state.lock() = SessionState::Discovering;
        let ports = factory.list_ports()?;
        log::info!(
            "actuator discovery: probing {} endpoint(s) for {:?} profile",
            ports.len(),
            config.profile
        );

        for port in ports {
            match Self::probe(factory, &port, config, state) {
                Ok(session) => {
                    log::info!(
                        "actuator connected on {} at {} baud",
                        session.port_name,
                        session.baud
                    );
                    return Ok(session);
                }
                Err(e) => {
                    *state.lock() = SessionState::Discovering;
                    log::debug!("endpoint {port} disqualified: {e}");
                }
            }
        }
        Err(ActuatorError::NoDevice)
    }

    /// Probe a single endpoint: open, settle, flush, handshake.
    fn probe(
        factory: &dyn TransportFactory,
        port: &str,
        config: &ActuatorConfig,
        state: &Arc<Mutex<SessionState>>,
    ) -> Result<Self, ActuatorError> {
        let read_timeout = Duration::from_millis(config.read_timeout_ms);
        let command_timeout = Duration::from_millis(config.command_timeout_ms);

        let mut transport = factory.open(port, config.default_baud, read_timeout)?;
        thread::sleep(Duration::from_millis(config.reset_delay_ms));
        transport.clear_buffers()?;
        *state.lock() = SessionState::HandshakeInFlight;

        let (transport, baud) = match config.profile {
            DeviceProfile::HardwareEmu => {
                let transport = Self::handshake_hardware(transport, port, command_timeout)?;
                (transport, config.default_baud)
            }
            DeviceProfile::General => {
                Self::handshake_general(factory, transport, port, config)?
            }
        };

        Ok(Self::from_handshaked(transport, port, baud, config, Arc::clone(state)))
    }

    /// Binary ping: a single opcode byte answered by a fixed ack byte.
    fn handshake_hardware(
        transport: Box<dyn SerialTransport>,
        port: &str,
        timeout: Duration,
    ) -> Result<Box<dyn SerialTransport>, ActuatorError> {
        let mut transport = transport;
        transport.write_all(&[OP_PING])?;
        match read_byte_deadline(transport.as_mut(), Instant::now() + timeout)? {
            Some(PING_ACK) => Ok(transport),
            Some(other) => Err(ActuatorError::HandshakeFailed {
                port: port.to_string(),
                reason: format!("unexpected ping response {other:#04x}"),
            }),
            None => Err(ActuatorError::HandshakeFailed {
                port: port.to_string(),
                reason: "no ping response within timeout".into(),
            }),
        }
    }

    /// Textual version query, then optional baud renegotiation followed by
    /// a second identity check at the new rate.
    fn handshake_general(
        factory: &dyn TransportFactory,
        mut transport: Box<dyn SerialTransport>,
        port: &str,
        config: &ActuatorConfig,
    ) -> Result<(Box<dyn SerialTransport>, u32), ActuatorError> {
        let command_timeout = Duration::from_millis(config.command_timeout_ms);

        let line = query_version(transport.as_mut(), command_timeout)?;
        if !identity_confirmed(&line) {
            return Err(ActuatorError::HandshakeFailed {
                port: port.to_string(),
                reason: format!("unrecognized version response {line:?}"),
            });
        }

        let Some(fast_baud) = config.fast_baud else {
            return Ok((transport, config.default_baud));
        };

        // Documented baud-change sequence: command, close, reopen, re-validate
        transport.write_all(format!("baud {fast_baud}\r\n").as_bytes())?;
        drop(transport);
        thread::sleep(Duration::from_millis(50));

        let mut transport = factory.open(
            port,
            fast_baud,
            Duration::from_millis(config.read_timeout_ms),
        )?;
        thread::sleep(Duration::from_millis(config.reset_delay_ms));
        transport.clear_buffers()?;

        let line = query_version(transport.as_mut(), command_timeout)?;
        if !identity_confirmed(&line) {
            return Err(ActuatorError::HandshakeFailed {
                port: port.to_string(),
                reason: format!("identity lost after baud change, got {line:?}"),
            });
        }
        Ok((transport, fast_baud))
    }

    fn from_handshaked(
        transport: Box<dyn SerialTransport>,
        port: &str,
        baud: u32,
        config: &ActuatorConfig,
        state: Arc<Mutex<SessionState>>,
    ) -> Self {
        let channel = Arc::new(Mutex::new(Some(transport)));
        *state.lock() = SessionState::Connected;
        let listener_paused = Arc::new(AtomicBool::new(false));
        let button_mask = Arc::new(AtomicU8::new(0));
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);

        let listener = spawn_listener(
            Arc::clone(&channel),
            Arc::clone(&state),
            Arc::clone(&listener_paused),
            Arc::clone(&button_mask),
            tx,
        );

        Self {
            port_name: port.to_string(),
            baud,
            profile: config.profile,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            gap_timeout: Duration::from_millis(config.gap_timeout_ms),
            channel,
            state,
            listener_paused,
            button_mask,
            events: rx,
            listener,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Baud negotiated at handshake; immutable for the session's lifetime
    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Edge-triggered button events decoded by the listener
    pub fn events(&self) -> &Receiver<ButtonEvent> {
        &self.events
    }

    /// Blocking wait for the next button event, bounded by `timeout`
    pub fn wait_button_event(&self, timeout: Duration) -> Option<ButtonEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Last fully-parsed state of a logical button
    pub fn button_pressed(&self, button: LogicalButton) -> bool {
        self.button_mask.load(Ordering::SeqCst) & (1 << button.bit()) != 0
    }

    /// Exchange one textual command. Commands not expecting a response are
    /// fire-and-forget; otherwise lines are read until the blank-gap or
    /// per-command timeout, the immediate self-echo is discarded and an
    /// initial bare acknowledgement is coalesced with the payload.
    pub fn send_command(
        &self,
        command: &str,
        expect_response: bool,
    ) -> Result<Option<String>, ActuatorError> {
        self.ensure_connected()?;
        let _pause = PauseGuard::engage(&self.listener_paused);
        let mut guard = self.channel.lock();
        let Some(port) = guard.as_mut() else {
            return Err(ActuatorError::NotConnected("endpoint released".to_string()));
        };
        self.mark_active();

        let io_result = Self::exchange(
            port.as_mut(),
            command,
            expect_response,
            self.command_timeout,
            self.gap_timeout,
        );

        match io_result {
            Err(ActuatorError::Io(e)) => {
                drop(guard);
                self.fault(&e);
                Err(ActuatorError::Io(e))
            }
            other => other,
        }
    }

    fn exchange(
        port: &mut dyn SerialTransport,
        command: &str,
        expect_response: bool,
        command_timeout: Duration,
        gap_timeout: Duration,
    ) -> Result<Option<String>, ActuatorError> {
        if expect_response {
            drain_input(port)?;
        }
        port.write_all(command.as_bytes())?;
        port.write_all(b"\r\n")?;
        if !expect_response {
            return Ok(None);
        }

        let mut lines = read_response_lines(port, command_timeout, gap_timeout)?;

        // Discard an immediate echo of the command text
        if lines.first().map(|l| l == command).unwrap_or(false) {
            lines.remove(0);
        }
        if lines.is_empty() {
            return Err(ActuatorError::Timeout(command_timeout));
        }
        Ok(Some(lines.join("\n")))
    }

    /// Dispatch a relative movement intent to the device
    pub fn move_relative(&self, dx: i32, dy: i32) -> Result<(), ActuatorError> {
        match self.profile {
            DeviceProfile::General => {
                self.send_command(&format!("move {dx} {dy}"), false)?;
                Ok(())
            }
            DeviceProfile::HardwareEmu => {
                // One packet per clamped chunk until no residual delta remains
                let chunks = packet::chunk_delta(dx, dy);
                self.write_packets(chunks.iter().map(|&(x, y)| packet::encode_move(x, y)))
            }
        }
    }

    /// Press or release a logical button
    pub fn set_button(&self, button: LogicalButton, pressed: bool) -> Result<(), ActuatorError> {
        match self.profile {
            DeviceProfile::General => {
                let verb = if pressed { "press" } else { "release" };
                self.send_command(&format!("{verb} {}", button.wire_name()), false)?;
                Ok(())
            }
            DeviceProfile::HardwareEmu => {
                self.write_packets(std::iter::once(packet::encode_button(button, pressed)))
            }
        }
    }

    /// Vertical scroll
    pub fn scroll(&self, amount: i32) -> Result<(), ActuatorError> {
        match self.profile {
            DeviceProfile::General => {
                self.send_command(&format!("scroll {amount}"), false)?;
                Ok(())
            }
            DeviceProfile::HardwareEmu => {
                self.write_packets(std::iter::once(packet::encode_scroll(amount)))
            }
        }
    }

    fn write_packets(
        &self,
        packets: impl Iterator<Item = [u8; 3]>,
    ) -> Result<(), ActuatorError> {
        self.ensure_connected()?;
        let _pause = PauseGuard::engage(&self.listener_paused);
        let mut guard = self.channel.lock();
        let Some(port) = guard.as_mut() else {
            return Err(ActuatorError::NotConnected("endpoint released".to_string()));
        };
        self.mark_active();
        for p in packets {
            if let Err(e) = port.write_all(&p) {
                drop(guard);
                self.fault(&e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn ensure_connected(&self) -> Result<(), ActuatorError> {
        let state = self.state();
        if state.is_open() {
            Ok(())
        } else {
            Err(ActuatorError::NotConnected(format!("{state:?}")))
        }
    }

    fn mark_active(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Connected {
            *state = SessionState::Active;
        }
    }

    fn fault(&self, error: &io::Error) {
        log::error!("actuator session on {} faulted: {error}", self.port_name);
        *self.state.lock() = SessionState::Faulted;
    }

    /// Close the session and release the serial endpoint. Idempotent.
    pub fn close(&mut self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
        // Drop the transport so the OS endpoint is reusable immediately
        self.channel.lock().take();
        SESSION_LIVE.store(false, Ordering::SeqCst);
        log::info!("actuator session on {} closed", self.port_name);
    }
}

impl Drop for ActuatorSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background listener: decodes unsolicited button-state packets while the
/// session is open and the command path has not paused it.
fn spawn_listener(
    channel: Arc<Mutex<Option<Box<dyn SerialTransport>>>>,
    state: Arc<Mutex<SessionState>>,
    paused: Arc<AtomicBool>,
    button_mask: Arc<AtomicU8>,
    events: Sender<ButtonEvent>,
) -> Option<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("actuator-listener".to_string())
        .spawn(move || {
            let mut decoder = PacketDecoder::new();
            let mut pending = Vec::new();
            let mut buf = [0u8; 64];

            loop {
                if !state.lock().is_open() {
                    break;
                }
                if paused.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }

                let read = {
                    let mut guard = channel.lock();
                    // A command exchange may have started while we waited
                    // for the lock; its pause flag wins.
                    if paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    match guard.as_mut() {
                        Some(port) => port.read(&mut buf),
                        None => break,
                    }
                };

                match read {
                    Ok(0) => continue,
                    Ok(n) => {
                        for &byte in &buf[..n] {
                            decoder.push(byte, &mut pending);
                        }
                        if !pending.is_empty() {
                            button_mask.store(decoder.last_mask(), Ordering::SeqCst);
                            for event in pending.drain(..) {
                                if events.try_send(event).is_err() {
                                    log::debug!("button event channel full, dropping event");
                                }
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("actuator listener read failed: {e}");
                        *state.lock() = SessionState::Faulted;
                        break;
                    }
                }
            }
            log::debug!("actuator listener stopped");
        });

    match handle {
        Ok(h) => Some(h),
        Err(e) => {
            log::error!("failed to spawn actuator listener: {e}");
            None
        }
    }
}

/// A version response proves identity when it starts with a digit, a
/// version token or the vendor marker.
fn identity_confirmed(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    trimmed.starts_with(|c: char| c.is_ascii_digit())
        || trimmed.to_ascii_lowercase().starts_with('v')
        || trimmed.starts_with(VENDOR_MARKER)
}

fn query_version(
    transport: &mut dyn SerialTransport,
    timeout: Duration,
) -> Result<String, ActuatorError> {
    transport.write_all(VERSION_QUERY.as_bytes())?;
    transport.write_all(b"\r\n")?;

    let deadline = Instant::now() + timeout;
    let mut acc: Vec<u8> = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        while let Some(pos) = acc.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = acc.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            // Skip blank lines and the self-echo of the query
            if !text.is_empty() && text != VERSION_QUERY {
                return Ok(text);
            }
        }
        if Instant::now() >= deadline {
            return Err(ActuatorError::Timeout(timeout));
        }
        let n = transport.read(&mut buf)?;
        if n > 0 {
            acc.extend_from_slice(&buf[..n]);
        }
    }
}

fn read_byte_deadline(
    transport: &mut dyn SerialTransport,
    deadline: Instant,
) -> Result<Option<u8>, ActuatorError> {
    let mut buf = [0u8; 1];
    while Instant::now() < deadline {
        if transport.read(&mut buf)? == 1 {
            return Ok(Some(buf[0]));
        }
    }
    Ok(None)
}

/// Discard stale input left over from unsolicited traffic
fn drain_input(transport: &mut dyn SerialTransport) -> Result<(), ActuatorError> {
    let mut buf = [0u8; 256];
    while transport.read(&mut buf)? > 0 {}
    Ok(())
}

/// Read response lines until the blank-gap timeout after the last data, or
/// the overall deadline. Empty lines are dropped; a trailing partial line
/// is kept.
fn read_response_lines(
    transport: &mut dyn SerialTransport,
    command_timeout: Duration,
    gap_timeout: Duration,
) -> Result<Vec<String>, ActuatorError> {
    let deadline = Instant::now() + command_timeout;
    let mut acc: Vec<u8> = Vec::new();
    let mut lines: Vec<String> = Vec::new();
    let mut last_data = Instant::now();
    let mut buf = [0u8; 256];

    while Instant::now() < deadline {
        let n = transport.read(&mut buf)?;
        if n == 0 {
            let have_data = !lines.is_empty() || !acc.is_empty();
            if have_data && last_data.elapsed() >= gap_timeout {
                break;
            }
            continue;
        }
        last_data = Instant::now();
        acc.extend_from_slice(&buf[..n]);
        while let Some(pos) = acc.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = acc.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
    }

    if !acc.is_empty() {
        let text = String::from_utf8_lossy(&acc).trim().to_string();
        if !text.is_empty() {
            lines.push(text);
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_confirmation() {
        assert!(identity_confirmed("v1.2.3"));
        assert!(identity_confirmed("2.0"));
        assert!(identity_confirmed("#dev-board rev C"));
        assert!(identity_confirmed("  V4  "));
        assert!(!identity_confirmed(""));
        assert!(!identity_confirmed("ERROR: unknown command"));
    }

    #[test]
    fn test_session_state_openness() {
        assert!(SessionState::Connected.is_open());
        assert!(SessionState::Active.is_open());
        assert!(!SessionState::Faulted.is_open());
        assert!(!SessionState::Closed.is_open());
        assert!(!SessionState::Unbound.is_open());
        assert!(!SessionState::Discovering.is_open());
        assert!(!SessionState::HandshakeInFlight.is_open());
    }

    #[test]
    fn test_pause_guard_resumes_on_drop() {
        let flag = AtomicBool::new(false);
        {
            let _guard = PauseGuard::engage(&flag);
            assert!(flag.load(Ordering::SeqCst));
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
