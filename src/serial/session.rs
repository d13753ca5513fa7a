//! # Session Module
//!
//! Owns the lifecycle of one serial link:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Closing -> Disconnected
//! ```
//!
//! While connected the session holds the transport and runs an inbound pump
//! that reads from it. A pump that dies on a read error is reaped the next
//! time the session is asked about its state (or while awaiting
//! [`Session::link_lost`]), which closes the transport and returns the
//! session to `Disconnected`.

use log::{error, info, warn};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Result, SerialConsoleError};
use crate::serial::data::{DisplayMode, Record, RecordSender, SharedMode, record_channel};
use crate::serial::display::Drain;
use crate::serial::encoding::parse_outbound;
use crate::serial::port::{Connector, PortSettings};
use crate::serial::pump::{PUMP_SHUTDOWN_TIMEOUT, PumpExit, PumpHandle, SharedTransport};

/// serial session state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Closing => write!(f, "closing"),
        }
    }
}

/// the open link: settings, transport and the pump reading it
struct Link {
    settings: PortSettings,
    transport: SharedTransport,
    pump: PumpHandle,
}

/// Session controller for a single serial port.
pub struct Session {
    connector: Box<dyn Connector>,
    records: RecordSender,
    mode: SharedMode,
    state: SessionState,
    link: Option<Link>,
}

impl Session {
    /// Creates a disconnected session and the drain that displays its records.
    pub fn new(connector: Box<dyn Connector>) -> (Self, Drain) {
        let (records, receiver) = record_channel();
        let mode = SharedMode::new(DisplayMode::default());
        let session = Session {
            connector,
            records,
            mode: mode.clone(),
            state: SessionState::Disconnected,
            link: None,
        };
        (session, Drain::new(receiver, mode))
    }

    /// Current state, after reaping a pump that died.
    pub async fn state(&mut self) -> SessionState {
        self.reap().await;
        self.state
    }

    /// Name of the connected port.
    pub fn port_name(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.settings.port_name.as_str())
    }

    /// Opens the port and starts reading from it.
    pub async fn connect(&mut self, settings: PortSettings) -> Result<()> {
        self.reap().await;
        if let Some(link) = &self.link {
            return Err(SerialConsoleError::AlreadyConnected(
                link.settings.port_name.clone(),
            ));
        }
        settings.validate()?;

        self.state = SessionState::Connecting;
        let transport = match self.connector.open(&settings) {
            Ok(transport) => transport,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };
        let transport: SharedTransport = Arc::new(Mutex::new(transport));
        let pump = PumpHandle::spawn(transport.clone(), self.records.clone(), settings.timeout);

        info!(
            "Connected to {} at {} baud",
            settings.port_name, settings.baud_rate
        );
        self.link = Some(Link {
            settings,
            transport,
            pump,
        });
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Parses `token` and writes it to the port, echoing it as a TX record.
    ///
    /// Blank input writes nothing and returns `Ok(0)`. A failed write leaves
    /// the session connected.
    pub async fn send(&mut self, token: &str) -> Result<usize> {
        self.reap().await;
        let link = self.link.as_ref().ok_or(SerialConsoleError::NotConnected)?;

        let data = parse_outbound(token);
        if data.is_empty() {
            return Ok(0);
        }
        let written = link.transport.lock().await.write(&data).await?;
        let _ = self.records.send(Record::tx(data));
        Ok(written)
    }

    /// Current display mode.
    pub fn mode(&self) -> DisplayMode {
        self.mode.get()
    }

    /// Sets the display mode for records rendered from now on.
    pub fn set_mode(&self, mode: DisplayMode) {
        self.mode.set(mode);
    }

    /// Switches between hex and text, returning the new mode.
    pub fn toggle_mode(&self) -> DisplayMode {
        self.mode.toggle()
    }

    /// Stops the pump, then closes the port. Does nothing when disconnected.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            self.state = SessionState::Disconnected;
            return;
        };
        self.state = SessionState::Closing;
        if !link.pump.shutdown(PUMP_SHUTDOWN_TIMEOUT).await {
            error!(
                "Inbound pump for {} did not stop within {:?}, aborted",
                link.settings.port_name, PUMP_SHUTDOWN_TIMEOUT
            );
        }
        link.transport.lock().await.close();
        self.state = SessionState::Disconnected;
        info!("Disconnected from {}", link.settings.port_name);
    }

    /// Waits for the link to drop on its own, then reaps it.
    ///
    /// Never completes while disconnected, which makes it usable as a
    /// `tokio::select!` branch.
    pub async fn link_lost(&mut self) -> PumpExit {
        let exit = match self.link.as_mut() {
            Some(link) => link.pump.finished().await,
            None => std::future::pending().await,
        };
        self.reap().await;
        exit
    }

    /// Tears down a link whose pump has terminated.
    async fn reap(&mut self) {
        let finished = self
            .link
            .as_ref()
            .is_some_and(|link| link.pump.is_finished());
        if !finished {
            return;
        }
        self.state = SessionState::Disconnected;
        if let Some(link) = self.link.take() {
            warn!(
                "Lost connection to {}: {:?}",
                link.settings.port_name,
                link.pump.exit()
            );
            link.transport.lock().await.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::display::{DisplayLine, PresentationSink};
    use crate::serial::port::MockConnector;
    use crate::serial::pump::IDLE_INTERVAL;
    use crate::serial::testing::{FakeConnector, Script};
    use tokio::time;

    #[derive(Default)]
    struct Lines(Vec<String>);

    impl PresentationSink for Lines {
        fn render(&mut self, line: &DisplayLine) {
            self.0.push(line.to_string());
        }
    }

    fn settings() -> PortSettings {
        PortSettings::new("/dev/ttyFAKE0", 115200)
    }

    fn fake_session(script: &Script) -> (Session, Drain) {
        Session::new(Box::new(FakeConnector::new(script.clone())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_disconnect() {
        let script = Script::new();
        let (mut session, _drain) = fake_session(&script);
        assert_eq!(session.state().await, SessionState::Disconnected);

        session.connect(settings()).await.unwrap();
        assert_eq!(session.state().await, SessionState::Connected);
        assert_eq!(session.port_name(), Some("/dev/ttyFAKE0"));

        session.disconnect().await;
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert_eq!(script.close_calls(), 1);

        // idempotent
        session.disconnect().await;
        assert_eq!(script.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_twice_is_rejected() {
        let script = Script::new();
        let (mut session, _drain) = fake_session(&script);
        session.connect(settings()).await.unwrap();

        let result = session.connect(settings()).await;
        assert!(matches!(result, Err(SerialConsoleError::AlreadyConnected(_))));
        assert_eq!(session.state().await, SessionState::Connected);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_connect_failure_stays_disconnected() {
        let mut connector = MockConnector::new();
        connector
            .expect_open()
            .times(1)
            .returning(|s| Err(SerialConsoleError::port_open(s.port_name.as_str(), "No such file")));
        let (mut session, mut drain) = Session::new(Box::new(connector));

        let result = session.connect(settings()).await;
        assert!(matches!(result, Err(SerialConsoleError::PortOpen { .. })));
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert!(session.port_name().is_none());

        time::sleep(IDLE_INTERVAL * 2).await;
        let mut lines = Lines::default();
        assert_eq!(drain.drain_pending(&mut lines), 0);
    }

    #[tokio::test]
    async fn test_invalid_settings_never_open() {
        let mut connector = MockConnector::new();
        connector.expect_open().never();
        let (mut session, _drain) = Session::new(Box::new(connector));

        let result = session.connect(PortSettings::new("COM1", 0)).await;
        assert!(matches!(result, Err(SerialConsoleError::InvalidConfig(_))));
        assert_eq!(session.state().await, SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_writes_and_echoes() {
        let script = Script::new();
        let (mut session, mut drain) = fake_session(&script);
        session.connect(settings()).await.unwrap();

        assert_eq!(session.send("0A FF 10").await.unwrap(), 3);
        assert_eq!(session.send("0A hello").await.unwrap(), 8);
        assert_eq!(script.written(), vec![vec![0x0A, 0xFF, 0x10], b"0A hello".to_vec()]);

        let mut lines = Lines::default();
        drain.drain_pending(&mut lines);
        assert_eq!(
            lines.0,
            vec!["[TX] 0A FF 10", "[TX] 30 41 20 68 65 6C 6C 6F"]
        );
        session.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_send_is_noop() {
        let script = Script::new();
        let (mut session, mut drain) = fake_session(&script);
        session.connect(settings()).await.unwrap();

        assert_eq!(session.send("   ").await.unwrap(), 0);
        assert_eq!(session.send("").await.unwrap(), 0);
        assert!(script.written().is_empty());

        let mut lines = Lines::default();
        assert_eq!(drain.drain_pending(&mut lines), 0);
        session.disconnect().await;
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let script = Script::new();
        let (mut session, _drain) = fake_session(&script);
        let result = session.send("01").await;
        assert!(matches!(result, Err(SerialConsoleError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_keeps_session_connected() {
        let script = Script::new();
        let (mut session, mut drain) = fake_session(&script);
        session.connect(settings()).await.unwrap();
        script.fail_writes(true);

        let result = session.send("01 02").await;
        assert!(matches!(result, Err(SerialConsoleError::PortWrite(_))));
        assert_eq!(session.state().await, SessionState::Connected);

        let mut lines = Lines::default();
        assert_eq!(drain.drain_pending(&mut lines), 0);

        script.fail_writes(false);
        assert_eq!(session.send("01 02").await.unwrap(), 2);
        session.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_disconnects_once() {
        let script = Script::new();
        script.push_chunk(b"ok");
        script.push_error(SerialConsoleError::port_read("device reports readiness but returned no data"));
        script.push_chunk(b"late");
        let (mut session, mut drain) = fake_session(&script);
        session.connect(settings()).await.unwrap();

        let exit = session.link_lost().await;
        assert!(matches!(exit, PumpExit::Failed(_)));
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert_eq!(script.close_calls(), 1);

        time::sleep(IDLE_INTERVAL * 4).await;
        let mut lines = Lines::default();
        drain.drain_pending(&mut lines);
        assert_eq!(lines.0.len(), 2);
        assert_eq!(lines.0[0], "[RX] 6F 6B");
        assert!(lines.0[1].starts_with("[ERR] Connection lost"));

        assert!(matches!(
            session.send("01").await,
            Err(SerialConsoleError::NotConnected)
        ));
        // a fresh connect works after the loss
        session.connect(settings()).await.unwrap();
        assert_eq!(session.state().await, SessionState::Connected);
        session.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_reaps_dead_pump() {
        let script = Script::new();
        script.push_error(SerialConsoleError::port_read("gone"));
        let (mut session, _drain) = fake_session(&script);
        session.connect(settings()).await.unwrap();

        time::sleep(IDLE_INTERVAL * 2).await;
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert_eq!(script.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rx_order_under_tx_echo() {
        let script = Script::new();
        let (mut session, mut drain) = fake_session(&script);
        session.connect(settings()).await.unwrap();

        script.push_chunk(b"A");
        script.push_chunk(b"B");
        for _ in 0..3 {
            session.send("FF").await.unwrap();
            time::sleep(IDLE_INTERVAL).await;
        }
        session.disconnect().await;

        let mut lines = Lines::default();
        drain.drain_pending(&mut lines);
        let rx: Vec<&String> = lines.0.iter().filter(|l| l.starts_with("[RX]")).collect();
        assert_eq!(rx, vec!["[RX] 41", "[RX] 42"]);
        assert_eq!(lines.0.iter().filter(|l| l.starts_with("[TX]")).count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_toggle_mid_stream() {
        let script = Script::new();
        let (mut session, mut drain) = fake_session(&script);
        session.connect(settings()).await.unwrap();
        let mut lines = Lines::default();

        assert_eq!(session.mode(), DisplayMode::Hex);
        script.push_chunk(b"c1");
        time::sleep(IDLE_INTERVAL * 2).await;
        drain.drain_pending(&mut lines);

        assert_eq!(session.toggle_mode(), DisplayMode::Text);
        script.push_chunk(b"c2\xC3");
        time::sleep(IDLE_INTERVAL * 2).await;
        drain.drain_pending(&mut lines);

        assert_eq!(lines.0, vec!["[RX] 63 31", "[RX] c2\u{FFFD}"]);
        session.set_mode(DisplayMode::Hex);
        assert_eq!(session.mode(), DisplayMode::Hex);
        session.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_renders_as_one_line() {
        let script = Script::new();
        script.push_chunk(b"\x00\x01");
        let (mut session, mut drain) = fake_session(&script);
        session.connect(settings()).await.unwrap();
        time::sleep(IDLE_INTERVAL * 2).await;
        session.disconnect().await;

        let mut sink = crate::serial::display::MockPresentationSink::new();
        sink.expect_render()
            .withf(|line| line.text == "00 01")
            .times(1)
            .return_const(());
        assert_eq!(drain.drain_pending(&mut sink), 1);
    }
}
