//! Background reader that forwards device bytes to the hand-off channel.

use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::error::Result;
use crate::serial::data::{Record, RecordSender};
use crate::serial::port::Transport;

/// How long the pump sleeps when no bytes are pending.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(50);

/// How long `disconnect` waits for the pump before giving up on it.
pub const PUMP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport shared between the session (write, close) and its pump (read).
pub type SharedTransport = Arc<Mutex<Box<dyn Transport>>>;

/// Why the pump stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PumpExit {
    /// stop requested by the session
    Stopped,
    /// the transport failed to read
    Failed(String),
}

/// Handle to a running inbound pump.
pub struct PumpHandle {
    stop_tx: watch::Sender<bool>,
    exit_rx: watch::Receiver<Option<PumpExit>>,
    task: JoinHandle<()>,
}

impl PumpHandle {
    /// Spawns the pump on the current tokio runtime.
    pub fn spawn(
        transport: SharedTransport,
        records: RecordSender,
        read_timeout: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (exit_tx, exit_rx) = watch::channel(None);
        let pump = InboundPump {
            transport,
            records,
            read_timeout,
            stop_rx,
        };
        let task = tokio::spawn(async move {
            let exit = pump.run().await;
            exit_tx.send_replace(Some(exit));
        });
        PumpHandle {
            stop_tx,
            exit_rx,
            task,
        }
    }

    /// Whether the pump has terminated.
    pub fn is_finished(&self) -> bool {
        self.exit_rx.borrow().is_some() || self.task.is_finished()
    }

    /// The exit reason, once terminated.
    pub fn exit(&self) -> Option<PumpExit> {
        self.exit_rx.borrow().clone()
    }

    /// Waits until the pump terminates on its own or is stopped.
    pub async fn finished(&mut self) -> PumpExit {
        match self.exit_rx.wait_for(Option::is_some).await {
            Ok(exit) => exit.clone().unwrap_or(PumpExit::Stopped),
            // task ended without publishing, i.e. it panicked or was aborted
            Err(_) => PumpExit::Failed("inbound pump ended unexpectedly".to_string()),
        }
    }

    /// Requests a stop and waits up to `bound` for the pump to end.
    ///
    /// Returns `false` if the pump had to be aborted.
    pub async fn shutdown(self, bound: Duration) -> bool {
        let _ = self.stop_tx.send(true);
        let mut task = self.task;
        match time::timeout(bound, &mut task).await {
            Ok(_) => true,
            Err(_) => {
                task.abort();
                false
            }
        }
    }
}

struct InboundPump {
    transport: SharedTransport,
    records: RecordSender,
    read_timeout: Duration,
    stop_rx: watch::Receiver<bool>,
}

impl InboundPump {
    async fn run(mut self) -> PumpExit {
        debug!("Inbound pump started");
        let exit = loop {
            // a dropped handle counts as a stop request, even on a busy link
            if *self.stop_rx.borrow() || self.stop_rx.has_changed().is_err() {
                break PumpExit::Stopped;
            }
            match self.poll_once().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        changed = self.stop_rx.changed() => {
                            // handle dropped without a stop request
                            if changed.is_err() {
                                break PumpExit::Stopped;
                            }
                        }
                        _ = time::sleep(IDLE_INTERVAL) => {}
                    }
                }
                Err(e) => {
                    warn!("Inbound pump read failed: {e}");
                    let _ = self
                        .records
                        .send(Record::diagnostic(format!("Connection lost: {e}")));
                    break PumpExit::Failed(e.to_string());
                }
            }
        };
        debug!("Inbound pump stopped: {exit:?}");
        exit
    }

    /// Reads whatever is pending. Returns whether a chunk was forwarded.
    async fn poll_once(&mut self) -> Result<bool> {
        let chunk = {
            let mut transport = self.transport.lock().await;
            let pending = transport.bytes_to_read()?;
            if pending == 0 {
                return Ok(false);
            }
            transport.read(pending, self.read_timeout).await?
        };
        if chunk.is_empty() {
            return Ok(false);
        }
        debug!("Read {} bytes", chunk.len());
        if self.records.send(Record::rx(chunk)).is_err() {
            debug!("Display drain is gone, dropping received chunk");
        }
        Ok(true)
    }
}
