//! Scripted transport used by the pump and session tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

use crate::error::{Result, SerialConsoleError};
use crate::serial::data::ByteChunk;
use crate::serial::port::{Connector, PortSettings, Transport};

enum Step {
    Chunk(Vec<u8>),
    Error(SerialConsoleError),
}

#[derive(Default)]
struct ScriptState {
    steps: VecDeque<Step>,
    written: Vec<Vec<u8>>,
    fail_writes: bool,
    close_calls: usize,
}

/// What the device "sends", and what it saw written. Cloned handles share state.
#[derive(Clone, Default)]
pub struct Script(Arc<Mutex<ScriptState>>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&self, bytes: &[u8]) {
        self.0
            .lock()
            .unwrap()
            .steps
            .push_back(Step::Chunk(bytes.to_vec()));
    }

    pub fn push_error(&self, error: SerialConsoleError) {
        self.0.lock().unwrap().steps.push_back(Step::Error(error));
    }

    pub fn fail_writes(&self, fail: bool) {
        self.0.lock().unwrap().fail_writes = fail;
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().written.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.0.lock().unwrap().close_calls
    }

    /// Steps the transport has not consumed yet.
    pub fn remaining(&self) -> usize {
        self.0.lock().unwrap().steps.len()
    }
}

pub struct FakeTransport {
    script: Script,
    open: bool,
}

impl FakeTransport {
    pub fn new(script: Script) -> Self {
        FakeTransport { script, open: true }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn bytes_to_read(&mut self) -> Result<usize> {
        if !self.open {
            return Err(SerialConsoleError::port_read("port is closed"));
        }
        let mut state = self.script.0.lock().unwrap();
        if matches!(state.steps.front(), Some(Step::Error(_)))
            && let Some(Step::Error(e)) = state.steps.pop_front()
        {
            return Err(e);
        }
        match state.steps.front() {
            Some(Step::Chunk(bytes)) => Ok(bytes.len()),
            _ => Ok(0),
        }
    }

    async fn read(&mut self, max_len: usize, _max_wait: Duration) -> Result<ByteChunk> {
        let mut state = self.script.0.lock().unwrap();
        match state.steps.pop_front() {
            Some(Step::Chunk(mut bytes)) => {
                if bytes.len() > max_len {
                    let rest = bytes.split_off(max_len);
                    state.steps.push_front(Step::Chunk(rest));
                }
                Ok(ByteChunk::from(bytes))
            }
            Some(Step::Error(e)) => Err(e),
            None => Ok(ByteChunk::empty()),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.script.0.lock().unwrap();
        if !self.open || state.fail_writes {
            return Err(SerialConsoleError::port_write("device disconnected"));
        }
        state.written.push(data.to_vec());
        Ok(data.len())
    }

    fn close(&mut self) {
        self.open = false;
        self.script.0.lock().unwrap().close_calls += 1;
    }
}

/// Hands out `FakeTransport`s bound to one script.
pub struct FakeConnector {
    script: Script,
}

impl FakeConnector {
    pub fn new(script: Script) -> Self {
        FakeConnector { script }
    }
}

impl Connector for FakeConnector {
    fn open(&self, _settings: &PortSettings) -> Result<Box<dyn Transport>> {
        Ok(Box::new(FakeTransport::new(self.script.clone())))
    }
}
