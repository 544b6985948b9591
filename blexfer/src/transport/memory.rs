//! In-memory transport that records every write.
//!
//! Used for dry runs (print what would be sent) and in tests. Failures can
//! be queued to exercise caller retry logic.

use crate::error::{Result, TransportError};
use crate::transport::{Transport, Uuid16};
use log::trace;
use std::collections::VecDeque;

/// One write captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Target device identifier.
    pub device: String,
    /// Service the write was addressed to.
    pub service: Uuid16,
    /// Characteristic the write was addressed to.
    pub characteristic: Uuid16,
    /// Raw bytes.
    pub data: Vec<u8>,
    /// Whether a response was requested.
    pub with_response: bool,
}

/// Transport that stores writes instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    writes: Vec<RecordedWrite>,
    failures: VecDeque<TransportError>,
}

impl RecordingTransport {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write fail with `error`.
    ///
    /// Queued failures are consumed in order, one per write attempt.
    pub fn fail_next(&mut self, error: TransportError) {
        self.failures.push_back(error);
    }

    /// Successful writes in the order they happened.
    pub fn writes(&self) -> &[RecordedWrite] {
        &self.writes
    }

    /// Take the recorded writes, leaving the recorder empty.
    pub fn take_writes(&mut self) -> Vec<RecordedWrite> {
        std::mem::take(&mut self.writes)
    }
}

impl Transport for RecordingTransport {
    /// Index of the write in [`RecordingTransport::writes`].
    type Outcome = usize;

    fn long_write(
        &mut self,
        device: &str,
        service: Uuid16,
        characteristic: Uuid16,
        data: &[u8],
        with_response: bool,
    ) -> Result<usize> {
        if let Some(err) = self.failures.pop_front() {
            trace!("Injected failure for {device}: {err}");
            return Err(err.into());
        }

        trace!("Recorded {} bytes for {device}", data.len());
        self.writes.push(RecordedWrite {
            device: device.to_string(),
            service,
            characteristic,
            data: data.to_vec(),
            with_response,
        });
        Ok(self.writes.len() - 1)
    }
}
