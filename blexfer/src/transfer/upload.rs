//! Caller-side upload driver.
//!
//! The session sends exactly one command per call and never retries. An
//! [`Uploader`] walks a loaded session from start to end, resending commands
//! that failed in the transport and reporting progress as it goes.

use crate::error::{Error, Result};
use crate::protocol::codec::TextCodec;
use crate::transfer::session::{Generation, TransferSession};
use crate::transport::Transport;
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// Default number of resends per command.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause before a resend.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// How package numbers are chosen for the commands of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageNumbering {
    /// Every command carries the same number.
    Fixed(u16),
    /// The first command carries `start`, each following one the next
    /// number, wrapping at `0xFFFF`. Resends keep their number.
    Incrementing {
        /// Number of the first command.
        start: u16,
    },
}

impl Default for PackageNumbering {
    fn default() -> Self {
        Self::Fixed(1)
    }
}

impl PackageNumbering {
    /// Number of the command at position `position` of the upload.
    #[allow(clippy::cast_possible_truncation)]
    pub fn number_at(self, position: usize) -> u16 {
        match self {
            Self::Fixed(number) => number,
            Self::Incrementing { start } => start.wrapping_add((position % 0x1_0000) as u16),
        }
    }
}

/// Upload tuning.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Resends allowed per command after the first attempt.
    pub max_retries: u32,
    /// Pause before each resend.
    pub retry_delay: Duration,
    /// Package number policy.
    pub numbering: PackageNumbering,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            numbering: PackageNumbering::default(),
        }
    }
}

/// What an upload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UploadReport {
    /// Commands delivered to the transport.
    pub commands: usize,
    /// Resends needed along the way.
    pub retries: usize,
}

/// Drives a [`TransferSession`] over a [`Transport`] until the whole file is
/// sent.
#[derive(Debug, Clone, Default)]
pub struct Uploader {
    config: UploadConfig,
}

impl Uploader {
    /// Create an uploader.
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// The uploader's configuration.
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Positions the upload visits: block indices for block-indexed files,
    /// window offsets for offset-indexed files.
    pub fn plan<C: TextCodec>(session: &TransferSession<C>) -> Result<Vec<usize>> {
        if let Some(blocks) = session.blocks() {
            return Ok((0..blocks.len()).collect());
        }
        match session.offset_file() {
            Some(file) => Ok(file.window_offsets().collect()),
            None => Err(Error::InvalidInput("no file loaded".into())),
        }
    }

    /// Send every command of the loaded file to `device`.
    ///
    /// `progress` is called with `(sent, total)` after each delivered
    /// command. Only transport failures are resent; any other error, or a
    /// command still failing after `max_retries` resends, ends the upload.
    /// The global interrupt checker is polled before every command.
    pub fn upload<C, T, F>(
        &self,
        session: &TransferSession<C>,
        transport: &mut T,
        device: &str,
        mut progress: F,
    ) -> Result<UploadReport>
    where
        C: TextCodec,
        T: Transport + ?Sized,
        F: FnMut(usize, usize),
    {
        let plan = Self::plan(session)?;
        let generation = session.generation();
        let total = plan.len();
        info!("Uploading {total} commands to {device}");

        let mut report = UploadReport::default();
        for (position, &at) in plan.iter().enumerate() {
            let number = self.config.numbering.number_at(position);
            let mut attempt = 0;
            loop {
                if crate::is_interrupted_requested() {
                    warn!("Upload interrupted at command {position}/{total}");
                    return Err(Error::Interrupted);
                }

                let sent = match generation {
                    Some(Generation::OffsetIndexed) => {
                        session.send_offset_window(transport, device, number, at)
                    },
                    _ => session.send_block(transport, device, number, at),
                };
                match sent {
                    Ok(_) => break,
                    Err(e) if e.is_transport() && attempt < self.config.max_retries => {
                        attempt += 1;
                        report.retries += 1;
                        warn!(
                            "Command {position} failed (attempt {attempt}/{}): {e}",
                            self.config.max_retries + 1
                        );
                        if !self.config.retry_delay.is_zero() {
                            thread::sleep(self.config.retry_delay);
                        }
                    },
                    Err(e) => return Err(e),
                }
            }

            report.commands += 1;
            progress(position + 1, total);
        }

        debug!(
            "Upload complete: {} commands, {} retries",
            report.commands, report.retries
        );
        Ok(report)
    }
}
