//! The decode-loop state machine.
//!
//! A single logical thread drives repeated asynchronous decode
//! submissions, interprets the returned status, and dispatches ready
//! surfaces to the export pipeline. At most one surface is ever
//! outstanding; the pipeline releases it before the next submission.

use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::bitstream::{Bitstream, BitstreamFeeder, FeedStatus};
use crate::error::DecodeError;
use crate::export::FrameExportPipeline;
use crate::session::DecodeSession;
use crate::status::DecodeStatus;
use crate::surface::SurfaceGuard;

/// Feeding/draining phase of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// New input is still being read from the source.
    Feeding,
    /// The source is exhausted; the decoder is flushing buffered
    /// frames. Never exited once entered.
    Draining,
}

/// Retry policy knobs for the loop itself.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// Delay before retrying after a `DeviceBusy` submission.
    pub busy_wait: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            busy_wait: Duration::from_millis(10),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    /// Frames written to the sink.
    pub frames: u64,
}

/// Drives the decoder session to termination.
pub struct DecodeLoop<R, W> {
    session: Box<dyn DecodeSession>,
    feeder: BitstreamFeeder<R>,
    bitstream: Bitstream,
    pipeline: FrameExportPipeline<W>,
    opts: LoopOptions,
    state: LoopState,
}

impl<R: Read, W: Write> DecodeLoop<R, W> {
    pub fn new(
        session: Box<dyn DecodeSession>,
        feeder: BitstreamFeeder<R>,
        bitstream: Bitstream,
        pipeline: FrameExportPipeline<W>,
        opts: LoopOptions,
    ) -> Self {
        Self {
            session,
            feeder,
            bitstream,
            pipeline,
            opts,
            state: LoopState::Feeding,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run to termination. `Ok` is reached only by draining the
    /// decoder dry; fatal statuses and any export failure are `Err`.
    pub fn run(mut self) -> Result<RunSummary, DecodeError> {
        loop {
            if self.state == LoopState::Feeding
                && self.feeder.refill(&mut self.bitstream)? == FeedStatus::EndOfInput
            {
                debug!("input exhausted, draining decoder");
                self.state = LoopState::Draining;
            }

            let input = match self.state {
                LoopState::Feeding => Some(&mut self.bitstream),
                LoopState::Draining => None,
            };
            let submission = self.session.submit(input)?;

            match submission.status {
                DecodeStatus::Ready => {
                    let surface = submission.surface.ok_or(DecodeError::MissingSurface)?;
                    self.pipeline.export_and_save(SurfaceGuard::new(surface))?;
                }
                DecodeStatus::NeedMoreInput => {
                    if self.state == LoopState::Draining {
                        // Decoding is complete.
                        let frames = self.pipeline.frames_written();
                        info!(frames, "decoder drained");
                        return Ok(RunSummary { frames });
                    }
                }
                DecodeStatus::NeedMoreSurfaces => {
                    // Internal surface pool; nothing for us to allocate.
                }
                DecodeStatus::DeviceBusy => {
                    thread::sleep(self.opts.busy_wait);
                }
                DecodeStatus::VideoParamsChanged => {
                    // With internally managed memory no reallocation is
                    // needed; acknowledge and continue.
                    debug!("new sequence header mid-stream");
                }
                DecodeStatus::ReallocationRequired => {
                    // Only meaningful with externally managed surfaces.
                }
                DecodeStatus::DeviceLost => {
                    error!("hardware context lost, tearing down");
                    return Err(DecodeError::DeviceLost);
                }
                DecodeStatus::IncompatibleVideoParams => {
                    error!("stream parameters require a session reinitialization");
                    return Err(DecodeError::IncompatibleVideoParams);
                }
                DecodeStatus::Other(code) => {
                    error!(code, "unexpected decoder status");
                    return Err(DecodeError::UnexpectedStatus(code));
                }
            }
        }
    }
}
