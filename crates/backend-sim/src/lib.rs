//! Deterministic stand-in for the vendor decode runtime.
//!
//! Real decoding happens inside a closed hardware SDK; this backend
//! implements the same session and surface contracts over a trivial
//! framed NV12 stream (see [`stream`]) so the harness runs end to end
//! without the hardware runtime installed. Surfaces report a
//! configurable number of still-running sync polls to exercise the
//! busy-poll path, and release calls are counted so tests can assert
//! the no-leak/no-double-release property.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use decode_core::session::paths;
use decode_core::{
    pack_api_version, BackendError, Bitstream, Codec, DecodeSession, DecodeStatus,
    DecodedSurface, DeviceContext, ExportDescriptor, ExportedSurface, FourCc, FrameInfo,
    HostFrame, ImplementationInfo, SessionProvider, Submission, SurfaceType, SyncStatus,
};

pub mod stream;

use stream::Parsed;

/// Marker device context standing in for the platform device handle.
#[derive(Default)]
pub struct SimDevice;

impl SimDevice {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceContext for SimDevice {
    fn name(&self) -> &str {
        "sim-device-0"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Release accounting, shared between provider, sessions and tests.
#[derive(Debug, Default)]
pub struct SimStats {
    pub surfaces_created: AtomicUsize,
    pub surfaces_released: AtomicUsize,
    pub exports_released: AtomicUsize,
}

/// Provider advertising a simulated hardware decoder for one codec.
pub struct SimProvider {
    info: ImplementationInfo,
    sync_latency: u32,
    stats: Arc<SimStats>,
}

impl SimProvider {
    pub fn new(codec: Codec) -> Self {
        let info = ImplementationInfo::new(format!("sim-hw-{}", codec.as_str()))
            .with(paths::IMPL_KIND, "hardware")
            .with(paths::DECODER_CODEC, codec.as_str())
            .with(paths::API_VERSION, pack_api_version(2, 9))
            .with(paths::ACCEL_MODE, "opencl")
            .with(paths::SHARING_TYPE, SurfaceType::OpenClImage2d.as_str())
            .with(paths::SHARING_COMPONENT, "decode")
            .with(paths::SHARING_FLAGS, "export_shared");
        Self {
            info,
            sync_latency: 1,
            stats: Arc::default(),
        }
    }

    /// Still-running polls each surface reports before `Done`.
    pub fn with_sync_latency(mut self, polls: u32) -> Self {
        self.sync_latency = polls;
        self
    }

    pub fn stats(&self) -> Arc<SimStats> {
        self.stats.clone()
    }
}

impl SessionProvider for SimProvider {
    fn info(&self) -> &ImplementationInfo {
        &self.info
    }

    fn create_session(
        &self,
        device: &dyn DeviceContext,
    ) -> Result<Box<dyn DecodeSession>, BackendError> {
        debug!(
            device = device.name(),
            implementation = %self.info.name,
            "simulated session created"
        );
        Ok(Box::new(SimSession {
            sync_latency: self.sync_latency,
            stats: self.stats.clone(),
        }))
    }
}

struct SimSession {
    sync_latency: u32,
    stats: Arc<SimStats>,
}

impl DecodeSession for SimSession {
    fn submit(&mut self, input: Option<&mut Bitstream>) -> Result<Submission, BackendError> {
        let Some(bitstream) = input else {
            // Nothing is buffered inside this backend, so draining is
            // immediately complete.
            return Ok(Submission {
                status: DecodeStatus::NeedMoreInput,
                surface: None,
            });
        };
        match stream::parse_frame(bitstream.unconsumed()) {
            Parsed::Frame {
                width,
                height,
                payload,
                consumed,
            } => {
                bitstream.consume(consumed);
                self.stats.surfaces_created.fetch_add(1, Ordering::SeqCst);
                let surface = SimSurface {
                    width,
                    height,
                    payload,
                    remaining_polls: self.sync_latency,
                    stats: self.stats.clone(),
                    released: false,
                };
                Ok(Submission {
                    status: DecodeStatus::Ready,
                    surface: Some(Box::new(surface)),
                })
            }
            Parsed::NeedMore => Ok(Submission {
                status: DecodeStatus::NeedMoreInput,
                surface: None,
            }),
            // Unframed garbage maps onto the catch-all status a real
            // runtime would produce for undecodable input.
            Parsed::Corrupt => Ok(Submission {
                status: DecodeStatus::Other(-1),
                surface: None,
            }),
        }
    }
}

struct SimSurface {
    width: u16,
    height: u16,
    payload: Vec<u8>,
    remaining_polls: u32,
    stats: Arc<SimStats>,
    released: bool,
}

impl DecodedSurface for SimSurface {
    fn info(&self) -> FrameInfo {
        FrameInfo {
            width: self.width as u32,
            height: self.height as u32,
            fourcc: FourCc::Nv12,
        }
    }

    fn synchronize(&mut self, _timeout: Duration) -> Result<SyncStatus, BackendError> {
        // Latency is modelled in poll counts; the timeout only bounds
        // how long a real runtime would block per poll.
        if self.remaining_polls > 0 {
            self.remaining_polls -= 1;
            Ok(SyncStatus::InProgress)
        } else {
            Ok(SyncStatus::Done)
        }
    }

    fn export(
        &mut self,
        _desc: ExportDescriptor,
    ) -> Result<Box<dyn ExportedSurface>, BackendError> {
        if self.released {
            return Err(BackendError::Device("export after release".into()));
        }
        let y_len = self.width as usize * self.height as usize;
        Ok(Box::new(SimExported {
            y: self.payload[..y_len].to_vec(),
            uv: self.payload[y_len..].to_vec(),
            stats: self.stats.clone(),
        }))
    }

    fn release(&mut self) -> Result<(), BackendError> {
        if self.released {
            return Err(BackendError::Device("surface released twice".into()));
        }
        self.released = true;
        self.stats.surfaces_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct SimExported {
    y: Vec<u8>,
    uv: Vec<u8>,
    stats: Arc<SimStats>,
}

impl ExportedSurface for SimExported {
    fn copy_to_host(&self, frame: &mut HostFrame) -> Result<(), BackendError> {
        if frame.y_mut().len() != self.y.len() || frame.uv_mut().len() != self.uv.len() {
            return Err(BackendError::Device("plane size mismatch".into()));
        }
        frame.y_mut().copy_from_slice(&self.y);
        frame.uv_mut().copy_from_slice(&self.uv);
        Ok(())
    }

    fn release_planes(&mut self) -> Result<(), BackendError> {
        self.y = Vec::new();
        self.uv = Vec::new();
        Ok(())
    }

    fn release(&mut self) -> Result<(), BackendError> {
        self.stats.exports_released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
