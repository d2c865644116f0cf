//! Decoded-surface and interop-export contracts, plus the scoped
//! ownership wrappers that make release-exactly-once structural
//! instead of a call-site convention.

use std::io::{self, Write};
use std::time::Duration;

use tracing::warn;

use crate::error::BackendError;
use crate::status::SyncStatus;

/// Native pixel layout of a decoded surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FourCc {
    Nv12,
    P010,
}

/// Geometry the decoder reports for an output surface.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCc,
}

/// Interop domain a surface can be exported into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceType {
    OpenClImage2d,
    D3d11Texture2d,
    VaapiSurface,
}

impl SurfaceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceType::OpenClImage2d => "opencl_img2d",
            SurfaceType::D3d11Texture2d => "d3d11_texture2d",
            SurfaceType::VaapiSurface => "vaapi",
        }
    }
}

/// Sharing mode requested for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFlags {
    /// Share the underlying allocation with the interop domain.
    Shared,
    /// Materialize a copy in the interop domain.
    Copied,
}

/// Surface-type/flags descriptor carried into the export call.
#[derive(Debug, Clone, Copy)]
pub struct ExportDescriptor {
    pub surface_type: SurfaceType,
    pub flags: ExportFlags,
}

/// A hardware-owned decoded frame, borrowed from the decoder between a
/// successful submission and the matching release.
pub trait DecodedSurface {
    fn info(&self) -> FrameInfo;

    /// Poll the surface sync token with a bounded wait.
    fn synchronize(&mut self, timeout: Duration) -> Result<SyncStatus, BackendError>;

    /// Export into an interop-domain handle. Must not be called before
    /// `synchronize` reports [`SyncStatus::Done`].
    fn export(&mut self, desc: ExportDescriptor)
        -> Result<Box<dyn ExportedSurface>, BackendError>;

    /// Return the surface to the decoder pool. Called exactly once.
    fn release(&mut self) -> Result<(), BackendError>;
}

/// Interop-domain view of a decoded surface. Must not outlive the
/// surface it was exported from.
pub trait ExportedSurface {
    /// Device-specific plane copy into host memory.
    fn copy_to_host(&self, frame: &mut HostFrame) -> Result<(), BackendError>;

    /// Release the interop copy resources (images/buffers), separate
    /// from releasing the handle object itself.
    fn release_planes(&mut self) -> Result<(), BackendError>;

    /// Release the exported handle object. Called exactly once.
    fn release(&mut self) -> Result<(), BackendError>;
}

/// Scoped ownership for a decode surface: release happens exactly once
/// on every exit path. The happy path calls [`SurfaceGuard::release`]
/// so failures are observable; `Drop` only covers early exits.
pub struct SurfaceGuard {
    inner: Option<Box<dyn DecodedSurface>>,
}

impl SurfaceGuard {
    pub fn new(surface: Box<dyn DecodedSurface>) -> Self {
        Self {
            inner: Some(surface),
        }
    }

    fn surface(&mut self) -> &mut dyn DecodedSurface {
        // Invariant: `inner` is only taken by release() and Drop, both
        // of which consume the guard.
        self.inner
            .as_deref_mut()
            .expect("surface accessed after release")
    }

    pub fn info(&mut self) -> FrameInfo {
        self.surface().info()
    }

    pub fn synchronize(&mut self, timeout: Duration) -> Result<SyncStatus, BackendError> {
        self.surface().synchronize(timeout)
    }

    pub fn export(
        &mut self,
        desc: ExportDescriptor,
    ) -> Result<Box<dyn ExportedSurface>, BackendError> {
        self.surface().export(desc)
    }

    /// Explicit release for the success path.
    pub fn release(mut self) -> Result<(), BackendError> {
        match self.inner.take() {
            Some(mut surface) => surface.release(),
            None => Ok(()),
        }
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        if let Some(mut surface) = self.inner.take() {
            if let Err(e) = surface.release() {
                warn!("decode surface release failed during cleanup: {e}");
            }
        }
    }
}

/// Same discipline for an exported handle: the interop plane resources
/// and the handle object each get released exactly once.
pub struct ExportedGuard {
    inner: Option<Box<dyn ExportedSurface>>,
    planes_released: bool,
}

impl ExportedGuard {
    pub fn new(exported: Box<dyn ExportedSurface>) -> Self {
        Self {
            inner: Some(exported),
            planes_released: false,
        }
    }

    pub fn copy_to_host(&self, frame: &mut HostFrame) -> Result<(), BackendError> {
        match self.inner.as_deref() {
            Some(exported) => exported.copy_to_host(frame),
            None => Err(BackendError::Device(
                "exported surface used after release".into(),
            )),
        }
    }

    pub fn release_planes(&mut self) -> Result<(), BackendError> {
        if self.planes_released {
            return Ok(());
        }
        self.planes_released = true;
        match self.inner.as_deref_mut() {
            Some(exported) => exported.release_planes(),
            None => Ok(()),
        }
    }

    /// Explicit release for the success path.
    pub fn release(mut self) -> Result<(), BackendError> {
        if let Some(mut exported) = self.inner.take() {
            if !self.planes_released {
                self.planes_released = true;
                exported.release_planes()?;
            }
            exported.release()
        } else {
            Ok(())
        }
    }
}

impl Drop for ExportedGuard {
    fn drop(&mut self) {
        if let Some(mut exported) = self.inner.take() {
            if !self.planes_released {
                if let Err(e) = exported.release_planes() {
                    warn!("interop plane release failed during cleanup: {e}");
                }
            }
            if let Err(e) = exported.release() {
                warn!("exported surface release failed during cleanup: {e}");
            }
        }
    }
}

/// Host-memory destination for the interop plane copy, in the
/// decoder's native NV12 layout.
///
/// The backing buffer is `width * height * 3` bytes; only the Y and UV
/// plane regions are ever written to the sink.
pub struct HostFrame {
    width: usize,
    height: usize,
    buf: Vec<u8>,
}

impl HostFrame {
    pub fn new(info: FrameInfo) -> Self {
        let (width, height) = (info.width as usize, info.height as usize);
        Self {
            width,
            height,
            buf: vec![0u8; width * height * 3],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn y_len(&self) -> usize {
        self.width * self.height
    }

    fn uv_len(&self) -> usize {
        // Interleaved 2-component chroma at half resolution.
        2 * self.width.div_ceil(2) * self.height.div_ceil(2)
    }

    pub fn y(&self) -> &[u8] {
        &self.buf[..self.y_len()]
    }

    pub fn y_mut(&mut self) -> &mut [u8] {
        let n = self.y_len();
        &mut self.buf[..n]
    }

    pub fn uv(&self) -> &[u8] {
        let start = self.y_len();
        &self.buf[start..start + self.uv_len()]
    }

    pub fn uv_mut(&mut self) -> &mut [u8] {
        let start = self.y_len();
        let n = self.uv_len();
        &mut self.buf[start..start + n]
    }

    /// Append plane0 then plane1 to the sink, row-major, no header.
    pub fn write_to(&self, sink: &mut dyn Write) -> io::Result<()> {
        sink.write_all(self.y())?;
        sink.write_all(self.uv())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_frame_plane_sizes() {
        let frame = HostFrame::new(FrameInfo {
            width: 6,
            height: 4,
            fourcc: FourCc::Nv12,
        });
        assert_eq!(frame.y().len(), 24);
        assert_eq!(frame.uv().len(), 12);
    }

    #[test]
    fn host_frame_rounds_odd_dimensions_up() {
        let frame = HostFrame::new(FrameInfo {
            width: 5,
            height: 3,
            fourcc: FourCc::Nv12,
        });
        assert_eq!(frame.y().len(), 15);
        // 2 * ceil(5/2) * ceil(3/2)
        assert_eq!(frame.uv().len(), 12);
    }

    #[test]
    fn write_to_emits_luma_then_chroma() {
        let mut frame = HostFrame::new(FrameInfo {
            width: 2,
            height: 2,
            fourcc: FourCc::Nv12,
        });
        frame.y_mut().fill(0xaa);
        frame.uv_mut().fill(0xbb);

        let mut out = Vec::new();
        frame.write_to(&mut out).unwrap();
        assert_eq!(out, vec![0xaa, 0xaa, 0xaa, 0xaa, 0xbb, 0xbb]);
    }
}
