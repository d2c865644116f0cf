//! Per-frame export pipeline: synchronize, export to the interop
//! domain, copy back to host memory, append to the raw sink.

use std::io::Write;
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::ExportError;
use crate::status::SyncStatus;
use crate::surface::{
    ExportDescriptor, ExportFlags, ExportedGuard, HostFrame, SurfaceGuard, SurfaceType,
};

/// Sync and export policy.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Bounded wait per synchronize poll.
    pub sync_timeout: Duration,
    /// Still-running polls tolerated before the frame is abandoned.
    /// `None` retries indefinitely; a truly stuck device then spins
    /// here.
    pub max_sync_attempts: Option<u32>,
    /// Descriptor passed to the export call.
    pub descriptor: ExportDescriptor,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_millis(100),
            max_sync_attempts: None,
            descriptor: ExportDescriptor {
                surface_type: SurfaceType::OpenClImage2d,
                flags: ExportFlags::Shared,
            },
        }
    }
}

/// Exports each decoded surface to an interop handle, copies the
/// planes to host memory and appends them to the raw output sink, in a
/// fixed order. Any step failure is fatal to the run.
pub struct FrameExportPipeline<W> {
    sink: W,
    opts: ExportOptions,
    frames_written: u64,
}

impl<W: Write> FrameExportPipeline<W> {
    pub fn new(sink: W, opts: ExportOptions) -> Self {
        Self {
            sink,
            opts,
            frames_written: 0,
        }
    }

    /// Frames fully written to the sink so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Run the fixed sequence on one decoded surface. The surface is
    /// released exactly once on every path out of here, via the guard.
    pub fn export_and_save(&mut self, mut surface: SurfaceGuard) -> Result<(), ExportError> {
        let mut attempts: u32 = 0;
        loop {
            match surface.synchronize(self.opts.sync_timeout) {
                Ok(SyncStatus::Done) => break,
                Ok(SyncStatus::InProgress) => {
                    attempts += 1;
                    trace!(attempts, "surface still running, re-polling");
                    if let Some(max) = self.opts.max_sync_attempts {
                        if attempts >= max {
                            return Err(ExportError::SyncExhausted(attempts));
                        }
                    }
                }
                Err(e) => return Err(ExportError::Sync(e)),
            }
        }

        let info = surface.info();
        let mut frame = HostFrame::new(info);

        let exported = surface
            .export(self.opts.descriptor)
            .map_err(ExportError::Export)?;
        let mut exported = ExportedGuard::new(exported);

        exported.copy_to_host(&mut frame).map_err(ExportError::Copy)?;
        // The interop images are no longer needed once the planes are
        // in host memory.
        exported.release_planes().map_err(ExportError::Release)?;
        frame.write_to(&mut self.sink).map_err(ExportError::Write)?;
        exported.release().map_err(ExportError::Release)?;

        self.frames_written += 1;
        debug!(
            frame = self.frames_written,
            width = info.width,
            height = info.height,
            "frame exported"
        );

        surface.release().map_err(ExportError::Release)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::surface::{DecodedSurface, ExportedSurface, FourCc, FrameInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        surface_released: AtomicUsize,
        planes_released: AtomicUsize,
        exported_released: AtomicUsize,
    }

    struct FakeSurface {
        counters: Arc<Counters>,
        pending_polls: u32,
        fail_copy: bool,
    }

    impl DecodedSurface for FakeSurface {
        fn info(&self) -> FrameInfo {
            FrameInfo {
                width: 4,
                height: 2,
                fourcc: FourCc::Nv12,
            }
        }

        fn synchronize(&mut self, _timeout: Duration) -> Result<SyncStatus, BackendError> {
            if self.pending_polls > 0 {
                self.pending_polls -= 1;
                Ok(SyncStatus::InProgress)
            } else {
                Ok(SyncStatus::Done)
            }
        }

        fn export(
            &mut self,
            _desc: ExportDescriptor,
        ) -> Result<Box<dyn ExportedSurface>, BackendError> {
            Ok(Box::new(FakeExported {
                counters: self.counters.clone(),
                fail_copy: self.fail_copy,
            }))
        }

        fn release(&mut self) -> Result<(), BackendError> {
            self.counters.surface_released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeExported {
        counters: Arc<Counters>,
        fail_copy: bool,
    }

    impl ExportedSurface for FakeExported {
        fn copy_to_host(&self, frame: &mut HostFrame) -> Result<(), BackendError> {
            if self.fail_copy {
                return Err(BackendError::Device("copy failed".into()));
            }
            frame.y_mut().fill(0x11);
            frame.uv_mut().fill(0x22);
            Ok(())
        }

        fn release_planes(&mut self) -> Result<(), BackendError> {
            self.counters.planes_released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn release(&mut self) -> Result<(), BackendError> {
            self.counters
                .exported_released
                .fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pipeline(opts: ExportOptions) -> FrameExportPipeline<Vec<u8>> {
        FrameExportPipeline::new(Vec::new(), opts)
    }

    #[test]
    fn still_running_is_repolled_until_done() {
        let counters = Arc::new(Counters::default());
        let mut p = pipeline(ExportOptions::default());
        let surface = SurfaceGuard::new(Box::new(FakeSurface {
            counters: counters.clone(),
            pending_polls: 3,
            fail_copy: false,
        }));

        p.export_and_save(surface).unwrap();

        assert_eq!(p.frames_written(), 1);
        // 4x2 NV12: 8 luma + 4 chroma bytes.
        assert_eq!(p.sink.len(), 12);
        assert_eq!(&p.sink[..8], &[0x11; 8]);
        assert_eq!(&p.sink[8..], &[0x22; 4]);
        assert_eq!(counters.surface_released.load(Ordering::SeqCst), 1);
        assert_eq!(counters.planes_released.load(Ordering::SeqCst), 1);
        assert_eq!(counters.exported_released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bounded_sync_poll_abandons_stuck_surface() {
        let counters = Arc::new(Counters::default());
        let mut p = pipeline(ExportOptions {
            max_sync_attempts: Some(3),
            ..ExportOptions::default()
        });
        let surface = SurfaceGuard::new(Box::new(FakeSurface {
            counters: counters.clone(),
            pending_polls: 100,
            fail_copy: false,
        }));

        let err = p.export_and_save(surface).unwrap_err();
        assert!(matches!(err, ExportError::SyncExhausted(3)));
        assert_eq!(p.frames_written(), 0);
        // The guard still released the surface on the error path.
        assert_eq!(counters.surface_released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn copy_failure_releases_everything_once() {
        let counters = Arc::new(Counters::default());
        let mut p = pipeline(ExportOptions::default());
        let surface = SurfaceGuard::new(Box::new(FakeSurface {
            counters: counters.clone(),
            pending_polls: 0,
            fail_copy: true,
        }));

        let err = p.export_and_save(surface).unwrap_err();
        assert!(matches!(err, ExportError::Copy(_)));
        assert_eq!(p.frames_written(), 0);
        assert_eq!(counters.surface_released.load(Ordering::SeqCst), 1);
        assert_eq!(counters.planes_released.load(Ordering::SeqCst), 1);
        assert_eq!(counters.exported_released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sync_error_is_fatal_and_releases_surface() {
        struct BrokenSurface(Arc<Counters>);

        impl DecodedSurface for BrokenSurface {
            fn info(&self) -> FrameInfo {
                FrameInfo {
                    width: 4,
                    height: 2,
                    fourcc: FourCc::Nv12,
                }
            }

            fn synchronize(&mut self, _timeout: Duration) -> Result<SyncStatus, BackendError> {
                Err(BackendError::Device("sync failed".into()))
            }

            fn export(
                &mut self,
                _desc: ExportDescriptor,
            ) -> Result<Box<dyn ExportedSurface>, BackendError> {
                unreachable!("export must not run after a sync error")
            }

            fn release(&mut self) -> Result<(), BackendError> {
                self.0.surface_released.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let counters = Arc::new(Counters::default());
        let mut p = pipeline(ExportOptions::default());
        let err = p
            .export_and_save(SurfaceGuard::new(Box::new(BrokenSurface(counters.clone()))))
            .unwrap_err();
        assert!(matches!(err, ExportError::Sync(_)));
        assert_eq!(counters.surface_released.load(Ordering::SeqCst), 1);
    }
}
