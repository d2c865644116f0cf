use std::io;
use thiserror::Error;

/// Failure reported by the decoder backend itself (session, surface or
/// export call into the hardware runtime).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("device error: {0}")]
    Device(String),
    #[error("operation not supported by this implementation: {0}")]
    Unsupported(String),
}

/// Implementation selection failure. Terminal for the whole pipeline;
/// constraints are never retried relaxed.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no implementation satisfies the requested constraints: [{0}]")]
    NoMatchingImplementation(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Per-frame export failure. Any of these aborts the run; there is no
/// partial-frame recovery.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("surface synchronize failed: {0}")]
    Sync(#[source] BackendError),
    #[error("surface still running after {0} synchronize attempts")]
    SyncExhausted(u32),
    #[error("surface export failed: {0}")]
    Export(#[source] BackendError),
    #[error("interop copy to host memory failed: {0}")]
    Copy(#[source] BackendError),
    #[error("writing raw frame to sink failed: {0}")]
    Write(#[source] io::Error),
    #[error("surface release failed: {0}")]
    Release(#[source] BackendError),
}

/// Terminal decode-loop failure. Transient statuses (busy, more
/// surfaces, params changed) are retried inside the loop and never
/// surface here.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("bitstream read failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("decode submission failed: {0}")]
    Backend(#[from] BackendError),
    #[error("decoder reported a ready frame without an output surface")]
    MissingSurface,
    #[error("hardware device lost")]
    DeviceLost,
    #[error("stream parameters are incompatible with the initialized session")]
    IncompatibleVideoParams,
    #[error("unexpected decoder status {0}")]
    UnexpectedStatus(i32),
}
