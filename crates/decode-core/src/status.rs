//! Status codes driving the decode loop.

/// Status returned by one asynchronous decode submission.
///
/// The vendor status space is open-ended; this is a closed union over
/// the codes the loop acts on, with everything else collapsing into
/// [`DecodeStatus::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// A decoded surface is ready.
    Ready,
    /// The decoder needs more encoded bytes before it can proceed.
    NeedMoreInput,
    /// The output surface pool is exhausted. Only relevant with
    /// externally managed surfaces.
    NeedMoreSurfaces,
    /// The hardware context is gone.
    DeviceLost,
    /// Transient resource contention; retry after a short delay.
    DeviceBusy,
    /// A new sequence header was detected mid-stream.
    VideoParamsChanged,
    /// Stream parameters conflict with the session initialization.
    IncompatibleVideoParams,
    /// The output surface needs resizing. Only relevant with
    /// externally managed surfaces.
    ReallocationRequired,
    /// Any vendor code this harness does not recognize.
    Other(i32),
}

/// Result of polling a surface sync token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The surface holds a complete decoded frame.
    Done,
    /// Decode is still running; poll again.
    InProgress,
}
