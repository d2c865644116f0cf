//! Core harness around an asynchronous hardware decode API.
//!
//! The hardware runtime itself is an external collaborator reached
//! through the traits in [`session`] and [`surface`]; this crate owns the
//! glue that has real design content: bounded bitstream feeding,
//! implementation selection by constraint matching, the decode status
//! state machine, and the surface export/copy-back pipeline with its
//! strict release ordering.

pub mod bitstream;
pub mod decode_loop;
pub mod error;
pub mod export;
pub mod session;
pub mod status;
pub mod surface;

pub use bitstream::{Bitstream, BitstreamFeeder, Codec, FeedStatus};
pub use decode_loop::{DecodeLoop, LoopOptions, LoopState, RunSummary};
pub use error::{BackendError, DecodeError, ExportError, SessionError};
pub use export::{ExportOptions, FrameExportPipeline};
pub use session::{
    pack_api_version, Constraint, ConstraintSet, DecodeSession, DeviceContext,
    ImplementationInfo, PropertyValue, SessionConfigurator, SessionProvider, Submission,
};
pub use status::{DecodeStatus, SyncStatus};
pub use surface::{
    DecodedSurface, ExportDescriptor, ExportFlags, ExportedGuard, ExportedSurface, FourCc,
    FrameInfo, HostFrame, SurfaceGuard, SurfaceType,
};
