//! Implementation selection and session creation.
//!
//! The decoder runtime is reached through [`SessionProvider`] and
//! [`DecodeSession`]; this module owns the part with design content:
//! an ordered set of selection constraints resolved against the
//! property descriptions the available implementations advertise.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::bitstream::{Bitstream, Codec};
use crate::error::{BackendError, SessionError};
use crate::status::DecodeStatus;
use crate::surface::{DecodedSurface, SurfaceType};

/// Well-known key-paths in an implementation description.
pub mod paths {
    pub const IMPL_KIND: &str = "impl.kind";
    pub const DECODER_CODEC: &str = "decoder.codec";
    pub const API_VERSION: &str = "api.version";
    pub const ACCEL_MODE: &str = "accel.mode";
    pub const SHARING_TYPE: &str = "surface_sharing.type";
    pub const SHARING_COMPONENT: &str = "surface_sharing.component";
    pub const SHARING_FLAGS: &str = "surface_sharing.flags";
}

/// Pack an API version the way implementation descriptions carry it.
pub fn pack_api_version(major: u16, minor: u16) -> u32 {
    (major as u32) << 16 | minor as u32
}

/// Property value in an implementation description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    U32(u32),
    Str(String),
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::U32(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::U32(v) => write!(f, "{v}"),
            PropertyValue::Str(v) => f.write_str(v),
        }
    }
}

/// One required property of the implementation to be selected.
#[derive(Debug, Clone, Serialize)]
pub enum Constraint {
    /// The property must be present and equal.
    Equals { path: String, value: PropertyValue },
    /// The property must be a number greater than or equal to `value`
    /// (used for minimum API versions).
    AtLeast { path: String, value: u32 },
}

impl Constraint {
    fn matches(&self, info: &ImplementationInfo) -> bool {
        match self {
            Constraint::Equals { path, value } => info.get(path) == Some(value),
            Constraint::AtLeast { path, value } => {
                matches!(info.get(path), Some(PropertyValue::U32(v)) if v >= value)
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Equals { path, value } => write!(f, "{path} = {value}"),
            Constraint::AtLeast { path, value } => write!(f, "{path} >= {value}"),
        }
    }
}

/// Ordered list of selection constraints, combined by logical AND.
///
/// Order never affects the matching result; it is preserved so that
/// diagnostics list requirements in declaration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConstraintSet {
    items: Vec<Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, path: &str, value: impl Into<PropertyValue>) -> &mut Self {
        self.items.push(Constraint::Equals {
            path: path.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn require_at_least(&mut self, path: &str, value: u32) -> &mut Self {
        self.items.push(Constraint::AtLeast {
            path: path.to_string(),
            value,
        });
        self
    }

    /// The implementation must be a hardware one.
    pub fn hardware_impl(&mut self) -> &mut Self {
        self.require(paths::IMPL_KIND, "hardware")
    }

    /// The implementation must provide a decoder for `codec`.
    pub fn decoder_codec(&mut self, codec: Codec) -> &mut Self {
        self.require(paths::DECODER_CODEC, codec.as_str())
    }

    /// The implementation must provide at least this API version.
    pub fn min_api_version(&mut self, major: u16, minor: u16) -> &mut Self {
        self.require_at_least(paths::API_VERSION, pack_api_version(major, minor))
    }

    pub fn acceleration_mode(&mut self, mode: &str) -> &mut Self {
        self.require(paths::ACCEL_MODE, mode)
    }

    /// Surface sharing support for the decode component in shared
    /// export mode. Three associated properties, AND-combined like the
    /// rest of the set.
    pub fn surface_sharing(&mut self, surface_type: SurfaceType) -> &mut Self {
        self.require(paths::SHARING_TYPE, surface_type.as_str());
        self.require(paths::SHARING_COMPONENT, "decode");
        self.require(paths::SHARING_FLAGS, "export_shared")
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Description of one available decoder implementation.
#[derive(Debug, Clone, Serialize)]
pub struct ImplementationInfo {
    pub name: String,
    properties: BTreeMap<String, PropertyValue>,
}

impl ImplementationInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, path: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(path.to_string(), value.into());
        self
    }

    pub fn get(&self, path: &str) -> Option<&PropertyValue> {
        self.properties.get(path)
    }

    pub fn satisfies(&self, constraints: &ConstraintSet) -> bool {
        constraints.iter().all(|c| c.matches(self))
    }
}

/// Opaque device/interop context handle from the platform
/// initialization collaborator. Its lifetime must exceed the
/// session's, which borrowing enforces here.
pub trait DeviceContext {
    fn name(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

/// Outcome of one decode submission.
pub struct Submission {
    pub status: DecodeStatus,
    pub surface: Option<Box<dyn DecodedSurface>>,
}

/// A concrete decoder session. Owned by the loop for its entire run
/// and destroyed exactly once when dropped.
pub trait DecodeSession {
    /// Issue one asynchronous decode submission. `None` input means
    /// the loop is draining buffered frames. The submission may
    /// advance the bitstream's consumed offset; the data bytes are
    /// left untouched.
    fn submit(&mut self, input: Option<&mut Bitstream>) -> Result<Submission, BackendError>;
}

/// A backend able to create sessions, advertised by its description.
pub trait SessionProvider {
    fn info(&self) -> &ImplementationInfo;

    fn create_session(
        &self,
        device: &dyn DeviceContext,
    ) -> Result<Box<dyn DecodeSession>, BackendError>;
}

impl fmt::Debug for dyn SessionProvider + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionProvider")
            .field("info", self.info())
            .finish()
    }
}

/// Resolves an ordered constraint set to one concrete implementation.
pub struct SessionConfigurator {
    constraints: ConstraintSet,
}

impl SessionConfigurator {
    pub fn new(constraints: ConstraintSet) -> Self {
        Self { constraints }
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// First provider whose description satisfies every constraint.
    /// Failure is terminal for the pipeline; callers do not retry with
    /// relaxed constraints.
    pub fn resolve<'a>(
        &self,
        providers: &'a [Box<dyn SessionProvider>],
    ) -> Result<&'a dyn SessionProvider, SessionError> {
        for provider in providers {
            if provider.info().satisfies(&self.constraints) {
                debug!(
                    implementation = %provider.info().name,
                    "implementation selected"
                );
                return Ok(provider.as_ref());
            }
        }
        let listed = self
            .constraints
            .iter()
            .map(Constraint::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Err(SessionError::NoMatchingImplementation(listed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hw_hevc_info() -> ImplementationInfo {
        ImplementationInfo::new("hw-a")
            .with(paths::IMPL_KIND, "hardware")
            .with(paths::DECODER_CODEC, "hevc")
            .with(paths::API_VERSION, pack_api_version(2, 9))
    }

    struct DummyProvider(ImplementationInfo);

    impl SessionProvider for DummyProvider {
        fn info(&self) -> &ImplementationInfo {
            &self.0
        }

        fn create_session(
            &self,
            _device: &dyn DeviceContext,
        ) -> Result<Box<dyn DecodeSession>, BackendError> {
            Err(BackendError::Unsupported("dummy".into()))
        }
    }

    #[test]
    fn constraints_are_and_combined() {
        let info = hw_hevc_info();
        let mut set = ConstraintSet::new();
        set.hardware_impl().decoder_codec(Codec::Hevc);
        assert!(info.satisfies(&set));

        set.decoder_codec(Codec::Av1);
        assert!(!info.satisfies(&set));
    }

    #[test]
    fn at_least_matches_newer_versions_only() {
        let info = hw_hevc_info();

        let mut ok = ConstraintSet::new();
        ok.min_api_version(2, 2);
        assert!(info.satisfies(&ok));

        let mut newer = ConstraintSet::new();
        newer.min_api_version(2, 10);
        assert!(!info.satisfies(&newer));

        // A string-valued property never satisfies a numeric minimum.
        let mut wrong_type = ConstraintSet::new();
        wrong_type.require_at_least(paths::IMPL_KIND, 1);
        assert!(!info.satisfies(&wrong_type));
    }

    #[test]
    fn resolve_picks_first_matching_provider() {
        let providers: Vec<Box<dyn SessionProvider>> = vec![
            Box::new(DummyProvider(
                ImplementationInfo::new("sw").with(paths::IMPL_KIND, "software"),
            )),
            Box::new(DummyProvider(hw_hevc_info())),
        ];

        let mut set = ConstraintSet::new();
        set.hardware_impl();
        let resolved = SessionConfigurator::new(set).resolve(&providers).unwrap();
        assert_eq!(resolved.info().name, "hw-a");
    }

    #[test]
    fn no_match_lists_constraints_in_declaration_order() {
        let providers: Vec<Box<dyn SessionProvider>> = vec![Box::new(DummyProvider(
            ImplementationInfo::new("sw").with(paths::IMPL_KIND, "software"),
        ))];

        let mut set = ConstraintSet::new();
        set.hardware_impl().min_api_version(2, 9);
        let err = SessionConfigurator::new(set)
            .resolve(&providers)
            .unwrap_err();
        let msg = err.to_string();
        let kind = msg.find("impl.kind = hardware").unwrap();
        let version = msg.find("api.version >=").unwrap();
        assert!(kind < version);
    }
}
