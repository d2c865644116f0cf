//! Plugin GUID lookup helper.
//!
//! Maps symbolic plugin names to their 16-byte identifiers and parses
//! plain 32-character hex strings. The table is built once at startup
//! and injected wherever resolution happens; there is no ambient
//! global state.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unknown plugin '{0}' (expected a known name or a 32-character hex GUID)")]
    Unknown(String),
}

/// 16-byte plugin identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginId([u8; 16]);

impl PluginId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

const HEVCD_SW: PluginId = PluginId::from_bytes([
    0x15, 0xdd, 0x93, 0x68, 0x25, 0xad, 0x47, 0x5a, 0x87, 0x4d, 0x10, 0xaa, 0x24, 0xaa, 0x0c,
    0xae,
]);
const HEVCD_HW: PluginId = PluginId::from_bytes([
    0x33, 0xa6, 0x1c, 0x0b, 0x4c, 0x27, 0x45, 0x4c, 0xa8, 0xd8, 0x5d, 0xde, 0x75, 0x7c, 0x6f,
    0x8e,
]);
const HEVCE_SW: PluginId = PluginId::from_bytes([
    0x2f, 0xca, 0x99, 0x74, 0x9f, 0xdb, 0x49, 0xae, 0xb1, 0x21, 0xa5, 0xb6, 0x3e, 0xf5, 0x68,
    0xf7,
]);
const HEVCE_HW: PluginId = PluginId::from_bytes([
    0x6f, 0xad, 0xc7, 0x91, 0xa0, 0xc2, 0xeb, 0x47, 0x9a, 0xb6, 0xdc, 0xd5, 0xea, 0x9d, 0xa3,
    0x47,
]);
const VP8D_HW: PluginId = PluginId::from_bytes([
    0xf6, 0x22, 0x39, 0x4d, 0x8d, 0x87, 0x45, 0x2f, 0x87, 0x8c, 0x51, 0xf2, 0xfc, 0x9b, 0x41,
    0x31,
]);
const VP9D_HW: PluginId = PluginId::from_bytes([
    0xa9, 0x22, 0x39, 0x4d, 0x8d, 0x87, 0x45, 0x2f, 0x87, 0x8c, 0x51, 0xf2, 0xfc, 0x9b, 0x41,
    0x31,
]);
const H264_LA_HW: PluginId = PluginId::from_bytes([
    0x58, 0x8f, 0x11, 0x85, 0xd4, 0x7b, 0x42, 0x96, 0x8d, 0xea, 0x37, 0x7b, 0xb5, 0xd0, 0xdc,
    0xb4,
]);

/// Immutable name-to-identifier table.
pub struct PluginRegistry {
    table: BTreeMap<&'static str, PluginId>,
}

impl PluginRegistry {
    /// Table of the well-known decode/encode plugins.
    pub fn builtin() -> Self {
        let table = BTreeMap::from([
            ("hevcd_sw", HEVCD_SW),
            ("hevcd_hw", HEVCD_HW),
            ("hevce_sw", HEVCE_SW),
            ("hevce_hw", HEVCE_HW),
            ("vp8d_hw", VP8D_HW),
            ("vp9d_hw", VP9D_HW),
            ("h264_la_hw", H264_LA_HW),
        ]);
        Self { table }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.keys().copied()
    }

    /// Accepts a known symbolic name or a plain 32-character hex GUID;
    /// anything else is unknown.
    pub fn resolve(&self, name: &str) -> Result<PluginId, ResolveError> {
        if let Some(id) = self.table.get(name) {
            return Ok(*id);
        }
        parse_hex_guid(name).ok_or_else(|| ResolveError::Unknown(name.to_string()))
    }
}

fn parse_hex_guid(s: &str) -> Option<PluginId> {
    let bytes = s.as_bytes();
    if bytes.len() != 32 {
        return None;
    }
    let mut id = [0u8; 16];
    for (i, chunk) in bytes.chunks_exact(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        id[i] = (hi * 16 + lo) as u8;
    }
    Some(PluginId::from_bytes(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbolic_names_resolve() {
        let registry = PluginRegistry::builtin();
        let id = registry.resolve("hevcd_hw").unwrap();
        assert_eq!(id.to_string(), "33a61c0b4c27454ca8d85dde757c6f8e");
    }

    #[test]
    fn hex_strings_resolve_case_insensitively() {
        let registry = PluginRegistry::builtin();
        let lower = registry.resolve("15dd936825ad475a874d10aa24aa0cae").unwrap();
        let upper = registry.resolve("15DD936825AD475A874D10AA24AA0CAE").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower, registry.resolve("hevcd_sw").unwrap());
    }

    #[test]
    fn wrong_length_or_garbage_is_unknown() {
        let registry = PluginRegistry::builtin();
        assert_eq!(
            registry.resolve("hevcd"),
            Err(ResolveError::Unknown("hevcd".into()))
        );
        // 31 chars
        assert!(registry
            .resolve("15dd936825ad475a874d10aa24aa0ca")
            .is_err());
        // right length, not hex
        assert!(registry
            .resolve("zzdd936825ad475a874d10aa24aa0cae")
            .is_err());
    }

    #[test]
    fn display_round_trips_through_resolve() {
        let registry = PluginRegistry::builtin();
        for name in registry.names() {
            let id = registry.resolve(name).unwrap();
            assert_eq!(registry.resolve(&id.to_string()).unwrap(), id);
        }
    }
}
