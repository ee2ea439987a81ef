//! Bridge configuration.

use std::env;

/// Member names used for the two halves of a complex compound.
///
/// Only name pairs that the reader also recognizes can be chosen, so anything
/// the bridge writes reads back as complex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComplexNames {
    /// `r` / `i`
    #[default]
    Ri,
    /// `re` / `im`
    ReIm,
    /// `real` / `imag`
    RealImag,
}

impl ComplexNames {
    pub const ALL: [ComplexNames; 3] = [ComplexNames::Ri, ComplexNames::ReIm, ComplexNames::RealImag];

    /// `(real, imaginary)` member names.
    pub fn pair(self) -> (&'static str, &'static str) {
        match self {
            ComplexNames::Ri => ("r", "i"),
            ComplexNames::ReIm => ("re", "im"),
            ComplexNames::RealImag => ("real", "imag"),
        }
    }

    /// The pair matching two member names, ignoring ASCII case.
    pub fn recognize(real: &str, imag: &str) -> Option<ComplexNames> {
        Self::ALL.into_iter().find(|names| {
            let (r, i) = names.pair();
            real.eq_ignore_ascii_case(r) && imag.eq_ignore_ascii_case(i)
        })
    }
}

/// Options controlling type mapping, attribute decoding and hierarchy walks.
///
/// ```
/// use rustyhdf5_bridge::{BridgeConfig, ComplexNames};
///
/// let config = BridgeConfig::default()
///     .with_complex_names(ComplexNames::ReIm)
///     .with_max_depth(8);
/// assert!(config.int64_extension);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Map 8-byte integers to the 64-bit extension element codes. When off,
    /// 8-byte integer data is rejected as unsupported.
    pub int64_extension: bool,
    /// Member names for complex compounds that the bridge creates.
    pub complex_names: ComplexNames,
    /// Decode string attributes of rank 1 or more as one flat list of text
    /// values instead of a nested list.
    pub flat_string_arrays: bool,
    /// Deepest group nesting the hierarchy walk descends into.
    pub max_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            int64_extension: true,
            complex_names: ComplexNames::Ri,
            flat_string_arrays: false,
            max_depth: 64,
        }
    }
}

impl BridgeConfig {
    /// Defaults overlaid with `RUSTYHDF5_BRIDGE_INT64`, `RUSTYHDF5_BRIDGE_FLAT_STRINGS`
    /// and `RUSTYHDF5_BRIDGE_MAX_DEPTH`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("RUSTYHDF5_BRIDGE_INT64").and_then(|v| parse_flag(&v)) {
            self.int64_extension = v;
        }
        if let Some(v) = lookup("RUSTYHDF5_BRIDGE_FLAT_STRINGS").and_then(|v| parse_flag(&v)) {
            self.flat_string_arrays = v;
        }
        if let Some(v) = lookup("RUSTYHDF5_BRIDGE_MAX_DEPTH").and_then(|v| v.trim().parse().ok()) {
            self.max_depth = v;
        }
        self
    }

    pub fn with_int64_extension(mut self, enabled: bool) -> Self {
        self.int64_extension = enabled;
        self
    }

    pub fn with_complex_names(mut self, names: ComplexNames) -> Self {
        self.complex_names = names;
        self
    }

    pub fn with_flat_string_arrays(mut self, enabled: bool) -> Self {
        self.flat_string_arrays = enabled;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
