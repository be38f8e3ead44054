//! Runtime configuration

mod culture;

pub use culture::Culture;

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

/// Behavior switches that change the severity or semantics of edge cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Comparing values of mismatched types produces an error value
    /// instead of `false` plus a warning.
    pub strict_type_comparison: bool,

    /// `Blank() = 0` and `Blank() = ""` are false. When off, blank is
    /// coerced to the other operand's zero value for equality.
    pub powerfx_v1_blank_coercion: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            strict_type_comparison: false,
            powerfx_v1_blank_coercion: true,
        }
    }
}

/// Settings shared by every evaluation of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Culture name, e.g. `en-US`
    pub culture: String,

    /// Offset of local time from UTC, in minutes
    pub time_zone_offset_minutes: i32,

    /// Maximum nesting of user-defined function calls
    pub max_call_depth: usize,

    /// Longest string the governor lets a function allocate, in chars
    pub max_string_length: usize,

    /// Behavior switches
    pub features: Features,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            culture: "en-US".to_string(),
            time_zone_offset_minutes: 0,
            max_call_depth: 100,
            max_string_length: 10_000_000,
            features: Features::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Builder: culture.
    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = culture.into();
        self
    }

    /// Builder: call depth limit.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Builder: string length limit.
    pub fn with_max_string_length(mut self, len: usize) -> Self {
        self.max_string_length = len;
        self
    }

    /// Builder: feature flags.
    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    /// Culture table for [`culture`](Self::culture), falling back to the
    /// invariant culture.
    pub fn resolve_culture(&self) -> &'static Culture {
        Culture::lookup(&self.culture).unwrap_or_else(|| {
            log::warn!("unknown culture '{}', using invariant", self.culture);
            Culture::invariant()
        })
    }

    /// Fixed offset for [`time_zone_offset_minutes`](Self::time_zone_offset_minutes),
    /// falling back to UTC when out of range.
    pub fn resolve_time_zone(&self) -> FixedOffset {
        self.time_zone_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                log::warn!(
                    "time zone offset {} minutes out of range, using UTC",
                    self.time_zone_offset_minutes
                );
                Utc.fix()
            })
    }
}
