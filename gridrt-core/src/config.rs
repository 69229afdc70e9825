//! Layered runtime configuration (§0.B).
//!
//! Loads, lowest priority first, from built-in defaults, an optional
//! `GridRt.toml` in the current directory, and `GRIDRT_*` environment
//! variables, via the `config` crate's builder — the way a layered
//! configuration source list is meant to be composed, rather than the
//! single hardcoded JSON file the workspace this grew out of used.

use serde::{Deserialize, Serialize};

use crate::error::{GridError, Result};

/// Tuning constants the design leaves open, collected in one place so a
/// deployment can override them without recompiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Entries per hash-map/hash-set bucket before chaining into an
    /// overflow bucket (§4.5/§4.6).
    pub bucket_capacity: usize,

    /// Byte budget per aggregation buffer; entry count is derived from it
    /// at buffer-construction time (§4.9).
    pub buffer_byte_budget: usize,

    /// Elements per bulk chunk when an array iterator or `forEachInRange`
    /// walks a contiguous run (§4.7).
    pub array_chunk_size: usize,

    /// Number of simulated localities a demo run or test stands up when
    /// none is given explicitly.
    pub num_localities: u16,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            bucket_capacity: 128,
            buffer_byte_budget: 3072,
            array_chunk_size: 256,
            num_localities: 4,
        }
    }
}

impl RuntimeConfig {
    /// Build the layered config: defaults < `GridRt.toml` < `GRIDRT_*` env.
    pub fn load() -> Result<Self> {
        let defaults = RuntimeConfig::default();
        let built = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).map_err(RuntimeConfig::wrap)?)
            .add_source(config::File::with_name("GridRt").required(false))
            .add_source(config::Environment::with_prefix("GRIDRT"))
            .build()
            .map_err(RuntimeConfig::wrap)?;
        let loaded: RuntimeConfig = built.try_deserialize().map_err(RuntimeConfig::wrap)?;
        loaded.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.bucket_capacity == 0 {
            return Err(GridError::Config("bucket_capacity must be nonzero".into()));
        }
        if self.buffer_byte_budget == 0 {
            return Err(GridError::Config("buffer_byte_budget must be nonzero".into()));
        }
        if self.num_localities == 0 {
            return Err(GridError::Config("num_localities must be nonzero".into()));
        }
        Ok(self)
    }

    fn wrap(err: config::ConfigError) -> GridError {
        // Configuration failures are always a caller-facing "not a valid
        // deployment" error, never a panic (§0.B).
        tracing::error!(error = %err, "configuration load failed");
        GridError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tuning_constants() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.bucket_capacity, 128);
        assert_eq!(cfg.buffer_byte_budget, 3072);
    }

    #[test]
    fn load_without_a_config_file_falls_back_to_defaults() {
        let cfg = RuntimeConfig::load().expect("defaults alone must validate");
        assert_eq!(cfg, RuntimeConfig::default());
    }
}
