//! Runtime configuration for the engines.

use std::path::PathBuf;

use super::error::AstraError;
use super::Result;

/// The protocol family always runs with three parties (two of them online).
pub const N_PARTIES: usize = 3;

/// Ring widths the crate can instantiate.
pub const SUPPORTED_RING_SIZES: [usize; 5] = [8, 16, 32, 64, 128];

/// Tunables and diagnostics switches, passed to every engine at
/// construction.
#[derive(Debug, Clone)]
pub struct AstraOptions {
    /// log2 of the admissible truncation error; also the threshold between
    /// the big-gap and small-gap regimes.
    pub trunc_error: u32,
    /// Generate daBits/edaBits with the replicated three-party preprocessor
    /// instead of the bit-based construction.
    pub rep3_prep: bool,
    /// Log prep file names and batch sizes.
    pub verbose_astra: bool,
    /// Log AND-gate batch counts.
    pub verbose_and: bool,
    /// Invoke the (semi-honest, no-op) check hook after every
    /// multiplication batch.
    pub always_check: bool,
    /// Log each protocol call site once.
    pub code_locations: bool,
    /// Directory holding prep and output files.
    pub prep_dir: PathBuf,
    /// Thread number, part of the prep file names.
    pub thread_num: usize,
}

impl Default for AstraOptions {
    fn default() -> Self {
        Self {
            trunc_error: 40,
            rep3_prep: false,
            verbose_astra: false,
            verbose_and: false,
            always_check: false,
            code_locations: false,
            prep_dir: PathBuf::from("."),
            thread_num: 0,
        }
    }
}

impl AstraOptions {
    /// Options writing prep files into `dir`.
    pub fn with_prep_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            prep_dir: dir.into(),
            ..Self::default()
        }
    }
}

/// Rejects cleartext ring widths the crate cannot instantiate.
pub fn check_ring_size(k: usize) -> Result<()> {
    if SUPPORTED_RING_SIZES.contains(&k) {
        Ok(())
    } else {
        Err(AstraError::Config(format!("unsupported ring width {k}")))
    }
}

/// Logs the call site once per process when `code_locations` is set.
macro_rules! code_location {
    ($options:expr) => {
        if $options.code_locations {
            static ONCE: std::sync::Once = std::sync::Once::new();
            ONCE.call_once(|| {
                tracing::info!(target: "astra::code_locations", "first call at {}:{}", file!(), line!())
            });
        }
    };
}
pub(crate) use code_location;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_size_validation() {
        assert!(check_ring_size(64).is_ok());
        assert!(check_ring_size(128).is_ok());
        assert!(check_ring_size(192).is_err());
        assert!(check_ring_size(512).is_err());
    }
}
