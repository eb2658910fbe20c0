//! Evaluation context configuration.
//!
//! Ambient policy threaded through kernel construction: the default error
//! mode, how ambiguous dates are read, the two-digit year window and the
//! chunking used by batch kernels. Loaded from any serde format.

use serde::{Deserialize, Serialize};

use continuum_ndt::ErrorMode;

/// Component order used when a date string is ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DateParseOrder {
    /// Reject dates whose day and month cannot be told apart.
    #[default]
    NoAmbig,
    /// Year, month, day.
    Ymd,
    /// Month, day, year.
    Mdy,
    /// Day, month, year.
    Dmy,
}

/// Chunking for kernels that process batches through scratch space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// Elements per chunk
    pub chunk_size: usize,
    /// Minimum chunk size
    pub min_chunk: usize,
    /// Maximum chunk size (bounds per-kernel scratch memory)
    pub max_chunk: usize,
}

impl ChunkConfig {
    /// Largest chunk any kernel will use, regardless of configuration.
    pub const LIMIT: usize = 4096;

    /// Create a chunk configuration with explicit size.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Get effective chunk size after clamping.
    pub fn effective_size(&self) -> usize {
        let max = self.max_chunk.clamp(1, Self::LIMIT);
        let min = self.min_chunk.clamp(1, max);
        self.chunk_size.clamp(min, max)
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 128,
            min_chunk: 1,
            max_chunk: Self::LIMIT,
        }
    }
}

/// Ambient parsing, formatting and validation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalContext {
    /// Mode substituted for [`ErrorMode::Default`].
    pub errmode: ErrorMode,
    /// How ambiguous numeric dates are read.
    pub date_parse_order: DateParseOrder,
    /// Two-digit years below this become 20yy, the rest 19yy. Zero rejects
    /// two-digit years.
    pub century_window: i32,
    /// Batch chunking.
    pub chunk: ChunkConfig,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            errmode: ErrorMode::Fractional,
            date_parse_order: DateParseOrder::NoAmbig,
            century_window: 70,
            chunk: ChunkConfig::default(),
        }
    }
}
