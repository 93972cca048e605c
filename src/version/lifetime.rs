//! Lifetime estimates attached to files as they enter the catalog.
//!
//! Two predictors exist for how long a new file will live: a model-based
//! calculation and a running average of observed lifetimes. They are
//! reconciled into one fused estimate that compaction uses for placement.

/// Where a newly added file's lifetime estimate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstimateSource {
    /// No estimate; all estimate fields stay zero.
    #[default]
    None,
    /// First appearance of a file (e.g. a level-0 flush): the seed becomes
    /// both the average and the fused estimate.
    Seed(u64),
    /// Output of a compaction: both predictors are known and get fused.
    Fused {
        /// Model-based estimate.
        calc: u64,
        /// Historical average estimate.
        avg: u64,
        /// Compaction that produced the file.
        compaction_id: u64,
    },
}

/// Estimate fields resolved from an [`EstimateSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ResolvedEstimate {
    pub avg: u64,
    pub calc: u64,
    pub fused: u64,
    pub creating_compaction_id: u64,
}

impl EstimateSource {
    pub(crate) fn resolve(self) -> ResolvedEstimate {
        match self {
            EstimateSource::None => ResolvedEstimate::default(),
            EstimateSource::Seed(seed) => ResolvedEstimate {
                avg: seed,
                calc: 0,
                fused: seed,
                creating_compaction_id: 0,
            },
            EstimateSource::Fused {
                calc,
                avg,
                compaction_id,
            } => ResolvedEstimate {
                avg,
                calc,
                fused: fuse_lifetime_estimates(calc, avg),
                creating_compaction_id: compaction_id,
            },
        }
    }
}

/// Fuse a model-based estimate with a historical average.
///
/// A zero on either side means that predictor has nothing yet, so the other
/// one is used as is. When the larger value is at least twice the smaller
/// (`(hi - lo) / lo >= 1` in integer arithmetic) the larger is treated as an
/// outlier and the smaller wins. Otherwise the truncated mean is returned.
pub fn fuse_lifetime_estimates(calc: u64, avg: u64) -> u64 {
    if calc == 0 {
        return avg;
    }
    if avg == 0 {
        return calc;
    }

    let (hi, lo) = if calc >= avg { (calc, avg) } else { (avg, calc) };
    if (hi - lo) / lo >= 1 {
        lo
    } else {
        ((calc as u128 + avg as u128) / 2) as u64
    }
}
