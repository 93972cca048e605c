//! Configuration options for the catalog.

/// Maximum number of levels in the LSM tree.
pub const MAX_LEVELS: usize = 7;

/// Seeks a freshly described file is allowed before it becomes a
/// seek-compaction candidate.
pub const DEFAULT_ALLOWED_SEEKS: i64 = 1 << 30;

/// Lower bound on allowed seeks once a file enters a snapshot.
pub const MIN_ALLOWED_SEEKS: i64 = 100;

/// One seek is charged for roughly this many bytes of file.
pub const BYTES_PER_SEEK: u64 = 16 * 1024;

/// Name of the default user-key comparator.
pub const DEFAULT_COMPARATOR_NAME: &str = "leveldb.BytewiseComparator";

/// Default L0 file count before compaction.
pub const DEFAULT_L0_COMPACTION_TRIGGER: usize = 4;

/// Default L1 size (256MB).
pub const DEFAULT_L1_SIZE: u64 = 256 * 1024 * 1024;

/// Default level size multiplier.
pub const DEFAULT_LEVEL_MULTIPLIER: u64 = 10;

/// Catalog configuration options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Comparator name recorded in the first edit of a catalog.
    pub comparator_name: String,

    // === Compaction scoring ===
    /// Number of L0 files that scores 1.0.
    pub l0_compaction_trigger: usize,

    /// Target size for level 1.
    pub max_bytes_for_level_base: u64,

    /// Size multiplier for each level.
    pub max_bytes_for_level_multiplier: u64,

    /// Charge point lookups against a file's allowed seeks.
    pub seek_compaction: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator_name: DEFAULT_COMPARATOR_NAME.to_string(),
            l0_compaction_trigger: DEFAULT_L0_COMPACTION_TRIGGER,
            max_bytes_for_level_base: DEFAULT_L1_SIZE,
            max_bytes_for_level_multiplier: DEFAULT_LEVEL_MULTIPLIER,
            seek_compaction: true,
        }
    }
}

impl Options {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the options.
    pub fn validate(&self) -> crate::Result<()> {
        if self.comparator_name.is_empty() {
            return Err(crate::Error::InvalidConfiguration(
                "comparator_name must not be empty".into(),
            ));
        }

        if self.l0_compaction_trigger == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "l0_compaction_trigger must be at least 1".into(),
            ));
        }

        if self.max_bytes_for_level_base == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "max_bytes_for_level_base must be non-zero".into(),
            ));
        }

        if self.max_bytes_for_level_multiplier < 2 {
            return Err(crate::Error::InvalidConfiguration(
                "max_bytes_for_level_multiplier must be at least 2".into(),
            ));
        }

        Ok(())
    }

    /// Calculate the maximum size for a given level (1 and up).
    pub fn max_bytes_for_level(&self, level: usize) -> u64 {
        let mut size = self.max_bytes_for_level_base;
        for _ in 1..level {
            size = size.saturating_mul(self.max_bytes_for_level_multiplier);
        }
        size
    }
}

/// Builder for Options.
#[derive(Debug, Clone, Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the comparator name.
    pub fn comparator_name(mut self, name: impl Into<String>) -> Self {
        self.options.comparator_name = name.into();
        self
    }

    /// Set the L0 compaction trigger.
    pub fn l0_compaction_trigger(mut self, files: usize) -> Self {
        self.options.l0_compaction_trigger = files;
        self
    }

    /// Set the level 1 size target.
    pub fn max_bytes_for_level_base(mut self, bytes: u64) -> Self {
        self.options.max_bytes_for_level_base = bytes;
        self
    }

    /// Set the per-level size multiplier.
    pub fn max_bytes_for_level_multiplier(mut self, multiplier: u64) -> Self {
        self.options.max_bytes_for_level_multiplier = multiplier;
        self
    }

    /// Enable or disable seek-triggered compaction.
    pub fn seek_compaction(mut self, enabled: bool) -> Self {
        self.options.seek_compaction = enabled;
        self
    }

    /// Build the options.
    pub fn build(self) -> crate::Result<Options> {
        self.options.validate()?;
        Ok(self.options)
    }
}
