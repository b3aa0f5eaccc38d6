//! Database configuration options (spec §6).

/// Whether, and how aggressively, mutations enqueue their owning object for
/// validation at commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Objects are only validated when explicitly enqueued via
    /// `revalidate`.
    Manual,
    /// Every mutating operation enqueues its owning object. The default.
    #[default]
    Automatic,
    /// Validation never runs; commit always drains an empty queue.
    Disabled,
}

/// The policy applied to a field's stored bytes during schema migration
/// when its encoding changes across versions (spec §4.4 `migrate_schema`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionPolicy {
    /// Convert if the codec can; keep the old value if it cannot.
    #[default]
    Attempt,
    /// Fail the migration if conversion would lose data.
    Require,
    /// Discard the old value, replacing it with the new field's default.
    Reset,
    /// Keep the old encoded bytes verbatim, only if the encoding is
    /// unchanged; otherwise behaves like `Require`.
    Retain,
}

/// Options controlling how a [`crate::Database`] opens and how its
/// transactions behave. Grounded on `sov_db`'s small options-struct
/// pattern (e.g. `RocksdbConfig`).
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// On open, permit registering the caller's schema if not already
    /// present; otherwise fail with `SchemaNotRegistered`.
    pub allow_new_schema: bool,
    /// Explicit schema version to bind new transactions to. `0` means
    /// "use the highest registered version".
    pub schema_version: u32,
    /// Whether mutations enqueue the owning object for validation.
    pub validation_mode: ValidationMode,
    /// Default per-field conversion policy used during migration when a
    /// field does not specify its own.
    pub upgrade_conversion_default: ConversionPolicy,
    /// Reject all mutating operations on transactions opened from this
    /// database.
    pub read_only: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        DatabaseOptions {
            allow_new_schema: false,
            schema_version: 0,
            validation_mode: ValidationMode::default(),
            upgrade_conversion_default: ConversionPolicy::default(),
            read_only: false,
        }
    }
}

impl DatabaseOptions {
    /// Starts from [`Default::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn allow_new_schema(mut self, allow: bool) -> Self {
        self.allow_new_schema = allow;
        self
    }

    /// Builder-style setter.
    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    /// Builder-style setter.
    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    /// Builder-style setter.
    pub fn upgrade_conversion_default(mut self, policy: ConversionPolicy) -> Self {
        self.upgrade_conversion_default = policy;
        self
    }

    /// Builder-style setter.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}
