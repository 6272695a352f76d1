//! Store configuration.

/// Configuration for a schema registrar and the store it builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Id attribute used by models that do not declare their own.
    pub id_attribute: String,

    /// Whether sessions record accessed ids and full-table scans.
    pub track_access: bool,

    /// Whether a one-to-one value may only point at an unclaimed target.
    pub enforce_one_to_one: bool,

    /// Whether adding an existing edge or removing a missing edge is an error.
    pub strict_edges: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_attribute: "id".to_string(),
            track_access: true,
            enforce_one_to_one: false,
            strict_edges: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default id attribute.
    #[must_use]
    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = name.into();
        self
    }

    /// Sets whether sessions track accessed ids.
    #[must_use]
    pub const fn track_access(mut self, value: bool) -> Self {
        self.track_access = value;
        self
    }

    /// Sets whether one-to-one targets must be unclaimed.
    #[must_use]
    pub const fn enforce_one_to_one(mut self, value: bool) -> Self {
        self.enforce_one_to_one = value;
        self
    }

    /// Sets whether redundant edge edits are errors.
    #[must_use]
    pub const fn strict_edges(mut self, value: bool) -> Self {
        self.strict_edges = value;
        self
    }
}
