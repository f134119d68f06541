//! Shard identifiers.

use std::fmt;

/// Key of one shard in the registry.
///
/// The textual form of [`ShardId::Default`] is the empty string, and
/// converting `""` yields `Default`, so a `Named` id is never empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShardId {
    /// Shard that receives text added without an explicit id.
    #[default]
    Default,
    /// Shard addressed by a non-empty name.
    Named(String),
}

impl ShardId {
    /// Builds an id from its textual form.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            ShardId::Default
        } else {
            ShardId::Named(name)
        }
    }

    /// Textual form, empty for the default shard.
    pub fn as_str(&self) -> &str {
        match self {
            ShardId::Default => "",
            ShardId::Named(name) => name,
        }
    }

    /// Reports whether this is the default shard.
    pub fn is_default(&self) -> bool {
        self.canonical() == &ShardId::Default
    }

    /// Folds a hand-built `Named("")` into `Default`.
    pub fn canonical(&self) -> &ShardId {
        static DEFAULT: ShardId = ShardId::Default;
        match self {
            ShardId::Named(name) if name.is_empty() => &DEFAULT,
            other => other,
        }
    }
}

impl From<&str> for ShardId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ShardId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&ShardId> for ShardId {
    fn from(id: &ShardId) -> Self {
        id.clone()
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardId::Default => f.write_str("<default>"),
            ShardId::Named(name) => f.write_str(name),
        }
    }
}
