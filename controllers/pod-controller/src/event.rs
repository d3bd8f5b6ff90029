//! Work items.
//!
//! An `Event` records one observed change. The queue compares events by
//! identity key only, so several pending changes to one object collapse into
//! a single reconciliation.

use std::fmt;
use std::hash::{Hash, Hasher};

/// What happened to the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The object appeared
    Created,
    /// The object changed
    Updated,
    /// The object went away
    Deleted,
}

impl EventKind {
    /// Lower-case label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed change, waiting to be reconciled.
#[derive(Debug, Clone)]
pub struct Event {
    key: String,
    kind: EventKind,
    display_name: String,
}

impl Event {
    /// Creates an event for the object with identity `key`.
    ///
    /// `display_name` is carried along because the cache may no longer hold
    /// the object by the time a delete is processed.
    pub fn new(key: impl Into<String>, kind: EventKind, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind,
            display_name: display_name.into(),
        }
    }

    /// Identity key (`namespace/name`).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Kind of change.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Human-readable object name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key, self.kind)
    }
}
