//! Identifiers for project model entities.
//!
//! GUIDs are handed out by an explicit [`GuidArena`] that the caller owns.
//! Two arenas created with the same prefix and asked for the same sequence
//! of identifiers produce the same GUIDs, so model construction stays a
//! pure function of its inputs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A globally unique identifier of a model entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    /// Wrap an existing identifier string.
    pub fn new(s: impl Into<String>) -> Self {
        Guid(s.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether the identifier is empty (not yet assigned).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Guid {
    fn default() -> Self {
        Guid(String::new())
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Allocator for [`Guid`]s.
///
/// Pass one of these to every model-construction call that needs a fresh
/// identifier. There is deliberately no process-wide counter.
#[derive(Debug, Clone)]
pub struct GuidArena {
    prefix: String,
    next: u64,
}

impl GuidArena {
    /// Create an arena whose GUIDs look like `<prefix>-<n>`.
    pub fn new(prefix: impl Into<String>) -> Self {
        GuidArena {
            prefix: prefix.into(),
            next: 1,
        }
    }

    /// Allocate the next GUID.
    pub fn next_guid(&mut self) -> Guid {
        let guid = Guid(format!("{}-{}", self.prefix, self.next));
        self.next += 1;
        guid
    }

    /// Return `guid` unchanged when assigned, otherwise allocate a new one.
    pub fn fill(&mut self, guid: &mut Guid) {
        if guid.is_empty() {
            *guid = self.next_guid();
        }
    }

    /// Number of GUIDs handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next - 1
    }
}

impl Default for GuidArena {
    fn default() -> Self {
        GuidArena::new("G")
    }
}
