//! Event metadata.

/// Metadata for a single server-sent event.
///
/// Both fields are optional in the wire sense: an empty `id` or `name`
/// produces no corresponding line. Values are written verbatim, so an
/// embedded newline produces a malformed frame; callers are responsible
/// for passing single-line values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    id: String,
    name: String,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event id (`id:` line).
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the event name (`event:` line).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
