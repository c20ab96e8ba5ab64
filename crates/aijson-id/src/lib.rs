//! Identity semantics and enforced constructors.
//!
//! This crate provides the construction tokens used by every identifier in
//! the capture graph. ID types live in `aijson-core` and accept only these
//! tokens at their public boundaries, so a node id can never be confused
//! with a document key or a payload file name.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdConstruction {
    External,
    TemporalCounter { prefix: &'static str },
    MonotonicCounter { prefix: &'static str },
    Derived,
    Ordinal,
}

/// Marker traits for enforced construction forms.
pub trait ExternalConstructible {}
pub trait DerivedConstructible {}
pub trait TemporalConstructible {}
pub trait MonotonicConstructible {}
pub trait OrdinalConstructible {}

/// Declares how a concrete id type is built.
pub trait IdSemantics {
    const CONSTRUCTION: IdConstruction;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedId(String);

impl DerivedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Joins `parts` onto `prefix` with `-`. File-system safe as long as the
    /// parts are.
    pub fn from_parts<'a>(
        prefix: &'static str,
        parts: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut id = String::from(prefix);
        for part in parts {
            id.push('-');
            id.push_str(part);
        }
        Self(id)
    }

    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.0.push_str(suffix);
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalId {
    prefix: &'static str,
    millis: u64,
    counter: u64,
}

impl TemporalId {
    pub const fn new(prefix: &'static str, millis: u64, counter: u64) -> Self {
        Self { prefix, millis, counter }
    }

    pub fn into_string(self) -> String {
        format!("{}-{}-{}", self.prefix, self.millis, self.counter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicId {
    prefix: &'static str,
    counter: u64,
}

impl MonotonicId {
    pub const fn new(prefix: &'static str, counter: u64) -> Self {
        Self { prefix, counter }
    }

    pub const fn counter(&self) -> u64 {
        self.counter
    }

    pub fn into_string(self) -> String {
        format!("{}-{}", self.prefix, self.counter)
    }
}

/// Position of an item inside one serialized document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrdinalId(usize);

impl OrdinalId {
    pub const fn new(position: usize) -> Self {
        Self(position)
    }

    pub fn parse_str(raw: &str) -> Option<Self> {
        raw.parse::<usize>().ok().map(Self)
    }

    pub const fn position(&self) -> usize {
        self.0
    }

    pub fn into_string(self) -> String {
        self.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_id_joins_parts_with_dash() {
        let id = DerivedId::from_parts("node", ["3"]).with_suffix(".pt");
        assert_eq!(id.as_str(), "node-3.pt");
    }

    #[test]
    fn monotonic_id_formats_prefix_and_counter() {
        assert_eq!(MonotonicId::new("node", 7).into_string(), "node-7");
    }

    #[test]
    fn ordinal_id_parses_only_digits() {
        assert_eq!(OrdinalId::parse_str("12"), Some(OrdinalId::new(12)));
        assert_eq!(OrdinalId::parse_str("node-1"), None);
    }
}
