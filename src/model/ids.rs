//! Newtype index for counter types.
//!
//! Slices and channels stay plain `usize` (1-based); the type index is the
//! one value that is easy to confuse with them, so it gets its own type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 0-based position of a counter type in declaration order.
///
/// An index is stable for as long as its type exists; types are only ever
/// removed from the end.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeIndex(pub usize);

impl TypeIndex {
    /// Creates a new TypeIndex.
    #[inline]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying 0-based value.
    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0
    }

    /// Returns the 1-based number shown to users ("Type 3" has index 2).
    #[inline]
    pub fn number(&self) -> usize {
        self.0 + 1
    }
}

impl From<usize> for TypeIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Debug for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeIndex({})", self.0)
    }
}

impl fmt::Display for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_is_one_based() {
        assert_eq!(TypeIndex::new(0).number(), 1);
        assert_eq!(TypeIndex::from(4).number(), 5);
    }

    #[test]
    fn ordering_follows_declaration_order() {
        assert!(TypeIndex(1) < TypeIndex(2));
        assert_eq!(format!("{:?}", TypeIndex(3)), "TypeIndex(3)");
    }
}
