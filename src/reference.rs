use std::fmt::{Display, Formatter};

/// Handle to a term stored in a [`Terms`][crate::term::Terms] manager.
///
/// Terms are hash-consed, so two handles from the same manager are equal
/// exactly when the terms they denote are syntactically equal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TermRef(u32);

impl TermRef {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Return the index of the referenced cell in the unique table.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Display for TermRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
