//! Outcome tallies for documents, directories and whole runs

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Tally of cell outcomes produced by executing test documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Counts {
    pub right: u64,
    pub wrong: u64,
    pub exceptions: u64,
    pub ignored: u64,
}

impl Counts {
    /// The identity for [`Counts::merge`]
    pub const ZERO: Counts = Counts::new(0, 0, 0, 0);

    pub const fn new(right: u64, wrong: u64, exceptions: u64, ignored: u64) -> Self {
        Self {
            right,
            wrong,
            exceptions,
            ignored,
        }
    }

    /// A single exception, recorded for a document that could not be run at all
    pub const fn exception() -> Self {
        Self::new(0, 0, 1, 0)
    }

    /// Component-wise sum of two tallies
    pub fn merge(a: Counts, b: Counts) -> Counts {
        Counts {
            right: a.right + b.right,
            wrong: a.wrong + b.wrong,
            exceptions: a.exceptions + b.exceptions,
            ignored: a.ignored + b.ignored,
        }
    }

    /// Fold another tally into this one
    pub fn tally(&mut self, other: Counts) {
        *self = Counts::merge(*self, other);
    }

    pub fn total(&self) -> u64 {
        self.right + self.wrong + self.exceptions + self.ignored
    }

    pub fn has_failures(&self) -> bool {
        self.wrong > 0 || self.exceptions > 0
    }
}

impl Add for Counts {
    type Output = Counts;

    fn add(self, rhs: Counts) -> Counts {
        Counts::merge(self, rhs)
    }
}

impl AddAssign for Counts {
    fn add_assign(&mut self, rhs: Counts) {
        self.tally(rhs);
    }
}

impl Sum for Counts {
    fn sum<I: Iterator<Item = Counts>>(iter: I) -> Counts {
        iter.fold(Counts::ZERO, Counts::merge)
    }
}

impl<'a> Sum<&'a Counts> for Counts {
    fn sum<I: Iterator<Item = &'a Counts>>(iter: I) -> Counts {
        iter.copied().sum()
    }
}

/// Same wording the fixture framework prints after running a document
impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} right, {} wrong, {} ignored, {} exceptions",
            self.right, self.wrong, self.ignored, self.exceptions
        )
    }
}
