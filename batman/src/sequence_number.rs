//! Dedicated logic for the 16-bit sequence numbers stamped on originator
//! messages. All comparisons are modular, so a wrap from 65535 to 0 does not
//! register as a regression.

use core::fmt;
use core::ops::{Add, AddAssign};

/// This value is compared against when deciding if a `SeqNo` is larger or
/// smaller under modular arithmetic.
const SEQNO_COMPARE_TRESHOLD: u16 = 32_768;

/// A sequence number on an originator message.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqNo(u16);

impl SeqNo {
    /// Create a new `SeqNo` with the default value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Modular "less than" comparison. Note that we don't implement the
    /// [`PartialOrd`](std::cmp::PartialOrd) trait, as the contract on that
    /// trait specifically defines that it is transitive, which is clearly not
    /// the case here.
    ///
    /// There is a quirk in this comparison where values which are exactly
    /// 32_768 apart will result in false in either way of ordering the
    /// arguments, which is counterintuitive to our understanding that a < b
    /// generally implies !(b < a).
    pub fn lt(&self, other: &Self) -> bool {
        if self.0 == other.0 {
            false
        } else {
            other.0.wrapping_sub(self.0) < SEQNO_COMPARE_TRESHOLD
        }
    }

    /// Modular "greater than" comparison, the mirror of [`SeqNo::lt`]. The
    /// same quirk at distance 32_768 applies.
    pub fn gt(&self, other: &Self) -> bool {
        if self.0 == other.0 {
            false
        } else {
            other.0.wrapping_sub(self.0) > SEQNO_COMPARE_TRESHOLD
        }
    }

    /// The amount of increments needed to go from `other` to `self` under
    /// wrapping arithmetic.
    pub fn diff(&self, other: &Self) -> u16 {
        self.0.wrapping_sub(other.0)
    }
}

impl fmt::Display for SeqNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{}", self.0))
    }
}

impl From<u16> for SeqNo {
    fn from(value: u16) -> Self {
        SeqNo(value)
    }
}

impl From<SeqNo> for u16 {
    fn from(value: SeqNo) -> Self {
        value.0
    }
}

impl Add<u16> for SeqNo {
    type Output = Self;

    fn add(self, rhs: u16) -> Self::Output {
        SeqNo(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u16> for SeqNo {
    fn add_assign(&mut self, rhs: u16) {
        *self = SeqNo(self.0.wrapping_add(rhs))
    }
}
