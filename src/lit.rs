use std::fmt::{Debug, Display, Formatter};
use std::ops::Not;

/// A literal of the [`Aig`][crate::aig::Aig].
///
/// The least significant bit is the polarity (set when the edge is inverted),
/// the remaining bits are the variable index.
/// Variable 0 is reserved: its two polarities are the constants `0` and `1`.
/// Variables `1..=num_inputs` are the inputs, the following ones are AND nodes.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Lit(u32);

// Constructors
impl Lit {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn one() -> Self {
        Self(1)
    }

    pub const fn from_var(var: u32) -> Self {
        Self(var << 1)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

// Getters
impl Lit {
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn var(self) -> u32 {
        self.0 >> 1
    }

    /// Index of the variable, for direct use on per-variable arrays.
    pub const fn index(self) -> usize {
        (self.0 >> 1) as usize
    }

    /// Same literal with the polarity bit cleared.
    pub const fn regular(self) -> Self {
        Self(self.0 & !1)
    }

    /// Word mask implementing the inversion on 64 simulation lanes.
    pub const fn mask(self) -> u64 {
        if self.is_negated() {
            u64::MAX
        } else {
            0
        }
    }
}

// Checks
impl Lit {
    pub const fn is_const(self) -> bool {
        self.var() == 0
    }

    pub const fn is_negated(self) -> bool {
        self.0 & 1 != 0
    }
}

impl From<bool> for Lit {
    fn from(b: bool) -> Self {
        if b {
            Self::one()
        } else {
            Self::zero()
        }
    }
}

impl Not for Lit {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(self.0 ^ 1)
    }
}

impl Display for Lit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_const() {
            write!(f, "{}", self.0 & 1)
        } else {
            if self.is_negated() {
                write!(f, "!")?;
            }
            write!(f, "x{}", self.var())
        }
    }
}

impl Debug for Lit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
