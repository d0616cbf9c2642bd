use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const KRW_CURRENCY_CODE: &str = "KRW";
pub const KRW_CURRENCY_CODE_LOWER: &str = "krw";

//--------------------------------------        Krw        -----------------------------------------------------------
/// An amount of Korean won. The won has no minor unit, so this is a plain integer amount.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Krw(i64);

op!(binary Krw, Add, add);
op!(binary Krw, Sub, sub);
op!(inplace Krw, SubAssign, sub_assign);
op!(unary Krw, Neg, neg);

impl Mul<i64> for Krw {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Krw {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in won: {0}")]
pub struct KrwConversionError(String);

impl From<i64> for Krw {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Krw {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Krw {}

impl TryFrom<u64> for Krw {
    type Error = KrwConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(KrwConversionError(format!("Value {} is too large to convert to Krw", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Krw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "₩{}", self.0)
    }
}

impl Krw {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Krw::from(10_000);
        let b = Krw::from(1_000);
        assert_eq!(a + b, Krw::from(11_000));
        assert_eq!(a - b, Krw::from(9_000));
        assert_eq!(b * 3, Krw::from(3_000));
        assert_eq!(-b, Krw::from(-1_000));
        let total: Krw = [a, b, b].into_iter().sum();
        assert_eq!(total, Krw::from(12_000));
    }

    #[test]
    fn display() {
        assert_eq!(Krw::from(11_000).to_string(), "₩11000");
    }
}
