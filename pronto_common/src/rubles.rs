use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

pub const RUB_CURRENCY_CODE: &str = "RUB";
pub const RUB_CURRENCY_CODE_LOWER: &str = "rub";

//--------------------------------------      Rubles       -----------------------------------------------------------
/// Whole-ruble amounts. The marketplace never deals in kopecks, so an `i64` of rubles is exact.
/// Debits are represented as negative amounts in the transaction log.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Rubles(i64);

impl Add for Rubles {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Rubles {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Rubles {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Rubles {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Rubles {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Mul<i64> for Rubles {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Rubles {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in rubles: {0}")]
pub struct RublesConversionError(String);

impl From<i64> for Rubles {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Rubles {
    type Error = RublesConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(RublesConversionError(format!("Value {value} is too large to convert to Rubles")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Rubles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}₽", self.0)
    }
}

impl Rubles {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = Rubles::from(10);
        let b = Rubles::from(3);
        assert_eq!(a + b, Rubles::from(13));
        assert_eq!(a - b, Rubles::from(7));
        assert_eq!(-b, Rubles::from(-3));
        assert_eq!(b * 4, Rubles::from(12));
        let total: Rubles = vec![a, b, -a].into_iter().sum();
        assert_eq!(total, Rubles::from(3));
    }

    #[test]
    fn display() {
        assert_eq!(Rubles::from(2).to_string(), "2₽");
        assert_eq!(Rubles::from(-2).to_string(), "-2₽");
    }
}
