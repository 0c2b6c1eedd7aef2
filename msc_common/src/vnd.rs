use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::op;

pub const VND_CURRENCY_CODE: &str = "VND";
pub const VND_CURRENCY_CODE_LOWER: &str = "vnd";

//--------------------------------------        Vnd        -----------------------------------------------------------
/// An amount of Vietnamese đồng. The đồng has no minor unit, so this is a whole number of đồng.
#[derive(Debug, Clone, Copy, Default, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vnd(i64);

op!(binary Vnd, Add, add);
op!(binary Vnd, Sub, sub);
op!(inplace Vnd, SubAssign, sub_assign);
op!(unary Vnd, Neg, neg);

impl Mul<i64> for Vnd {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Vnd {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in đồng: {0}")]
pub struct VndConversionError(String);

impl From<i64> for Vnd {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Vnd {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Vnd {}

impl TryFrom<u64> for Vnd {
    type Error = VndConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(VndConversionError(format!("Value {} is too large to convert to Vnd", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Vnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}{} ₫", group_thousands(self.0.unsigned_abs()))
    }
}

impl Vnd {
    pub fn value(&self) -> i64 {
        self.0
    }
}

/// Format an amount with comma separators, e.g. `550000` -> `"550,000"`.
fn group_thousands(mut value: u64) -> String {
    let mut groups = Vec::new();
    loop {
        let group = value % 1000;
        value /= 1000;
        if value == 0 {
            groups.push(group.to_string());
            break;
        }
        groups.push(format!("{group:03}"));
    }
    groups.reverse();
    groups.join(",")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_groups_thousands() {
        assert_eq!(Vnd::from(0).to_string(), "0 ₫");
        assert_eq!(Vnd::from(999).to_string(), "999 ₫");
        assert_eq!(Vnd::from(550_000).to_string(), "550,000 ₫");
        assert_eq!(Vnd::from(1_234_567).to_string(), "1,234,567 ₫");
        assert_eq!(Vnd::from(-100_000).to_string(), "-100,000 ₫");
    }

    #[test]
    fn arithmetic_delegates_to_inner_value() {
        let total: Vnd = [Vnd::from(100_000) * 2, Vnd::from(50_000), Vnd::from(300_000)].into_iter().sum();
        assert_eq!(total, Vnd::from(550_000));
        assert_eq!(Vnd::from(100_000) - Vnd::from(25_000), Vnd::from(75_000));
    }

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&Vnd::from(550_000)).unwrap();
        assert_eq!(json, "550000");
        let back: Vnd = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Vnd::from(550_000));
    }
}
