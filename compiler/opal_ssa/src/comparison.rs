//! Comparison codes for conditional branches and selects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signed, unsigned and floating-point orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
    Feq,
    Fne,
    Fgt,
    Fge,
    Flt,
    Fle,
}

impl Comparison {
    /// The comparison that holds exactly when `self` does not.
    pub fn invert(self) -> Comparison {
        match self {
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
            Comparison::Ugt => Comparison::Ule,
            Comparison::Uge => Comparison::Ult,
            Comparison::Ult => Comparison::Uge,
            Comparison::Ule => Comparison::Ugt,
            Comparison::Sgt => Comparison::Sle,
            Comparison::Sge => Comparison::Slt,
            Comparison::Slt => Comparison::Sge,
            Comparison::Sle => Comparison::Sgt,
            Comparison::Feq => Comparison::Fne,
            Comparison::Fne => Comparison::Feq,
            Comparison::Fgt => Comparison::Fle,
            Comparison::Fge => Comparison::Flt,
            Comparison::Flt => Comparison::Fge,
            Comparison::Fle => Comparison::Fgt,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            Comparison::Feq
                | Comparison::Fne
                | Comparison::Fgt
                | Comparison::Fge
                | Comparison::Flt
                | Comparison::Fle
        )
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Comparison::Eq => "eq",
            Comparison::Ne => "ne",
            Comparison::Ugt => "ugt",
            Comparison::Uge => "uge",
            Comparison::Ult => "ult",
            Comparison::Ule => "ule",
            Comparison::Sgt => "sgt",
            Comparison::Sge => "sge",
            Comparison::Slt => "slt",
            Comparison::Sle => "sle",
            Comparison::Feq => "feq",
            Comparison::Fne => "fne",
            Comparison::Fgt => "fgt",
            Comparison::Fge => "fge",
            Comparison::Flt => "flt",
            Comparison::Fle => "fle",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Comparison {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "eq" => Comparison::Eq,
            "ne" => Comparison::Ne,
            "ugt" => Comparison::Ugt,
            "uge" => Comparison::Uge,
            "ult" => Comparison::Ult,
            "ule" => Comparison::Ule,
            "sgt" => Comparison::Sgt,
            "sge" => Comparison::Sge,
            "slt" => Comparison::Slt,
            "sle" => Comparison::Sle,
            "feq" => Comparison::Feq,
            "fne" => Comparison::Fne,
            "fgt" => Comparison::Fgt,
            "fge" => Comparison::Fge,
            "flt" => Comparison::Flt,
            "fle" => Comparison::Fle,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_is_involutive() {
        let all = [
            Comparison::Eq,
            Comparison::Ne,
            Comparison::Ugt,
            Comparison::Uge,
            Comparison::Ult,
            Comparison::Ule,
            Comparison::Sgt,
            Comparison::Sge,
            Comparison::Slt,
            Comparison::Sle,
            Comparison::Feq,
            Comparison::Fne,
            Comparison::Fgt,
            Comparison::Fge,
            Comparison::Flt,
            Comparison::Fle,
        ];

        for cmp in all {
            assert_eq!(cmp.invert().invert(), cmp);
            assert_eq!(cmp.to_string().parse::<Comparison>(), Ok(cmp));
        }
    }
}
