//! `NdM+K` dice notation.

use std::fmt;

use rand::Rng;

use crate::{AppError, AppResult};

const MAX_DICE: u32 = 100;
const MAX_SIDES: u32 = 1000;
const MAX_MODIFIER: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dice {
    pub count: u32,
    pub sides: u32,
    pub modifier: i64,
}

impl Dice {
    /// Accepts `2d6`, `d20`, `3d8+2`, `1d4 - 1`; case and spacing are ignored.
    pub fn parse(notation: &str) -> AppResult<Self> {
        let invalid = || AppError::InvalidDiceNotation(notation.to_owned());

        let compact: String = notation
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        let (count, rest) = compact.split_once('d').ok_or_else(invalid)?;

        let count = match count {
            "" => 1,
            count => count.parse().map_err(|_| invalid())?,
        };
        let (sides, modifier) = match rest.find(['+', '-']) {
            Some(at) => {
                let (sides, modifier) = rest.split_at(at);
                (sides, modifier.parse().map_err(|_| invalid())?)
            }
            None => (rest, 0),
        };
        let sides = sides.parse().map_err(|_| invalid())?;

        let dice = Dice { count, sides, modifier };
        if (1..=MAX_DICE).contains(&dice.count)
            && (2..=MAX_SIDES).contains(&dice.sides)
            && dice.modifier.abs() <= MAX_MODIFIER
        {
            Ok(dice)
        } else {
            Err(invalid())
        }
    }

    pub fn roll(&self, rng: &mut impl Rng) -> DiceRoll {
        let details: Vec<i64> = (0..self.count)
            .map(|_| i64::from(rng.random_range(1..=self.sides)))
            .collect();
        DiceRoll {
            notation: self.to_string(),
            result: details.iter().sum::<i64>() + self.modifier,
            details,
        }
    }
}

impl fmt::Display for Dice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

/// One roll as it is posted to chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceRoll {
    pub notation: String,
    pub result: i64,
    pub details: Vec<i64>,
}

pub fn roll(notation: &str, rng: &mut impl Rng) -> AppResult<DiceRoll> {
    Ok(Dice::parse(notation)?.roll(rng))
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn parses_common_forms() {
        let d = |count, sides, modifier| Dice { count, sides, modifier };
        assert_eq!(Dice::parse("2d6").unwrap(), d(2, 6, 0));
        assert_eq!(Dice::parse("D20").unwrap(), d(1, 20, 0));
        assert_eq!(Dice::parse(" 3d8 + 2 ").unwrap(), d(3, 8, 2));
        assert_eq!(Dice::parse("1d4-1").unwrap(), d(1, 4, -1));
        assert_eq!(Dice::parse("d20").unwrap().to_string(), "1d20");
        assert_eq!(Dice::parse("1d4-1").unwrap().to_string(), "1d4-1");
    }

    #[test]
    fn rejects_nonsense() {
        for bad in ["", "d", "2x6", "0d6", "2d1", "101d6", "2d6+", "2d6+-1", "2d6+1d4", "1d1001"] {
            assert!(
                matches!(Dice::parse(bad), Err(AppError::InvalidDiceNotation(n)) if n == bad),
                "{bad:?} parsed"
            );
        }
    }

    #[test]
    fn rolls_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let roll = roll("4d6+1", &mut rng).unwrap();
            assert_eq!(roll.details.len(), 4);
            assert!(roll.details.iter().all(|d| (1..=6).contains(d)));
            assert_eq!(roll.result, roll.details.iter().sum::<i64>() + 1);
            assert_eq!(roll.notation, "4d6+1");
        }
    }
}
