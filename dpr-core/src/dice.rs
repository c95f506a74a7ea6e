//! Dice notation and d20 attack probabilities.
//!
//! Supports standard dice notation (`XdY+Z`), expected values for damage
//! dice, sampling for statistical checks, and closed-form hit/crit odds for
//! attack rolls under advantage and disadvantage.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
}

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Advantage::Normal => "normal",
            Advantage::Advantage => "advantage",
            Advantage::Disadvantage => "disadvantage",
        }
    }
}

impl FromStr for Advantage {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Advantage::Normal),
            "advantage" | "adv" => Ok(Advantage::Advantage),
            "disadvantage" | "dis" => Ok(Advantage::Disadvantage),
            other => Err(DiceError::InvalidNotation(other.to_string())),
        }
    }
}

/// Standard D&D die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }

    /// Mean of a single die.
    pub fn average(&self) -> f64 {
        (self.sides() as f64 + 1.0) / 2.0
    }

    /// Mean of a single die when 1s and 2s are rerolled once (Great Weapon Fighting).
    pub fn average_rerolling_low(&self) -> f64 {
        let sides = self.sides() as f64;
        let rerolled = 2.0_f64.min(sides);
        let kept_sum: f64 = (3..=self.sides()).map(|v| v as f64).sum();
        (kept_sum + rerolled * self.average()) / sides
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// A single die component of a dice expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceComponent {
    pub count: u32,
    pub die_type: DieType,
}

/// A complete dice expression (e.g., 2d6+3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub components: Vec<DiceComponent>,
    pub modifier: i32,
}

impl DiceExpression {
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut components = Vec::new();
        let mut modifier: i32 = 0;
        let mut current = String::new();
        let mut sign: i32 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_component(&current, sign, &mut components, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_component(&current, sign, &mut components, &mut modifier)?;
        }

        if components.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression {
            components,
            modifier,
        })
    }

    /// Shorthand for `count` dice of one type with no modifier.
    pub fn dice(count: u32, die_type: DieType) -> Self {
        Self {
            components: vec![DiceComponent { count, die_type }],
            modifier: 0,
        }
    }

    fn parse_component(
        s: &str,
        sign: i32,
        components: &mut Vec<DiceComponent>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        if let Some(d_pos) = s.find('d') {
            let count_str = &s[..d_pos];
            let sides_str = &s[d_pos + 1..];

            let count: u32 = if count_str.is_empty() {
                1
            } else {
                count_str
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(s.to_string()))?
            };

            // Subtracted dice never show up in damage notation.
            if sign < 0 {
                return Err(DiceError::InvalidNotation(s.to_string()));
            }

            let sides: u32 = sides_str
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            let die_type = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;

            components.push(DiceComponent { count, die_type });
        } else {
            let value: i32 = s
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            *modifier += sign * value;
        }

        Ok(())
    }

    /// Expected value of the dice alone (the part doubled on a critical hit).
    pub fn dice_average(&self) -> f64 {
        self.components
            .iter()
            .map(|c| c.count as f64 * c.die_type.average())
            .sum()
    }

    /// Expected value of the dice when low rolls are rerolled once.
    pub fn dice_average_rerolling_low(&self) -> f64 {
        self.components
            .iter()
            .map(|c| c.count as f64 * c.die_type.average_rerolling_low())
            .sum()
    }

    /// Expected value of the whole expression.
    pub fn average(&self) -> f64 {
        self.dice_average() + self.modifier as f64
    }

    /// Number of dice in the expression.
    pub fn dice_count(&self) -> u32 {
        self.components.iter().map(|c| c.count).sum()
    }

    /// Roll the expression with a specific RNG.
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> i32 {
        let dice_total: u32 = self
            .components
            .iter()
            .flat_map(|c| (0..c.count).map(move |_| c.die_type))
            .map(|die| rng.gen_range(1..=die.sides()))
            .sum();
        dice_total as i32 + self.modifier
    }
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dice: Vec<String> = self
            .components
            .iter()
            .map(|c| format!("{}{}", c.count, c.die_type))
            .collect();
        write!(f, "{}", dice.join("+"))?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 && !dice.is_empty() => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

/// Probability that a single attack roll hits, and that it crits.
///
/// `hit` includes critical hits, so `crit <= hit` always holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackOdds {
    pub hit: f64,
    pub crit: f64,
}

/// Closed-form hit and crit chances for an attack roll.
///
/// `attack_bonus` may be fractional so that expected-value bonuses such as
/// Bless (+1d4 = +2.5) fold into the same formula. A natural 1 always
/// misses; a natural roll inside the crit range always hits. Elven Accuracy
/// rolls a third die when the attack already has advantage.
pub fn attack_odds(
    attack_bonus: f64,
    target_ac: i32,
    crit_min: u8,
    advantage: Advantage,
    elven_accuracy: bool,
) -> AttackOdds {
    let crit_single = (21.0 - crit_min.clamp(2, 20) as f64) / 20.0;
    let needed = target_ac as f64 - attack_bonus;
    let hit_single = ((21.0 - needed) / 20.0).clamp(0.05, 0.95).max(crit_single);

    match advantage {
        Advantage::Normal => AttackOdds {
            hit: hit_single,
            crit: crit_single,
        },
        Advantage::Advantage => {
            let dice = if elven_accuracy { 3 } else { 2 };
            AttackOdds {
                hit: 1.0 - (1.0 - hit_single).powi(dice),
                crit: 1.0 - (1.0 - crit_single).powi(dice),
            }
        }
        Advantage::Disadvantage => AttackOdds {
            hit: hit_single.powi(2),
            crit: crit_single.powi(2),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_simple() {
        let expr = DiceExpression::parse("1d20").unwrap();
        assert_eq!(expr.components.len(), 1);
        assert_eq!(expr.components[0].count, 1);
        assert_eq!(expr.components[0].die_type, DieType::D20);
        assert_eq!(expr.modifier, 0);
    }

    #[test]
    fn test_parse_with_modifier() {
        let expr = DiceExpression::parse("1d8+5").unwrap();
        assert_eq!(expr.modifier, 5);

        let expr = DiceExpression::parse("2d6-2").unwrap();
        assert_eq!(expr.modifier, -2);
    }

    #[test]
    fn test_parse_multiple_dice() {
        let expr = DiceExpression::parse("2d6+1d4+3").unwrap();
        assert_eq!(expr.components.len(), 2);
        assert_eq!(expr.modifier, 3);
        assert_eq!(expr.dice_count(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(DiceExpression::parse(""), Err(DiceError::NoDice)));
        assert!(matches!(
            DiceExpression::parse("1d7"),
            Err(DiceError::InvalidDieSize(7))
        ));
        assert!(DiceExpression::parse("xd6").is_err());
    }

    #[test]
    fn test_averages() {
        assert_eq!(DiceExpression::parse("2d6").unwrap().average(), 7.0);
        assert_eq!(DiceExpression::parse("1d8+3").unwrap().average(), 7.5);
        assert_eq!(DiceExpression::parse("1d8+3").unwrap().dice_average(), 4.5);
    }

    #[test]
    fn test_great_weapon_fighting_average() {
        // 2d6 with rerolls of 1-2 is the well known 8.33
        let avg = DiceExpression::parse("2d6")
            .unwrap()
            .dice_average_rerolling_low();
        assert!((avg - 8.333).abs() < 0.01);
    }

    #[test]
    fn test_sampled_mean_matches_average() {
        let expr = DiceExpression::parse("2d6+1d4+3").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let samples = 20_000;
        let total: i64 = (0..samples)
            .map(|_| expr.roll_with_rng(&mut rng) as i64)
            .sum();
        let mean = total as f64 / samples as f64;
        assert!((mean - expr.average()).abs() < 0.1, "mean was {mean}");
    }

    #[test]
    fn test_attack_odds_clamped() {
        let easy = attack_odds(30.0, 10, 20, Advantage::Normal, false);
        assert!((easy.hit - 0.95).abs() < 1e-9);
        let hard = attack_odds(0.0, 40, 20, Advantage::Normal, false);
        assert!((hard.hit - 0.05).abs() < 1e-9);
        assert!((hard.crit - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_attack_odds_advantage_ordering() {
        let normal = attack_odds(7.0, 16, 20, Advantage::Normal, false);
        let adv = attack_odds(7.0, 16, 20, Advantage::Advantage, false);
        let elven = attack_odds(7.0, 16, 20, Advantage::Advantage, true);
        let dis = attack_odds(7.0, 16, 20, Advantage::Disadvantage, false);
        assert!((normal.hit - 0.6).abs() < 1e-9);
        assert!(adv.hit > normal.hit && elven.hit > adv.hit);
        assert!(dis.hit < normal.hit);
        assert!((adv.crit - 0.0975).abs() < 1e-9);
    }

    #[test]
    fn test_expanded_crit_range_always_hits() {
        let odds = attack_odds(0.0, 30, 18, Advantage::Normal, false);
        assert!((odds.crit - 0.15).abs() < 1e-9);
        assert!(odds.hit >= odds.crit);
    }

    #[test]
    fn test_advantage_combine() {
        assert_eq!(
            Advantage::Normal.combine(Advantage::Advantage),
            Advantage::Advantage
        );
        assert_eq!(
            Advantage::Advantage.combine(Advantage::Disadvantage),
            Advantage::Normal
        );
        assert_eq!("adv".parse::<Advantage>().unwrap(), Advantage::Advantage);
    }
}
