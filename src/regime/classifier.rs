/// Moving-average regime classifier
///
/// Ranks price against MA5/MA7/MA21/MA200 and looks the ranking up in a
/// static table:
/// - Bullish / Shortbull: long family, buy side only
/// - Bearish / Longbear: short family, sell side only
/// - Neutral: everything not enumerated

use serde::{Deserialize, Serialize};
use std::fmt;

use super::table;
use crate::models::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketCondition {
    Bullish,
    Shortbull,
    Bearish,
    Longbear,
    Neutral,
}

impl MarketCondition {
    /// Trade direction this regime permits, None for Neutral
    pub fn direction(&self) -> Option<Direction> {
        match self {
            MarketCondition::Bullish | MarketCondition::Shortbull => Some(Direction::Buy),
            MarketCondition::Bearish | MarketCondition::Longbear => Some(Direction::Sell),
            MarketCondition::Neutral => None,
        }
    }

    pub fn is_long_family(&self) -> bool {
        self.direction() == Some(Direction::Buy)
    }

    pub fn is_short_family(&self) -> bool {
        self.direction() == Some(Direction::Sell)
    }
}

impl fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MarketCondition::Bullish => "Bullish",
            MarketCondition::Shortbull => "Shortbull",
            MarketCondition::Bearish => "Bearish",
            MarketCondition::Longbear => "Longbear",
            MarketCondition::Neutral => "Neutral",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendStrength {
    Strong,
    Weak,
    Neutral,
}

/// The five ranked values, declared in tie-break priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Price,
    Ma5,
    Ma7,
    Ma21,
    Ma200,
}

impl Label {
    pub const ALL: [Label; 5] = [Label::Price, Label::Ma5, Label::Ma7, Label::Ma21, Label::Ma200];
}

/// Labels ordered from highest to lowest value
pub type Ranking = [Label; 5];

/// Rank the five values in descending order
///
/// Equal values keep priority order Price > MA5 > MA7 > MA21 > MA200.
pub fn rank(price: f64, ma5: f64, ma7: f64, ma21: f64, ma200: f64) -> Ranking {
    let mut values = [
        (Label::Price, price),
        (Label::Ma5, ma5),
        (Label::Ma7, ma7),
        (Label::Ma21, ma21),
        (Label::Ma200, ma200),
    ];
    // Stable sort, so ties stay in declaration order
    values.sort_by(|a, b| b.1.total_cmp(&a.1));
    values.map(|(label, _)| label)
}

/// Classify the market from price and moving averages
///
/// Total over finite inputs. Callers must reject missing averages first.
pub fn classify(
    price: f64,
    ma5: f64,
    ma7: f64,
    ma21: f64,
    ma200: f64,
) -> (MarketCondition, TrendStrength) {
    let condition = table::lookup(&rank(price, ma5, ma7, ma21, ma200));
    let strength = trend_strength(condition, price, ma5, ma7, ma21);
    (condition, strength)
}

/// Trend strength relative to MA21 for the regime's family
pub fn trend_strength(
    condition: MarketCondition,
    price: f64,
    ma5: f64,
    ma7: f64,
    ma21: f64,
) -> TrendStrength {
    let all_above = price > ma21 && ma5 > ma21 && ma7 > ma21;
    let all_below = price < ma21 && ma5 < ma21 && ma7 < ma21;

    if condition.is_long_family() {
        if all_above {
            TrendStrength::Strong
        } else if all_below {
            TrendStrength::Weak
        } else if (price > ma5 && ma5 > ma7 && ma7 > ma21)
            || (price > ma7 && ma7 > ma5 && ma5 > ma21)
        {
            TrendStrength::Strong
        } else {
            TrendStrength::Neutral
        }
    } else if condition.is_short_family() {
        if all_below {
            TrendStrength::Strong
        } else if all_above {
            TrendStrength::Weak
        } else if (price < ma5 && ma5 < ma7 && ma7 < ma21)
            || (price < ma7 && ma7 < ma5 && ma5 < ma21)
        {
            TrendStrength::Strong
        } else {
            TrendStrength::Neutral
        }
    } else {
        TrendStrength::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Label::*;

    #[test]
    fn test_descending_is_strong_bullish() {
        let (condition, strength) = classify(110.0, 108.0, 106.0, 104.0, 100.0);
        assert_eq!(condition, MarketCondition::Bullish);
        assert_eq!(strength, TrendStrength::Strong);
    }

    #[test]
    fn test_ascending_is_strong_short_family() {
        let (condition, strength) = classify(90.0, 92.0, 94.0, 96.0, 100.0);
        assert_eq!(condition, MarketCondition::Bearish);
        assert!(condition.is_short_family());
        assert_eq!(strength, TrendStrength::Strong);
    }

    #[test]
    fn test_shortbull_below_long_average() {
        // MA200 on top, price next: recovering under the long trend
        let (condition, _) = classify(99.0, 97.0, 96.0, 95.0, 100.0);
        assert_eq!(rank(99.0, 97.0, 96.0, 95.0, 100.0), [Ma200, Price, Ma5, Ma7, Ma21]);
        assert_eq!(condition, MarketCondition::Shortbull);
    }

    #[test]
    fn test_longbear_above_long_average() {
        let (condition, strength) = classify(104.0, 106.0, 105.0, 103.0, 100.0);
        assert_eq!(rank(104.0, 106.0, 105.0, 103.0, 100.0), [Ma5, Ma7, Price, Ma21, Ma200]);
        assert_eq!(condition, MarketCondition::Longbear);
        // price and short MAs all above MA21 reads as weak for a sell bias
        assert_eq!(strength, TrendStrength::Weak);
    }

    #[test]
    fn test_unlisted_ranking_is_neutral() {
        // Ma7 > Ma200 > Ma21 > Price > Ma5
        let (condition, strength) = classify(98.0, 97.0, 103.0, 99.0, 100.0);
        assert_eq!(condition, MarketCondition::Neutral);
        assert_eq!(strength, TrendStrength::Neutral);
    }

    #[test]
    fn test_ties_follow_priority_order() {
        assert_eq!(rank(100.0, 100.0, 100.0, 100.0, 100.0), [Price, Ma5, Ma7, Ma21, Ma200]);
        assert_eq!(rank(100.0, 101.0, 100.0, 101.0, 99.0), [Ma5, Ma21, Price, Ma7, Ma200]);
        // all equal ranks exactly like a strict descending series
        assert_eq!(classify(5.0, 5.0, 5.0, 5.0, 5.0).0, MarketCondition::Bullish);
    }

    #[test]
    fn test_long_family_strength_branches() {
        assert_eq!(
            trend_strength(MarketCondition::Bullish, 90.0, 91.0, 92.0, 95.0),
            TrendStrength::Weak
        );
        assert_eq!(
            trend_strength(MarketCondition::Shortbull, 100.0, 94.0, 96.0, 95.0),
            TrendStrength::Neutral
        );
    }

    #[test]
    fn test_neutral_strength_always_neutral() {
        assert_eq!(
            trend_strength(MarketCondition::Neutral, 110.0, 108.0, 106.0, 104.0),
            TrendStrength::Neutral
        );
    }

    #[test]
    fn test_classify_total_over_grid() {
        let values = [-1.0e6, -3.5, 0.0, 1.0, 1.0, 2.5, 100.0, 1.0e9];
        let mut seen = 0;
        for &p in &values {
            for &a in &values {
                for &b in &values {
                    for &c in &values {
                        for &d in &values {
                            let (condition, strength) = classify(p, a, b, c, d);
                            if condition == MarketCondition::Neutral {
                                assert_eq!(strength, TrendStrength::Neutral);
                            }
                            seen += 1;
                        }
                    }
                }
            }
        }
        assert_eq!(seen, values.len().pow(5));
    }

    #[test]
    fn test_direction_by_family() {
        assert_eq!(MarketCondition::Shortbull.direction(), Some(Direction::Buy));
        assert_eq!(MarketCondition::Longbear.direction(), Some(Direction::Sell));
        assert_eq!(MarketCondition::Neutral.direction(), None);
    }
}
