/// Static ranking-to-regime table
///
/// Each entry is a descending ranking of the five labeled values. Rankings
/// not listed here classify as Neutral.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::classifier::{Label, Ranking};
use super::MarketCondition;
use Label::{Ma200, Ma21, Ma5, Ma7, Price};
use MarketCondition::{Bearish, Bullish, Longbear, Shortbull};

pub(crate) const RANKING_TABLE: &[(Ranking, MarketCondition)] = &[
    // Bullish
    ([Price, Ma5, Ma7, Ma21, Ma200], Bullish),
    ([Ma5, Price, Ma7, Ma21, Ma200], Bullish),
    ([Ma21, Price, Ma5, Ma7, Ma200], Bullish),
    ([Price, Ma21, Ma5, Ma7, Ma200], Bullish),
    ([Price, Ma7, Ma5, Ma21, Ma200], Bullish),
    ([Ma21, Price, Ma7, Ma5, Ma200], Bullish),
    ([Price, Ma21, Ma7, Ma5, Ma200], Bullish),
    ([Price, Ma7, Ma21, Ma5, Ma200], Bullish),
    ([Ma7, Ma21, Price, Ma5, Ma200], Bullish),
    ([Price, Ma5, Ma21, Ma7, Ma200], Bullish),
    ([Price, Ma200, Ma5, Ma7, Ma21], Bullish),
    ([Price, Ma5, Ma200, Ma7, Ma21], Bullish),
    ([Price, Ma5, Ma7, Ma200, Ma21], Bullish),
    ([Price, Ma21, Ma200, Ma5, Ma7], Bullish),
    ([Ma21, Price, Ma200, Ma5, Ma7], Bullish),
    ([Price, Ma200, Ma5, Ma21, Ma7], Bullish),
    ([Ma5, Price, Ma7, Ma200, Ma21], Bullish),
    ([Price, Ma7, Ma5, Ma200, Ma21], Bullish),
    ([Price, Ma7, Ma200, Ma5, Ma21], Bullish),
    ([Price, Ma200, Ma21, Ma5, Ma7], Bullish),
    ([Ma5, Ma21, Price, Ma200, Ma7], Bullish),
    ([Ma21, Price, Ma200, Ma7, Ma5], Bullish),
    ([Ma21, Ma5, Price, Ma7, Ma200], Bullish),
    // Shortbull
    ([Ma200, Ma21, Price, Ma5, Ma7], Shortbull),
    ([Ma200, Price, Ma5, Ma7, Ma21], Shortbull),
    ([Ma200, Ma5, Price, Ma7, Ma21], Shortbull),
    ([Ma200, Ma21, Price, Ma7, Ma5], Shortbull),
    ([Ma200, Price, Ma21, Ma7, Ma5], Shortbull),
    ([Ma200, Price, Ma5, Ma21, Ma7], Shortbull),
    ([Ma200, Price, Ma21, Ma5, Ma7], Shortbull),
    ([Ma200, Price, Ma7, Ma5, Ma21], Shortbull),
    ([Ma21, Ma200, Price, Ma5, Ma7], Shortbull),
    ([Ma21, Ma200, Price, Ma7, Ma5], Shortbull),
    ([Ma200, Price, Ma7, Ma21, Ma5], Shortbull),
    ([Ma5, Ma200, Price, Ma21, Ma7], Shortbull),
    ([Ma200, Ma21, Ma5, Price, Ma7], Shortbull),
    // Longbear
    ([Ma21, Ma7, Ma5, Price, Ma200], Longbear),
    ([Ma7, Ma5, Price, Ma21, Ma200], Longbear),
    ([Ma21, Ma7, Price, Ma5, Ma200], Longbear),
    ([Ma5, Ma7, Price, Ma21, Ma200], Longbear),
    ([Ma5, Ma7, Ma21, Price, Ma200], Longbear),
    ([Ma7, Ma21, Ma5, Price, Ma200], Longbear),
    ([Ma21, Ma5, Ma7, Price, Ma200], Longbear),
    ([Ma5, Ma21, Ma7, Price, Ma200], Longbear),
    ([Ma7, Ma5, Ma21, Price, Ma200], Longbear),
    ([Ma5, Ma7, Price, Ma200, Ma21], Longbear),
    ([Ma7, Ma5, Price, Ma200, Ma21], Longbear),
    ([Ma7, Price, Ma5, Ma200, Ma21], Longbear),
    ([Ma7, Price, Ma5, Ma21, Ma200], Longbear),
    // Bearish
    ([Ma200, Ma21, Ma7, Ma5, Price], Bearish),
    ([Ma200, Ma7, Ma5, Price, Ma21], Bearish),
    ([Ma200, Ma21, Ma7, Price, Ma5], Bearish),
    ([Ma200, Ma7, Ma21, Ma5, Price], Bearish),
    ([Ma7, Ma5, Ma200, Ma21, Price], Bearish),
    ([Ma7, Ma200, Ma5, Ma21, Price], Bearish),
    ([Ma200, Ma5, Ma7, Price, Ma21], Bearish),
    ([Ma200, Ma7, Ma5, Ma21, Price], Bearish),
    ([Ma21, Ma200, Ma7, Ma5, Price], Bearish),
    ([Ma21, Ma7, Ma5, Ma200, Price], Bearish),
    ([Ma21, Ma7, Ma200, Ma5, Price], Bearish),
    ([Ma200, Ma21, Ma5, Ma7, Price], Bearish),
    ([Ma21, Ma200, Ma5, Ma7, Price], Bearish),
    ([Ma200, Ma7, Ma21, Price, Ma5], Bearish),
    ([Ma200, Ma5, Ma7, Ma21, Price], Bearish),
    ([Ma5, Ma200, Ma7, Ma21, Price], Bearish),
    ([Ma5, Ma200, Ma7, Price, Ma21], Bearish),
    ([Ma5, Ma7, Ma200, Price, Ma21], Bearish),
    ([Ma5, Ma7, Ma200, Ma21, Price], Bearish),
    ([Ma200, Ma5, Ma21, Ma7, Price], Bearish),
    ([Ma7, Ma5, Ma200, Price, Ma21], Bearish),
    ([Ma7, Ma5, Ma21, Ma200, Price], Bearish),
    ([Ma7, Ma21, Ma5, Ma200, Price], Bearish),
    ([Ma21, Ma200, Ma7, Price, Ma5], Bearish),
    ([Ma7, Ma200, Price, Ma5, Ma21], Bearish),
    ([Ma21, Ma5, Ma200, Ma7, Price], Bearish),
    ([Ma200, Ma7, Price, Ma5, Ma21], Bearish),
];

static LOOKUP: OnceLock<HashMap<Ranking, MarketCondition>> = OnceLock::new();

/// Regime for a ranking, Neutral when not enumerated
pub(crate) fn lookup(ranking: &Ranking) -> MarketCondition {
    LOOKUP
        .get_or_init(build_lookup)
        .get(ranking)
        .copied()
        .unwrap_or(MarketCondition::Neutral)
}

fn build_lookup() -> HashMap<Ranking, MarketCondition> {
    let mut map = HashMap::with_capacity(RANKING_TABLE.len());
    for (ranking, condition) in RANKING_TABLE {
        let previous = map.insert(*ranking, *condition);
        debug_assert!(previous.is_none(), "duplicate ranking {:?}", ranking);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all_rankings() -> Vec<Ranking> {
        let labels = Label::ALL;
        let mut out = Vec::new();
        for a in 0..5 {
            for b in 0..5 {
                for c in 0..5 {
                    for d in 0..5 {
                        for e in 0..5 {
                            let idx = [a, b, c, d, e];
                            let unique: HashSet<usize> = idx.iter().copied().collect();
                            if unique.len() == 5 {
                                out.push(idx.map(|i| labels[i]));
                            }
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_table_entries_are_permutations() {
        for (ranking, _) in RANKING_TABLE {
            let unique: HashSet<Label> = ranking.iter().copied().collect();
            assert_eq!(unique.len(), 5, "not a permutation: {:?}", ranking);
        }
    }

    #[test]
    fn test_table_has_no_duplicate_rankings() {
        let unique: HashSet<Ranking> = RANKING_TABLE.iter().map(|(r, _)| *r).collect();
        assert_eq!(unique.len(), RANKING_TABLE.len());
    }

    #[test]
    fn test_every_permutation_maps_to_one_bucket() {
        let rankings = all_rankings();
        assert_eq!(rankings.len(), 120);

        let mut counts: HashMap<MarketCondition, usize> = HashMap::new();
        for ranking in &rankings {
            *counts.entry(lookup(ranking)).or_default() += 1;
        }

        assert_eq!(counts.values().sum::<usize>(), 120);
        assert_eq!(counts[&Bullish], 23);
        assert_eq!(counts[&Shortbull], 13);
        assert_eq!(counts[&Longbear], 13);
        assert_eq!(counts[&Bearish], 27);
        assert_eq!(counts[&MarketCondition::Neutral], 44);
    }

    #[test]
    fn test_unlisted_ranking_is_neutral() {
        assert_eq!(lookup(&[Ma7, Ma200, Ma21, Price, Ma5]), MarketCondition::Neutral);
    }
}
