//! Source Selector: ranks funding sources by how much routing they need.

use rust_decimal::Decimal;
use serde::Serialize;

use super::scanner::BalanceEntry;
use crate::chain::catalog::SourceOption;
use crate::market::Destination;

/// Symbols treated as stablecoins when scoring.
pub const STABLECOINS: [&str; 3] = ["USDC", "USDT", "DAI"];

/// Whether a token symbol is on the stablecoin allow-list.
pub fn is_stablecoin(symbol: &str) -> bool {
    STABLECOINS.contains(&symbol)
}

/// Routing cost of a source, lower is cheaper.
///
/// | score | source |
/// |---|---|
/// | 0 | settlement token on the destination chain |
/// | 1 | other stablecoin on the destination chain |
/// | 2 | settlement symbol on another chain |
/// | 3 | other stablecoin on another chain |
/// | 4 | volatile asset on the destination chain |
/// | 5 | volatile asset on another chain |
pub fn cost_score(source: &SourceOption, destination: &Destination) -> u8 {
    let on_destination = source.chain_id == destination.chain_id;
    let stable = is_stablecoin(source.token_symbol);

    if destination.is_settlement_asset(source.chain_id, source.token_address) {
        0
    } else if on_destination && stable {
        1
    } else if !on_destination && source.token_symbol == destination.settlement_symbol {
        2
    } else if !on_destination && stable {
        3
    } else if on_destination {
        4
    } else {
        5
    }
}

/// Outcome of [`select_source`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    /// Cheapest candidate, absent when there are no balances.
    pub chosen: Option<BalanceEntry>,
    /// Candidates in rank order (the sufficient subset when one exists).
    pub candidates: Vec<BalanceEntry>,
    /// Every positive balance the scan found.
    pub all_balances: Vec<BalanceEntry>,
}

impl SelectionResult {
    /// Catalog index of the chosen entry.
    pub fn chosen_index(&self) -> Option<usize> {
        self.chosen.as_ref().map(|e| e.source_index)
    }

    /// Balance of the chosen entry.
    pub fn chosen_balance(&self) -> Option<Decimal> {
        self.chosen.as_ref().map(|e| e.human_balance)
    }
}

/// Pick the cheapest source able to cover `required`.
///
/// When no entry covers the amount, the cheapest entry overall is returned
/// so the caller can still show what is available. Entries whose index is
/// outside `catalog` are ignored.
pub fn select_source(
    entries: &[BalanceEntry],
    required: Decimal,
    catalog: &[SourceOption],
    destination: &Destination,
) -> SelectionResult {
    let known: Vec<&BalanceEntry> = entries
        .iter()
        .filter(|e| e.source_index < catalog.len())
        .collect();

    let sufficient: Vec<&BalanceEntry> = known
        .iter()
        .copied()
        .filter(|e| e.human_balance >= required)
        .collect();

    let pool = if sufficient.is_empty() { known } else { sufficient };

    let mut ranked: Vec<BalanceEntry> = pool.into_iter().cloned().collect();
    ranked.sort_by(|a, b| {
        let score_a = cost_score(&catalog[a.source_index], destination);
        let score_b = cost_score(&catalog[b.source_index], destination);
        score_a
            .cmp(&score_b)
            .then_with(|| b.human_balance.cmp(&a.human_balance))
    });

    SelectionResult {
        chosen: ranked.first().cloned(),
        candidates: ranked,
        all_balances: entries.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::catalog::SOURCE_CATALOG;
    use alloy::primitives::U256;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn base_usdc() -> Destination {
        Destination {
            chain_id: 8453,
            settlement_token: SOURCE_CATALOG[0].token_address,
            settlement_symbol: "USDC".to_string(),
            settlement_decimals: 6,
        }
    }

    fn index_of(label: &str) -> usize {
        SOURCE_CATALOG
            .iter()
            .position(|s| s.label == label)
            .unwrap()
    }

    fn entry(label: &str, balance: Decimal) -> BalanceEntry {
        BalanceEntry {
            source_index: index_of(label),
            human_balance: balance,
            raw_balance: U256::from(1u64),
        }
    }

    fn score(label: &str) -> u8 {
        cost_score(&SOURCE_CATALOG[index_of(label)], &base_usdc())
    }

    #[test]
    fn scores_follow_routing_cost() {
        assert_eq!(score("USDC on Base"), 0);
        assert_eq!(score("DAI on Base"), 1);
        assert_eq!(score("USDC on Arbitrum"), 2);
        assert_eq!(score("USDT on Polygon"), 3);
        assert_eq!(score("ETH on Base"), 4);
        assert_eq!(score("ETH on Ethereum"), 5);
    }

    #[test]
    fn prefers_sufficient_entries() {
        let entries = vec![
            entry("USDC on Base", dec!(5)),
            entry("ETH on Ethereum", dec!(100)),
        ];

        let result = select_source(&entries, dec!(20), &SOURCE_CATALOG, &base_usdc());
        assert_eq!(result.chosen_index(), Some(index_of("ETH on Ethereum")));
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.all_balances.len(), 2);
    }

    #[test]
    fn falls_back_to_all_entries_when_none_suffice() {
        let entries = vec![
            entry("ETH on Ethereum", dec!(3)),
            entry("USDC on Base", dec!(5)),
        ];

        let result = select_source(&entries, dec!(20), &SOURCE_CATALOG, &base_usdc());
        assert_eq!(result.chosen_index(), Some(index_of("USDC on Base")));
        assert_eq!(result.candidates.len(), 2);
    }

    #[test]
    fn ties_break_on_larger_balance() {
        let entries = vec![
            entry("USDC on Polygon", dec!(30)),
            entry("USDC on Arbitrum", dec!(80)),
            entry("USDC on Ethereum", dec!(50)),
        ];

        let result = select_source(&entries, dec!(20), &SOURCE_CATALOG, &base_usdc());
        assert_eq!(result.chosen_balance(), Some(dec!(80)));
        let order: Vec<Decimal> = result.candidates.iter().map(|e| e.human_balance).collect();
        assert_eq!(order, vec![dec!(80), dec!(50), dec!(30)]);
    }

    #[test]
    fn no_balances_means_no_choice() {
        let result = select_source(&[], dec!(1), &SOURCE_CATALOG, &base_usdc());
        assert_eq!(result.chosen, None);
        assert!(result.candidates.is_empty());
    }

    #[test]
    fn chosen_covers_amount_whenever_possible() {
        let balances = [dec!(1), dec!(19.99), dec!(20), dec!(250), dec!(0.5)];
        let labels = [
            "USDC on Base",
            "DAI on Base",
            "USDC on Arbitrum",
            "ETH on Ethereum",
            "WETH on Base",
        ];

        for required in [dec!(0), dec!(0.5), dec!(1), dec!(20), dec!(100), dec!(300)] {
            let entries: Vec<BalanceEntry> = labels
                .iter()
                .zip(balances)
                .map(|(label, balance)| entry(label, balance))
                .collect();

            let result = select_source(&entries, required, &SOURCE_CATALOG, &base_usdc());
            let any_sufficient = entries.iter().any(|e| e.human_balance >= required);
            if any_sufficient {
                assert!(result.chosen_balance().unwrap() >= required, "required {}", required);
            }
            assert!(result
                .all_balances
                .iter()
                .any(|e| Some(e.source_index) == result.chosen_index()));
        }
    }
}
