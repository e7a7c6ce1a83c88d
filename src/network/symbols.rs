//! Symbol normalization and provider id mapping

/// Supported instruments. Left column is the canonical ticker symbol,
/// right column the upstream provider's asset id.
const SYMBOL_TABLE: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("AVAX", "avalanche-2"),
    ("DOT", "polkadot"),
    ("LINK", "chainlink"),
    ("MATIC", "matic-network"),
    ("UNI", "uniswap"),
    ("LTC", "litecoin"),
    ("ATOM", "cosmos"),
    ("ARB", "arbitrum"),
    ("OP", "optimism"),
    ("AAVE", "aave"),
    ("AERO", "aerodrome-finance"),
];

/// Uppercased, trimmed, alias-resolved form of a caller-supplied symbol.
pub fn canonical(symbol: &str) -> String {
    let sym = symbol.trim().to_uppercase();
    match sym.as_str() {
        "XBT" => "BTC".to_string(),
        "WETH" => "ETH".to_string(),
        "WBTC" => "BTC".to_string(),
        _ => sym,
    }
}

pub fn provider_id(symbol: &str) -> Option<&'static str> {
    let canon = canonical(symbol);
    SYMBOL_TABLE
        .iter()
        .find(|(sym, _)| *sym == canon)
        .map(|(_, id)| *id)
}

pub fn symbol_for_id(provider_id: &str) -> Option<&'static str> {
    SYMBOL_TABLE
        .iter()
        .find(|(_, id)| *id == provider_id)
        .map(|(sym, _)| *sym)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_symbols() {
        assert_eq!(provider_id("BTC"), Some("bitcoin"));
        assert_eq!(provider_id("eth"), Some("ethereum"));
        assert_eq!(provider_id(" sol "), Some("solana"));
    }

    #[test]
    fn resolves_aliases() {
        assert_eq!(canonical("xbt"), "BTC");
        assert_eq!(canonical("WETH"), "ETH");
        assert_eq!(provider_id("WBTC"), Some("bitcoin"));
    }

    #[test]
    fn unknown_symbols_are_unmapped() {
        assert_eq!(provider_id("NOTACOIN"), None);
        assert_eq!(provider_id(""), None);
    }

    #[test]
    fn reverse_lookup_round_trips() {
        for (sym, id) in super::SYMBOL_TABLE {
            assert_eq!(symbol_for_id(id), Some(*sym));
        }
    }
}
