// =============================================================================
// Trading-pair allow-lists and symbol translation
// =============================================================================
//
// Each exchange is watched for a fixed set of pairs embedded in the build.
// Storage keys and the read API use the Binance spelling as the canonical
// form; Bittrex and Poloniex spellings are translated into it. Translation is
// total: an unknown symbol maps to the empty string and the caller skips the
// sample.
// =============================================================================

/// Binance pairs, canonical spelling.
pub const BINANCE_SYMBOLS: [&str; 14] = [
    "LTCBTC",
    "ETHBTC",
    "DASHBTC",
    "ZECBTC",
    "BCHABCBTC",
    "BCHSVBTC",
    "LTCETH",
    "DASHETH",
    "ZECETH",
    "BTCUSDT",
    "LTCUSDT",
    "ETHUSDT",
    "BCHABCUSDT",
    "BCHSVUSDT",
];

/// Bittrex pairs, quote-first with a dash.
pub const BITTREX_SYMBOLS: [&str; 14] = [
    "BTC-LTC",
    "BTC-ETH",
    "BTC-DASH",
    "BTC-ZEC",
    "BTC-BCH",
    "BTC-BSV",
    "ETH-LTC",
    "ETH-DASH",
    "ETH-ZEC",
    "USD-BTC",
    "USD-LTC",
    "USD-ETH",
    "USD-BCH",
    "USD-BSV",
];

/// Poloniex pairs, lower-case quote-first with a dash.
pub const POLONIEX_SYMBOLS: [&str; 14] = [
    "btc-ltc",
    "btc-eth",
    "btc-dash",
    "btc-zec",
    "btc-bch",
    "btc-bsv",
    "eth-ltc",
    "eth-dash",
    "eth-zec",
    "usd-btc",
    "usd-ltc",
    "usd-eth",
    "usd-bch",
    "usd-bsv",
];

/// Translate a Bittrex market name into the canonical (Binance) spelling.
/// Unknown symbols yield `""`.
pub fn bittrex_symbol_to_canonical(symbol: &str) -> &'static str {
    match symbol {
        "BTC-LTC" => "LTCBTC",
        "BTC-ETH" => "ETHBTC",
        "BTC-DASH" => "DASHBTC",
        "BTC-ZEC" => "ZECBTC",
        "BTC-BCH" => "BCHABCBTC",
        "BTC-BSV" => "BCHSVBTC",
        "ETH-LTC" => "LTCETH",
        "ETH-DASH" => "DASHETH",
        "ETH-ZEC" => "ZECETH",
        "USD-BTC" => "BTCUSDT",
        "USD-LTC" => "LTCUSDT",
        "USD-ETH" => "ETHUSDT",
        "USD-BCH" => "BCHABCUSDT",
        "USD-BSV" => "BCHSVUSDT",
        _ => "",
    }
}

/// Translate a Poloniex pair into the canonical (Binance) spelling.
/// Poloniex spells the same quote-first pairs as Bittrex, lower-cased.
pub fn poloniex_symbol_to_canonical(symbol: &str) -> &'static str {
    bittrex_symbol_to_canonical(&symbol.to_uppercase())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_bittrex_symbol_translates() {
        for s in BITTREX_SYMBOLS {
            let canonical = bittrex_symbol_to_canonical(s);
            assert!(!canonical.is_empty(), "{s} should translate");
            assert!(BINANCE_SYMBOLS.contains(&canonical));
        }
    }

    #[test]
    fn every_poloniex_symbol_translates() {
        for s in POLONIEX_SYMBOLS {
            let canonical = poloniex_symbol_to_canonical(s);
            assert!(!canonical.is_empty(), "{s} should translate");
            assert!(BINANCE_SYMBOLS.contains(&canonical));
        }
    }

    #[test]
    fn unknown_symbols_yield_empty() {
        assert_eq!(bittrex_symbol_to_canonical("BTC-DOGE"), "");
        assert_eq!(poloniex_symbol_to_canonical("btc-doge"), "");
        assert_eq!(bittrex_symbol_to_canonical(""), "");
    }

    #[test]
    fn translation_examples() {
        assert_eq!(bittrex_symbol_to_canonical("BTC-LTC"), "LTCBTC");
        assert_eq!(bittrex_symbol_to_canonical("USD-BTC"), "BTCUSDT");
        assert_eq!(poloniex_symbol_to_canonical("btc-ltc"), "LTCBTC");
        assert_eq!(poloniex_symbol_to_canonical("usd-bch"), "BCHABCUSDT");
    }
}
