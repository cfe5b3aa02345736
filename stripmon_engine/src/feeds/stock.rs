//! Stock miner: daily closing-price history for a configured symbol list,
//! fetched at the 30-minute cadence.
//!
//! Symbols are fetched together in one background task; a symbol-list
//! change supersedes the in-flight fetch so late results for the old list
//! never overwrite newer state.

use tracing::{debug, warn};

use crate::series::TimeSeries;

use super::fetch::{build_client, fetch_text, FetchTask};

const QUOTE_URL_TEMPLATE: &str =
    "https://stooq.com/q/d/l/?s={symbol}&i=d";

/// One tracked symbol with its derived display data.
#[derive(Debug)]
pub struct StockQuote {
    pub symbol: String,
    pub current_price: f32,
    /// Change against the previous close.
    pub last_change: f32,
    pub high_52_week: f32,
    pub low_52_week: f32,
    /// Daily closes, oldest to newest.
    pub closing_prices: TimeSeries,
    /// Daily volumes, oldest to newest.
    pub volumes: TimeSeries,
}

pub struct StockMiner {
    symbols: Vec<String>,
    client: reqwest::Client,
    fetch: FetchTask<Vec<(String, String)>>,
    quotes: Vec<StockQuote>,
}

impl StockMiner {
    pub fn new(symbols: &[String]) -> Self {
        Self {
            symbols: normalize_symbols(symbols),
            client: build_client(),
            fetch: FetchTask::new(),
            quotes: Vec::new(),
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn quotes(&self) -> &[StockQuote] {
        &self.quotes
    }

    pub fn has_good_data(&self) -> bool {
        !self.quotes.is_empty()
    }

    pub fn quote(&self, symbol: &str) -> Option<&StockQuote> {
        let symbol = symbol.trim().to_uppercase();
        self.quotes.iter().find(|q| q.symbol == symbol)
    }

    /// A list change discards data for the old list and supersedes any
    /// fetch still in flight.
    pub fn set_symbols(&mut self, symbols: &[String]) {
        let symbols = normalize_symbols(symbols);
        if self.symbols == symbols {
            return;
        }
        debug!(symbols = ?symbols, "stock symbol list changed");
        self.symbols = symbols;
        self.quotes.clear();
        self.fetch.cancel();
        self.begin_fetch();
    }

    /// 30-minute cadence: kick off a background fetch for every symbol.
    pub fn min30_update(&mut self) {
        self.begin_fetch();
    }

    fn begin_fetch(&mut self) {
        if self.symbols.is_empty() {
            return;
        }
        let client = self.client.clone();
        let symbols = self.symbols.clone();
        self.fetch.begin(async move {
            let mut documents = Vec::with_capacity(symbols.len());
            for symbol in symbols {
                let url =
                    QUOTE_URL_TEMPLATE.replace("{symbol}", &symbol.to_lowercase());
                match fetch_text(&client, &url).await {
                    Ok(body) => documents.push((symbol, body)),
                    // One dead symbol must not starve the others.
                    Err(e) => warn!(%symbol, "quote fetch failed: {e}"),
                }
            }
            if documents.is_empty() {
                return Err("no symbol could be fetched".to_string());
            }
            Ok(documents)
        });
    }

    /// Graph cadence: integrate a delivered fetch result, if any.
    pub fn graph_update(&mut self) {
        let Some(result) = self.fetch.try_take() else {
            return;
        };
        match result {
            Ok(documents) => {
                let mut quotes = Vec::with_capacity(documents.len());
                for (symbol, body) in documents {
                    match parse_price_history(&symbol, &body) {
                        Some(quote) => quotes.push(quote),
                        None => warn!(%symbol, "malformed quote document"),
                    }
                }
                if !quotes.is_empty() {
                    self.quotes = quotes;
                }
            }
            Err(e) => warn!("stock fetch failed: {e}"),
        }
    }

    pub fn reset(&mut self) {
        self.fetch.cancel();
        self.quotes.clear();
    }
}

fn normalize_symbols(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = symbols
        .iter()
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    out.dedup();
    out
}

/// CSV document "Date,Open,High,Low,Close,Volume", oldest first. Rows that
/// fail to parse are skipped rather than poisoning the whole document.
fn parse_price_history(symbol: &str, body: &str) -> Option<StockQuote> {
    let mut closes = Vec::new();
    let mut volumes = Vec::new();
    for line in body.lines().skip(1) {
        let mut fields = line.split(',');
        let close = fields.nth(4);
        let volume = fields.next();
        if let Some(close) = close.and_then(|c| c.trim().parse::<f32>().ok()) {
            closes.push(close);
            volumes.push(
                volume
                    .and_then(|v| v.trim().parse::<f32>().ok())
                    .unwrap_or(0.0),
            );
        }
    }
    if closes.is_empty() {
        return None;
    }

    let current_price = *closes.last()?;
    let last_change = if closes.len() >= 2 {
        current_price - closes[closes.len() - 2]
    } else {
        0.0
    };
    let high_52_week = closes.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let low_52_week = closes.iter().copied().fold(f32::INFINITY, f32::min);

    let mut closing_prices = TimeSeries::new(closes.len());
    for c in &closes {
        closing_prices.append(*c);
    }
    let mut volume_series = TimeSeries::new(volumes.len());
    for v in &volumes {
        volume_series.append(*v);
    }

    Some(StockQuote {
        symbol: symbol.to_string(),
        current_price,
        last_change,
        high_52_week,
        low_52_week,
        closing_prices,
        volumes: volume_series,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "Date,Open,High,Low,Close,Volume\n\
                       2026-08-04,10,11,9,10.5,1000\n\
                       2026-08-05,10.5,12,10,11.5,1500\n\
                       2026-08-06,11.5,12,8,9.0,2000\n";

    #[test]
    fn parses_close_history_and_derived_figures() {
        let quote = parse_price_history("ACME", CSV).unwrap();
        assert_eq!(quote.current_price, 9.0);
        assert!((quote.last_change - (9.0 - 11.5)).abs() < 1e-4);
        assert_eq!(quote.high_52_week, 11.5);
        assert_eq!(quote.low_52_week, 9.0);
        assert_eq!(
            quote.closing_prices.ordered_snapshot(),
            vec![10.5, 11.5, 9.0]
        );
        assert_eq!(quote.volumes.current(), 2000.0);
    }

    #[test]
    fn garbage_rows_are_skipped() {
        let body = "Date,Open,High,Low,Close,Volume\nnot,a,row\n2026-08-06,1,1,1,2.0,10\n";
        let quote = parse_price_history("ACME", body).unwrap();
        assert_eq!(quote.closing_prices.len(), 1);
        assert_eq!(quote.current_price, 2.0);
    }

    #[test]
    fn empty_document_is_rejected() {
        assert!(parse_price_history("ACME", "Date,Open,High,Low,Close,Volume\n").is_none());
        assert!(parse_price_history("ACME", "").is_none());
    }

    #[test]
    fn symbol_normalization_dedupes_and_uppercases() {
        let syms = vec![" acme ".to_string(), "ACME".to_string(), "".to_string()];
        assert_eq!(normalize_symbols(&syms), vec!["ACME".to_string()]);
    }

    #[tokio::test]
    async fn symbol_change_clears_old_quotes() {
        let mut miner = StockMiner::new(&["ACME".to_string()]);
        miner.quotes = vec![parse_price_history("ACME", CSV).unwrap()];
        assert!(miner.has_good_data());
        miner.set_symbols(&["OTHR".to_string()]);
        assert!(!miner.has_good_data());
        assert!(miner.quote("ACME").is_none());
    }
}
