//! Ticker and candle snapshots.

/// Candle period. Venue adapters map these onto their own interval spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandlePeriod {
    #[default]
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    D7,
    Mon1,
}

impl CandlePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandlePeriod::M1 => "M1",
            CandlePeriod::M3 => "M3",
            CandlePeriod::M5 => "M5",
            CandlePeriod::M15 => "M15",
            CandlePeriod::M30 => "M30",
            CandlePeriod::H1 => "H1",
            CandlePeriod::H4 => "H4",
            CandlePeriod::D1 => "D1",
            CandlePeriod::D7 => "D7",
            CandlePeriod::Mon1 => "1M",
        }
    }

    /// Binance-compatible interval spelling.
    pub fn as_interval(&self) -> &'static str {
        match self {
            CandlePeriod::M1 => "1m",
            CandlePeriod::M3 => "3m",
            CandlePeriod::M5 => "5m",
            CandlePeriod::M15 => "15m",
            CandlePeriod::M30 => "30m",
            CandlePeriod::H1 => "1h",
            CandlePeriod::H4 => "4h",
            CandlePeriod::D1 => "1d",
            CandlePeriod::D7 => "1w",
            CandlePeriod::Mon1 => "1M",
        }
    }
}

/// 24h ticker snapshot with best bid/ask.
#[derive(Debug, Clone, Copy)]
pub struct Tickers {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub ask: f64,
    pub bid: f64,
    pub volume: f64,
}

/// Latest OHLCV candle for one period.
#[derive(Debug, Clone, Copy)]
pub struct PriceCandles {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub period: CandlePeriod,
}
