use chrono::NaiveDate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Right {
    Call,
    Put,
}

/// Invariants (§3): bid <= ask when both present; 0 < iv < 5; |delta| <= 1.
/// The provider is responsible for surfacing only contracts that satisfy
/// these; the engine does not re-validate them, it treats absent fields
/// (`missing_iv`, `missing_quotes`) as typed rejections instead.
#[derive(Clone, Debug)]
pub struct Contract {
    pub strike: f64,
    pub right: Right,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub iv: Option<f64>,
    pub delta: Option<f64>,
    pub volume: i64,
    pub open_interest: i64,
}

impl Contract {
    pub fn is_valid(&self) -> bool {
        if let (Some(bid), Some(ask)) = (self.bid, self.ask) {
            if bid > ask {
                return false;
            }
        }
        if let Some(iv) = self.iv {
            if !(iv > 0.0 && iv < 5.0) {
                return false;
            }
        }
        if let Some(delta) = self.delta {
            if delta.abs() > 1.0 {
                return false;
            }
        }
        true
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Expiry {
    pub expiry_date: NaiveDate,
    pub contracts: Vec<Contract>,
}

impl Expiry {
    pub fn dte(&self, as_of: NaiveDate) -> i64 {
        crate::time::days_between(as_of, self.expiry_date)
    }
}

/// Ticker, as-of timestamp, underlying price, and expiries (§3).
#[derive(Clone, Debug)]
pub struct ChainSnapshot {
    pub ticker: String,
    pub as_of_ts: u64,
    pub underlying_price: f64,
    pub expiries: Vec<Expiry>,
}
