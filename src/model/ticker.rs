/// Scan priority bucket. Recomputed daily and on subscriber-count change
/// (§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Tier::High),
            "medium" => Some(Tier::Medium),
            "low" => Some(Tier::Low),
            _ => None,
        }
    }
}

/// Created on first subscription; tier recomputed when subscribers change
/// or daily.
#[derive(Clone, Debug)]
pub struct Ticker {
    pub symbol: String,
    pub active_subscriber_count: i64,
    pub last_scan_at: Option<u64>,
    pub tier: Tier,
}

impl Ticker {
    /// Symbol must be uppercase alphanumeric, 1-5 chars (§3).
    pub fn is_valid_symbol(symbol: &str) -> bool {
        let len = symbol.len();
        (1..=5).contains(&len) && symbol.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    }
}
