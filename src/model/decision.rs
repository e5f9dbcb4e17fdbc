use uuid::Uuid;

/// Closed set; other values are rejected at the store boundary (§4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionKind {
    Placed,
    Ignored,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Placed => "placed",
            DecisionKind::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "placed" => Some(DecisionKind::Placed),
            "ignored" => Some(DecisionKind::Ignored),
            _ => None,
        }
    }
}

/// At most one active decision per (signal, user); re-recording overwrites
/// (§3).
#[derive(Clone, Debug)]
pub struct Decision {
    pub signal_id: Uuid,
    pub user_id: Uuid,
    pub kind: DecisionKind,
    pub ts: u64,
    pub entry_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub pnl: Option<f64>,
    pub notes: Option<String>,
}
