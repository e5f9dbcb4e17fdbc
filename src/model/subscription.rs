use uuid::Uuid;

/// (user, ticker) edge. Unique per (user, ticker).
#[derive(Clone, Debug)]
pub struct Subscription {
    pub user_id: Uuid,
    pub ticker: String,
    pub active: bool,
    pub added_at: u64,
}
