pub mod chain;
pub mod decision;
pub mod policy;
pub mod signal;
pub mod subscription;
pub mod ticker;

pub use chain::{ChainSnapshot, Contract, Expiry, Right};
pub use decision::{Decision, DecisionKind};
pub use policy::{DtePairRule, QuietHours, UserPolicy, VolPoint};
pub use signal::Signal;
pub use subscription::Subscription;
pub use ticker::{Tier, Ticker};
