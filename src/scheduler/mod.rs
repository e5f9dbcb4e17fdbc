pub mod scan;
pub mod tier;

pub use scan::{ScanScheduler, TierCadence};
