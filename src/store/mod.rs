pub mod active_set;
pub mod orders;
pub mod units;
