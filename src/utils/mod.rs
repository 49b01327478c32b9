pub mod logging;
pub mod range;
pub mod time;

pub use logging::truncate_for_log;
pub use range::{card_ranges, merge_ranges, observation_ranges, TimeRange};
