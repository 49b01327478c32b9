pub mod card;
pub mod category;
pub mod frame;
pub mod observation;
pub mod usage;

pub use card::{ActivityCard, AppSites, Distraction, TimedCard};
pub use category::{default_categories, match_category, CategoryConfig};
pub use frame::{Frame, FrameDescription, VideoSegment};
pub use observation::{observation_bounds, Observation};
pub use usage::TokenUsage;
