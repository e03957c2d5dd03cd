pub mod cohort;
pub mod file;
pub mod group;
pub mod query;
pub mod result;
pub mod rule;

pub use cohort::Cohort;
pub use file::File;
pub use group::Group;
pub use query::{AvailabilityQuery, DistributionQuery, DistributionQueryType};
pub use result::RquestResult;
pub use rule::Rule;
