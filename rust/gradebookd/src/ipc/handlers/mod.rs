pub mod attendance;
pub mod calendar;
pub mod core;
pub mod learners;
pub mod remarks;
pub mod reports;
pub mod results;
pub mod summary;
