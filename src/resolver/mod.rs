//! Crawls the orchestration API for container instances and tasks.

pub mod instances;
pub mod tasks;

pub use instances::InstanceResolver;
pub use tasks::TaskResolver;
