pub mod hierarchy;
pub mod membership;
pub mod metrics;
