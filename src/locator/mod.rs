pub mod analytics;
pub mod hybrid;
pub mod strategy;
