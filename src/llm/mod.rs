pub mod provider;
pub mod providers;
pub mod registry;
pub mod sse_parser;
pub mod types;
pub mod vision;
