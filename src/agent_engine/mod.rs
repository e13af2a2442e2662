pub mod engine;
pub mod loop_control;
pub mod parser;
pub mod state;
