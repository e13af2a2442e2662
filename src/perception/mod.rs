pub mod pruner;
pub mod screenshot;
pub mod types;
