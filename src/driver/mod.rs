pub mod mock;
pub mod traits;
pub mod types;
pub mod webdriver;
