mod config;
pub mod vision;

pub use config::*;
pub use vision::*;
