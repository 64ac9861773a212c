mod health;
mod image;
mod types;
mod user;

pub use health::*;
pub use image::*;
pub use types::*;
pub use user::*;
