mod hash;
pub mod validation;

pub use hash::*;
