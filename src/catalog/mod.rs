pub mod cache;
pub mod label;
pub mod provider;

pub use cache::*;
pub use label::*;
pub use provider::*;
