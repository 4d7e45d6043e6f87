pub mod config;
pub mod filters;
pub mod generator;
pub mod metadata;
pub mod publish;
pub mod resolver;
pub mod selector;
pub mod shuffle;

pub use config::*;
pub use generator::*;
pub use metadata::*;
pub use publish::*;
pub use resolver::*;
pub use selector::*;
