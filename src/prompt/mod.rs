pub mod activity;
pub mod duration;
pub mod validator;

pub use activity::*;
pub use duration::*;
pub use validator::*;
