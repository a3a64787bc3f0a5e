pub mod config;
pub mod task;
pub mod user;

pub use config::*;
pub use task::*;
pub use user::*;
