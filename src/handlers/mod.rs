pub mod config;
pub mod models;
pub mod summaries;

pub use config::*;
pub use models::*;
pub use summaries::*;
