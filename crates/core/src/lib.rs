pub mod config;
pub mod context;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use context::RunContext;
pub use errors::*;
pub use models::*;
pub use traits::*;
