pub mod readiness_probe;
pub mod remote_session;
pub mod result_processor;

pub use readiness_probe::*;
pub use remote_session::*;
pub use result_processor::*;
