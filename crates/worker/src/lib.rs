pub mod ssh;


pub use ssh::{ProcessOutput, SshSession, SshSessionFactory};
