#[macro_export]
macro_rules! profile {
  ($name:expr) => {
    let _profile = $crate::Profile::new($name);
  };
}

pub mod cli;
pub mod commit_type;
pub mod completion;
pub mod composer;
pub mod config;
pub mod error;
pub mod git;
pub mod message;
pub mod profiling;
pub mod retry;

// Re-exports
pub use error::{Error, Result};
pub use message::CommitMessage;
pub use profiling::Profile;
