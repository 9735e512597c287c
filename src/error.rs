//! Error kinds shared by every part of the tool.
//!
//! The library returns [`Result`] everywhere; the binary maps each variant to
//! a process exit code through [`Error::exit_code`].

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
  /// Bad config key or value, empty diff, malformed CLI argument
  #[error("{0}")]
  Validation(String),

  #[error("Invalid config file: line {line} must contain exactly one '='")]
  MalformedConfigLine { line: usize },

  #[error("Please set your OpenAI API key via `ai-git-commit config set OPENAI_KEY=<your token>`")]
  MissingCredential,

  #[error("The current directory must be a git repository")]
  NotARepository,

  #[error("`{command}` exited with code {code}: {stderr}")]
  ExternalCommand { command: String, code: i32, stderr: String },

  #[error("OpenAI request failed ({code}): {message}")]
  ExternalService { code: String, message: String },

  #[error("Prompt failed: {0}")]
  Prompt(#[from] dialoguer::Error),

  #[error("Template error: {0}")]
  Template(#[from] mustache::Error),

  #[error(transparent)]
  Io(#[from] std::io::Error)
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self {
    Error::Validation(msg.into())
  }

  /// Exit code the CLI terminates with when this error reaches `main`.
  pub fn exit_code(&self) -> i32 {
    match self {
      Error::Validation(_) | Error::MalformedConfigLine { .. } | Error::MissingCredential => 2,
      Error::ExternalCommand { code, .. } if *code > 0 => *code,
      _ => 1
    }
  }

  /// True if the failure must not be retried (bad or missing credentials).
  pub fn is_auth_error(&self) -> bool {
    match self {
      Error::MissingCredential => true,
      Error::ExternalService { code, message } => is_auth_failure(code, message),
      _ => false
    }
  }
}

/// Checks whether a provider error code/message pair describes an
/// authentication failure.
///
/// Matches OpenAI-specific API key errors and generic auth failures that
/// mention OpenAI. HTTP-level 401/403 responses count as well.
///
/// ```
/// use aigc::error::is_auth_failure;
///
/// assert!(is_auth_failure("invalid_api_key", "Incorrect API key provided"));
/// assert!(!is_auth_failure("rate_limit_exceeded", "Slow down"));
/// ```
pub fn is_auth_failure(code: &str, message: &str) -> bool {
  let code = code.to_lowercase();
  let msg = message.to_lowercase();

  code == "invalid_api_key" ||
  code == "401" ||
  code == "403" ||
  msg.contains("invalid_api_key") ||
  msg.contains("incorrect api key") ||

  // Generic auth failures, scoped to avoid false positives
  (msg.contains("authentication") && msg.contains("openai")) ||
  (msg.contains("unauthorized") && msg.contains("openai"))
}
