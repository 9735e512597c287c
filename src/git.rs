use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{Repository, RepositoryOpenFlags as Flags};

use crate::error::{Error, Result};
use crate::message::CommitMessage;
use crate::profile;

/// Name of the file git reads the message of an in-progress commit from.
pub const COMMIT_MSG_FILE: &str = "COMMIT_EDITMSG";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
  /// `None` when the process was killed by a signal
  pub code:   Option<i32>,
  pub stdout: String,
  pub stderr: String
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Runs `git` with the given arguments and captures its output.
#[cfg_attr(test, mockall::automock)]
pub trait GitRunner {
  fn run(&self, args: Vec<String>) -> Result<CommandOutput>;
}

/// Invokes the `git` executable found on `PATH`.
#[derive(Debug, Clone)]
pub struct SystemGit {
  workdir: PathBuf
}

impl SystemGit {
  pub fn new(workdir: impl Into<PathBuf>) -> Self {
    Self { workdir: workdir.into() }
  }
}

impl GitRunner for SystemGit {
  fn run(&self, args: Vec<String>) -> Result<CommandOutput> {
    log::debug!("Running git {}", args.join(" "));

    let output = Command::new("git")
      .args(&args)
      .current_dir(&self.workdir)
      .output()?;

    Ok(CommandOutput {
      code:   output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned()
    })
  }
}

/// Git operations scoped to one working directory.
#[derive(Debug)]
pub struct Git<R = SystemGit> {
  workdir: PathBuf,
  runner:  R
}

impl Git<SystemGit> {
  pub fn new(workdir: impl Into<PathBuf>) -> Self {
    let workdir = workdir.into();
    Self { runner: SystemGit::new(workdir.clone()), workdir }
  }
}

impl<R: GitRunner> Git<R> {
  pub fn with_runner(workdir: impl Into<PathBuf>, runner: R) -> Self {
    Self { workdir: workdir.into(), runner }
  }

  /// True if the working directory sits inside a non-bare git work tree.
  /// Any failure while probing counts as "no".
  pub fn is_repository(&self) -> bool {
    profile!("Probe repository");
    self.open().map(|repo| !repo.is_bare()).unwrap_or(false)
  }

  /// Unified diff of the staged changes.
  pub fn staged_diff(&self) -> Result<String> {
    profile!("Staged diff");
    self.git(&["diff", "--staged"])
  }

  /// Short status of staged changes to tracked files.
  pub fn staged_status(&self) -> Result<String> {
    profile!("Staged status");
    self.git(&["status", "--short", "--untracked-files=no"])
  }

  /// Path of the pending-commit-message file inside the git directory.
  pub fn commit_msg_path(&self) -> Result<PathBuf> {
    let repo = self.open().map_err(|_| Error::NotARepository)?;
    Ok(repo.path().join(COMMIT_MSG_FILE))
  }

  /// Writes `message` to the pending-commit-message file and commits from it.
  ///
  /// The file stays in place when `git commit` fails.
  pub fn commit(&self, message: &CommitMessage) -> Result<String> {
    profile!("Commit");

    let path = self.commit_msg_path()?;
    log::debug!("Writing commit message to {}", path.display());
    fs::write(&path, message.render())?;

    let path = path.to_string_lossy().into_owned();
    self.git(&["commit", "-F", path.as_str()])
  }

  fn open(&self) -> std::result::Result<Repository, git2::Error> {
    Repository::open_ext(&self.workdir, Flags::empty(), Vec::<&Path>::new())
  }

  fn git(&self, args: &[&str]) -> Result<String> {
    let output = self
      .runner
      .run(args.iter().map(|arg| arg.to_string()).collect())?;

    if !output.success() {
      let command = format!("git {}", args.join(" "));
      log::debug!("{command} failed with {:?}", output.code);
      return Err(Error::ExternalCommand {
        command,
        code: output.code.unwrap_or(-1),
        stderr: output.stderr
      });
    }

    Ok(output.stdout)
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  fn ok(stdout: &str) -> CommandOutput {
    CommandOutput { code: Some(0), stdout: stdout.to_string(), stderr: String::new() }
  }

  fn failed(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput { code: Some(code), stdout: String::new(), stderr: stderr.to_string() }
  }

  #[test]
  fn test_staged_diff_returns_stdout_unchanged() {
    let expected = "file1.rs\nfile2.rs\n";
    let mut runner = MockGitRunner::new();
    runner
      .expect_run()
      .withf(|args| args == &["diff", "--staged"])
      .times(1)
      .returning(move |_| Ok(ok(expected)));

    let git = Git::with_runner(".", runner);
    assert_eq!(git.staged_diff().unwrap(), expected);
  }

  #[test]
  fn test_staged_diff_failure_carries_exit_code() {
    let mut runner = MockGitRunner::new();
    runner
      .expect_run()
      .times(1)
      .returning(|_| Ok(failed(1, "error: failed to execute git diff command")));

    let git = Git::with_runner(".", runner);
    match git.staged_diff() {
      Err(Error::ExternalCommand { command, code, stderr }) => {
        assert_eq!(command, "git diff --staged");
        assert_eq!(code, 1);
        assert_eq!(stderr, "error: failed to execute git diff command");
      }
      other => panic!("Expected external command error, got {other:?}")
    }
  }

  #[test]
  fn test_staged_status() {
    let mut runner = MockGitRunner::new();
    runner
      .expect_run()
      .withf(|args| args == &["status", "--short", "--untracked-files=no"])
      .returning(|_| Ok(ok("M  src/lib.rs\n")));

    let git = Git::with_runner(".", runner);
    assert_eq!(git.staged_status().unwrap(), "M  src/lib.rs\n");
  }

  #[test]
  fn test_staged_status_killed_by_signal() {
    let mut runner = MockGitRunner::new();
    runner
      .expect_run()
      .returning(|_| Ok(CommandOutput { code: None, ..Default::default() }));

    let git = Git::with_runner(".", runner);
    assert!(matches!(git.staged_status(), Err(Error::ExternalCommand { code: -1, .. })));
  }

  #[test]
  fn test_is_repository() {
    let dir = TempDir::new().unwrap();
    let git = Git::with_runner(dir.path(), MockGitRunner::new());
    assert!(!git.is_repository());

    Repository::init(dir.path()).unwrap();
    assert!(git.is_repository());

    let nested = dir.path().join("nested");
    fs::create_dir(&nested).unwrap();
    assert!(Git::with_runner(&nested, MockGitRunner::new()).is_repository());
  }

  #[test]
  fn test_is_repository_rejects_bare() {
    let dir = TempDir::new().unwrap();
    Repository::init_bare(dir.path()).unwrap();
    assert!(!Git::with_runner(dir.path(), MockGitRunner::new()).is_repository());
  }

  #[test]
  fn test_commit_writes_message_file() {
    let dir = TempDir::new().unwrap();
    Repository::init(dir.path()).unwrap();
    let msg_path = dir.path().join(".git").join(COMMIT_MSG_FILE);

    let mut runner = MockGitRunner::new();
    runner
      .expect_run()
      .withf(|args| args.len() == 3 && args[0] == "commit" && args[1] == "-F" && args[2].ends_with(COMMIT_MSG_FILE))
      .times(1)
      .returning(|_| Ok(ok("[main (root-commit) abc1234] Subject\n")));

    let git = Git::with_runner(dir.path(), runner);
    let message = CommitMessage::new("Subject", vec!["first".into()]);

    assert_eq!(git.commit(&message).unwrap(), "[main (root-commit) abc1234] Subject\n");
    assert_eq!(fs::read_to_string(msg_path).unwrap(), "Subject\n\n- first\n");
  }

  #[test]
  fn test_failed_commit_leaves_message_file() {
    let dir = TempDir::new().unwrap();
    Repository::init(dir.path()).unwrap();

    let mut runner = MockGitRunner::new();
    runner
      .expect_run()
      .returning(|_| Ok(failed(1, "nothing to commit")));

    let git = Git::with_runner(dir.path(), runner);
    let message = CommitMessage::new("Subject", vec![]);

    assert!(matches!(git.commit(&message), Err(Error::ExternalCommand { code: 1, .. })));
    assert_eq!(fs::read_to_string(git.commit_msg_path().unwrap()).unwrap(), "Subject\n\n");
  }

  #[test]
  fn test_commit_outside_repository() {
    let dir = TempDir::new().unwrap();
    let git = Git::with_runner(dir.path(), MockGitRunner::new());
    assert!(matches!(git.commit(&CommitMessage::new("x", vec![])), Err(Error::NotARepository)));
  }
}
