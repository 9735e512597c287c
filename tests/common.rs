#![allow(dead_code)]

use std::path::Path;
use std::process::Command;

pub use aigc::composer::testing::ScriptedPrompter;
use anyhow::{bail, Context, Result};
use tempfile::TempDir;

pub struct TestRepo {
  dir: TempDir
}

impl Default for TestRepo {
  fn default() -> Self {
    let repo = TestRepo { dir: TempDir::new().expect("Could not create temp dir") };

    repo.git(&["init"]).expect("Could not init repository");
    repo.git(&["config", "user.name", "Your Name"]).unwrap();
    repo.git(&["config", "user.email", "email@example.com"]).unwrap();
    repo.git(&["config", "commit.gpgsign", "false"]).unwrap();

    repo
  }
}

impl TestRepo {
  pub fn path(&self) -> &Path {
    self.dir.path()
  }

  pub fn create_file(&self, name: &str, content: &str) {
    std::fs::write(self.path().join(name), content).expect("Could not write file");
  }

  pub fn stage_file(&self, name: &str) -> Result<String> {
    self.git(&["add", name])
  }

  pub fn last_commit_message(&self) -> Result<String> {
    self.git(&["log", "-1", "--format=%B"])
  }

  pub fn read_git_file(&self, name: &str) -> String {
    std::fs::read_to_string(self.path().join(".git").join(name)).expect("Could not read file")
  }

  pub fn git(&self, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
      .args(args)
      .current_dir(self.path())
      .output()
      .context("Could not run git command")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      bail!("Git command failed: {}", stderr);
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
  }
}
