use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};

use crate::completion::{CompletionBackend, CompletionClient, DraftOptions, DEFAULT_MODEL, DEFAULT_TOKEN_BUDGET};
use crate::composer::{self, Prompter, TermPrompter};
use crate::config::{self, ConfigKey, ConfigMap, ConfigStore};
use crate::error::{Error, Result};
use crate::git::{Git, GitRunner};
use crate::message::CommitMessage;

const EMOJI: Emoji<'_, '_> = Emoji("✨", ":-)");

#[derive(Parser, Debug)]
#[clap(name = "ai-git-commit", author, version, about = "Write a commit message by hand or let OpenAI draft it from the staged diff")]
pub struct Cli {
  #[clap(long, global = true, overrides_with = "no_debug", help = "Enables debug logging")]
  pub debug: bool,

  #[clap(long = "no-debug", global = true, overrides_with = "debug", help = "Disables debug logging")]
  pub no_debug: bool,

  #[clap(long, help = "Draft the message with OpenAI instead of typing it")]
  pub ai: bool,

  #[clap(long, default_value = DEFAULT_MODEL, help = "Model used with --ai")]
  pub model: String,

  #[clap(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=5), help = "Number of drafts to choose from")]
  pub count: u8,

  #[clap(long, default_value_t = DEFAULT_TOKEN_BUDGET, help = "Maximum tokens in the drafted response")]
  pub max_tokens: u32,

  #[clap(long = "openai-key", value_parser = parse_openai_key, help = "API key for this run only")]
  pub openai_key: Option<String>,

  #[clap(long, value_parser = parse_locale, help = "Language of the drafted message for this run only")]
  pub locale: Option<String>,

  #[clap(subcommand)]
  pub command: Option<Command>
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Configure local variables
  #[clap(subcommand)]
  Config(ConfigCommand)
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
  /// Set one or more KEY=VALUE pairs
  Set {
    #[clap(required = true, value_parser = parse_pair, value_name = "KEY=VALUE")]
    pairs: Vec<(ConfigKey, String)>
  },

  /// Print the resolved value of KEY
  Get {
    #[clap(value_parser = parse_key)]
    key: ConfigKey
  }
}

fn parse_pair(arg: &str) -> std::result::Result<(ConfigKey, String), String> {
  config::parse_pair(arg).map_err(|err| err.to_string())
}

fn parse_key(arg: &str) -> std::result::Result<ConfigKey, String> {
  arg
    .parse::<ConfigKey>()
    .map_err(|err| format!("{err}. Example should be OPENAI_KEY"))
}

fn parse_openai_key(arg: &str) -> std::result::Result<String, String> {
  config::openai_key(arg).map_err(|err| err.to_string())
}

fn parse_locale(arg: &str) -> std::result::Result<String, String> {
  config::locale(arg).map_err(|err| err.to_string())
}

impl Cli {
  /// Values given on the command line that take precedence over the file.
  pub fn overrides(&self) -> ConfigMap {
    [(ConfigKey::OpenaiKey, &self.openai_key), (ConfigKey::Locale, &self.locale)]
      .into_iter()
      .filter_map(|(key, value)| value.as_ref().map(|value| (key.to_string(), value.clone())))
      .collect()
  }

  pub fn draft_options(&self) -> DraftOptions {
    DraftOptions {
      count: self.count,
      token_budget: self.max_tokens,
      ..Default::default()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// `git commit` output
  Committed(String),
  Aborted
}

/// Dispatches a parsed command line.
pub async fn run(cli: Cli, store: &ConfigStore, workdir: PathBuf) -> Result<()> {
  match &cli.command {
    Some(Command::Config(ConfigCommand::Set { pairs })) => {
      store.set_many(pairs.iter().map(|(key, value)| (key.as_str(), value.as_str())))?;
      for (key, _) in pairs {
        println!("{EMOJI} Configuration option {} updated!", key.to_string().italic());
      }
      Ok(())
    }
    Some(Command::Config(ConfigCommand::Get { key })) => {
      println!("{}", store.get_value(*key)?.unwrap_or_default());
      Ok(())
    }
    None => {
      let git = Git::new(workdir);
      let mut prompter = TermPrompter;

      let outcome = if cli.ai {
        let config = store.get(Some(&cli.overrides()))?;
        let client = CompletionClient::from_config(&config, cli.model.as_str())?;
        commit_flow(&git, &mut prompter, Some((&client, cli.draft_options()))).await?
      } else {
        commit_flow::<_, _, crate::completion::OpenAiBackend>(&git, &mut prompter, None).await?
      };

      match outcome {
        Outcome::Committed(summary) => println!("{}", summary.trim_end()),
        Outcome::Aborted => println!("{}", "Commit aborted".yellow())
      }
      Ok(())
    }
  }
}

/// Verify repository, show status, collect a message, confirm, commit.
///
/// With `drafter` the message comes from the completion client, otherwise
/// from the interactive composer.
pub async fn commit_flow<R, P, B>(
  git: &Git<R>, prompter: &mut P, drafter: Option<(&CompletionClient<B>, DraftOptions)>
) -> Result<Outcome>
where
  R: GitRunner,
  P: Prompter + ?Sized,
  B: CompletionBackend
{
  if !git.is_repository() {
    return Err(Error::NotARepository);
  }

  let status = git.staged_status()?;
  if status.trim().is_empty() {
    println!("{}", "No staged changes".dimmed());
  } else {
    println!("{}\n{}", "Staged changes:".bold(), status.trim_end());
  }

  let message = match drafter {
    Some((client, options)) => draft(git, prompter, client, &options).await?,
    None => composer::compose(prompter)?
  };

  println!("\n{}\n", message.to_string().green());

  if !prompter.confirm("Commit with this message?")? {
    return Ok(Outcome::Aborted);
  }

  git.commit(&message).map(Outcome::Committed)
}

async fn draft<R, P, B>(
  git: &Git<R>, prompter: &mut P, client: &CompletionClient<B>, options: &DraftOptions
) -> Result<CommitMessage>
where
  R: GitRunner,
  P: Prompter + ?Sized,
  B: CompletionBackend
{
  let diff = git.staged_diff()?;

  let pb = spinner("Generating commit message...");
  let candidates = client.draft(&diff, options).await;
  pb.finish_and_clear();
  let mut candidates = candidates?;

  let index = if candidates.len() > 1 {
    let subjects: Vec<String> = candidates
      .iter()
      .map(|candidate| CommitMessage::from_candidate(candidate).subject)
      .collect();
    prompter.select("Pick a commit message", &subjects)?
  } else {
    0
  };

  if index >= candidates.len() {
    return Err(Error::validation("No commit message was generated"));
  }

  Ok(CommitMessage::from_candidate(&candidates.swap_remove(index)))
}

fn spinner(msg: &'static str) -> ProgressBar {
  let pb = ProgressBar::new_spinner();
  if let Ok(style) = ProgressStyle::default_spinner()
    .tick_strings(&["-", "\\", "|", "/", ""])
    .template("{spinner:.blue} {msg}")
  {
    pb.set_style(style);
  }
  pb.set_message(msg);
  pb.enable_steady_tick(Duration::from_millis(150));
  pb
}
