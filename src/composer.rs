//! Line-oriented collection of a commit message from the user.

use colored::Colorize;
use dialoguer::{Completion, Confirm, Input, Select};

use crate::commit_type::{self, CommitTypeOption, COMMIT_TYPES};
use crate::error::Result;
use crate::message::CommitMessage;

/// Source of answers for the interactive steps.
pub trait Prompter {
  /// Asks for a commit type tag, offering `options` for completion. Returns
  /// whatever was typed.
  fn commit_type(&mut self, options: &[CommitTypeOption]) -> Result<String>;

  /// One line of free text. An empty answer is allowed.
  fn line(&mut self, prompt: &str) -> Result<String>;

  /// Yes/no question where an empty answer means yes.
  fn confirm(&mut self, prompt: &str) -> Result<bool>;

  /// Picks one of `items`, returning its index.
  fn select(&mut self, prompt: &str, items: &[String]) -> Result<usize>;
}

/// Reads `y`, `yes`, `n`, `no` in any case. Empty input means yes.
pub fn parse_confirmation(answer: &str) -> Option<bool> {
  match answer.trim().to_lowercase().as_str() {
    "" | "y" | "yes" => Some(true),
    "n" | "no" => Some(false),
    _ => None
  }
}

/// Completes a partially typed tag to the first catalog entry it prefixes.
struct CatalogCompletion;

impl Completion for CatalogCompletion {
  fn get(&self, input: &str) -> Option<String> {
    if input.trim().is_empty() {
      return None;
    }
    commit_type::matching(input).next().map(|option| option.value.to_string())
  }
}

/// Prompts on the terminal.
#[derive(Debug, Default)]
pub struct TermPrompter;

impl Prompter for TermPrompter {
  fn commit_type(&mut self, options: &[CommitTypeOption]) -> Result<String> {
    for option in options {
      println!("  {:<12} {}", option.label, option.hint.dimmed());
    }

    let completion = CatalogCompletion;
    let tag = Input::<String>::new()
      .with_prompt("Select the type of change (Tab completes)")
      .completion_with(&completion)
      .allow_empty(true)
      .interact_text()?;

    Ok(tag)
  }

  fn line(&mut self, prompt: &str) -> Result<String> {
    Ok(
      Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?
    )
  }

  fn confirm(&mut self, prompt: &str) -> Result<bool> {
    Ok(
      Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()?
    )
  }

  fn select(&mut self, prompt: &str, items: &[String]) -> Result<usize> {
    Ok(
      Select::new()
        .with_prompt(prompt)
        .items(items)
        .default(0)
        .interact()?
    )
  }
}

/// Asks for a commit type, a subject and body lines until an empty line.
///
/// A known type turns the subject into `"<label>: <subject>"`; anything else
/// leaves the subject as typed.
pub fn compose<P: Prompter + ?Sized>(prompter: &mut P) -> Result<CommitMessage> {
  let tag = prompter.commit_type(COMMIT_TYPES)?;
  let option = commit_type::lookup(&tag);
  if option.is_none() && !tag.trim().is_empty() {
    log::debug!("Unknown commit type {tag:?}, leaving the subject unprefixed");
  }

  let subject = prompter.line("Subject")?;
  let subject = match option {
    Some(option) => format!("{}: {}", option.label, subject),
    None => subject
  };

  let mut body = Vec::new();
  loop {
    let line = prompter.line("Body (empty line to finish)")?;
    if line.is_empty() {
      break;
    }
    body.push(line);
  }

  Ok(CommitMessage::new(subject, body))
}

/// Non-interactive prompters for driving the commit flow from tests.
#[doc(hidden)]
pub mod testing {
  use std::collections::VecDeque;

  use super::*;
  use crate::error::Error;

  /// Answers every prompt from a fixed script, in order.
  #[derive(Debug, Default)]
  pub struct ScriptedPrompter {
    answers:   VecDeque<String>,
    pub asked: Vec<String>
  }

  impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
      Self { answers: answers.iter().map(|a| a.to_string()).collect(), asked: Vec::new() }
    }

    fn next(&mut self, prompt: &str) -> Result<String> {
      self.asked.push(prompt.to_string());
      self
        .answers
        .pop_front()
        .ok_or_else(|| Error::validation(format!("No scripted answer for {prompt:?}")))
    }
  }

  impl Prompter for ScriptedPrompter {
    fn commit_type(&mut self, _options: &[CommitTypeOption]) -> Result<String> {
      self.next("type")
    }

    fn line(&mut self, prompt: &str) -> Result<String> {
      self.next(prompt)
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
      let answer = self.next(prompt)?;
      Ok(parse_confirmation(&answer).unwrap_or(false))
    }

    fn select(&mut self, prompt: &str, _items: &[String]) -> Result<usize> {
      let answer = self.next(prompt)?;
      Ok(answer.parse().unwrap_or(0))
    }
  }
}
