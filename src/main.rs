use std::process::ExitCode;

use aigc::cli::{self, Cli};
use aigc::config::ConfigStore;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dotenv::dotenv;
use log::LevelFilter;

fn init_logging(debug: bool) {
  let mut builder = env_logger::Builder::from_default_env();
  builder.format_target(false);
  if debug {
    builder.filter_level(LevelFilter::Debug);
  }
  builder.init();
}

// Leave the terminal usable when Ctrl-C interrupts a prompt
fn restore_cursor_on_interrupt() -> Result<()> {
  ctrlc::set_handler(|| {
    let _ = console::Term::stderr().show_cursor();
    std::process::exit(130);
  })
  .context("Failed to install Ctrl-C handler")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  dotenv().ok();

  let args = Cli::parse();
  init_logging(args.debug);
  restore_cursor_on_interrupt()?;

  let workdir = std::env::current_dir().context("Failed to get current directory")?;
  let store = ConfigStore::open_default()?;
  log::debug!("Using config file {}", store.path().display());

  match cli::run(args, &store, workdir).await {
    Ok(()) => Ok(ExitCode::SUCCESS),
    Err(err) => {
      eprintln!("{} {}", "ERROR:".bold().bright_red(), err);
      let code = u8::try_from(err.exit_code()).unwrap_or(1);
      Ok(ExitCode::from(code))
    }
  }
}
