use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::profile;

// Constants
pub const CONFIG_FILE_NAME: &str = ".ai-git-commit";
pub const ENV_PREFIX: &str = "AI_GIT_COMMIT_";
const DEFAULT_LOCALE: &str = "en";
const OPENAI_KEY_PREFIX: &str = "sk-";

/// Resolved configuration, keyed by the on-disk key name.
pub type ConfigMap = BTreeMap<String, String>;

/// The closed set of keys the store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKey {
  OpenaiKey,
  Locale
}

impl ConfigKey {
  pub const ALL: [ConfigKey; 2] = [ConfigKey::OpenaiKey, ConfigKey::Locale];

  pub fn as_str(&self) -> &'static str {
    match self {
      ConfigKey::OpenaiKey => "OPENAI_KEY",
      ConfigKey::Locale => "locale"
    }
  }

  /// Name of the environment variable supplying a default for this key.
  pub fn env_var(&self) -> String {
    format!("{ENV_PREFIX}{}", self.as_str().to_uppercase())
  }

  /// Runs the per-key validator and returns the value to store.
  pub fn parse_value(&self, value: &str) -> Result<String> {
    // The file holds one `key = value` per line
    if value.contains(['=', '\n', '\r']) {
      return Err(Error::validation(format!(
        "Invalid config property {self}: Must not contain \"=\" or line breaks"
      )));
    }

    match self {
      ConfigKey::OpenaiKey => openai_key(value),
      ConfigKey::Locale => locale(value)
    }
  }
}

impl FromStr for ConfigKey {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    ConfigKey::ALL
      .into_iter()
      .find(|key| key.as_str() == s)
      .ok_or_else(|| Error::validation(format!("Invalid config property: {s}")))
  }
}

impl fmt::Display for ConfigKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

pub fn openai_key(value: &str) -> Result<String> {
  if !value.starts_with(OPENAI_KEY_PREFIX) {
    return Err(Error::validation(format!(
      "Invalid config property {}: Must start with \"{OPENAI_KEY_PREFIX}\"",
      ConfigKey::OpenaiKey
    )));
  }
  Ok(value.to_string())
}

/// Accepts bare language codes (`en`, `pt-`) and rejects region suffixes such
/// as `en-US`.
pub fn locale(value: &str) -> Result<String> {
  let valid = !value.is_empty() && value.chars().all(|c| c.is_ascii_lowercase() || c == '-');
  if !valid {
    return Err(Error::validation(format!(
      "Invalid config property {}: Must be a valid locale (lowercase letters and dashes)",
      ConfigKey::Locale
    )));
  }
  Ok(value.to_string())
}

/// Splits a `KEY=VALUE` command-line argument and validates both halves.
pub fn parse_pair(arg: &str) -> Result<(ConfigKey, String)> {
  let (key, value) = arg
    .split_once('=')
    .ok_or_else(|| Error::validation(format!("Invalid key format '{arg}'. Example should be OPENAI_KEY=<your token>")))?;
  let key = ConfigKey::from_str(key.trim())?;
  let value = key.parse_value(value.trim())?;
  Ok((key, value))
}

/// Defaults taken from the process environment, captured once at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
  vars: BTreeMap<ConfigKey, String>
}

impl Environment {
  pub fn from_process() -> Self {
    Self::from_pairs(ConfigKey::ALL.into_iter().filter_map(|key| {
      std::env::var(key.env_var())
        .ok()
        .filter(|value| !value.is_empty())
        .map(|value| (key, value))
    }))
  }

  pub fn from_pairs(pairs: impl IntoIterator<Item = (ConfigKey, String)>) -> Self {
    Self { vars: pairs.into_iter().collect() }
  }

  pub fn get(&self, key: ConfigKey) -> Option<&str> {
    self.vars.get(&key).map(String::as_str)
  }
}

/// Flat `key = value` file in the user's home directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
  path: PathBuf,
  env:  Environment
}

impl ConfigStore {
  pub fn new(path: impl Into<PathBuf>, env: Environment) -> Self {
    Self { path: path.into(), env }
  }

  /// `~/.ai-git-commit` with defaults from the current process environment.
  pub fn open_default() -> Result<Self> {
    Ok(Self::new(default_path()?, Environment::from_process()))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Parses the file. A missing file is an empty configuration.
  pub fn read_all(&self) -> Result<ConfigMap> {
    profile!("Read config file");

    let contents = match fs::read_to_string(&self.path) {
      Ok(contents) => contents,
      Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ConfigMap::new()),
      Err(err) => return Err(err.into())
    };

    parse(&contents)
  }

  pub fn set(&self, key: &str, value: &str) -> Result<()> {
    self.set_many([(key, value)])
  }

  /// Validates every pair first and only then rewrites the file, so a single
  /// bad pair leaves the file untouched.
  pub fn set_many<'a>(&self, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<()> {
    let parsed = pairs
      .into_iter()
      .map(|(key, value)| {
        let key = ConfigKey::from_str(key)?;
        Ok((key, key.parse_value(value)?))
      })
      .collect::<Result<Vec<_>>>()?;

    let mut config = self.read_all()?;
    for (key, value) in parsed {
      log::debug!("Setting config property {key}");
      config.insert(key.to_string(), value);
    }

    self.write_all(&config)
  }

  /// File values merged with environment defaults and `overrides`, with
  /// built-in defaults for anything still missing. Requires the API key.
  pub fn get(&self, overrides: Option<&ConfigMap>) -> Result<ConfigMap> {
    let config = self.resolve(overrides)?;

    if !config.contains_key(ConfigKey::OpenaiKey.as_str()) {
      return Err(Error::MissingCredential);
    }

    Ok(config)
  }

  /// Resolved value of a single key. Does not require the API key.
  pub fn get_value(&self, key: ConfigKey) -> Result<Option<String>> {
    Ok(self.resolve(None)?.remove(key.as_str()))
  }

  fn resolve(&self, overrides: Option<&ConfigMap>) -> Result<ConfigMap> {
    let mut config: ConfigMap = ConfigKey::ALL
      .into_iter()
      .filter_map(|key| self.env.get(key).map(|value| (key.to_string(), value.to_string())))
      .collect();

    config.extend(self.read_all()?);

    if let Some(overrides) = overrides {
      config.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    config
      .entry(ConfigKey::Locale.to_string())
      .or_insert_with(|| DEFAULT_LOCALE.to_string());

    Ok(config)
  }

  fn write_all(&self, config: &ConfigMap) -> Result<()> {
    profile!("Write config file");

    let dir = match self.path.parent() {
      Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
      _ => PathBuf::from(".")
    };
    fs::create_dir_all(&dir)?;

    let mut file = NamedTempFile::new_in(&dir)?;
    file.write_all(serialize(config).as_bytes())?;
    file.persist(&self.path).map_err(|err| err.error)?;

    log::debug!("Wrote {} config entries to {}", config.len(), self.path.display());
    Ok(())
  }
}

pub fn default_path() -> Result<PathBuf> {
  let home = home::home_dir().ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Failed to determine home directory"))?;
  Ok(home.join(CONFIG_FILE_NAME))
}

fn parse(contents: &str) -> Result<ConfigMap> {
  let mut config = ConfigMap::new();

  for (index, line) in contents.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
      continue;
    }

    match line.split_once('=') {
      Some((key, value)) if !value.contains('=') => {
        config.insert(key.trim().to_string(), value.trim().to_string());
      }
      _ => return Err(Error::MalformedConfigLine { line: index + 1 })
    }
  }

  Ok(config)
}

fn serialize(config: &ConfigMap) -> String {
  config
    .iter()
    .map(|(key, value)| format!("{key} = {value}\n"))
    .collect()
}
