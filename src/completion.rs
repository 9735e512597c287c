use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs};
use async_openai::Client;
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;

use crate::config::{ConfigKey, ConfigMap};
use crate::error::{Error, Result};
use crate::profile;
use crate::retry::{retry_with_backoff, RetryPolicy, DEFAULT_MAX_ATTEMPTS};

// Constants
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TOKEN_BUDGET: u32 = 1024;
const DEFAULT_LOCALE: &str = "en";
const TEMPERATURE: f32 = 0.35;
const MAX_DIFF_CHARS: usize = 60_000;
const CANDIDATE_SEPARATOR: &str = "---";

const SYSTEM_PROMPT: &str = "You are an AI assistant that writes concise and meaningful git commit messages from diffs. \
                             Reply with commit messages only, no explanations and no code fences.";

const PROMPT_TEMPLATE: &str = "Write {{count}} git commit message{{#plural}}s{{/plural}} in the language with code \"{{locale}}\" for the diff below.

Guidelines:
- Start with a short summary line in the present tense and imperative mood (e.g. 'Add x to y').
- Keep the summary under 72 characters.
- If the change needs more explanation, add a blank line followed by one bullet point per detail.
{{#plural}}- Separate the commit messages with a line containing only {{separator}}.
{{/plural}}
Diff:
{{{diff}}}
";

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
  pub model:       String,
  pub system:      String,
  pub prompt:      String,
  pub max_tokens:  u32,
  pub temperature: f32
}

/// Remote endpoint turning a prompt into completion texts, one per choice.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
  async fn complete(&self, request: &CompletionRequest) -> Result<Vec<String>>;
}

/// Chat completions through the OpenAI API.
pub struct OpenAiBackend {
  client: Client<OpenAIConfig>
}

impl OpenAiBackend {
  pub fn new(api_key: &str) -> Self {
    let config = OpenAIConfig::new().with_api_key(api_key);
    // Retries are handled by `retry_with_backoff`
    let no_retry = ExponentialBackoffBuilder::new()
      .with_max_elapsed_time(Some(Duration::ZERO))
      .build();

    Self { client: Client::with_config(config).with_backoff(no_retry) }
  }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
  async fn complete(&self, request: &CompletionRequest) -> Result<Vec<String>> {
    profile!("OpenAI API call");

    let body = CreateChatCompletionRequestArgs::default()
      .model(request.model.as_str())
      .max_tokens(request.max_tokens)
      .temperature(request.temperature)
      .messages([
        ChatCompletionRequestSystemMessageArgs::default()
          .content(request.system.as_str())
          .build()
          .map_err(service_error)?
          .into(),
        ChatCompletionRequestUserMessageArgs::default()
          .content(request.prompt.as_str())
          .build()
          .map_err(service_error)?
          .into()
      ])
      .build()
      .map_err(service_error)?;

    let response = self.client.chat().create(body).await.map_err(service_error)?;

    let choices: Vec<String> = response
      .choices
      .into_iter()
      .filter_map(|choice| choice.message.content)
      .filter(|content| !content.trim().is_empty())
      .collect();

    if choices.is_empty() {
      return Err(Error::ExternalService {
        code:    "empty_response".to_string(),
        message: "No choices returned".to_string()
      });
    }

    Ok(choices)
  }
}

fn service_error(err: OpenAIError) -> Error {
  match err {
    OpenAIError::ApiError(e) =>
      Error::ExternalService {
        code:    e.code.or(e.r#type).unwrap_or_else(|| "api_error".to_string()),
        message: e.message
      },
    OpenAIError::Reqwest(e) =>
      Error::ExternalService {
        code:    e
          .status()
          .map(|status| status.as_u16().to_string())
          .unwrap_or_else(|| "network_error".to_string()),
        message: e.to_string()
      },
    other =>
      Error::ExternalService {
        code:    "unexpected".to_string(),
        message: other.to_string()
      },
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftOptions {
  /// Number of candidate messages to ask for
  pub count:        u8,
  /// Upper bound on tokens in the response
  pub token_budget: u32,
  /// Total attempts against the endpoint
  pub max_retries:  u32
}

impl Default for DraftOptions {
  fn default() -> Self {
    Self { count: 1, token_budget: DEFAULT_TOKEN_BUDGET, max_retries: DEFAULT_MAX_ATTEMPTS }
  }
}

/// Drafts commit messages for a staged diff.
pub struct CompletionClient<B = OpenAiBackend> {
  backend: B,
  model:   String,
  locale:  String,
  policy:  RetryPolicy
}

impl CompletionClient<OpenAiBackend> {
  /// Builds an OpenAI-backed client from a resolved configuration.
  pub fn from_config(config: &ConfigMap, model: impl Into<String>) -> Result<Self> {
    let api_key = config
      .get(ConfigKey::OpenaiKey.as_str())
      .ok_or(Error::MissingCredential)?;
    let locale = config
      .get(ConfigKey::Locale.as_str())
      .map(String::as_str)
      .unwrap_or(DEFAULT_LOCALE);

    Ok(Self::new(OpenAiBackend::new(api_key), model, locale))
  }
}

impl<B: CompletionBackend> CompletionClient<B> {
  pub fn new(backend: B, model: impl Into<String>, locale: impl Into<String>) -> Self {
    Self {
      backend,
      model: model.into(),
      locale: locale.into(),
      policy: RetryPolicy::default()
    }
  }

  pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Renders the user prompt for `diff`.
  pub fn prompt(&self, diff: &str, count: u8) -> Result<String> {
    let count = count.max(1);
    let template = mustache::compile_str(PROMPT_TEMPLATE)?;
    let data = mustache::MapBuilder::new()
      .insert_str("count", count.to_string())
      .insert_bool("plural", count > 1)
      .insert_str("locale", &self.locale)
      .insert_str("separator", CANDIDATE_SEPARATOR)
      .insert_str("diff", truncate(diff, MAX_DIFF_CHARS))
      .build();

    let mut out = Vec::new();
    template.render_data(&mut out, &data)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
  }

  /// Asks the endpoint for commit messages describing `diff` and returns the
  /// raw candidate texts.
  pub async fn draft(&self, diff: &str, options: &DraftOptions) -> Result<Vec<String>> {
    profile!("Draft commit message");

    if diff.trim().is_empty() {
      return Err(Error::validation("No diff provided"));
    }

    let request = CompletionRequest {
      model:       self.model.clone(),
      system:      SYSTEM_PROMPT.to_string(),
      prompt:      self.prompt(diff, options.count)?,
      max_tokens:  options.token_budget,
      temperature: TEMPERATURE
    };

    let policy = self.policy.clone().with_max_attempts(options.max_retries);
    let request = &request;
    let backend = &self.backend;
    let choices = retry_with_backoff(&policy, |attempt| {
      log::debug!("Requesting completion from {} (attempt {attempt})", request.model);
      backend.complete(request)
    })
    .await?;

    Ok(choices.iter().flat_map(|choice| split_candidates(choice)).collect())
  }
}

/// Splits one completion text into the commit messages it contains.
pub fn split_candidates(text: &str) -> Vec<String> {
  let mut candidates = Vec::new();
  let mut current = Vec::new();

  for line in text.lines() {
    if line.trim() == CANDIDATE_SEPARATOR {
      candidates.push(current.join("\n"));
      current.clear();
    } else {
      current.push(line);
    }
  }
  candidates.push(current.join("\n"));

  candidates
    .into_iter()
    .map(|candidate| candidate.trim().to_string())
    .filter(|candidate| !candidate.is_empty())
    .collect()
}

fn truncate(text: &str, max_chars: usize) -> &str {
  match text.char_indices().nth(max_chars) {
    Some((end, _)) => {
      log::warn!("Diff is longer than {max_chars} characters, truncating");
      &text[..end]
    }
    None => text
  }
}

#[cfg(test)]
mod tests {
  use maplit::btreemap;

  use super::*;

  const DIFF: &str = "diff --git a/test.txt b/test.txt
new file mode 100644
--- /dev/null
+++ b/test.txt
@@ -0,0 +1 @@
+Vec<u8> & friends
";

  fn fast() -> RetryPolicy {
    RetryPolicy {
      max_attempts:     3,
      initial_interval: Duration::from_millis(1),
      max_interval:     Duration::from_millis(2),
      deadline:         Duration::from_secs(5)
    }
  }

  fn client(backend: MockCompletionBackend) -> CompletionClient<MockCompletionBackend> {
    CompletionClient::new(backend, DEFAULT_MODEL, "en").with_policy(fast())
  }

  #[tokio::test]
  async fn test_empty_diff_is_rejected() {
    let mut backend = MockCompletionBackend::new();
    backend.expect_complete().times(0);

    let result = client(backend).draft("  \n", &DraftOptions::default()).await;
    match result {
      Err(Error::Validation(msg)) => assert_eq!(msg, "No diff provided"),
      other => panic!("Expected validation error, got {other:?}")
    }
  }

  #[test]
  fn test_prompt_renders_diff_verbatim() {
    let client = CompletionClient::new(MockCompletionBackend::new(), DEFAULT_MODEL, "fr");

    let single = client.prompt(DIFF, 1).unwrap();
    assert!(single.starts_with("Write 1 git commit message in the language with code \"fr\""));
    assert!(single.contains("+Vec<u8> & friends"));
    assert!(!single.contains("a line containing only"));

    let several = client.prompt(DIFF, 3).unwrap();
    assert!(several.starts_with("Write 3 git commit messages"));
    assert!(several.contains("a line containing only ---"));
  }

  #[tokio::test]
  async fn test_draft_returns_candidates() {
    let mut backend = MockCompletionBackend::new();
    backend
      .expect_complete()
      .withf(|request| {
        request.model == DEFAULT_MODEL &&
          request.max_tokens == 256 &&
          request.temperature == TEMPERATURE &&
          request.prompt.contains("Write 2 git commit messages")
      })
      .times(1)
      .returning(|_| Ok(vec!["Add test file\n\n- add greeting\n---\nCreate test.txt".to_string()]));

    let options = DraftOptions { count: 2, token_budget: 256, ..Default::default() };
    let candidates = client(backend).draft(DIFF, &options).await.unwrap();

    assert_eq!(candidates, vec!["Add test file\n\n- add greeting", "Create test.txt"]);
  }

  #[tokio::test]
  async fn test_draft_retries_transient_failures() {
    let mut backend = MockCompletionBackend::new();
    let mut seq = mockall::Sequence::new();
    backend
      .expect_complete()
      .times(1)
      .in_sequence(&mut seq)
      .returning(|_| Err(Error::ExternalService { code: "429".into(), message: "Rate limit reached".into() }));
    backend
      .expect_complete()
      .times(1)
      .in_sequence(&mut seq)
      .returning(|_| Ok(vec!["Add test file".to_string()]));

    let candidates = client(backend).draft(DIFF, &DraftOptions::default()).await.unwrap();
    assert_eq!(candidates, vec!["Add test file"]);
  }

  #[tokio::test]
  async fn test_draft_gives_up_after_max_retries() {
    let mut backend = MockCompletionBackend::new();
    backend
      .expect_complete()
      .times(2)
      .returning(|_| Err(Error::ExternalService { code: "500".into(), message: "The server had an error".into() }));

    let options = DraftOptions { max_retries: 2, ..Default::default() };
    match client(backend).draft(DIFF, &options).await {
      Err(Error::ExternalService { code, message }) => {
        assert_eq!(code, "500");
        assert_eq!(message, "The server had an error");
      }
      other => panic!("Expected external service error, got {other:?}")
    }
  }

  #[tokio::test]
  async fn test_draft_does_not_retry_bad_credentials() {
    let mut backend = MockCompletionBackend::new();
    backend
      .expect_complete()
      .times(1)
      .returning(|_| Err(Error::ExternalService { code: "invalid_api_key".into(), message: "Incorrect API key provided".into() }));

    let result = client(backend).draft(DIFF, &DraftOptions::default()).await;
    assert!(result.unwrap_err().is_auth_error());
  }

  #[test]
  fn test_split_candidates() {
    assert_eq!(split_candidates("One\n---\n\nTwo\n- detail\n --- \n"), vec!["One", "Two\n- detail"]);
    assert_eq!(split_candidates("Only one"), vec!["Only one"]);
    assert!(split_candidates("---\n\n").is_empty());
  }

  #[test]
  fn test_truncate_respects_char_boundaries() {
    assert_eq!(truncate("héllo", 2), "hé");
    assert_eq!(truncate("abc", 10), "abc");
  }

  #[test]
  fn test_from_config_requires_key() {
    let config = btreemap! { "locale".to_string() => "en".to_string() };
    assert!(matches!(CompletionClient::from_config(&config, DEFAULT_MODEL), Err(Error::MissingCredential)));

    let config = btreemap! {
      "OPENAI_KEY".to_string() => "sk-abc123".to_string(),
      "locale".to_string() => "de".to_string()
    };
    let client = CompletionClient::from_config(&config, "gpt-4o").unwrap();
    assert_eq!(client.model, "gpt-4o");
    assert_eq!(client.locale, "de");
  }
}
