//! Fixed catalog of conventional commit types.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitTypeOption {
  pub value: &'static str,
  pub label: &'static str,
  pub hint:  &'static str
}

pub const COMMIT_TYPES: &[CommitTypeOption] = &[
  CommitTypeOption { value: "feat", label: "✨ feat", hint: "A new feature" },
  CommitTypeOption { value: "fix", label: "🐛 fix", hint: "A bug fix" },
  CommitTypeOption { value: "docs", label: "📝 docs", hint: "Documentation only changes" },
  CommitTypeOption {
    value: "style",
    label: "💄 style",
    hint:  "Changes that do not affect the meaning of the code (white-space, formatting, etc)"
  },
  CommitTypeOption {
    value: "refactor",
    label: "♻️ refactor",
    hint:  "A code change that neither fixes a bug nor adds a feature"
  },
  CommitTypeOption { value: "perf", label: "⚡️ perf", hint: "A code change that improves performance" },
  CommitTypeOption { value: "test", label: "✅ test", hint: "Adding missing tests or correcting existing tests" },
  CommitTypeOption {
    value: "build",
    label: "📦 build",
    hint:  "Changes that affect the build system or external dependencies"
  },
  CommitTypeOption { value: "ci", label: "👷 ci", hint: "Changes to CI configuration files and scripts" },
  CommitTypeOption { value: "chore", label: "🔧 chore", hint: "Other changes that don't modify src or test files" },
  CommitTypeOption { value: "revert", label: "⏪️ revert", hint: "Reverts a previous commit" }
];

/// Looks up a catalog entry by its tag. Surrounding whitespace is ignored,
/// case is not.
pub fn lookup(tag: &str) -> Option<&'static CommitTypeOption> {
  let tag = tag.trim();
  COMMIT_TYPES.iter().find(|option| option.value == tag)
}

/// Tags starting with `prefix`, in catalog order.
pub fn matching(prefix: &str) -> impl Iterator<Item = &'static CommitTypeOption> + '_ {
  COMMIT_TYPES
    .iter()
    .filter(move |option| option.value.starts_with(prefix.trim()))
}
