#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::Client;

/// Prompt truncation length for grading payloads.
pub const PROMPT_TRUNCATE: usize = 60_000;

/// Maximum number of `${name}` substitution passes.
const MAX_SUBSTITUTION_PASSES: usize = 10;

/// Provider order used when `ai_providers` is not configured.
const DEFAULT_PROVIDER_ORDER: [ProviderKind; 3] =
    [ProviderKind::Gemini, ProviderKind::Anthropic, ProviderKind::OpenAi];

/// Errors raised while loading or resolving configuration. All of them are
/// fatal for a run.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The properties file does not exist.
    #[error("Config file not found: {}", path.display())]
    NotFound {
        /// Path that was looked up
        path: PathBuf,
    },
    /// The properties file exists but could not be read.
    #[error("Could not read config file {}", path.display())]
    Read {
        /// Path that failed to read
        path:   PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
    /// A required key is absent or empty.
    #[error("Missing required configuration key `{key}`")]
    MissingKey {
        /// Name of the key
        key: String,
    },
    /// A provider name that is not supported.
    #[error("Unknown AI provider `{0}` (expected gemini, anthropic or openai)")]
    UnknownProvider(String),
    /// No provider in the preference list has an API key.
    #[error("No AI provider is configured; set at least one of gemini_api_key, \
             anthropic_api_key or openai_api_key")]
    NoProviders,
    /// The shared HTTP client could not be built.
    #[error("Failed to construct shared HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// Raw `key=value` settings with `${name}` references resolved.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// Resolved values by key.
    values: BTreeMap<String, String>,
    /// File the values came from, if any.
    source: Option<PathBuf>,
}

impl Properties {
    /// Reads and resolves a properties file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut props = Self::parse(&text);
        props.source = Some(path.to_path_buf());
        tracing::debug!("Loaded {} keys from {}", props.values.len(), path.display());
        Ok(props)
    }

    /// Parses properties text. Blank lines and lines starting with `#` or `!`
    /// are ignored; everything after the first `=` is the value.
    pub fn parse(text: &str) -> Self {
        let raw = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect::<BTreeMap<_, _>>();

        Self {
            values: resolve_references(raw),
            source: None,
        }
    }

    /// The file these properties were loaded from.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Returns the value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the value for `key`, or `default` when unset.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Returns the value for `key` parsed as an integer; unset or invalid
    /// values yield `default`.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(default)
    }

    /// Returns the value for `key` parsed as a boolean (`true/false/yes/no/1/0`).
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(str::to_ascii_lowercase).as_deref() {
            Some("true" | "yes" | "1") => true,
            Some("false" | "no" | "0") => false,
            _ => default,
        }
    }

    /// Returns the value for `key` as a path, if set and non-empty.
    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    }

    /// Returns the value for `key`, failing when it is unset or empty.
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigError::MissingKey {
                key: key.to_string(),
            })
    }

    /// Keys present in these properties.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Replaces `${name}` references with the value of `name`, repeating until
/// nothing changes. References to unknown keys are left as written.
fn resolve_references(mut values: BTreeMap<String, String>) -> BTreeMap<String, String> {
    for _ in 0..MAX_SUBSTITUTION_PASSES {
        let snapshot = values.clone();
        let mut changed = false;

        for value in values.values_mut() {
            let substituted = substitute_once(value, &snapshot);
            if substituted != *value {
                *value = substituted;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }
    values
}

/// Performs a single left-to-right substitution pass over `value`.
fn substitute_once(value: &str, lookup: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match lookup.get(name) {
                    Some(resolved) => out.push_str(resolved),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Supported AI backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Google Gemini
    Gemini,
    /// Anthropic Claude
    Anthropic,
    /// Any OpenAI-compatible chat completions endpoint
    OpenAi,
}

impl ProviderKind {
    /// Parses a provider name as written in the config file.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }

    /// Lowercase name used for config keys and log messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }

    /// Environment variable consulted by [`AiSettings::with_env_fallback`].
    pub fn env_key(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash",
            Self::Anthropic => "claude-3-opus-20240229",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Credentials and model for one provider.
#[derive(Clone)]
pub struct ProviderSettings {
    /// Which backend these settings belong to.
    kind:    ProviderKind,
    /// API key, if one was configured.
    api_key: Option<String>,
    /// Model identifier.
    model:   String,
}

impl ProviderSettings {
    /// Backend kind.
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// API key, if configured.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .finish()
    }
}

/// Everything the provider chain needs, passed explicitly to the router
/// factory instead of being looked up from the environment on demand.
#[derive(Debug, Clone)]
pub struct AiSettings {
    /// Providers in preference order.
    providers:       Vec<ProviderSettings>,
    /// Base URL for the OpenAI-compatible endpoint.
    openai_endpoint: String,
    /// Token cap for providers that require one.
    max_tokens:      u32,
}

impl AiSettings {
    /// Builds settings from the properties file alone.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let mut order = match props.get("ai_providers").filter(|v| !v.trim().is_empty()) {
            Some(list) => list
                .split(',')
                .filter(|name| !name.trim().is_empty())
                .map(ProviderKind::parse)
                .collect::<Result<Vec<_>, _>>()?,
            None => DEFAULT_PROVIDER_ORDER.to_vec(),
        };

        // The single-provider key predates `ai_providers`; honour it as the
        // first choice.
        if let Some(preferred) = props.get("ai_provider").filter(|v| !v.trim().is_empty()) {
            let preferred = ProviderKind::parse(preferred)?;
            order.retain(|kind| *kind != preferred);
            order.insert(0, preferred);
        }

        let mut seen = Vec::with_capacity(order.len());
        let providers = order
            .into_iter()
            .filter(|kind| {
                let fresh = !seen.contains(kind);
                seen.push(*kind);
                fresh
            })
            .map(|kind| ProviderSettings {
                kind,
                api_key: props
                    .get(&format!("{}_api_key", kind.name()))
                    .filter(|key| !key.is_empty())
                    .map(str::to_string),
                model: props
                    .get_or(&format!("{}_model", kind.name()), kind.default_model())
                    .to_string(),
            })
            .collect();

        Ok(Self {
            providers,
            openai_endpoint: props
                .get_or("openai_endpoint", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            max_tokens: u32::try_from(props.get_int("ai_max_tokens", 2000)).unwrap_or(2000),
        })
    }

    /// Fills in API keys that the properties file left empty by calling
    /// `lookup` with each provider's environment variable name.
    pub fn with_env_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for provider in &mut self.providers {
            if provider.api_key.is_none() {
                provider.api_key = lookup(provider.kind.env_key())
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty());
            }
        }
        self
    }

    /// All providers in preference order, with or without keys.
    pub fn providers(&self) -> &[ProviderSettings] {
        &self.providers
    }

    /// Providers that have an API key, in preference order.
    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.api_key.is_some())
    }

    /// Base URL for the OpenAI-compatible endpoint.
    pub fn openai_endpoint(&self) -> &str {
        &self.openai_endpoint
    }

    /// Token cap for providers that require one.
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

/// Typed configuration for one `gradeit` invocation.
#[derive(Debug, Clone)]
pub struct GradeItConfig {
    /// Roster of GitLab group names.
    students_file:          PathBuf,
    /// Where feedback documents are written.
    output_directory:       PathBuf,
    /// Working directory for the tool.
    base_directory:         PathBuf,
    /// Where student repositories are cloned.
    repositories_directory: PathBuf,
    /// GitLab host used to build clone URLs.
    gitlab_host:            Option<String>,
    /// Maximum grade a submission can receive.
    max_grade:              i64,
    /// Threshold reported as passing.
    passing_grade:          i64,
    /// Gradle task to run.
    gradle_task:            String,
    /// Whether to prefer `./gradlew` over a system gradle.
    gradle_use_wrapper:     bool,
    /// Deadline for a single build.
    build_timeout:          Duration,
    /// Deadline for a single clone.
    clone_timeout:          Duration,
    /// Provider chain settings.
    ai:                     AiSettings,
}

impl GradeItConfig {
    /// Loads a properties file and resolves the typed configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_properties(&Properties::load(path)?)
    }

    /// Resolves the typed configuration from already-loaded properties.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let base_directory = PathBuf::from(props.require("base_directory")?);
        let repositories_directory = props
            .get_path("repositories_directory")
            .unwrap_or_else(|| base_directory.clone());

        Ok(Self {
            students_file: PathBuf::from(props.require("students_file")?),
            output_directory: PathBuf::from(props.require("output_directory")?),
            base_directory,
            repositories_directory,
            gitlab_host: props
                .get("gitlab_host")
                .filter(|host| !host.is_empty())
                .map(str::to_string),
            max_grade: props.get_int("max_grade", 100),
            passing_grade: props.get_int("passing_grade", 60),
            gradle_task: props.get_or("gradle_task", "build").to_string(),
            gradle_use_wrapper: props.get_bool("gradle_use_wrapper", true),
            build_timeout: read_secs(props, "build_timeout_secs", 300),
            clone_timeout: read_secs(props, "clone_timeout_secs", 120),
            ai: AiSettings::from_properties(props)?,
        })
    }

    /// Roster of GitLab group names.
    pub fn students_file(&self) -> &Path {
        &self.students_file
    }

    /// Where feedback documents are written.
    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    /// Working directory for the tool.
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Where student repositories live.
    pub fn repositories_directory(&self) -> &Path {
        &self.repositories_directory
    }

    /// GitLab host, required by the clone command.
    pub fn gitlab_host(&self) -> Result<&str, ConfigError> {
        self.gitlab_host
            .as_deref()
            .ok_or_else(|| ConfigError::MissingKey {
                key: "gitlab_host".to_string(),
            })
    }

    /// Maximum grade.
    pub fn max_grade(&self) -> i64 {
        self.max_grade
    }

    /// Passing threshold.
    pub fn passing_grade(&self) -> i64 {
        self.passing_grade
    }

    /// Overrides the maximum grade (command-line flag).
    pub fn set_max_grade(&mut self, value: i64) {
        self.max_grade = value;
    }

    /// Overrides the passing threshold (command-line flag).
    pub fn set_passing_grade(&mut self, value: i64) {
        self.passing_grade = value;
    }

    /// Gradle task to run.
    pub fn gradle_task(&self) -> &str {
        &self.gradle_task
    }

    /// Whether to prefer `./gradlew`.
    pub fn gradle_use_wrapper(&self) -> bool {
        self.gradle_use_wrapper
    }

    /// Deadline for one build.
    pub fn build_timeout(&self) -> Duration {
        self.build_timeout
    }

    /// Deadline for one clone.
    pub fn clone_timeout(&self) -> Duration {
        self.clone_timeout
    }

    /// Provider chain settings.
    pub fn ai(&self) -> &AiSettings {
        &self.ai
    }

    /// Replaces the provider settings, e.g. after applying env fallback.
    pub fn set_ai(&mut self, ai: AiSettings) {
        self.ai = ai;
    }
}

/// Parses a seconds value into a `Duration`, falling back to `default_secs`.
fn read_secs(props: &Properties, key: &str, default_secs: u64) -> Duration {
    props
        .get(key)
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Builds the shared reqwest client used by every HTTP provider.
pub fn http_client() -> Result<Client, ConfigError> {
    Client::builder()
        // Avoid macOS dynamic store lookups that fail in sandboxed environments.
        .no_proxy()
        .build()
        .map_err(ConfigError::HttpClient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution_handles_unknown_and_unterminated_references() {
        let props = Properties::parse("a=${missing}/x\nb=${a}\nc=${oops");
        assert_eq!(props.get("a"), Some("${missing}/x"));
        assert_eq!(props.get("b"), Some("${missing}/x"));
        assert_eq!(props.get("c"), Some("${oops"));
    }

    #[test]
    fn legacy_provider_key_moves_to_front() {
        let props = Properties::parse("ai_provider=anthropic\nanthropic_api_key=k");
        let ai = AiSettings::from_properties(&props).expect("settings");
        let kinds: Vec<_> = ai.providers().iter().map(ProviderSettings::kind).collect();
        assert_eq!(kinds, vec![ProviderKind::Anthropic, ProviderKind::Gemini, ProviderKind::OpenAi]);
        assert_eq!(ai.enabled_providers().count(), 1);
    }
}
