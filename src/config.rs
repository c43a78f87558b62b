use anyhow::{bail, Context, Result};
use std::fmt;
use std::str::FromStr;

use crate::tools::{Capabilities, ShellCommand};
use crate::util::{env_flag, env_non_empty, is_local_endpoint_url};

pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const MAX_TOKENS: u32 = 8192;
pub const MAX_TOKENS_REASONING: u32 = 32768;
const MIN_REASONING_BUDGET: u32 = 1024;
/// The API requires `max_tokens` to exceed the thinking budget.
pub const MAX_REASONING_BUDGET: u32 = MAX_TOKENS_REASONING - 1;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous agent with access to tools. \
The task is given in the first user message; carry it out fully and proactively.\n\n\
Core tools are always available: web_search finds current information, fetch_webpage reads a \
specific URL, run_command executes a shell command on the local machine. Desktop and browser \
tools are offered only when the user has enabled them.\n\n\
Search before guessing. After each tool result, reassess and either call the next tool or give \
the final answer. Destructive commands may be refused or need the user's approval; when a \
command is rejected, do not retry it in another form.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
    Max,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReasoningEffort {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "max" => Ok(Self::Max),
            other => bail!("unknown reasoning effort '{other}'"),
        }
    }
}

/// How the model samples. Temperature and reasoning are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingMode {
    Temperature(f32),
    AdaptiveReasoning { effort: ReasoningEffort },
    BudgetedReasoning { budget_tokens: u32 },
}

impl SamplingMode {
    pub fn reasoning_enabled(&self) -> bool {
        !matches!(self, Self::Temperature(_))
    }

    pub fn max_tokens(&self) -> u32 {
        if self.reasoning_enabled() {
            MAX_TOKENS_REASONING
        } else {
            MAX_TOKENS
        }
    }
}

/// Settings a run reads at the start of every request cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub model: String,
    pub system_prompt: String,
    pub sampling: SamplingMode,
    pub capabilities: Capabilities,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            sampling: SamplingMode::Temperature(DEFAULT_TEMPERATURE),
            capabilities: Capabilities::default(),
        }
    }
}

/// Value of `AGENTDESK_THINKING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningSetting {
    Off,
    Effort(ReasoningEffort),
    Budget(u32),
}

impl FromStr for ReasoningSetting {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        if matches!(normalized.as_str(), "" | "off" | "false" | "0" | "no") {
            return Ok(Self::Off);
        }
        if let Ok(effort) = normalized.parse::<ReasoningEffort>() {
            return Ok(Self::Effort(effort));
        }
        let budget = match normalized.strip_suffix('k') {
            Some(thousands) => thousands.parse::<u32>().map(|k| k.saturating_mul(1024)),
            None => normalized.parse::<u32>(),
        }
        .with_context(|| {
            format!("AGENTDESK_THINKING must be off, low|medium|high|max or a token budget, got '{value}'")
        })?;
        Ok(Self::Budget(budget))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub anthropic_version: String,
    pub temperature: f32,
    pub reasoning: ReasoningSetting,
    pub capabilities: Capabilities,
    pub system_prompt: String,
    pub shell: ShellCommand,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            reasoning: ReasoningSetting::Off,
            capabilities: Capabilities::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            shell: ShellCommand::platform_default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let temperature = match env_non_empty("AGENTDESK_TEMPERATURE") {
            Some(raw) => raw
                .parse::<f32>()
                .with_context(|| format!("Invalid AGENTDESK_TEMPERATURE '{raw}'"))?,
            None => defaults.temperature,
        };
        let reasoning = match env_non_empty("AGENTDESK_THINKING") {
            Some(raw) => raw.parse()?,
            None => ReasoningSetting::Off,
        };
        let shell = env_non_empty("AGENTDESK_SHELL")
            .and_then(|raw| ShellCommand::parse(&raw))
            .unwrap_or(defaults.shell);

        Ok(Self {
            api_key: env_non_empty("ANTHROPIC_API_KEY"),
            model: env_non_empty("AGENTDESK_MODEL").unwrap_or(defaults.model),
            api_url: env_non_empty("ANTHROPIC_API_URL").unwrap_or(defaults.api_url),
            anthropic_version: env_non_empty("ANTHROPIC_VERSION")
                .unwrap_or(defaults.anthropic_version),
            temperature,
            reasoning,
            capabilities: Capabilities {
                desktop: env_flag("AGENTDESK_DESKTOP", false),
                browser: env_flag("AGENTDESK_BROWSER", false),
            },
            system_prompt: env_non_empty("AGENTDESK_SYSTEM_PROMPT")
                .unwrap_or(defaults.system_prompt),
            shell,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid ANTHROPIC_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        let local_endpoint = self.is_local_endpoint();
        if !local_endpoint && self.api_key.is_none() {
            bail!(
                "ANTHROPIC_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if !local_endpoint && !self.model.starts_with("claude-") {
            bail!(
                "Invalid model name: '{}'. Expected a model starting with 'claude-'",
                self.model
            );
        }

        if !(0.0..=1.0).contains(&self.temperature) {
            bail!(
                "AGENTDESK_TEMPERATURE must be between 0.0 and 1.0 (got {})",
                self.temperature
            );
        }

        if let ReasoningSetting::Budget(budget) = self.reasoning {
            if !(MIN_REASONING_BUDGET..=MAX_REASONING_BUDGET).contains(&budget) {
                bail!(
                    "Reasoning budget must be between {MIN_REASONING_BUDGET} and {MAX_REASONING_BUDGET} tokens (got {budget})"
                );
            }
        }

        Ok(())
    }

    pub fn run_settings(&self) -> RunSettings {
        let sampling = match self.reasoning {
            ReasoningSetting::Off => SamplingMode::Temperature(self.temperature),
            ReasoningSetting::Effort(effort) => SamplingMode::AdaptiveReasoning { effort },
            ReasoningSetting::Budget(budget_tokens) => {
                SamplingMode::BudgetedReasoning { budget_tokens }
            }
        };
        RunSettings {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            sampling,
            capabilities: self.capabilities,
        }
    }

    fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}
