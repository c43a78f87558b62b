//! Shell command classification.
//!
//! Two ordered rule tables decide what happens to a command before it runs:
//! the block list refuses it outright, the confirm list routes it through a
//! [`Confirmer`]. Everything else is safe. Matching is case-insensitive and
//! unanchored, so a rule fires anywhere in the command text.

mod confirm;

pub use confirm::{ChannelConfirmer, ConfirmationRequest, Confirmer};

use regex::{RegexSet, RegexSetBuilder};
use thiserror::Error;

/// Rules that refuse a command. Each tuple: `(regex_pattern, what_it_catches)`.
pub const BLOCK_RULES: &[(&str, &str)] = &[
    (r"\bFormat-Volume\b", "volume formatting"),
    (r"\bFormat-Disk\b", "disk formatting"),
    (r"\bClear-Disk\b", "disk wipe"),
    (r"\bInitialize-Disk\b", "disk initialization"),
    (r"\bStop-Computer\b", "shutdown"),
    (r"\bRestart-Computer\b", "restart"),
    (r"\bSet-ExecutionPolicy\b", "execution policy change"),
    (r"\breg\s+delete\b", "registry deletion"),
    (
        r"\bRemove-Item(?:Property)?\b.*\b(?:HKLM|HKCU|HKEY_LOCAL_MACHINE|HKEY_CURRENT_USER)\b",
        "registry hive deletion",
    ),
    (r"\bbcdedit\b", "boot configuration edit"),
    (r"\bdiskpart\b", "partition editor"),
    (r"\bnet\s+user\b.*(?:/add|/delete)", "local account change"),
    (r"\bDisable-LocalUser\b", "local account disable"),
    (r"\bRemove-LocalUser\b", "local account removal"),
    (r"\bClear-EventLog\b", "event log wipe"),
    (r"\bwmic\b.*delete", "WMI deletion"),
];

/// Rules that require an explicit human approval.
pub const CONFIRM_RULES: &[(&str, &str)] = &[
    (r"\bRemove-Item\b", "file deletion"),
    (r"\bdel\b", "file deletion"),
    (r"\brmdir\b", "directory deletion"),
    (r"\brm\b\s", "file deletion"),
    (r"\brd\b\s", "directory deletion"),
    (r"\bClear-Content\b", "content clearing"),
    (r"\bClear-RecycleBin\b", "recycle bin wipe"),
    (r"\bStop-Process\b", "process stop"),
    (r"\bkill\b\s", "process kill"),
    (r"\btaskkill\b", "process kill"),
    (r"\bStop-Service\b", "service stop"),
    (r"\bRemove-Service\b", "service removal"),
    (r"\bUninstall-Package\b", "package removal"),
    (r"\bMove-Item\b", "move"),
    (r"\bRename-Item\b", "rename"),
    (r"\bSet-Content\b", "file overwrite"),
    (r"\bOut-File\b", "file write"),
    (r"\bInvoke-Expression\b", "dynamic evaluation"),
    (r"\biex\b\s", "dynamic evaluation"),
    (r"\bInvoke-WebRequest\b.*-OutFile", "download to file"),
    (r"\bStart-Process\b", "process launch"),
    (r"\bNew-Service\b", "service install"),
    (r"(?:^|\s)-Recurse\b", "recursive operation"),
    (r"(?:^|\s)-Force\b", "forced operation"),
    (r"(?:^|[^-=>])>>?\s*[^\s&>]", "output redirection"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    /// Refused; the text starts with `BLOCKED:` and names the matched rule.
    Blocked(String),
    /// Needs approval; carries the matched rule pattern.
    NeedsConfirmation(String),
    Safe,
}

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("failed to compile safety rules: {0}")]
    InvalidRules(#[from] regex::Error),
}

/// Compiled block and confirm tables.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    block_set: RegexSet,
    block_patterns: Vec<String>,
    confirm_set: RegexSet,
    confirm_patterns: Vec<String>,
}

impl SafetyGate {
    pub fn new(
        block_rules: &[(&str, &str)],
        confirm_rules: &[(&str, &str)],
    ) -> Result<Self, SafetyError> {
        let (block_set, block_patterns) = compile(block_rules)?;
        let (confirm_set, confirm_patterns) = compile(confirm_rules)?;
        Ok(Self {
            block_set,
            block_patterns,
            confirm_set,
            confirm_patterns,
        })
    }

    pub fn with_defaults() -> Result<Self, SafetyError> {
        Self::new(BLOCK_RULES, CONFIRM_RULES)
    }

    /// Block rules win over confirm rules; within a table the first rule wins.
    pub fn classify(&self, command: &str) -> SafetyVerdict {
        if let Some(index) = self.block_set.matches(command).iter().next() {
            return SafetyVerdict::Blocked(format!(
                "BLOCKED: Command matches dangerous pattern ({})",
                self.block_patterns[index]
            ));
        }
        if let Some(index) = self.confirm_set.matches(command).iter().next() {
            return SafetyVerdict::NeedsConfirmation(self.confirm_patterns[index].clone());
        }
        SafetyVerdict::Safe
    }
}

fn compile(rules: &[(&str, &str)]) -> Result<(RegexSet, Vec<String>), SafetyError> {
    let patterns: Vec<String> = rules
        .iter()
        .map(|(pattern, _)| (*pattern).to_string())
        .collect();
    let set = RegexSetBuilder::new(&patterns)
        .case_insensitive(true)
        .build()?;
    Ok((set, patterns))
}
