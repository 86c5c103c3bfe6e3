//! Spoken-phrase command routing.
//!
//! A manifest pattern such as `"включи свет|включи освещение"` is split on
//! `|` into aliases. Every alias is normalized (trimmed, lower-cased,
//! whitespace collapsed, `ё` folded to `е`) and indexed to the same
//! [`CommandTarget`].
//!
//! Resolution is exact first. When no alias equals the utterance, the
//! longest alias that is a whole-word prefix of it wins and the rest of the
//! utterance becomes the free-text argument ("включи свет в кухне" ->
//! alias "включи свет в", residual "кухне").

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::PluginError;
use crate::traits::Invocation;

/// Reserved delimiter between aliases in a pattern.
pub const ALIAS_DELIMITER: char = '|';

/// The plugin command an alias resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandTarget {
    /// Owning plugin id.
    pub owner: String,
    /// Command id within the owning plugin.
    pub command: String,
}

impl CommandTarget {
    pub fn new(owner: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            command: command.into(),
        }
    }
}

impl std::fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.command)
    }
}

/// What to do when an alias is registered twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Keep the first registration; report the later one.
    #[default]
    Reject,
    /// Later registration replaces the earlier one; still reported.
    Overwrite,
}

/// Result of registering one pattern.
#[derive(Debug, Default)]
pub struct Registration {
    /// Aliases now pointing at the registered target.
    pub registered: usize,
    /// One [`PluginError::RegistrationConflict`] per contested alias.
    pub conflicts: Vec<PluginError>,
}

impl Registration {
    /// Fail with the first conflict, if any.
    pub fn into_result(self) -> Result<usize, PluginError> {
        match self.conflicts.into_iter().next() {
            Some(conflict) => Err(conflict),
            None => Ok(self.registered),
        }
    }
}

/// Flat alias -> command index.
#[derive(Debug, Default)]
pub struct CommandRouter {
    index: HashMap<String, CommandTarget>,
    policy: ConflictPolicy,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ConflictPolicy) -> Self {
        Self {
            index: HashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Index every alias of `pattern` to `target`.
    ///
    /// Re-registering an alias for the same target is a no-op, not a
    /// conflict.
    pub fn register(&mut self, pattern: &str, target: CommandTarget) -> Registration {
        let mut outcome = Registration::default();
        for alias in split_pattern(pattern) {
            match self.index.get(&alias) {
                Some(existing) if *existing == target => outcome.registered += 1,
                Some(existing) => {
                    warn!(
                        alias = %alias,
                        existing = %existing,
                        incoming = %target,
                        policy = ?self.policy,
                        "alias registration conflict"
                    );
                    outcome.conflicts.push(PluginError::RegistrationConflict {
                        alias: alias.clone(),
                        existing: existing.to_string(),
                        incoming: target.to_string(),
                    });
                    if self.policy == ConflictPolicy::Overwrite {
                        self.index.insert(alias, target.clone());
                        outcome.registered += 1;
                    }
                }
                None => {
                    debug!(alias = %alias, target = %target, "registered alias");
                    self.index.insert(alias, target.clone());
                    outcome.registered += 1;
                }
            }
        }
        outcome
    }

    /// Exact, case-insensitive, whitespace-trimmed lookup.
    pub fn lookup(&self, utterance: &str) -> Option<&CommandTarget> {
        self.index.get(&normalize_phrase(utterance))
    }

    /// Match an utterance, falling back to the longest whole-word alias
    /// prefix when no alias matches exactly.
    pub fn resolve(&self, utterance: &str) -> Option<(&CommandTarget, Invocation)> {
        let normalized = normalize_phrase(utterance);
        if normalized.is_empty() {
            return None;
        }

        if let Some(target) = self.index.get(&normalized) {
            return Some((
                target,
                Invocation {
                    utterance: utterance.trim().to_string(),
                    alias: normalized,
                    residual: String::new(),
                },
            ));
        }

        let (alias, target) = self
            .index
            .iter()
            .filter(|(alias, _)| {
                normalized
                    .strip_prefix(alias.as_str())
                    .is_some_and(|rest| rest.starts_with(' '))
            })
            // Longest alias wins; ties are broken lexicographically so the
            // result never depends on hash order.
            .max_by(|(a, _), (b, _)| {
                a.chars()
                    .count()
                    .cmp(&b.chars().count())
                    .then_with(|| b.cmp(a))
            })?;

        let residual = residual_after(utterance, alias.split(' ').count());
        Some((
            target,
            Invocation {
                utterance: utterance.trim().to_string(),
                alias: alias.clone(),
                residual,
            },
        ))
    }

    /// Drop every alias owned by `owner`. Returns how many were removed.
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let before = self.index.len();
        self.index.retain(|_, target| target.owner != owner);
        before - self.index.len()
    }

    /// All aliases, sorted, with their targets.
    pub fn aliases(&self) -> Vec<(&str, &CommandTarget)> {
        let mut entries: Vec<(&str, &CommandTarget)> = self
            .index
            .iter()
            .map(|(alias, target)| (alias.as_str(), target))
            .collect();
        entries.sort_by(|a, b| a.1.owner.cmp(&b.1.owner).then_with(|| a.0.cmp(b.0)));
        entries
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn is_edge(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?' | '…')
}

/// Normalize a phrase for indexing and matching.
pub fn normalize_phrase(text: &str) -> String {
    let lowered = text.to_lowercase().replace('ё', "е");
    let trimmed = lowered.trim_matches(is_edge);
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The original `utterance` with its first `words` words removed.
///
/// Case, `ё` and inner punctuation are kept; only edge punctuation and
/// whitespace are trimmed, as in [`normalize_phrase`].
fn residual_after(utterance: &str, words: usize) -> String {
    let mut rest = utterance.trim_start_matches(is_edge);
    for _ in 0..words {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = &rest[end..];
    }
    rest.trim_matches(is_edge).to_string()
}

/// Split an alias pattern into normalized, non-empty, distinct aliases.
pub fn split_pattern(pattern: &str) -> Vec<String> {
    let mut aliases: Vec<String> = Vec::new();
    for alias in pattern.split(ALIAS_DELIMITER).map(normalize_phrase) {
        if !alias.is_empty() && !aliases.contains(&alias) {
            aliases.push(alias);
        }
    }
    aliases
}
