//! Virtualization rules for filesystem and registry paths
//!
//! A [`RuleSet`] decides how a guest path is treated: fully virtualized,
//! read through to the host, or passed through untouched. Patterns are path
//! prefixes; the most specific (longest) matching prefix wins.

use serde::{Deserialize, Serialize};
use vsync_fs::NormalizedPath;

use crate::{Error, Result};

/// How accesses under a path are virtualized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VirtualizationType {
    /// Reads and writes go to the virtual view only
    #[default]
    Virtual,
    /// Reads fall through to the host when the virtual view has no entry,
    /// writes stay virtual
    TransparentRead,
    /// Reads and writes go straight to the host
    Transparent,
}

/// A single prefix rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Path prefix, e.g. `C:\Users\Guest\AppData` or `HKEY_CURRENT_USER\Software\Vendor`
    pub pattern: String,
    /// Treatment for everything under `pattern`
    pub access: VirtualizationType,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, access: VirtualizationType) -> Self {
        Self {
            pattern: pattern.into(),
            access,
        }
    }

    fn key(&self) -> String {
        match_key(&self.pattern)
    }
}

/// An ordered collection of rules with a fallback treatment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Treatment for paths no rule matches
    #[serde(default)]
    pub default_access: VirtualizationType,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(default_access: VirtualizationType) -> Self {
        Self {
            default_access,
            rules: Vec::new(),
        }
    }

    /// Builder-style rule insertion
    pub fn with_rule(mut self, pattern: impl Into<String>, access: VirtualizationType) -> Self {
        self.rules.push(Rule::new(pattern, access));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Reject rules that can never match.
    pub fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            if rule.key().is_empty() {
                return Err(Error::InvalidRule {
                    pattern: rule.pattern.clone(),
                    reason: "pattern is empty".into(),
                });
            }
        }
        Ok(())
    }

    /// Find the rule governing `path`, if any.
    ///
    /// Matching is case-insensitive, separator-agnostic and respects segment
    /// boundaries: `C:\App` matches `C:\App\data` but not `C:\Application`.
    /// Among several matches the longest pattern wins; ties keep the rule
    /// declared first.
    pub fn matching_rule(&self, path: &str) -> Option<&Rule> {
        let target = match_key(path);
        let mut best: Option<(&Rule, usize)> = None;

        for rule in &self.rules {
            let key = rule.key();
            if key.is_empty() || !is_prefix_on_boundary(&key, &target) {
                continue;
            }
            if best.is_none_or(|(_, len)| key.len() > len) {
                best = Some((rule, key.len()));
            }
        }

        best.map(|(rule, _)| rule)
    }

    /// Resolve the treatment for `path`.
    pub fn resolve(&self, path: &str) -> VirtualizationType {
        self.matching_rule(path)
            .map(|rule| rule.access)
            .unwrap_or(self.default_access)
    }
}

fn match_key(path: &str) -> String {
    NormalizedPath::new(path)
        .as_str()
        .trim_end_matches('/')
        .to_lowercase()
}

fn is_prefix_on_boundary(prefix: &str, target: &str) -> bool {
    if !target.starts_with(prefix) {
        return false;
    }
    target.len() == prefix.len() || target.as_bytes()[prefix.len()] == b'/'
}
