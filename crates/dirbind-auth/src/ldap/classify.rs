//! Mapping of bind diagnostics to user-facing notices
//!
//! Directory servers put vendor-specific codes into the diagnostic text of a
//! failed bind (Active Directory: `... AcceptSecurityContext error, data 52e, v4563`).
//! Rules are kept in declaration order; every rule whose pattern occurs in the
//! text produces one detail, in that order.

use dirbind_core::config::{DiagnosticRuleConfig, FlashConfig};

use super::types::{FailureDetail, FlashNotice};

/// Diagnostic substring and the notice shown when it occurs
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticRule {
    pub pattern: String,
    pub notice: FlashNotice,
}

impl DiagnosticRule {
    pub fn new(pattern: impl Into<String>, message: impl Into<String>, flash: &FlashConfig) -> Self {
        Self {
            pattern: pattern.into(),
            notice: FlashNotice {
                message: message.into(),
                key: flash.key.clone(),
                element: flash.element.clone(),
                params: flash.params.clone(),
            },
        }
    }

    pub fn matches(&self, diagnostic: &str) -> bool {
        diagnostic.contains(&self.pattern)
    }
}

/// Ordered rule list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticTable {
    rules: Vec<DiagnosticRule>,
}

/// Well-known Active Directory bind sub-codes
const ACTIVE_DIRECTORY_CODES: &[(&str, &str)] = &[
    ("data 525", "User not found."),
    ("data 52e", "Invalid username or password."),
    ("data 530", "You are not permitted to log on at this time."),
    ("data 531", "You are not permitted to log on from this workstation."),
    ("data 532", "Your password has expired."),
    ("data 533", "Your account is disabled."),
    ("data 701", "Your account has expired."),
    ("data 773", "You must reset your password before logging on."),
    ("data 775", "Your account is locked out."),
];

impl DiagnosticTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules from `[[errors]]`, with per-rule presentation overrides
    pub fn from_config(rules: &[DiagnosticRuleConfig], flash: &FlashConfig) -> Self {
        let rules = rules
            .iter()
            .map(|rule| DiagnosticRule {
                pattern: rule.pattern.clone(),
                notice: FlashNotice {
                    message: rule.message.clone(),
                    key: rule.key.clone().unwrap_or_else(|| flash.key.clone()),
                    element: rule.element.clone().unwrap_or_else(|| flash.element.clone()),
                    params: rule.params.clone().unwrap_or_else(|| flash.params.clone()),
                },
            })
            .collect();

        Self { rules }
    }

    pub fn active_directory(flash: &FlashConfig) -> Self {
        ACTIVE_DIRECTORY_CODES
            .iter()
            .fold(Self::new(), |table, (pattern, message)| {
                table.with_rule(DiagnosticRule::new(*pattern, *message, flash))
            })
    }

    pub fn with_rule(mut self, rule: DiagnosticRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[DiagnosticRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule in declaration order whose pattern occurs in the text
    pub fn first_match(&self, diagnostic: &str) -> Option<&DiagnosticRule> {
        self.rules.iter().find(|rule| rule.matches(diagnostic))
    }

    /// All matching rules, in declaration order. Absent or empty text
    /// classifies as nothing.
    pub fn classify(&self, diagnostic: Option<&str>) -> Vec<FailureDetail> {
        let text = match diagnostic {
            Some(text) if !text.is_empty() => text,
            _ => return Vec::new(),
        };

        self.rules
            .iter()
            .filter(|rule| rule.matches(text))
            .map(|rule| FailureDetail {
                code: rule.pattern.clone(),
                notice: rule.notice.clone(),
            })
            .collect()
    }
}
