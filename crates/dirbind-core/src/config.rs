//! Configuration for Dirbind

use serde::{Deserialize, Serialize};

use crate::{Error, Result, DEFAULT_NETWORK_TIMEOUT_SECS, USERNAME_PLACEHOLDER};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirbindConfig {
    #[serde(default)]
    pub ldap: LdapConfigSection,

    #[serde(default)]
    pub flash: FlashConfig,

    /// Diagnostic substring rules, scanned in declaration order
    #[serde(default)]
    pub errors: Vec<DiagnosticRuleConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DirbindConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Defaults plus `DIRBIND_*` environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override values from `DIRBIND_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DIRBIND_LDAP_HOST") {
            self.ldap.host = host;
        }
        if let Some(port) = lookup("DIRBIND_LDAP_PORT") {
            if let Ok(p) = port.parse() {
                self.ldap.port = Some(p);
            }
        }
        if let Some(account) = lookup("DIRBIND_LDAP_BIND_ACCOUNT") {
            self.ldap.bind_account = Some(account);
        }
        if let Some(password) = lookup("DIRBIND_LDAP_BIND_PASSWORD") {
            self.ldap.bind_password = Some(password);
        }
        if let Some(base_dn) = lookup("DIRBIND_LDAP_BASE_DN") {
            self.ldap.base_dn = base_dn;
        }
        if let Some(filter) = lookup("DIRBIND_LDAP_USER_FILTER") {
            self.ldap.user_filter = Some(filter);
        }
        if let Some(attrs) = lookup("DIRBIND_LDAP_ATTRIBUTES") {
            self.ldap.attributes = attrs
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(timeout) = lookup("DIRBIND_LDAP_TIMEOUT") {
            if let Ok(t) = timeout.parse() {
                self.ldap.timeout_seconds = t;
            }
        }
        if lookup("DIRBIND_LDAP_START_TLS").map(|v| v == "true").unwrap_or(false) {
            self.ldap.start_tls = true;
        }
        if let Some(level) = lookup("DIRBIND_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("DIRBIND_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.ldap.validate()?;

        for (idx, rule) in self.errors.iter().enumerate() {
            if rule.pattern.is_empty() {
                return Err(Error::Config(format!(
                    "errors[{}]: pattern must not be empty",
                    idx
                )));
            }
        }

        Ok(())
    }
}

/// LDAP directory section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfigSection {
    /// Host name or URL (ldap://, ldaps://, ldapi://)
    #[serde(default)]
    pub host: String,

    /// Port; unset means the scheme default
    #[serde(default)]
    pub port: Option<u16>,

    /// Service account used to look up user DNs
    #[serde(default)]
    pub bind_account: Option<String>,

    #[serde(default)]
    pub bind_password: Option<String>,

    /// Search base, also used to synthesize DNs in direct-bind mode
    #[serde(default)]
    pub base_dn: String,

    /// Search filter template (use {username} placeholder).
    /// Unset picks the default for `server_type`.
    #[serde(default)]
    pub user_filter: Option<String>,

    /// Attributes returned on successful authentication
    #[serde(default)]
    pub attributes: Vec<String>,

    /// Network connect timeout in seconds
    #[serde(default = "default_ldap_timeout")]
    pub timeout_seconds: u64,

    /// Use STARTTLS
    #[serde(default)]
    pub start_tls: bool,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub skip_tls_verify: bool,

    #[serde(default)]
    pub server_type: LdapServerType,
}

fn default_ldap_timeout() -> u64 {
    DEFAULT_NETWORK_TIMEOUT_SECS
}

impl Default for LdapConfigSection {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            bind_account: None,
            bind_password: None,
            base_dn: String::new(),
            user_filter: None,
            attributes: Vec::new(),
            timeout_seconds: default_ldap_timeout(),
            start_tls: false,
            skip_tls_verify: false,
            server_type: LdapServerType::default(),
        }
    }
}

impl LdapConfigSection {
    /// Filter template in effect, falling back to the server type default
    pub fn effective_user_filter(&self) -> &str {
        self.user_filter
            .as_deref()
            .unwrap_or_else(|| self.server_type.default_user_filter())
    }

    /// Service identity, if an account is configured
    pub fn service_identity(&self) -> Option<(&str, &str)> {
        match self.bind_account.as_deref() {
            Some(account) if !account.is_empty() => {
                Some((account, self.bind_password.as_deref().unwrap_or("")))
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("LDAP server not specified".to_string()));
        }

        if self.timeout_seconds == 0 {
            return Err(Error::Config("timeout_seconds must be positive".to_string()));
        }

        if self.bind_account.as_deref().is_some_and(|a| !a.is_empty())
            && self.bind_password.as_deref().unwrap_or("").is_empty()
        {
            return Err(Error::Config(
                "bind_account requires a non-empty bind_password".to_string(),
            ));
        }

        if !self.effective_user_filter().contains(USERNAME_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "User filter must contain {} placeholder",
                USERNAME_PLACEHOLDER
            )));
        }

        Ok(())
    }
}

/// LDAP server type hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LdapServerType {
    #[default]
    Ldap,
    ActiveDirectory,
    #[serde(rename = "openldap")]
    OpenLdap,
}

impl LdapServerType {
    pub fn default_user_filter(&self) -> &'static str {
        match self {
            LdapServerType::ActiveDirectory => "(sAMAccountName={username})",
            _ => "(uid={username})",
        }
    }
}

/// Presentation settings attached to every failure notice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashConfig {
    #[serde(default = "default_flash_key")]
    pub key: String,

    #[serde(default = "default_flash_element")]
    pub element: String,

    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

fn default_flash_key() -> String {
    "auth".to_string()
}

fn default_flash_element() -> String {
    "Flash/error".to_string()
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            key: default_flash_key(),
            element: default_flash_element(),
            params: serde_json::Map::new(),
        }
    }
}

/// One `[[errors]]` entry: diagnostic substring mapped to a user message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRuleConfig {
    /// Substring looked up in the server diagnostic text
    pub pattern: String,

    /// Message shown to the user
    pub message: String,

    /// Overrides `flash.key`
    #[serde(default)]
    pub key: Option<String>,

    /// Overrides `flash.element`
    #[serde(default)]
    pub element: Option<String>,

    /// Overrides `flash.params`
    #[serde(default)]
    pub params: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
