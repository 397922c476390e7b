//! LDAP authentication types and configuration

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dirbind_core::config::{DirbindConfig, LdapServerType};
use dirbind_core::{Error, Result, DEFAULT_NETWORK_TIMEOUT_SECS, USERNAME_PLACEHOLDER};
use serde::{Deserialize, Serialize};
use url::Url;

use super::classify::DiagnosticTable;

/// Multi-valued directory attributes keyed by attribute name
pub type Attributes = HashMap<String, Vec<String>>;

// ============================================================================
// Directory configuration
// ============================================================================

/// Where the server host comes from
#[derive(Clone)]
pub enum HostSource {
    /// Fixed host name or URL
    Static(String),
    /// Evaluated once when the flow is constructed
    Resolver(Arc<dyn Fn() -> Option<String> + Send + Sync>),
}

impl HostSource {
    /// Resolve the host, treating blank values as missing
    pub fn resolve(&self) -> Option<String> {
        let host = match self {
            HostSource::Static(host) => Some(host.clone()),
            HostSource::Resolver(resolve) => resolve(),
        };

        host.map(|h| h.trim().to_string()).filter(|h| !h.is_empty())
    }
}

impl fmt::Debug for HostSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostSource::Static(host) => f.debug_tuple("Static").field(host).finish(),
            HostSource::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// Builds the search filter for a username
#[derive(Clone)]
pub struct FilterBuilder(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl FilterBuilder {
    /// Template with a `{username}` placeholder; the username is filter-escaped
    pub fn template(template: impl Into<String>) -> Self {
        let template = template.into();
        Self(Arc::new(move |username: &str| {
            template.replace(USERNAME_PLACEHOLDER, &ldap3::ldap_escape(username))
        }))
    }

    /// Arbitrary builder; escaping is up to the caller
    pub fn custom<F>(build: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(build))
    }

    pub fn build(&self, username: &str) -> String {
        (self.0)(username)
    }
}

impl fmt::Debug for FilterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FilterBuilder(..)")
    }
}

/// Privileged account used only to look up user DNs
#[derive(Clone)]
pub struct ServiceIdentity {
    pub account: String,
    pub password: String,
}

impl ServiceIdentity {
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read-only settings for one authentication flow
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub host: HostSource,
    pub port: Option<u16>,
    pub service: Option<ServiceIdentity>,
    pub base_dn: String,
    pub filter: FilterBuilder,
    pub attributes: Vec<String>,
    pub diagnostics: DiagnosticTable,
    pub timeout: Duration,
    pub start_tls: bool,
    pub skip_tls_verify: bool,
}

impl DirectoryConfig {
    pub fn new(host: impl Into<String>, base_dn: impl Into<String>) -> Self {
        Self {
            host: HostSource::Static(host.into()),
            port: None,
            service: None,
            base_dn: base_dn.into(),
            filter: FilterBuilder::template(LdapServerType::Ldap.default_user_filter()),
            attributes: Vec::new(),
            diagnostics: DiagnosticTable::default(),
            timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS),
            start_tls: false,
            skip_tls_verify: false,
        }
    }

    /// Build from the file/env configuration.
    ///
    /// Without `[[errors]]` rules an Active Directory server gets the built-in
    /// AD sub-code table.
    pub fn from_config(config: &DirbindConfig) -> Self {
        let ldap = &config.ldap;

        let diagnostics = if config.errors.is_empty()
            && ldap.server_type == LdapServerType::ActiveDirectory
        {
            DiagnosticTable::active_directory(&config.flash)
        } else {
            DiagnosticTable::from_config(&config.errors, &config.flash)
        };

        Self {
            host: HostSource::Static(ldap.host.clone()),
            port: ldap.port,
            service: ldap
                .service_identity()
                .map(|(account, password)| ServiceIdentity::new(account, password)),
            base_dn: ldap.base_dn.clone(),
            filter: FilterBuilder::template(ldap.effective_user_filter()),
            attributes: ldap.attributes.clone(),
            diagnostics,
            timeout: Duration::from_secs(ldap.timeout_seconds),
            start_tls: ldap.start_tls,
            skip_tls_verify: ldap.skip_tls_verify,
        }
    }

    pub fn with_host_resolver<F>(mut self, resolve: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.host = HostSource::Resolver(Arc::new(resolve));
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_service_account(
        mut self,
        account: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.service = Some(ServiceIdentity::new(account, password));
        self
    }

    pub fn with_filter(mut self, filter: FilterBuilder) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticTable) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// DN used in direct-bind mode. The username is escaped as an RDN value
    /// so it cannot add RDNs of its own.
    pub fn synthesize_dn(&self, username: &str) -> String {
        format!("CN={},{}", ldap3::dn_escape(username), self.base_dn)
    }

    /// Resolve the host and build the connection target.
    ///
    /// A missing host is a configuration error.
    pub fn server_target(&self) -> Result<ServerTarget> {
        let host = self
            .host
            .resolve()
            .ok_or_else(|| Error::Config("LDAP server not specified".to_string()))?;

        Ok(ServerTarget {
            url: server_url(&host, self.port)?,
            timeout: self.timeout,
            start_tls: self.start_tls,
            skip_tls_verify: self.skip_tls_verify,
        })
    }
}

/// Resolved connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub url: String,
    pub timeout: Duration,
    pub start_tls: bool,
    pub skip_tls_verify: bool,
}

/// Turn a host name or LDAP URL plus optional port into a connection URL
pub fn server_url(host: &str, port: Option<u16>) -> Result<String> {
    let raw = if host.contains("://") {
        host.to_string()
    } else {
        format!("ldap://{}", host)
    };

    let mut url =
        Url::parse(&raw).map_err(|e| Error::Config(format!("Invalid LDAP host {}: {}", host, e)))?;

    match url.scheme() {
        "ldap" | "ldaps" => {
            if let Some(port) = port {
                url.set_port(Some(port))
                    .map_err(|_| Error::Config(format!("Cannot apply port {} to {}", port, host)))?;
            }
        }
        "ldapi" => {}
        other => {
            return Err(Error::Config(format!(
                "Unsupported LDAP scheme: {}",
                other
            )))
        }
    }

    Ok(url.to_string())
}

// ============================================================================
// Directory entries
// ============================================================================

/// One search result entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub dn: String,

    #[serde(default)]
    pub attributes: Attributes,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }
}

// ============================================================================
// Authentication result
// ============================================================================

/// Notice handed to the host application for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashNotice {
    pub message: String,
    pub key: String,
    pub element: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// One classified failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureDetail {
    /// Configured substring found in the diagnostic text
    pub code: String,
    pub notice: FlashNotice,
}

/// Failed attempt with zero or more classified details
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuthFailure {
    pub details: Vec<FailureDetail>,

    /// Raw server diagnostic; logs only, never shown to users
    #[serde(skip)]
    diagnostic: Option<String>,
}

impl AuthFailure {
    pub fn new(details: Vec<FailureDetail>, diagnostic: Option<String>) -> Self {
        Self {
            details,
            diagnostic,
        }
    }

    /// Bare failure with no user-facing message
    pub fn unclassified() -> Self {
        Self::default()
    }

    pub fn is_classified(&self) -> bool {
        !self.details.is_empty()
    }

    pub fn notices(&self) -> impl Iterator<Item = &FlashNotice> {
        self.details.iter().map(|d| &d.notice)
    }

    pub fn raw_diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }
}

/// Outcome of one authentication attempt
#[derive(Debug, Clone)]
pub enum AuthResult {
    /// Username or password absent; no bind was made
    NotAttempted,
    /// Credentials accepted
    Success(Attributes),
    /// Credentials rejected or directory error
    Failure(AuthFailure),
}

impl AuthResult {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthResult::Success(_))
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            AuthResult::Success(attributes) => Some(attributes),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&AuthFailure> {
        match self {
            AuthResult::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            AuthResult::NotAttempted => "not_attempted",
            AuthResult::Success(_) => "success",
            AuthResult::Failure(_) => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_template_escapes_username() {
        let filter = FilterBuilder::template("(sAMAccountName={username})");

        assert_eq!(filter.build("jdoe"), "(sAMAccountName=jdoe)");
        assert_eq!(filter.build("j*)(uid=*"), "(sAMAccountName=j\\2a\\29\\28uid=\\2a)");
    }

    #[test]
    fn test_custom_filter() {
        let filter = FilterBuilder::custom(|u| format!("(&(objectClass=person)(uid={}))", u));
        assert_eq!(filter.build("ann"), "(&(objectClass=person)(uid=ann))");
    }

    #[test]
    fn test_synthesize_dn() {
        let config = DirectoryConfig::new("dc01", "OU=Staff,DC=corp,DC=example,DC=com");
        assert_eq!(
            config.synthesize_dn("jdoe"),
            "CN=jdoe,OU=Staff,DC=corp,DC=example,DC=com"
        );
    }

    #[test]
    fn test_synthesize_dn_escapes_separators() {
        let config = DirectoryConfig::new("dc01", "DC=corp,DC=example,DC=com");

        assert_eq!(
            config.synthesize_dn("Doe, Jane"),
            "CN=Doe\\2c Jane,DC=corp,DC=example,DC=com"
        );
        assert_eq!(
            config.synthesize_dn("x,OU=Admins"),
            "CN=x\\2cOU\\3dAdmins,DC=corp,DC=example,DC=com"
        );
    }

    #[test]
    fn test_server_url_bare_host() {
        let url = server_url("ldap.example.com", None).unwrap();
        assert_eq!(Url::parse(&url).unwrap().host_str(), Some("ldap.example.com"));
        assert!(url.starts_with("ldap://"));
    }

    #[test]
    fn test_server_url_applies_port() {
        let url = server_url("ldaps://dc01.corp.example.com", Some(3269)).unwrap();
        let parsed = Url::parse(&url).unwrap();

        assert_eq!(parsed.scheme(), "ldaps");
        assert_eq!(parsed.port(), Some(3269));
    }

    #[test]
    fn test_server_url_rejects_other_schemes() {
        let err = server_url("https://ldap.example.com", None).unwrap_err();
        assert_eq!(err.code(), "ConfigError");
    }

    #[test]
    fn test_missing_host_target() {
        let config = DirectoryConfig::new("   ", "DC=example,DC=com");
        assert!(matches!(config.server_target(), Err(Error::Config(_))));

        let config = DirectoryConfig::new("ignored", "DC=example,DC=com").with_host_resolver(|| None);
        assert!(matches!(config.server_target(), Err(Error::Config(_))));
    }

    #[test]
    fn test_host_resolver() {
        let config = DirectoryConfig::new("", "DC=example,DC=com")
            .with_host_resolver(|| Some("ldap-b.example.com".to_string()))
            .with_port(1389);

        let target = config.server_target().unwrap();
        assert_eq!(Url::parse(&target.url).unwrap().port(), Some(1389));
        assert_eq!(target.timeout, Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS));
    }

    #[test]
    fn test_from_config() {
        let config = DirbindConfig::from_toml(
            r#"
[ldap]
host = "dc01"
bind_account = "CN=svc,DC=corp"
bind_password = "pw"
base_dn = "DC=corp"
server_type = "active_directory"
attributes = ["mail"]
"#,
        )
        .unwrap();

        let directory = DirectoryConfig::from_config(&config);

        assert_eq!(directory.service.as_ref().map(|s| s.account.as_str()), Some("CN=svc,DC=corp"));
        assert_eq!(directory.filter.build("jdoe"), "(sAMAccountName=jdoe)");
        assert_eq!(directory.attributes, vec!["mail"]);
        assert!(!directory.diagnostics.is_empty());
    }

    #[test]
    fn test_service_identity_debug_redacts_password() {
        let identity = ServiceIdentity::new("cn=svc", "hunter2");
        let rendered = format!("{:?}", identity);

        assert!(rendered.contains("cn=svc"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_failure_serialization_omits_diagnostic() {
        let failure = AuthFailure::new(Vec::new(), Some("80090308: LdapErr: data 52e".into()));
        let json = serde_json::to_string(&failure).unwrap();

        assert!(!json.contains("52e"));
        assert_eq!(failure.raw_diagnostic(), Some("80090308: LdapErr: data 52e"));
    }
}
