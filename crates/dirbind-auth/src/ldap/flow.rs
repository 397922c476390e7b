//! Two-phase bind authentication
//!
//! 1. bind as the service identity (when configured) and search for the user
//! 2. rebind with the user's DN and password
//!
//! Without a service identity the DN is synthesized as `CN=<username>,<base DN>`.
//! A failed service bind or an empty search does not abort the attempt: the
//! user bind then runs with an unresolved DN and fails, and the failure is
//! classified from whatever diagnostic the connection holds.
//!
//! Log lines carry outcomes and error codes only, never the username or
//! anything derived from it (filter, user DN).

use std::sync::Arc;

use dirbind_core::{Error, Result};
use tracing::{debug, info, warn};

use super::connection::{
    first_entry_dn, Connector, DirectoryConnection, LdapConnector, LdapDirectoryConnection,
};
use super::types::{
    Attributes, AuthFailure, AuthResult, DirectoryConfig, DirectoryEntry, ServiceIdentity,
};

/// Bind target resolved in the first phase
enum BindTarget {
    /// Entry found by the service search
    Entry(DirectoryEntry),
    /// DN synthesized in direct-bind mode
    Dn(String),
    Unresolved,
}

/// One connection, one attempt at a time
pub struct AuthenticationFlow<C: DirectoryConnection = LdapDirectoryConnection> {
    config: Arc<DirectoryConfig>,
    connection: C,
}

impl AuthenticationFlow<LdapDirectoryConnection> {
    /// Resolve the host and connect with `ldap3`
    pub async fn connect(config: Arc<DirectoryConfig>) -> Result<Self> {
        Self::open(config, &LdapConnector).await
    }
}

impl<C: DirectoryConnection> AuthenticationFlow<C> {
    /// Construct the flow. A missing host fails with a configuration error
    /// before any connection is attempted.
    pub async fn open<K>(config: Arc<DirectoryConfig>, connector: &K) -> Result<Self>
    where
        K: Connector<Connection = C>,
    {
        let target = config.server_target()?;
        let connection = connector.open(&target).await?;

        debug!("LDAP authentication flow ready for {}", target.url);

        Ok(Self { config, connection })
    }

    pub fn with_connection(config: Arc<DirectoryConfig>, connection: C) -> Self {
        Self { config, connection }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Authenticate a user.
    ///
    /// Absent or empty credentials are never sent to the directory: some
    /// servers accept an empty password as an anonymous bind.
    pub async fn authenticate(
        &mut self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> AuthResult {
        let (username, password) = match (username, password) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => (u, p),
            _ => {
                debug!("Incomplete credentials, authentication not attempted");
                return AuthResult::NotAttempted;
            }
        };

        match self.bind_user(username, password).await {
            Ok(attributes) => {
                info!("LDAP authentication succeeded");
                AuthResult::Success(attributes)
            }
            Err(e) => {
                warn!("LDAP authentication failed: {}", e.code());
                AuthResult::Failure(self.classify())
            }
        }
    }

    /// Release the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        self.connection.close().await;
    }

    async fn bind_user(&mut self, username: &str, password: &str) -> Result<Attributes> {
        let config = Arc::clone(&self.config);

        let target = match &config.service {
            Some(service) => {
                let filter = config.filter.build(username);
                match self.resolve_entry(service, &filter).await {
                    Ok(entry) => BindTarget::Entry(entry),
                    Err(e) => {
                        debug!("User entry not resolved: {}", e.code());
                        BindTarget::Unresolved
                    }
                }
            }
            None => BindTarget::Dn(config.synthesize_dn(username)),
        };

        match target {
            BindTarget::Entry(entry) => {
                self.user_bind(&entry.dn, password).await?;
                Ok(entry.attributes)
            }
            BindTarget::Dn(dn) => {
                self.user_bind(&dn, password).await?;
                let entry = self.connection.read_entry(&dn, &config.attributes).await?;
                Ok(entry.attributes)
            }
            BindTarget::Unresolved => self.user_bind("", password).await.map(|_| Attributes::new()),
        }
    }

    async fn resolve_entry(
        &mut self,
        service: &ServiceIdentity,
        filter: &str,
    ) -> Result<DirectoryEntry> {
        if let Err(e) = self.connection.bind(&service.account, &service.password).await {
            warn!("Service bind as {} failed: {}", service.account, e.code());
            return Err(e);
        }

        let mut entries = self
            .connection
            .search(&self.config.base_dn, filter, &self.config.attributes)
            .await?;

        first_entry_dn(&entries)?;
        if entries.len() > 1 {
            warn!("User filter matched {} entries, using the first", entries.len());
        }

        Ok(entries.swap_remove(0))
    }

    /// The credential check. An empty DN is refused locally: sent to the
    /// server it would be an unauthenticated bind.
    async fn user_bind(&mut self, dn: &str, password: &str) -> Result<()> {
        if dn.is_empty() {
            return Err(Error::UnresolvedDn);
        }

        self.connection.bind(dn, password).await
    }

    fn classify(&self) -> AuthFailure {
        let diagnostic = self
            .connection
            .last_diagnostic_message()
            .filter(|text| !text.is_empty());

        let Some(text) = diagnostic else {
            return AuthFailure::unclassified();
        };

        warn!("Directory diagnostic: {}", text);

        let details = self.config.diagnostics.classify(Some(text));
        if details.is_empty() {
            debug!("No configured message matches the diagnostic");
        }

        AuthFailure::new(details, Some(text.to_string()))
    }
}

/// Open a connection, authenticate once and close it on every path
pub async fn authenticate_once<K>(
    connector: &K,
    config: Arc<DirectoryConfig>,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<AuthResult>
where
    K: Connector,
{
    let mut flow = AuthenticationFlow::open(config, connector).await?;
    let result = flow.authenticate(username, password).await;
    flow.close().await;

    Ok(result)
}
