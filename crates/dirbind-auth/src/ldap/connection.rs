//! LDAP connection primitives
//!
//! One connection per authentication attempt. A bind changes the identity of
//! the whole connection, so a handle is never shared between attempts.

use std::time::Duration;

use async_trait::async_trait;
use dirbind_core::{Error, Result, LDAP_PROTOCOL_VERSION};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Scope, SearchEntry, SearchResult};
use tracing::{debug, warn};

use super::types::{DirectoryEntry, ServerTarget};

/// Upper bound for the unbind sent on close
const UNBIND_TIMEOUT: Duration = Duration::from_secs(2);

/// Raw bind/search operations on one directory connection
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Simple bind; succeeds only on result code 0
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()>;

    /// Subtree search below `base_dn`
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>>;

    /// Base-scope read of a single entry
    async fn read_entry(&mut self, dn: &str, attributes: &[String]) -> Result<DirectoryEntry>;

    /// Server diagnostic text of the most recent failed operation
    fn last_diagnostic_message(&self) -> Option<&str>;

    fn is_closed(&self) -> bool;

    /// Unbind and release the transport. Idempotent, never fails.
    async fn close(&mut self);
}

/// Opens connections for a resolved server target
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: DirectoryConnection;

    async fn open(&self, target: &ServerTarget) -> Result<Self::Connection>;
}

/// DN of the first entry of a search result
pub fn first_entry_dn(entries: &[DirectoryEntry]) -> Result<&str> {
    entries
        .first()
        .map(|entry| entry.dn.as_str())
        .ok_or(Error::NotFound)
}

/// Identity the connection is currently authenticated as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindState {
    Unbound,
    Bound(String),
    Closed,
}

/// Connector backed by `ldap3`
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

#[async_trait]
impl Connector for LdapConnector {
    type Connection = LdapDirectoryConnection;

    async fn open(&self, target: &ServerTarget) -> Result<Self::Connection> {
        LdapDirectoryConnection::open(target).await
    }
}

/// `ldap3` connection handle
pub struct LdapDirectoryConnection {
    ldap: Option<Ldap>,
    url: String,
    state: BindState,
    last_diagnostic: Option<String>,
}

impl LdapDirectoryConnection {
    /// Connect to the server.
    ///
    /// `ldap3` only speaks protocol version 3 and never chases referrals, so
    /// the only option to apply here is the connect timeout (plus TLS).
    pub async fn open(target: &ServerTarget) -> Result<Self> {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(target.timeout)
            .set_starttls(target.start_tls);

        if target.skip_tls_verify {
            settings = settings.set_no_tls_verify(true);
        }

        debug!(
            "Connecting to LDAP server: {} (protocol v{})",
            target.url, LDAP_PROTOCOL_VERSION
        );

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &target.url)
            .await
            .map_err(|e| Error::Connect(format!("{}: {}", target.url, e)))?;

        ldap3::drive!(conn);

        Ok(Self {
            ldap: Some(ldap),
            url: target.url.clone(),
            state: BindState::Unbound,
            last_diagnostic: None,
        })
    }

    pub fn state(&self) -> &BindState {
        &self.state
    }

    fn handle(&mut self) -> Result<&mut Ldap> {
        self.ldap.as_mut().ok_or(Error::ConnectionClosed)
    }

    fn record_diagnostic(&mut self, result: &LdapResult) {
        self.last_diagnostic = if result.text.is_empty() {
            None
        } else {
            Some(result.text.clone())
        };
    }
}

#[async_trait]
impl DirectoryConnection for LdapDirectoryConnection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        let result = self.handle()?.simple_bind(dn, password).await;

        match result {
            Ok(res) if res.rc == 0 => {
                debug!("Bind to {} succeeded", self.url);
                self.state = BindState::Bound(dn.to_string());
                self.last_diagnostic = None;
                Ok(())
            }
            Ok(res) => {
                self.state = BindState::Unbound;
                self.record_diagnostic(&res);
                Err(Error::BindRejected {
                    dn: dn.to_string(),
                    rc: res.rc,
                })
            }
            Err(e) => {
                self.state = BindState::Unbound;
                self.last_diagnostic = None;
                Err(Error::Protocol(format!("Bind failed: {}", e)))
            }
        }
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>> {
        debug!("Searching {}", base_dn);

        let result = self
            .handle()?
            .search(base_dn, Scope::Subtree, filter, attributes.to_vec())
            .await;

        match result {
            Ok(SearchResult(entries, res)) if res.rc == 0 => Ok(entries
                .into_iter()
                .filter(|entry| !entry.is_ref())
                .map(|entry| DirectoryEntry::from(SearchEntry::construct(entry)))
                .collect()),
            Ok(SearchResult(_, res)) => {
                self.record_diagnostic(&res);
                Err(Error::SearchFailed {
                    base_dn: base_dn.to_string(),
                    rc: res.rc,
                })
            }
            Err(e) => Err(Error::Protocol(format!("Search failed: {}", e))),
        }
    }

    async fn read_entry(&mut self, dn: &str, attributes: &[String]) -> Result<DirectoryEntry> {
        let result = self
            .handle()?
            .search(dn, Scope::Base, "(objectClass=*)", attributes.to_vec())
            .await;

        match result {
            Ok(SearchResult(entries, res)) if res.rc == 0 => entries
                .into_iter()
                .find(|entry| !entry.is_ref())
                .map(|entry| DirectoryEntry::from(SearchEntry::construct(entry)))
                .ok_or(Error::NotFound),
            Ok(SearchResult(_, res)) => {
                self.record_diagnostic(&res);
                Err(Error::SearchFailed {
                    base_dn: dn.to_string(),
                    rc: res.rc,
                })
            }
            Err(e) => Err(Error::Protocol(format!("Read of {} failed: {}", dn, e))),
        }
    }

    fn last_diagnostic_message(&self) -> Option<&str> {
        self.last_diagnostic.as_deref()
    }

    fn is_closed(&self) -> bool {
        self.state == BindState::Closed
    }

    async fn close(&mut self) {
        if let Some(mut ldap) = self.ldap.take() {
            match tokio::time::timeout(UNBIND_TIMEOUT, ldap.unbind()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Unbind from {} failed: {}", self.url, e),
                Err(_) => warn!("Unbind from {} timed out", self.url),
            }
            debug!("Closed LDAP connection to {}", self.url);
        }
        self.state = BindState::Closed;
    }
}

impl From<SearchEntry> for DirectoryEntry {
    fn from(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs,
        }
    }
}
