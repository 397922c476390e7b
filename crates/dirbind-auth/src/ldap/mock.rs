//! Scripted in-memory directory for flow tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dirbind_core::{Error, Result};

use super::connection::{Connector, DirectoryConnection};
use super::types::{DirectoryEntry, ServerTarget};

/// Operation observed by the scripted directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Bind(String),
    Search { base_dn: String, filter: String },
    Read(String),
    Close,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

#[derive(Default)]
pub struct ScriptedConnection {
    accounts: HashMap<String, String>,
    bind_diagnostics: HashMap<String, String>,
    search_results: HashMap<String, Vec<DirectoryEntry>>,
    search_diagnostic: Option<String>,
    entries: HashMap<String, DirectoryEntry>,
    last_diagnostic: Option<String>,
    closed: bool,
    calls: CallLog,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account that binds with exactly this password
    pub fn with_account(mut self, dn: &str, password: &str) -> Self {
        self.accounts.insert(dn.to_string(), password.to_string());
        self
    }

    /// Diagnostic text produced by a failed bind as `dn`
    pub fn with_bind_diagnostic(mut self, dn: &str, diagnostic: &str) -> Self {
        self.bind_diagnostics
            .insert(dn.to_string(), diagnostic.to_string());
        self
    }

    pub fn with_search_result(mut self, filter: &str, entries: Vec<DirectoryEntry>) -> Self {
        for entry in &entries {
            self.entries.insert(entry.dn.clone(), entry.clone());
        }
        self.search_results.insert(filter.to_string(), entries);
        self
    }

    pub fn with_entry(mut self, entry: DirectoryEntry) -> Self {
        self.entries.insert(entry.dn.clone(), entry);
        self
    }

    /// Every search fails with this diagnostic
    pub fn with_failing_search(mut self, diagnostic: &str) -> Self {
        self.search_diagnostic = Some(diagnostic.to_string());
        self
    }

    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    fn log(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DirectoryConnection for ScriptedConnection {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.ensure_open()?;
        self.log(Call::Bind(dn.to_string()));

        if self.accounts.get(dn).map(String::as_str) == Some(password) {
            self.last_diagnostic = None;
            return Ok(());
        }

        self.last_diagnostic = self.bind_diagnostics.get(dn).cloned();
        Err(Error::BindRejected {
            dn: dn.to_string(),
            rc: 49,
        })
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        _attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>> {
        self.ensure_open()?;
        self.log(Call::Search {
            base_dn: base_dn.to_string(),
            filter: filter.to_string(),
        });

        if let Some(diagnostic) = &self.search_diagnostic {
            self.last_diagnostic = Some(diagnostic.clone());
            return Err(Error::SearchFailed {
                base_dn: base_dn.to_string(),
                rc: 1,
            });
        }

        Ok(self.search_results.get(filter).cloned().unwrap_or_default())
    }

    async fn read_entry(&mut self, dn: &str, _attributes: &[String]) -> Result<DirectoryEntry> {
        self.ensure_open()?;
        self.log(Call::Read(dn.to_string()));

        self.entries.get(dn).cloned().ok_or(Error::NotFound)
    }

    fn last_diagnostic_message(&self) -> Option<&str> {
        self.last_diagnostic.as_deref()
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) {
        if !self.closed {
            self.log(Call::Close);
        }
        self.closed = true;
    }
}

/// Hands out one prepared connection and counts open attempts
pub struct ScriptedConnector {
    connection: Mutex<Option<ScriptedConnection>>,
    opens: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(connection: ScriptedConnection) -> Self {
        Self {
            connection: Mutex::new(Some(connection)),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn open(&self, target: &ServerTarget) -> Result<Self::Connection> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        self.connection
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| Error::Connect(format!("{}: no scripted connection left", target.url)))
    }
}
