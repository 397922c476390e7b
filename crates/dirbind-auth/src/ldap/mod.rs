//! LDAP/Active Directory authentication module
//!
//! Two-phase bind against a directory server:
//! - optional service-account bind and user search
//! - rebind with the user's DN and password
//! - classification of failed binds from the server diagnostic text

mod classify;
mod connection;
mod flow;
mod types;

#[cfg(test)]
mod mock;

pub use classify::{DiagnosticRule, DiagnosticTable};
pub use connection::{
    first_entry_dn, BindState, Connector, DirectoryConnection, LdapConnector,
    LdapDirectoryConnection,
};
pub use flow::{authenticate_once, AuthenticationFlow};
pub use types::*;
