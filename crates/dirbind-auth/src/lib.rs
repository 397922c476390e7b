//! LDAP credential authentication for Dirbind

pub mod ldap;

pub use ldap::{
    authenticate_once, first_entry_dn, Attributes, AuthFailure, AuthResult, AuthenticationFlow,
    BindState, Connector, DiagnosticRule, DiagnosticTable, DirectoryConfig, DirectoryConnection,
    DirectoryEntry, FailureDetail, FilterBuilder, FlashNotice, HostSource, LdapConnector,
    LdapDirectoryConnection, ServerTarget, ServiceIdentity,
};
