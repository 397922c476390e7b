//! Error types for Dirbind

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Construction-time errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unable to connect to LDAP server: {0}")]
    Connect(String),

    // Bind errors
    #[error("Bind rejected for {dn} with result code {rc}")]
    BindRejected { dn: String, rc: u32 },

    #[error("Bind refused: distinguished name could not be resolved")]
    UnresolvedDn,

    // Search errors
    #[error("Search under {base_dn} failed with result code {rc}")]
    SearchFailed { base_dn: String, rc: u32 },

    #[error("No entry matched the search")]
    NotFound,

    // Transport errors
    #[error("LDAP protocol error: {0}")]
    Protocol(String),

    #[error("Connection already closed")]
    ConnectionClosed,
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::Connect(_) => "ConnectError",
            Error::BindRejected { .. } | Error::UnresolvedDn => "BindFailure",
            Error::SearchFailed { .. } => "SearchFailure",
            Error::NotFound => "NotFoundError",
            Error::Protocol(_) => "ProtocolError",
            Error::ConnectionClosed => "ConnectionClosed",
        }
    }

    /// Fatal errors stop authentication setup; everything else is recovered
    /// into a failed attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Connect(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::Config("missing host".into()).code(), "ConfigError");
        assert_eq!(Error::UnresolvedDn.code(), "BindFailure");
        assert_eq!(
            Error::BindRejected {
                dn: "cn=x".into(),
                rc: 49
            }
            .code(),
            "BindFailure"
        );
        assert_eq!(Error::NotFound.code(), "NotFoundError");
    }

    #[test]
    fn test_fatality() {
        assert!(Error::Config("x".into()).is_fatal());
        assert!(Error::Connect("refused".into()).is_fatal());
        assert!(!Error::NotFound.is_fatal());
        assert!(!Error::Protocol("reset".into()).is_fatal());
    }

    #[test]
    fn test_bind_display_has_no_diagnostic() {
        let err = Error::BindRejected {
            dn: "CN=jdoe,DC=corp".into(),
            rc: 49,
        };
        assert_eq!(
            err.to_string(),
            "Bind rejected for CN=jdoe,DC=corp with result code 49"
        );
    }
}
