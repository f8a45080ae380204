use crate::domain::model::Provider;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QslError {
    #[error("{provider} rejected the credentials: {message}")]
    Authentication { provider: Provider, message: String },

    #[error("{provider} request failed{}: {message}", status_suffix(.status))]
    RemoteService {
        provider: Provider,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} does not support {operation}")]
    UnsupportedOperation {
        provider: Provider,
        operation: &'static str,
    },

    #[error("Normalization error on field {field}: {reason}")]
    Normalization { field: String, reason: String },

    #[error("Cannot parse timestamp '{value}': {reason}")]
    TimestampParse { value: String, reason: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfig { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse error classification for callers that branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    RemoteService,
    UnsupportedOperation,
    Normalization,
    TimestampParse,
    Parse,
    Config,
}

impl QslError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QslError::Authentication { .. } => ErrorKind::Authentication,
            QslError::RemoteService { .. } => ErrorKind::RemoteService,
            QslError::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            QslError::Normalization { .. } => ErrorKind::Normalization,
            QslError::TimestampParse { .. } => ErrorKind::TimestampParse,
            QslError::Parse { .. } => ErrorKind::Parse,
            QslError::Io(_)
            | QslError::Config { .. }
            | QslError::MissingConfig { .. }
            | QslError::InvalidConfigValue { .. } => ErrorKind::Config,
        }
    }

    pub(crate) fn unsupported(provider: Provider, operation: &'static str) -> Self {
        QslError::UnsupportedOperation {
            provider,
            operation,
        }
    }

    pub(crate) fn remote(provider: Provider, status: Option<u16>, message: impl Into<String>) -> Self {
        QslError::RemoteService {
            provider,
            status,
            message: message.into(),
        }
    }

    pub(crate) fn auth(provider: Provider, message: impl Into<String>) -> Self {
        QslError::Authentication {
            provider,
            message: message.into(),
        }
    }

    pub(crate) fn missing_field(field: &str) -> Self {
        QslError::Normalization {
            field: field.to_string(),
            reason: "required field is absent or empty".to_string(),
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        QslError::Parse {
            message: message.into(),
        }
    }

    /// Wraps a transport failure so it surfaces as a remote service error for `provider`.
    pub fn from_transport(provider: Provider, err: reqwest::Error) -> Self {
        QslError::RemoteService {
            provider,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for QslError {
    fn from(err: csv::Error) -> Self {
        QslError::parse(format!("CSV: {err}"))
    }
}

impl From<quick_xml::Error> for QslError {
    fn from(err: quick_xml::Error) -> Self {
        QslError::parse(format!("XML: {err}"))
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, QslError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            QslError::unsupported(Provider::Lotw, "verify_confirmation").kind(),
            ErrorKind::UnsupportedOperation
        );
        assert_eq!(
            QslError::missing_field("CALL").kind(),
            ErrorKind::Normalization
        );
        assert_eq!(
            QslError::MissingConfig {
                field: "lotw.password".into()
            }
            .kind(),
            ErrorKind::Config
        );
    }

    #[test]
    fn test_remote_message_includes_status() {
        let err = QslError::remote(Provider::ClubLog, Some(500), "boom");
        assert_eq!(err.to_string(), "ClubLog request failed (HTTP 500): boom");

        let err = QslError::remote(Provider::Eqsl, None, "boom");
        assert_eq!(err.to_string(), "eQSL request failed: boom");
    }
}
