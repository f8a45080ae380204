use crate::core::logbook::Logbook;
use crate::domain::model::{AwardQuery, ExtraInfo, FetchFilter, Provider, VerifyRequest};
use crate::utils::error::{QslError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// File attached to a request; its presence turns the body into `multipart/form-data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// One outbound call. `query` goes on the URL, `form` becomes an urlencoded body
/// (or text parts, when a file is attached).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            file: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(url)
        }
    }

    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((name.to_string(), value.into()));
        self
    }

    pub fn form(mut self, name: &str, value: impl Into<String>) -> Self {
        self.form.push((name.to_string(), value.into()));
        self
    }

    pub fn file(mut self, field: &str, file_name: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.file = Some(FilePart {
            field: field.to_string(),
            file_name: file_name.to_string(),
            contents: contents.into(),
        });
        self
    }

    /// Value of a query or form parameter, for logging and tests.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .chain(self.form.iter())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Single-request HTTP collaborator. No retries.
pub trait Transport: Send + Sync {
    fn execute(&self, provider: Provider, request: &HttpRequest) -> Result<HttpResponse>;
}

/// Operation set shared by every provider. Members a provider's API lacks keep the
/// default body and report the gap without touching the network.
pub trait Adapter: Send + Sync {
    fn provider(&self) -> Provider;

    fn fetch_logbook(&self, filter: &FetchFilter) -> Result<Logbook>;

    fn verify_confirmation(&self, _request: &VerifyRequest) -> Result<(bool, ExtraInfo)> {
        Err(QslError::unsupported(self.provider(), "verify_confirmation"))
    }

    fn award_credit(&self, _query: &AwardQuery) -> Result<Logbook> {
        Err(QslError::unsupported(self.provider(), "award_credit"))
    }

    fn last_upload(&self) -> Result<String> {
        Err(QslError::unsupported(self.provider(), "last_upload"))
    }

    /// Submits a signed log (`.tq5`/`.tq8`) and returns the service's acceptance message.
    fn upload_logbook(&self, _file_name: &str, _contents: &[u8]) -> Result<String> {
        Err(QslError::unsupported(self.provider(), "upload_logbook"))
    }

    fn logbook_status(&self) -> Result<ExtraInfo> {
        Err(QslError::unsupported(self.provider(), "logbook_status"))
    }

    fn delete_records(&self, _logids: &[String]) -> Result<ExtraInfo> {
        Err(QslError::unsupported(self.provider(), "delete_records"))
    }

    fn lookup_callsign(&self, _callsign: &str) -> Result<ExtraInfo> {
        Err(QslError::unsupported(self.provider(), "lookup_callsign"))
    }

    fn lookup_dxcc(&self, _entity: &str) -> Result<ExtraInfo> {
        Err(QslError::unsupported(self.provider(), "lookup_dxcc"))
    }
}
