use crate::adapters::http::check_status;
use crate::core::logbook::Logbook;
use crate::core::normalize::CLUBLOG_FIELDS;
use crate::domain::model::{FetchFilter, Provider};
use crate::domain::ports::{Adapter, HttpRequest, Transport};
use crate::utils::error::Result;
use crate::utils::validation::{validate_non_empty_string, validate_url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_ENDPOINT: &str = "https://clublog.org/getadif.php";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClubLogCredentials {
    pub email: String,
    pub callsign: String,
    pub password: String,
    pub endpoint: Option<String>,
}

pub struct ClubLogAdapter {
    credentials: ClubLogCredentials,
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl ClubLogAdapter {
    pub fn new(credentials: ClubLogCredentials, transport: Arc<dyn Transport>) -> Result<Self> {
        CLUBLOG_FIELDS.validate()?;
        validate_non_empty_string("clublog.email", &credentials.email)?;
        validate_non_empty_string("clublog.callsign", &credentials.callsign)?;
        validate_non_empty_string("clublog.password", &credentials.password)?;
        let endpoint = credentials
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        validate_url("clublog.endpoint", &endpoint)?;

        Ok(Self {
            credentials,
            endpoint,
            transport,
        })
    }
}

impl Adapter for ClubLogAdapter {
    fn provider(&self) -> Provider {
        Provider::ClubLog
    }

    /// Downloads the whole log for the account's callsign. ClubLog takes no query options,
    /// only `extra` parameters are forwarded.
    fn fetch_logbook(&self, filter: &FetchFilter) -> Result<Logbook> {
        if filter.since.is_some()
            || filter.until.is_some()
            || filter.confirmed_only
            || filter.callsign.is_some()
            || filter.band.is_some()
            || filter.mode.is_some()
            || filter.max_records.is_some()
        {
            tracing::debug!("ClubLog getadif takes no filters, ignoring fetch options");
        }

        let mut request = HttpRequest::post(&self.endpoint)
            .form("email", &self.credentials.email)
            .form("password", &self.credentials.password)
            .form("call", &self.credentials.callsign);
        for (name, value) in &filter.extra {
            request = request.form(name, value);
        }

        let response = self.transport.execute(Provider::ClubLog, &request)?;
        check_status(Provider::ClubLog, &response)?;
        Logbook::assemble(Provider::ClubLog, &self.credentials.callsign, &response.body)
    }
}
