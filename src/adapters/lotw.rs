use crate::adapters::endpoint_url;
use crate::adapters::http::{check_status, snippet};
use crate::core::logbook::Logbook;
use crate::core::normalize::{parse_combined, LOTW_FIELDS};
use crate::domain::model::{AwardQuery, FetchFilter, Provider};
use crate::domain::ports::{Adapter, HttpRequest, HttpResponse, Transport};
use crate::utils::error::{QslError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_url};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_ENDPOINT: &str = "https://lotw.arrl.org/";

const REPORT_PATH: &str = "lotwuser/lotwreport.adi";
const DXCC_PATH: &str = "lotwuser/logbook/qslcards.php";
const ACTIVITY_PATH: &str = "lotw-user-activity.csv";
const UPLOAD_PATH: &str = "lotw/upload";
const UPLOAD_RESULT: &str = "<!-- .UPL.";
const UPLOAD_MESSAGE: &str = "<!-- .UPLMESSAGE.";
const DXCC_BANNER: &str = "ARRL Logbook of the World DXCC QSL Card Report";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotwCredentials {
    pub callsign: String,
    pub password: String,
    pub endpoint: Option<String>,
}

/// Last upload time of one LoTW user, from the public activity list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserActivity {
    pub callsign: String,
    pub last_upload: DateTime<Utc>,
}

pub struct LotwAdapter {
    credentials: LotwCredentials,
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl LotwAdapter {
    pub fn new(credentials: LotwCredentials, transport: Arc<dyn Transport>) -> Result<Self> {
        LOTW_FIELDS.validate()?;
        validate_non_empty_string("lotw.callsign", &credentials.callsign)?;
        validate_non_empty_string("lotw.password", &credentials.password)?;
        let endpoint = credentials
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        validate_url("lotw.endpoint", &endpoint)?;

        Ok(Self {
            credentials,
            endpoint,
            transport,
        })
    }

    fn authenticated(&self, path: &str) -> HttpRequest {
        HttpRequest::get(endpoint_url(&self.endpoint, path))
            .query("login", &self.credentials.callsign)
            .query("password", &self.credentials.password)
    }

    /// LoTW answers bad credentials with an HTML page and status 200.
    fn rejected(response: &HttpResponse) -> QslError {
        if response.body.to_ascii_lowercase().contains("password") {
            QslError::auth(Provider::Lotw, "username/password incorrect")
        } else {
            QslError::remote(Provider::Lotw, Some(response.status), snippet(&response.body))
        }
    }

    /// Public list of LoTW users and the time of their last upload. No credentials needed.
    pub fn user_activity(transport: &dyn Transport, endpoint: Option<&str>) -> Result<Vec<UserActivity>> {
        let url = endpoint_url(endpoint.unwrap_or(DEFAULT_ENDPOINT), ACTIVITY_PATH);
        let response = transport.execute(Provider::Lotw, &HttpRequest::get(url))?;
        check_status(Provider::Lotw, &response)?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(response.body.as_bytes());

        let mut users = Vec::new();
        for row in reader.records() {
            let row = row?;
            let (Some(call), Some(date), Some(time)) = (row.get(0), row.get(1), row.get(2)) else {
                return Err(QslError::parse(format!("short activity row: {row:?}")));
            };
            users.push(UserActivity {
                callsign: call.trim().to_ascii_uppercase(),
                last_upload: parse_combined(&format!("{} {}", date.trim(), time.trim()))?,
            });
        }
        Ok(users)
    }
}

/// Text of the first `<!-- TAG ... -->` comment.
fn upload_comment<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let rest = &body[body.find(tag)? + tag.len()..];
    rest.find("-->").map(|end| rest[..end].trim())
}

impl Adapter for LotwAdapter {
    fn provider(&self) -> Provider {
        Provider::Lotw
    }

    fn fetch_logbook(&self, filter: &FetchFilter) -> Result<Logbook> {
        let mut request = self
            .authenticated(REPORT_PATH)
            .query("qso_query", "1")
            .query("qso_qsl", if filter.confirmed_only { "yes" } else { "no" });

        if let Some(since) = filter.since {
            request = request.query("qso_startdate", since.format("%Y-%m-%d").to_string());
        }
        if let Some(until) = filter.until {
            request = request.query("qso_enddate", until.format("%Y-%m-%d").to_string());
        }
        if let Some(call) = &filter.callsign {
            request = request.query("qso_callsign", call);
        }
        if let Some(band) = &filter.band {
            request = request.query("qso_band", band);
        }
        if let Some(mode) = &filter.mode {
            request = request.query("qso_mode", mode);
        }
        if filter.max_records.is_some() {
            tracing::debug!("LoTW has no record limit parameter, ignoring max_records");
        }
        for (name, value) in &filter.extra {
            request = request.query(name, value);
        }

        let response = self.transport.execute(Provider::Lotw, &request)?;
        check_status(Provider::Lotw, &response)?;
        if !response.body.to_ascii_lowercase().contains("<eoh>") {
            return Err(Self::rejected(&response));
        }
        Logbook::assemble(Provider::Lotw, &self.credentials.callsign, &response.body)
    }

    /// Posts a signed log without login parameters. The result page reports through HTML comments.
    fn upload_logbook(&self, file_name: &str, contents: &[u8]) -> Result<String> {
        let request = HttpRequest::post(endpoint_url(&self.endpoint, UPLOAD_PATH))
            .file("upfile", file_name, contents);
        let response = self.transport.execute(Provider::Lotw, &request)?;
        check_status(Provider::Lotw, &response)?;

        let (Some(result), Some(message)) = (
            upload_comment(&response.body, UPLOAD_RESULT),
            upload_comment(&response.body, UPLOAD_MESSAGE),
        ) else {
            return Err(QslError::remote(
                Provider::Lotw,
                Some(response.status),
                snippet(&response.body),
            ));
        };
        tracing::debug!("LoTW upload of {file_name}: {result}");

        if result.to_ascii_lowercase().contains("rejected") {
            Err(QslError::remote(Provider::Lotw, Some(response.status), message))
        } else {
            Ok(message.to_string())
        }
    }

    /// Granted DXCC credit (not presumed credit), optionally for one entity or award account.
    fn award_credit(&self, query: &AwardQuery) -> Result<Logbook> {
        let mut request = self.authenticated(DXCC_PATH);
        if let Some(entity) = query.entity {
            request = request.query("entity", entity.to_string());
        }
        if let Some(account) = &query.account {
            request = request.query("ac_acct", account);
        }

        let response = self.transport.execute(Provider::Lotw, &request)?;
        check_status(Provider::Lotw, &response)?;
        if !response.body.trim_start().starts_with(DXCC_BANNER) {
            return Err(Self::rejected(&response));
        }
        Logbook::assemble(Provider::Lotw, &self.credentials.callsign, &response.body)
    }
}
