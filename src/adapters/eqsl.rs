use crate::adapters::http::{check_status, snippet};
use crate::adapters::{endpoint_url, resolve_link, strip_tags};
use crate::core::logbook::Logbook;
use crate::core::normalize::EQSL_FIELDS;
use crate::domain::model::{AdifFile, ExtraInfo, FetchFilter, Provider, VerifyRequest};
use crate::domain::ports::{Adapter, HttpRequest, HttpResponse, Transport};
use crate::utils::error::{QslError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_url};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

pub const DEFAULT_ENDPOINT: &str = "https://www.eqsl.cc/qslcard/";

const INBOX_PATH: &str = "DownloadInBox.cfm";
const OUTBOX_PATH: &str = "DownloadADIF.cfm";
const VERIFY_PATH: &str = "VerifyQSO.cfm";
const LAST_UPLOAD_PATH: &str = "DisplayLastUploadDate.cfm";
const AG_LIST_PATH: &str = "DownloadedFiles/AGMemberList.txt";
const AG_DATED_PATH: &str = "DownloadedFiles/AGMemberListDated.txt";
const MEMBER_LIST_PATH: &str = "../DownloadedFiles/eQSLMemberList.csv";

const ADIF_BUILT: &str = "Your ADIF log file has been built";
const NO_ENTRIES: &str = "You have no log entries";
const QSO_ON_FILE: &str = "Result - QSO on file";
const PARAMETER_MISSING: &str = "Parameter missing";
const LAST_UPLOAD_MARKER: &str = "Your last ADIF upload was";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqslCredentials {
    pub username: String,
    pub password: String,
    pub qth_nickname: Option<String>,
    pub endpoint: Option<String>,
}

/// Authenticity Guaranteed member list and the header line naming when it was generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgMembers {
    pub generated: String,
    pub callsigns: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgMembersDated {
    pub generated: String,
    pub last_upload: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub grid_square: String,
    pub authenticity_guaranteed: bool,
    pub last_upload: Option<String>,
}

fn adi_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)<A HREF="([^"]+)">\s*\.ADI file\s*</A>"#).expect("valid link regex")
    })
}

pub struct EqslAdapter {
    credentials: EqslCredentials,
    endpoint: String,
    transport: Arc<dyn Transport>,
}

impl EqslAdapter {
    pub fn new(credentials: EqslCredentials, transport: Arc<dyn Transport>) -> Result<Self> {
        EQSL_FIELDS.validate()?;
        validate_non_empty_string("eqsl.username", &credentials.username)?;
        validate_non_empty_string("eqsl.password", &credentials.password)?;
        let endpoint = credentials
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        validate_url("eqsl.endpoint", &endpoint)?;

        Ok(Self {
            credentials,
            endpoint,
            transport,
        })
    }

    fn authenticated(&self, path: &str) -> HttpRequest {
        let request = HttpRequest::get(endpoint_url(&self.endpoint, path))
            .query("UserName", &self.credentials.username)
            .query("Password", &self.credentials.password);
        match &self.credentials.qth_nickname {
            Some(nickname) => request.query("QTHNickname", nickname),
            None => request,
        }
    }

    /// eQSL reports login problems inside a 200 HTML page.
    fn rejected(response: &HttpResponse) -> QslError {
        let text = strip_tags(&response.body);
        if text.to_ascii_lowercase().contains("password") {
            QslError::auth(Provider::Eqsl, snippet(&text))
        } else {
            QslError::remote(Provider::Eqsl, Some(response.status), snippet(&text))
        }
    }

    /// The download pages build an ADI file server-side and link to it; fetch that link.
    fn download_built_log(&self, request: HttpRequest) -> Result<Logbook> {
        let response = self.transport.execute(Provider::Eqsl, &request)?;
        check_status(Provider::Eqsl, &response)?;

        if response.body.contains(NO_ENTRIES) {
            return Logbook::from_parsed(&EQSL_FIELDS, &self.credentials.username, AdifFile::default());
        }
        if !response.body.contains(ADIF_BUILT) {
            return Err(Self::rejected(&response));
        }
        let href = adi_link_pattern()
            .captures(&response.body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| QslError::remote(Provider::Eqsl, Some(response.status), "ADIF link missing from download page"))?;

        let link = resolve_link(&self.endpoint, href)?;
        tracing::debug!("eQSL: ADI file built at {link}");
        let adif = self.transport.execute(Provider::Eqsl, &HttpRequest::get(link))?;
        check_status(Provider::Eqsl, &adif)?;
        Logbook::assemble(Provider::Eqsl, &self.credentials.username, &adif.body)
    }

    /// Outgoing QSOs (the user's uploaded log) rather than received eQSLs.
    pub fn fetch_outbox(&self) -> Result<Logbook> {
        self.download_built_log(self.authenticated(OUTBOX_PATH))
    }

    fn public_text(transport: &dyn Transport, endpoint: Option<&str>, path: &str) -> Result<String> {
        let url = resolve_link(endpoint.unwrap_or(DEFAULT_ENDPOINT), path)?;
        let response = transport.execute(Provider::Eqsl, &HttpRequest::get(url))?;
        check_status(Provider::Eqsl, &response)?;
        Ok(response.body)
    }

    pub fn ag_members(transport: &dyn Transport, endpoint: Option<&str>) -> Result<AgMembers> {
        let body = Self::public_text(transport, endpoint, AG_LIST_PATH)?;
        let mut lines = body.lines();
        let generated = lines.next().unwrap_or_default().trim().to_string();
        let callsigns = lines
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Ok(AgMembers {
            generated,
            callsigns,
        })
    }

    pub fn ag_members_dated(transport: &dyn Transport, endpoint: Option<&str>) -> Result<AgMembersDated> {
        let body = Self::public_text(transport, endpoint, AG_DATED_PATH)?;
        let mut lines = body.lines();
        let generated = lines.next().unwrap_or_default().trim().to_string();

        let mut last_upload = BTreeMap::new();
        for line in lines.map(str::trim).filter(|l| !l.is_empty()) {
            let (call, date) = line
                .split_once(',')
                .ok_or_else(|| QslError::parse(format!("bad AG list line: {line}")))?;
            last_upload.insert(call.trim().to_string(), date.trim().to_string());
        }
        Ok(AgMembersDated {
            generated,
            last_upload,
        })
    }

    /// Full member directory keyed by callsign.
    pub fn member_list(transport: &dyn Transport, endpoint: Option<&str>) -> Result<BTreeMap<String, MemberInfo>> {
        let body = Self::public_text(transport, endpoint, MEMBER_LIST_PATH)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(body.as_bytes());

        let mut members = BTreeMap::new();
        for row in reader.records() {
            let row = row?;
            let Some(call) = row.get(0).map(str::trim).filter(|c| !c.is_empty()) else {
                continue;
            };
            let field = |i: usize| row.get(i).map(str::trim).unwrap_or_default();
            members.insert(
                call.to_string(),
                MemberInfo {
                    grid_square: field(1).to_string(),
                    authenticity_guaranteed: field(2).eq_ignore_ascii_case("Y"),
                    last_upload: Some(field(3)).filter(|d| !d.is_empty()).map(str::to_string),
                },
            );
        }
        Ok(members)
    }
}

impl Adapter for EqslAdapter {
    fn provider(&self) -> Provider {
        Provider::Eqsl
    }

    /// Received eQSLs (the inbox).
    fn fetch_logbook(&self, filter: &FetchFilter) -> Result<Logbook> {
        let mut request = self.authenticated(INBOX_PATH);
        if let Some(since) = filter.since {
            request = request.query("LimitDateLo", since.format("%m/%d/%Y").to_string());
        }
        if let Some(until) = filter.until {
            request = request.query("LimitDateHi", until.format("%m/%d/%Y").to_string());
        }
        if filter.confirmed_only {
            request = request.query("ConfirmedOnly", "1");
        }
        if filter.callsign.is_some() || filter.band.is_some() || filter.mode.is_some() || filter.max_records.is_some() {
            tracing::debug!("eQSL inbox filters by date and confirmation only, ignoring other options");
        }
        for (name, value) in &filter.extra {
            request = request.query(name, value);
        }

        self.download_built_log(request)
    }

    fn verify_confirmation(&self, verify: &VerifyRequest) -> Result<(bool, ExtraInfo)> {
        let mut request = HttpRequest::get(endpoint_url(&self.endpoint, VERIFY_PATH))
            .query("CallsignFrom", &verify.callsign_from)
            .query("CallsignTo", &verify.callsign_to)
            .query("QSOBand", &verify.band);
        if let Some(mode) = &verify.mode {
            request = request.query("QSOMode", mode);
        }
        if let Some(date) = verify.date {
            request = request.query("QSODate", date.format("%m/%d/%Y").to_string());
        }

        let response = self.transport.execute(Provider::Eqsl, &request)?;
        check_status(Provider::Eqsl, &response)?;
        let text = strip_tags(&response.body);

        if text.contains(QSO_ON_FILE) {
            let mut extra = ExtraInfo::new();
            let lower = text.to_ascii_lowercase();
            if lower.contains("not authenticity guaranteed") {
                extra.insert("authenticity_guaranteed".into(), "N".into());
            } else if lower.contains("authenticity guaranteed") {
                extra.insert("authenticity_guaranteed".into(), "Y".into());
            }
            extra.insert("message".into(), text);
            Ok((true, extra))
        } else if text.contains(PARAMETER_MISSING) {
            Err(QslError::remote(Provider::Eqsl, Some(response.status), snippet(&text)))
        } else {
            Ok((false, ExtraInfo::new()))
        }
    }

    /// Date of the account's last ADIF upload, as eQSL formats it (`DD-MMM-YYYY at HH:mm UTC`).
    fn last_upload(&self) -> Result<String> {
        let response = self
            .transport
            .execute(Provider::Eqsl, &self.authenticated(LAST_UPLOAD_PATH))?;
        check_status(Provider::Eqsl, &response)?;

        let Some(marker) = response.body.find(LAST_UPLOAD_MARKER) else {
            return Err(Self::rejected(&response));
        };
        let tail = &response.body[marker + LAST_UPLOAD_MARKER.len()..];
        let date = tail
            .split_once('(')
            .and_then(|(_, rest)| rest.split_once(')'))
            .map(|(date, _)| date.trim().to_string());
        date.ok_or_else(|| QslError::parse("last upload date not found in eQSL response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::stub::StubTransport;
    use crate::domain::model::{AwardQuery, Confirmation};
    use crate::utils::error::ErrorKind;
    use chrono::NaiveDate;

    const BUILT_PAGE: &str = r#"<HTML><BODY>
Your ADIF log file has been built.
<UL><LI><A HREF="../downloadedfiles/TE5T1234.adi">.ADI file</A></UL>
</BODY></HTML>"#;

    const INBOX_ADI: &str = "eQSL.cc DownloadInBox
<EOH>
<CALL:5>W1TJL<QSO_DATE:8>20240120<TIME_ON:4>1512<BAND:3>10M<MODE:3>USB<EQSL_QSL_RCVD:1>Y<EOR>
<CALL:5>K2ABC<QSO_DATE:8>20240121<TIME_ON:4>0000<BAND:3>20M<MODE:3>FT8<EQSL_QSL_RCVD:1>R<EOR>
";

    fn adapter(stub: StubTransport) -> (EqslAdapter, Arc<StubTransport>) {
        let stub = Arc::new(stub);
        let credentials = EqslCredentials {
            username: "TE5T".into(),
            password: "secret".into(),
            qth_nickname: Some("Home".into()),
            endpoint: Some("https://eqsl.test/qslcard/".into()),
        };
        (EqslAdapter::new(credentials, stub.clone()).unwrap(), stub)
    }

    #[test]
    fn test_inbox_follows_built_link() {
        let (eqsl, stub) = adapter(StubTransport::new().respond(200, BUILT_PAGE).respond(200, INBOX_ADI));
        let filter = FetchFilter::new()
            .since(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
            .confirmed_only();

        let log = eqsl.fetch_logbook(&filter).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].mode.as_str(), "SSB");
        assert_eq!(log.records()[0].confirmed, Confirmation::Confirmed);
        assert_eq!(log.records()[1].confirmed, Confirmation::NotConfirmed);

        let first = stub.request(0);
        assert_eq!(first.url, "https://eqsl.test/qslcard/DownloadInBox.cfm");
        assert_eq!(first.param("LimitDateLo"), Some("01/31/2024"));
        assert_eq!(first.param("ConfirmedOnly"), Some("1"));
        assert_eq!(first.param("QTHNickname"), Some("Home"));
        assert_eq!(stub.request(1).url, "https://eqsl.test/downloadedfiles/TE5T1234.adi");
    }

    #[test]
    fn test_outbox_uses_download_adif_page() {
        let (eqsl, stub) = adapter(StubTransport::new().respond(200, BUILT_PAGE).respond(200, INBOX_ADI));
        eqsl.fetch_outbox().unwrap();
        assert!(stub.request(0).url.ends_with("DownloadADIF.cfm"));
    }

    #[test]
    fn test_empty_inbox() {
        let (eqsl, stub) = adapter(StubTransport::new().respond(200, "<p>You have no log entries</p>"));
        let log = eqsl.fetch_logbook(&FetchFilter::new()).unwrap();
        assert!(log.is_empty());
        assert_eq!(stub.request_count(), 1);
    }

    #[test]
    fn test_bad_login() {
        let (eqsl, _) = adapter(StubTransport::new().respond(200, "<b>Error: No such Username/Password found</b>"));
        let err = eqsl.fetch_logbook(&FetchFilter::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_verify_on_file() {
        let page = "<HTML><BODY><H3>Result - QSO on file</H3><BR>Authenticity Guaranteed</BODY></HTML>";
        let (eqsl, stub) = adapter(StubTransport::new().respond(200, page));
        let request = VerifyRequest::new("ai5zk", "w1tjl", "10m")
            .mode("SSB")
            .date(NaiveDate::from_ymd_opt(2024, 1, 20).unwrap());

        let (confirmed, extra) = eqsl.verify_confirmation(&request).unwrap();

        assert!(confirmed);
        assert_eq!(extra.get("authenticity_guaranteed").map(String::as_str), Some("Y"));
        assert!(extra["message"].contains("QSO on file"));
        assert_eq!(stub.request(0).param("QSODate"), Some("01/20/2024"));
        assert_eq!(stub.request(0).param("UserName"), None);
    }

    #[test]
    fn test_verify_not_on_file_is_false_with_empty_extra() {
        let (eqsl, _) = adapter(StubTransport::new().respond(200, "Error - Result: QSO not on file"));
        let result = eqsl
            .verify_confirmation(&VerifyRequest::new("N5UP", "TEST", "160m"))
            .unwrap();
        assert_eq!(result, (false, ExtraInfo::new()));
    }

    #[test]
    fn test_verify_parameter_missing_is_an_error() {
        let (eqsl, _) = adapter(StubTransport::new().respond(200, "Error - Parameter missing: QSOBand"));
        let err = eqsl
            .verify_confirmation(&VerifyRequest::new("N5UP", "TEST", ""))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteService);
    }

    #[test]
    fn test_last_upload() {
        let page = "Your last ADIF upload was (05-Jan-2024 at 14:03 UTC)";
        let (eqsl, _) = adapter(StubTransport::new().respond(200, page));
        assert_eq!(eqsl.last_upload().unwrap(), "05-Jan-2024 at 14:03 UTC");
    }

    #[test]
    fn test_last_upload_ignores_parentheses_outside_the_sentence() {
        let page = "<HTML><TITLE>eQSL (Electronic QSL)</TITLE>\nYour last ADIF upload was (05-Jan-2024 at 14:03 UTC)\n<P>(c) eQSL.cc</P></HTML>";
        let (eqsl, _) = adapter(StubTransport::new().respond(200, page));
        assert_eq!(eqsl.last_upload().unwrap(), "05-Jan-2024 at 14:03 UTC");

        let (eqsl, _) = adapter(StubTransport::new().respond(200, "(x) Your last ADIF upload was never"));
        assert_eq!(eqsl.last_upload().unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_award_credit_is_unsupported() {
        let (eqsl, _) = adapter(StubTransport::new());
        let err = eqsl.award_credit(&AwardQuery::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_directory_lists() {
        let stub = StubTransport::new()
            .respond(200, "List generated 2024-01-01\r\nW1AW\r\nK1ABC\r\n")
            .respond(200, "List generated 2024-01-01\r\nW1AW, 2023-12-30\r\n")
            .respond(200, "Callsign,GridSquare,AG,LastUpload\r\nW1AW,FN31pr,Y,\r\nK1ABC,FN42,N,2023-10-01\r\n");

        let ag = EqslAdapter::ag_members(&stub, Some("https://eqsl.test/qslcard/")).unwrap();
        assert!(ag.callsigns.contains("W1AW"));
        assert!(!ag.callsigns.contains("WE3BS"));
        assert_eq!(ag.generated, "List generated 2024-01-01");

        let dated = EqslAdapter::ag_members_dated(&stub, Some("https://eqsl.test/qslcard/")).unwrap();
        assert_eq!(dated.last_upload["W1AW"], "2023-12-30");

        let members = EqslAdapter::member_list(&stub, Some("https://eqsl.test/qslcard/")).unwrap();
        let w1aw = &members["W1AW"];
        assert_eq!(w1aw.grid_square, "FN31pr");
        assert!(w1aw.authenticity_guaranteed);
        assert_eq!(w1aw.last_upload, None);
        assert_eq!(members["K1ABC"].last_upload.as_deref(), Some("2023-10-01"));

        assert_eq!(stub.request(0).url, "https://eqsl.test/qslcard/DownloadedFiles/AGMemberList.txt");
        assert_eq!(stub.request(2).url, "https://eqsl.test/DownloadedFiles/eQSLMemberList.csv");
    }
}
