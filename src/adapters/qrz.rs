//! QRZ.com: the logbook API (API key, form POST, `KEY=VALUE&...` answers carrying
//! HTML-escaped ADIF) and the XML callsign database (username/password login per call).

use crate::adapters::http::{check_status, snippet, USER_AGENT};
use crate::core::logbook::Logbook;
use crate::core::normalize::QRZ_FIELDS;
use crate::domain::model::{AdifFile, ExtraInfo, FetchFilter, Provider};
use crate::domain::ports::{Adapter, HttpRequest, Transport};
use crate::utils::error::{QslError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_url};
use chrono::Utc;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_LOGBOOK_ENDPOINT: &str = "https://logbook.qrz.com/api";
pub const DEFAULT_XML_ENDPOINT: &str = "https://xmldata.qrz.com/xml/current/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrzCredentials {
    /// Logbook API key.
    pub api_key: Option<String>,
    /// XML database login.
    pub username: Option<String>,
    pub password: Option<String>,
    pub logbook_endpoint: Option<String>,
    pub xml_endpoint: Option<String>,
}

pub struct QrzAdapter {
    credentials: QrzCredentials,
    logbook_endpoint: String,
    xml_endpoint: String,
    transport: Arc<dyn Transport>,
}

/// Splits a logbook API answer into its key/value pairs and the trailing ADIF payload.
/// ADIF is always the last key and may itself contain `&` and `=`.
pub fn parse_logbook_response(body: &str) -> Result<(ExtraInfo, Option<String>)> {
    let body = body.trim();
    let adif_at = if body.starts_with("ADIF=") {
        Some(0)
    } else {
        body.find("&ADIF=").map(|i| i + 1)
    };
    let (head, adif) = match adif_at {
        Some(at) => (&body[..at], Some(html_unescape(&body[at + "ADIF=".len()..])?)),
        None => (body, None),
    };

    let info = url::form_urlencoded::parse(head.trim_end_matches('&').as_bytes())
        .map(|(k, v)| Ok((k.into_owned(), html_unescape(&v)?)))
        .collect::<Result<ExtraInfo>>()?;
    Ok((info, adif))
}

/// Named and numeric character references (`&lt;`, `&#039;`, `&#xE9;`).
fn html_unescape(text: &str) -> Result<String> {
    unescape(text)
        .map(|text| text.into_owned())
        .map_err(|e| QslError::parse(format!("QRZ entity decoding: {e}")))
}

/// Leaf elements of the first `<section>` element, or `None` when it is absent.
fn xml_section(xml: &str, section: &str) -> Result<Option<ExtraInfo>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut fields: Option<ExtraInfo> = None;
    let mut current: Option<String> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if fields.is_none() && name.eq_ignore_ascii_case(section) {
                    fields = Some(ExtraInfo::new());
                } else if fields.is_some() {
                    current = Some(name);
                }
            }
            Event::Text(t) => {
                if let (Some(fields), Some(key)) = (fields.as_mut(), current.as_ref()) {
                    let text = t.unescape().map_err(|e| QslError::parse(format!("XML: {e}")))?;
                    fields.insert(key.clone(), text.into_owned());
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if current.as_deref() == Some(name.as_str()) {
                    current = None;
                } else if fields.is_some() && name.eq_ignore_ascii_case(section) {
                    return Ok(fields);
                }
            }
            Event::Eof => return Ok(fields),
            _ => {}
        }
    }
}

impl QrzAdapter {
    pub fn new(credentials: QrzCredentials, transport: Arc<dyn Transport>) -> Result<Self> {
        QRZ_FIELDS.validate()?;
        if credentials.api_key.is_none() && credentials.username.is_none() {
            return Err(QslError::MissingConfig {
                field: "qrz.api_key or qrz.username".to_string(),
            });
        }
        if let Some(key) = &credentials.api_key {
            validate_non_empty_string("qrz.api_key", key)?;
        }
        if let Some(username) = &credentials.username {
            validate_non_empty_string("qrz.username", username)?;
        }

        let logbook_endpoint = credentials
            .logbook_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_LOGBOOK_ENDPOINT.to_string());
        let xml_endpoint = credentials
            .xml_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_XML_ENDPOINT.to_string());
        validate_url("qrz.logbook_endpoint", &logbook_endpoint)?;
        validate_url("qrz.xml_endpoint", &xml_endpoint)?;

        Ok(Self {
            credentials,
            logbook_endpoint,
            xml_endpoint,
            transport,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.credentials
            .api_key
            .as_deref()
            .ok_or_else(|| QslError::MissingConfig {
                field: "qrz.api_key".to_string(),
            })
    }

    fn logbook_call(&self, action: &str, extra: &[(&str, String)]) -> Result<(ExtraInfo, Option<String>)> {
        let mut request = HttpRequest::post(&self.logbook_endpoint)
            .form("KEY", self.api_key()?)
            .form("ACTION", action);
        for (name, value) in extra {
            request = request.form(name, value.clone());
        }

        let response = self.transport.execute(Provider::Qrz, &request)?;
        check_status(Provider::Qrz, &response)?;
        let (info, adif) = parse_logbook_response(&response.body)?;

        let reason = info.get("REASON").cloned().unwrap_or_else(|| snippet(&response.body));
        match info.get("RESULT").map(String::as_str) {
            Some("OK") | Some("PARTIAL") => Ok((info, adif)),
            Some("AUTH") => Err(QslError::auth(Provider::Qrz, reason)),
            Some("FAIL") if reason.to_ascii_lowercase().contains("invalid api key") => {
                Err(QslError::auth(Provider::Qrz, reason))
            }
            _ => Err(QslError::remote(Provider::Qrz, Some(response.status), reason)),
        }
    }

    fn fetch_option(filter: &FetchFilter) -> String {
        let mut parts = Vec::new();
        if filter.confirmed_only {
            parts.push("STATUS:CONFIRMED".to_string());
        }
        if let Some(band) = &filter.band {
            parts.push(format!("BAND:{band}"));
        }
        if let Some(mode) = &filter.mode {
            parts.push(format!("MODE:{mode}"));
        }
        if let Some(call) = &filter.callsign {
            parts.push(format!("CALL:{call}"));
        }
        if filter.since.is_some() || filter.until.is_some() {
            let start = filter.since.map(|d| d.format("%Y-%m-%d").to_string());
            let end = filter
                .until
                .unwrap_or_else(|| Utc::now().date_naive())
                .format("%Y-%m-%d")
                .to_string();
            parts.push(format!("BETWEEN:{}+{end}", start.as_deref().unwrap_or("1900-01-01")));
        }
        if let Some(max) = filter.max_records {
            parts.push(format!("MAX:{max}"));
        }
        parts.extend(filter.extra.iter().map(|(k, v)| format!("{k}:{v}")));

        if parts.is_empty() {
            "ALL".to_string()
        } else {
            parts.join(",")
        }
    }

    /// Logs in to the XML service and returns a fresh session key. Keys are not kept
    /// between calls.
    fn xml_session_key(&self) -> Result<String> {
        let username = self
            .credentials
            .username
            .as_deref()
            .ok_or_else(|| QslError::MissingConfig {
                field: "qrz.username".to_string(),
            })?;
        let password = self
            .credentials
            .password
            .as_deref()
            .ok_or_else(|| QslError::MissingConfig {
                field: "qrz.password".to_string(),
            })?;

        let request = HttpRequest::get(&self.xml_endpoint)
            .query("username", username)
            .query("password", password)
            .query("agent", USER_AGENT);
        let response = self.transport.execute(Provider::Qrz, &request)?;
        check_status(Provider::Qrz, &response)?;

        let session = xml_section(&response.body, "Session")?.unwrap_or_default();
        match session.get("Key") {
            Some(key) if !key.is_empty() => Ok(key.clone()),
            _ => Err(QslError::auth(
                Provider::Qrz,
                session
                    .get("Error")
                    .cloned()
                    .unwrap_or_else(|| "no session key returned".to_string()),
            )),
        }
    }

    fn xml_lookup(&self, param: &str, value: &str, section: &str) -> Result<ExtraInfo> {
        let key = self.xml_session_key()?;
        let request = HttpRequest::get(&self.xml_endpoint)
            .query("s", key)
            .query(param, value);
        let response = self.transport.execute(Provider::Qrz, &request)?;
        check_status(Provider::Qrz, &response)?;

        if let Some(found) = xml_section(&response.body, section)? {
            return Ok(found);
        }
        let session = xml_section(&response.body, "Session")?.unwrap_or_default();
        let error = session.get("Error").cloned().unwrap_or_default();
        if error.starts_with("Not found") {
            Ok(ExtraInfo::new())
        } else if session.get("Key").map_or(true, |k| k.is_empty()) {
            Err(QslError::auth(Provider::Qrz, error))
        } else {
            Err(QslError::remote(Provider::Qrz, Some(response.status), error))
        }
    }
}

impl Adapter for QrzAdapter {
    fn provider(&self) -> Provider {
        Provider::Qrz
    }

    fn fetch_logbook(&self, filter: &FetchFilter) -> Result<Logbook> {
        let option = Self::fetch_option(filter);
        tracing::debug!("QRZ: FETCH OPTION={option}");
        let (_, adif) = self.logbook_call("FETCH", &[("OPTION", option)])?;
        let owner = self.credentials.username.as_deref().unwrap_or_default();

        match adif {
            Some(adif) => Logbook::assemble(Provider::Qrz, owner, &adif),
            None => Logbook::from_parsed(&QRZ_FIELDS, owner, AdifFile::default()),
        }
    }

    /// Book metadata: owner, name, QSO and confirmation counts, date range.
    fn logbook_status(&self) -> Result<ExtraInfo> {
        self.logbook_call("STATUS", &[]).map(|(info, _)| info)
    }

    /// Permanently removes the given log ids; `LOGIDS` in the answer lists ids not found.
    fn delete_records(&self, logids: &[String]) -> Result<ExtraInfo> {
        self.logbook_call("DELETE", &[("LOGIDS", logids.join(","))])
            .map(|(info, _)| info)
    }

    fn lookup_callsign(&self, callsign: &str) -> Result<ExtraInfo> {
        self.xml_lookup("callsign", callsign, "Callsign")
    }

    fn lookup_dxcc(&self, entity: &str) -> Result<ExtraInfo> {
        self.xml_lookup("dxcc", entity, "DXCC")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::stub::StubTransport;
    use crate::domain::model::{Confirmation, VerifyRequest};
    use crate::utils::error::ErrorKind;
    use chrono::NaiveDate;

    const FETCH_OK: &str = "RESULT=OK&COUNT=2&LOGIDS=101,102&ADIF=&lt;call:4&gt;W1AW&lt;band:3&gt;20m&lt;mode:3&gt;SSB&lt;qso_date:8&gt;20240101&lt;time_on:4&gt;1200&lt;app_qrzlog_status:1&gt;C&lt;comment:4&gt;A&amp;B!&lt;eor&gt;\n&lt;call:5&gt;K1ABC&lt;band:3&gt;40m&lt;mode:2&gt;CW&lt;qso_date:8&gt;20240102&lt;time_on:4&gt;0100&lt;eor&gt;\n";

    fn adapter(stub: StubTransport) -> (QrzAdapter, Arc<StubTransport>) {
        let stub = Arc::new(stub);
        let credentials = QrzCredentials {
            api_key: Some("ABCD-1234".into()),
            username: Some("TE5T".into()),
            password: Some("secret".into()),
            logbook_endpoint: Some("https://qrz.test/api".into()),
            xml_endpoint: Some("https://qrz.test/xml/".into()),
        };
        (QrzAdapter::new(credentials, stub.clone()).unwrap(), stub)
    }

    #[test]
    fn test_parse_logbook_response() {
        let (info, adif) = parse_logbook_response("RESULT=FAIL&REASON=invalid+api+key&COUNT=0").unwrap();
        assert_eq!(info["RESULT"], "FAIL");
        assert_eq!(info["REASON"], "invalid api key");
        assert!(adif.is_none());

        let (info, adif) = parse_logbook_response(FETCH_OK).unwrap();
        assert_eq!(info["COUNT"], "2");
        assert_eq!(info["LOGIDS"], "101,102");
        assert!(adif.unwrap().starts_with("<call:4>W1AW"));
    }

    #[test]
    fn test_fetch_logbook() {
        let (qrz, stub) = adapter(StubTransport::new().respond(200, FETCH_OK));
        let filter = FetchFilter::new()
            .band("20m")
            .since(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
            .until(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
            .max_records(50);

        let log = qrz.fetch_logbook(&filter).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.owner(), "TE5T");
        assert_eq!(log.records()[0].confirmed, Confirmation::Confirmed);
        assert_eq!(log.records()[0].raw.get("COMMENT"), Some("A&B!"));
        assert_eq!(log.records()[1].confirmed, Confirmation::NotConfirmed);

        let request = stub.request(0);
        assert_eq!(request.param("KEY"), Some("ABCD-1234"));
        assert_eq!(request.param("ACTION"), Some("FETCH"));
        assert_eq!(
            request.param("OPTION"),
            Some("BAND:20m,BETWEEN:2024-01-01+2024-02-01,MAX:50")
        );
    }

    #[test]
    fn test_numeric_entities_keep_raw_values_whole() {
        let body = "RESULT=OK&COUNT=1&ADIF=&lt;call:4&gt;F5XY&lt;band:3&gt;20m&lt;mode:2&gt;CW&lt;qso_date:8&gt;20240101&lt;time_on:4&gt;1200&lt;comment:5&gt;Joe&#039;s&lt;name:4&gt;Ren&#233;&lt;qth:4&gt;Caf&#xE9;&lt;eor&gt;\n";
        let (qrz, _) = adapter(StubTransport::new().respond(200, body));

        let log = qrz.fetch_logbook(&FetchFilter::new()).unwrap();

        let raw = &log.records()[0].raw;
        assert_eq!(raw.get("COMMENT"), Some("Joe's"));
        assert_eq!(raw.get("NAME"), Some("René"));
        assert_eq!(raw.get("QTH"), Some("Café"));
        assert_eq!(raw.len(), 8);
    }

    #[test]
    fn test_broken_entity_is_a_parse_error() {
        let err = parse_logbook_response("RESULT=OK&ADIF=&lt;call:4&gt;W1AW&bogus;&lt;eor&gt;").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_fetch_all_when_unfiltered() {
        assert_eq!(QrzAdapter::fetch_option(&FetchFilter::new()), "ALL");
        assert_eq!(
            QrzAdapter::fetch_option(&FetchFilter::new().confirmed_only().callsign("W1AW")),
            "STATUS:CONFIRMED,CALL:W1AW"
        );
    }

    #[test]
    fn test_fetch_without_entries() {
        let (qrz, _) = adapter(StubTransport::new().respond(200, "RESULT=OK&COUNT=0"));
        assert!(qrz.fetch_logbook(&FetchFilter::new()).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_key_is_authentication_error() {
        let (qrz, _) = adapter(StubTransport::new().respond(200, "RESULT=FAIL&REASON=invalid api key"));
        let err = qrz.fetch_logbook(&FetchFilter::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);

        let (qrz, _) = adapter(StubTransport::new().respond(200, "RESULT=FAIL&REASON=wrong option"));
        let err = qrz.fetch_logbook(&FetchFilter::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteService);
    }

    #[test]
    fn test_status_and_delete() {
        let (qrz, stub) = adapter(
            StubTransport::new()
                .respond(200, "RESULT=OK&OWNER=TE5T&COUNT=42&CONFIRMED=7&DXCC_COUNT=12")
                .respond(200, "RESULT=PARTIAL&COUNT=1&LOGIDS=99"),
        );

        let status = qrz.logbook_status().unwrap();
        assert_eq!(status["CONFIRMED"], "7");

        let deleted = qrz.delete_records(&["98".to_string(), "99".to_string()]).unwrap();
        assert_eq!(deleted["LOGIDS"], "99");
        assert_eq!(stub.request(1).param("LOGIDS"), Some("98,99"));
    }

    #[test]
    fn test_lookup_callsign_logs_in_each_time() {
        let login = r#"<?xml version="1.0" ?><QRZDatabase version="1.34" xmlns="http://xmldata.qrz.com"><Session><Key>k1</Key><Count>5</Count></Session></QRZDatabase>"#;
        let found = r#"<?xml version="1.0" ?><QRZDatabase version="1.34" xmlns="http://xmldata.qrz.com"><Callsign><call>W1AW</call><fname>Hiram Percy</fname><name>Maxim &amp; Co</name><grid>FN31pr</grid></Callsign><Session><Key>k1</Key></Session></QRZDatabase>"#;
        let (qrz, stub) = adapter(
            StubTransport::new()
                .respond(200, login)
                .respond(200, found)
                .respond(200, login)
                .respond(200, found),
        );

        let info = qrz.lookup_callsign("W1AW").unwrap();
        assert_eq!(info["grid"], "FN31pr");
        assert_eq!(info["name"], "Maxim & Co");
        qrz.lookup_callsign("W1AW").unwrap();

        assert_eq!(stub.request_count(), 4);
        assert_eq!(stub.request(0).param("username"), Some("TE5T"));
        assert_eq!(stub.request(1).param("s"), Some("k1"));
        assert_eq!(stub.request(1).param("callsign"), Some("W1AW"));
    }

    #[test]
    fn test_lookup_not_found_and_bad_login() {
        let login = "<QRZDatabase><Session><Key>k1</Key></Session></QRZDatabase>";
        let missing = "<QRZDatabase><Session><Error>Not found: ZZ9ZZZ</Error><Key>k1</Key></Session></QRZDatabase>";
        let bad = "<QRZDatabase><Session><Error>Username/password incorrect</Error></Session></QRZDatabase>";
        let (qrz, _) = adapter(
            StubTransport::new()
                .respond(200, login)
                .respond(200, missing)
                .respond(200, bad),
        );

        assert!(qrz.lookup_dxcc("ZZ9ZZZ").unwrap().is_empty());
        let err = qrz.lookup_callsign("W1AW").unwrap_err();
        assert!(matches!(err, QslError::Authentication { ref message, .. } if message == "Username/password incorrect"));
    }

    #[test]
    fn test_missing_credentials() {
        let stub: Arc<dyn Transport> = Arc::new(StubTransport::new());
        assert!(QrzAdapter::new(QrzCredentials::default(), stub.clone()).is_err());

        let key_only = QrzCredentials {
            api_key: Some("ABCD".into()),
            ..QrzCredentials::default()
        };
        let qrz = QrzAdapter::new(key_only, stub).unwrap();
        assert_eq!(qrz.lookup_callsign("W1AW").unwrap_err().kind(), ErrorKind::Config);
        assert_eq!(
            qrz.verify_confirmation(&VerifyRequest::new("A", "B", "20m")).unwrap_err().kind(),
            ErrorKind::UnsupportedOperation
        );
    }
}
