use chrono::{DateTime, NaiveDate, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Provider-specific metadata returned alongside single-lookup results.
pub type ExtraInfo = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Provider {
    Lotw,
    Eqsl,
    Qrz,
    ClubLog,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Lotw => "LoTW",
            Provider::Eqsl => "eQSL",
            Provider::Qrz => "QRZ",
            Provider::ClubLog => "ClubLog",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lotw" => Ok(Provider::Lotw),
            "eqsl" => Ok(Provider::Eqsl),
            "qrz" => Ok(Provider::Qrz),
            "clublog" => Ok(Provider::ClubLog),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Canonical amateur band. Tokens outside the vocabulary are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Band {
    B2190m,
    B630m,
    B560m,
    B160m,
    B80m,
    B60m,
    B40m,
    B30m,
    B20m,
    B17m,
    B15m,
    B12m,
    B10m,
    B8m,
    B6m,
    B5m,
    B4m,
    B2m,
    B1_25m,
    B70cm,
    B33cm,
    B23cm,
    B13cm,
    Other(String),
}

const BAND_TOKENS: &[(&str, Band)] = &[
    ("2190m", Band::B2190m),
    ("630m", Band::B630m),
    ("560m", Band::B560m),
    ("160m", Band::B160m),
    ("80m", Band::B80m),
    ("60m", Band::B60m),
    ("40m", Band::B40m),
    ("30m", Band::B30m),
    ("20m", Band::B20m),
    ("17m", Band::B17m),
    ("15m", Band::B15m),
    ("12m", Band::B12m),
    ("10m", Band::B10m),
    ("8m", Band::B8m),
    ("6m", Band::B6m),
    ("5m", Band::B5m),
    ("4m", Band::B4m),
    ("2m", Band::B2m),
    ("1.25m", Band::B1_25m),
    ("70cm", Band::B70cm),
    ("33cm", Band::B33cm),
    ("23cm", Band::B23cm),
    ("13cm", Band::B13cm),
];

impl Band {
    /// Matches a canonical token, ignoring ASCII case.
    pub fn from_canonical(token: &str) -> Option<Band> {
        BAND_TOKENS
            .iter()
            .find(|(canonical, _)| canonical.eq_ignore_ascii_case(token))
            .map(|(_, band)| band.clone())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Band::Other(token) => token,
            known => BAND_TOKENS
                .iter()
                .find(|(_, band)| band == known)
                .map(|(canonical, _)| *canonical)
                .unwrap_or_default(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Band::Other(_))
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Band {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Canonical ADIF mode. Tokens outside the vocabulary are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    Am,
    Cw,
    Fm,
    Ssb,
    Rtty,
    Psk,
    Ft8,
    Ft4,
    Jt65,
    Jt9,
    Mfsk,
    Olivia,
    Sstv,
    DigitalVoice,
    Other(String),
}

const MODE_TOKENS: &[(&str, Mode)] = &[
    ("AM", Mode::Am),
    ("CW", Mode::Cw),
    ("FM", Mode::Fm),
    ("SSB", Mode::Ssb),
    ("RTTY", Mode::Rtty),
    ("PSK", Mode::Psk),
    ("FT8", Mode::Ft8),
    ("FT4", Mode::Ft4),
    ("JT65", Mode::Jt65),
    ("JT9", Mode::Jt9),
    ("MFSK", Mode::Mfsk),
    ("OLIVIA", Mode::Olivia),
    ("SSTV", Mode::Sstv),
    ("DIGITALVOICE", Mode::DigitalVoice),
];

impl Mode {
    pub fn from_canonical(token: &str) -> Option<Mode> {
        MODE_TOKENS
            .iter()
            .find(|(canonical, _)| canonical.eq_ignore_ascii_case(token))
            .map(|(_, mode)| mode.clone())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Mode::Other(token) => token,
            known => MODE_TOKENS
                .iter()
                .find(|(_, mode)| mode == known)
                .map(|(canonical, _)| *canonical)
                .unwrap_or_default(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Mode::Other(_))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Mode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Confirmed,
    NotConfirmed,
    Unknown,
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed)
    }
}

/// One `<NAME:LEN[:TYPE]>value` item as it appeared in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdifField {
    pub name: String,
    pub value: String,
    pub data_type: Option<String>,
}

/// Ordered field list of a single ADIF entry; names keep their original casing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdifRecord {
    fields: Vec<AdifField>,
}

impl AdifRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>, data_type: Option<String>) {
        self.fields.push(AdifField {
            name: name.into(),
            value: value.into(),
            data_type,
        });
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value, None);
        self
    }

    /// Case-insensitive lookup; the first occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn fields(&self) -> &[AdifField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AdifRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = AdifRecord::new();
        for (name, value) in iter {
            record.push(name, value, None);
        }
        record
    }
}

impl Serialize for AdifRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for field in &self.fields {
            map.serialize_entry(&field.name, &field.value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AdifHeader {
    /// Free text before the first header field.
    pub preamble: String,
    pub fields: AdifRecord,
}

/// A fully parsed ADI document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AdifFile {
    pub header: AdifHeader,
    pub records: Vec<AdifRecord>,
}

/// Provider-agnostic view of one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactRecord {
    pub callsign: String,
    pub band: Band,
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
    pub confirmed: Confirmation,
    pub raw: AdifRecord,
}

/// Options for `fetch_logbook`. Each set option is forwarded as the provider's own parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchFilter {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub confirmed_only: bool,
    pub callsign: Option<String>,
    pub band: Option<String>,
    pub mode: Option<String>,
    pub max_records: Option<u32>,
    /// Raw provider parameters appended verbatim.
    pub extra: Vec<(String, String)>,
}

impl FetchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.since = Some(date);
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.until = Some(date);
        self
    }

    pub fn confirmed_only(mut self) -> Self {
        self.confirmed_only = true;
        self
    }

    pub fn callsign(mut self, callsign: impl Into<String>) -> Self {
        self.callsign = Some(callsign.into());
        self
    }

    pub fn band(mut self, band: impl Into<String>) -> Self {
        self.band = Some(band.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn max_records(mut self, max: u32) -> Self {
        self.max_records = Some(max);
        self
    }

    pub fn extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }
}

/// Single-contact confirmation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    pub callsign_from: String,
    pub callsign_to: String,
    pub band: String,
    pub mode: Option<String>,
    pub date: Option<NaiveDate>,
}

impl VerifyRequest {
    pub fn new(
        callsign_from: impl Into<String>,
        callsign_to: impl Into<String>,
        band: impl Into<String>,
    ) -> Self {
        Self {
            callsign_from: callsign_from.into(),
            callsign_to: callsign_to.into(),
            band: band.into(),
            mode: None,
            date: None,
        }
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// Award credit query (DXCC entity and award account).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwardQuery {
    pub entity: Option<u32>,
    pub account: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_tokens_ignore_case() {
        assert_eq!(Band::from_canonical("20M"), Some(Band::B20m));
        assert_eq!(Band::from_canonical("70CM"), Some(Band::B70cm));
        assert_eq!(Band::from_canonical("1.25M").map(|b| b.to_string()), Some("1.25m".to_string()));
        assert_eq!(Band::from_canonical("11m"), None);
        assert!(!Band::Other("11m".into()).is_recognized());
        assert_eq!(Band::Other("11m".into()).as_str(), "11m");
    }

    #[test]
    fn test_mode_tokens() {
        assert_eq!(Mode::from_canonical("ft8"), Some(Mode::Ft8));
        assert_eq!(Mode::Ssb.as_str(), "SSB");
        assert_eq!(Mode::Other("VARA".into()).to_string(), "VARA");
    }

    #[test]
    fn test_adif_record_lookup_is_case_insensitive() {
        let record: AdifRecord = [("CALL", "W1AW"), ("qso_date", "20240101"), ("call", "dup")]
            .into_iter()
            .collect();

        assert_eq!(record.get("call"), Some("W1AW"));
        assert_eq!(record.get("QSO_DATE"), Some("20240101"));
        assert!(!record.contains("TIME_ON"));
        assert_eq!(record.len(), 3);
        assert_eq!(record.fields()[1].name, "qso_date");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("LoTW".parse::<Provider>(), Ok(Provider::Lotw));
        assert_eq!("clublog".parse::<Provider>(), Ok(Provider::ClubLog));
        assert!("hamqth".parse::<Provider>().is_err());
    }

    #[test]
    fn test_adif_record_serializes_as_map() {
        let record = AdifRecord::new().with_field("CALL", "W1AW").with_field("BAND", "20m");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"CALL": "W1AW", "BAND": "20m"}));
    }
}
