//! Projection of one provider ADIF entry onto [`ContactRecord`].
//!
//! Every provider is described by a static [`FieldMap`]: which fields carry the callsign,
//! band, mode and timestamp, how confirmation is signalled, and which provider spellings
//! map onto canonical band/mode tokens. Normalization never edits the entry; the record
//! keeps a verbatim copy in `raw` so the projection can always be repeated.

use crate::domain::model::{AdifRecord, Band, Confirmation, ContactRecord, Mode, Provider};
use crate::utils::error::{QslError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::HashSet;

#[derive(Debug)]
pub enum TimestampSource {
    /// `YYYYMMDD` date plus `HHMM`/`HHMMSS` time in two fields.
    Separate {
        date: &'static str,
        time: &'static str,
    },
    /// One field holding an ISO-like date and time.
    Combined(&'static str),
}

#[derive(Debug)]
pub enum ConfirmationRule {
    /// Field value looked up in `table`; a value missing from the table is `Unknown`.
    Status {
        field: &'static str,
        table: &'static [(&'static str, Confirmation)],
    },
    /// Non-empty field means confirmed, absent or empty means not confirmed.
    Presence { field: &'static str },
    /// First rule whose field is present decides.
    FirstOf(&'static [ConfirmationRule]),
}

impl ConfirmationRule {
    /// `None` when the rule's signal field is absent.
    fn evaluate(&self, raw: &AdifRecord) -> Option<Confirmation> {
        match self {
            ConfirmationRule::Status { field, table } => {
                let value = raw.get(field)?.trim();
                Some(
                    table
                        .iter()
                        .find(|(signal, _)| signal.eq_ignore_ascii_case(value))
                        .map(|(_, state)| *state)
                        .unwrap_or(Confirmation::Unknown),
                )
            }
            ConfirmationRule::Presence { field } => Some(match raw.get(field) {
                Some(value) if !value.trim().is_empty() => Confirmation::Confirmed,
                _ => Confirmation::NotConfirmed,
            }),
            ConfirmationRule::FirstOf(rules) => rules.iter().find_map(|rule| rule.evaluate(raw)),
        }
    }

    pub fn resolve(&self, raw: &AdifRecord) -> Confirmation {
        self.evaluate(raw).unwrap_or(Confirmation::Unknown)
    }

    fn field_names(&self, out: &mut Vec<&'static str>) {
        match self {
            ConfirmationRule::Status { field, .. } | ConfirmationRule::Presence { field } => {
                out.push(*field)
            }
            ConfirmationRule::FirstOf(rules) => rules.iter().for_each(|r| r.field_names(out)),
        }
    }
}

#[derive(Debug)]
pub struct FieldMap {
    pub provider: Provider,
    pub callsign: &'static str,
    pub band: &'static str,
    pub mode: &'static str,
    /// Tried in order; the first source whose fields are all present is used.
    pub timestamps: &'static [TimestampSource],
    pub confirmation: ConfirmationRule,
    pub band_synonyms: &'static [(&'static str, Band)],
    pub mode_synonyms: &'static [(&'static str, Mode)],
}

const QSL_RCVD_TABLE: &[(&str, Confirmation)] = &[
    ("Y", Confirmation::Confirmed),
    ("V", Confirmation::Confirmed),
    ("N", Confirmation::NotConfirmed),
    ("R", Confirmation::NotConfirmed),
    ("I", Confirmation::NotConfirmed),
];

const EQSL_RCVD_TABLE: &[(&str, Confirmation)] = &[
    ("Y", Confirmation::Confirmed),
    ("N", Confirmation::NotConfirmed),
    ("R", Confirmation::NotConfirmed),
    ("I", Confirmation::NotConfirmed),
];

const QRZ_STATUS_TABLE: &[(&str, Confirmation)] = &[
    ("C", Confirmation::Confirmed),
    ("N", Confirmation::NotConfirmed),
];

const ADIF_DATE_TIME: TimestampSource = TimestampSource::Separate {
    date: "QSO_DATE",
    time: "TIME_ON",
};

pub static LOTW_FIELDS: FieldMap = FieldMap {
    provider: Provider::Lotw,
    callsign: "CALL",
    band: "BAND",
    mode: "MODE",
    timestamps: &[ADIF_DATE_TIME, TimestampSource::Combined("APP_LoTW_QSO_TIMESTAMP")],
    confirmation: ConfirmationRule::Status {
        field: "QSL_RCVD",
        table: QSL_RCVD_TABLE,
    },
    band_synonyms: &[],
    mode_synonyms: &[
        ("JT65A", Mode::Jt65),
        ("JT65B", Mode::Jt65),
        ("JT65C", Mode::Jt65),
        ("JT9-1", Mode::Jt9),
    ],
};

pub static EQSL_FIELDS: FieldMap = FieldMap {
    provider: Provider::Eqsl,
    callsign: "CALL",
    band: "BAND",
    mode: "MODE",
    timestamps: &[ADIF_DATE_TIME],
    confirmation: ConfirmationRule::Status {
        field: "EQSL_QSL_RCVD",
        table: EQSL_RCVD_TABLE,
    },
    band_synonyms: &[],
    mode_synonyms: &[
        ("USB", Mode::Ssb),
        ("LSB", Mode::Ssb),
        ("PSK31", Mode::Psk),
        ("BPSK31", Mode::Psk),
        ("PSK63", Mode::Psk),
        ("JT65A", Mode::Jt65),
    ],
};

pub static QRZ_FIELDS: FieldMap = FieldMap {
    provider: Provider::Qrz,
    callsign: "CALL",
    band: "BAND",
    mode: "MODE",
    timestamps: &[ADIF_DATE_TIME],
    confirmation: ConfirmationRule::FirstOf(&[
        ConfirmationRule::Status {
            field: "APP_QRZLOG_STATUS",
            table: QRZ_STATUS_TABLE,
        },
        ConfirmationRule::Presence {
            field: "APP_QRZLOG_QSLDATE",
        },
    ]),
    band_synonyms: &[],
    mode_synonyms: &[("USB", Mode::Ssb), ("LSB", Mode::Ssb), ("PSK31", Mode::Psk)],
};

pub static CLUBLOG_FIELDS: FieldMap = FieldMap {
    provider: Provider::ClubLog,
    callsign: "CALL",
    band: "BAND",
    mode: "MODE",
    timestamps: &[ADIF_DATE_TIME],
    confirmation: ConfirmationRule::Status {
        field: "QSL_RCVD",
        table: QSL_RCVD_TABLE,
    },
    band_synonyms: &[],
    mode_synonyms: &[("USB", Mode::Ssb), ("LSB", Mode::Ssb)],
};

pub fn field_map(provider: Provider) -> &'static FieldMap {
    match provider {
        Provider::Lotw => &LOTW_FIELDS,
        Provider::Eqsl => &EQSL_FIELDS,
        Provider::Qrz => &QRZ_FIELDS,
        Provider::ClubLog => &CLUBLOG_FIELDS,
    }
}

fn config_error(provider: Provider, message: String) -> QslError {
    QslError::Config {
        message: format!("{provider} field map: {message}"),
    }
}

impl FieldMap {
    /// Rejects a table that could never normalize an entry.
    pub fn validate(&self) -> Result<()> {
        let mut names = vec![self.callsign, self.band, self.mode];
        if self.timestamps.is_empty() {
            return Err(config_error(self.provider, "no timestamp source".into()));
        }
        for source in self.timestamps {
            match source {
                TimestampSource::Separate { date, time } => {
                    names.push(*date);
                    names.push(*time);
                }
                TimestampSource::Combined(field) => names.push(*field),
            }
        }

        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(config_error(self.provider, "empty field name".into()));
            }
            if !seen.insert(name.to_ascii_uppercase()) {
                return Err(config_error(self.provider, format!("{name} mapped twice")));
            }
        }

        let mut signal_fields = Vec::new();
        self.confirmation.field_names(&mut signal_fields);
        if signal_fields.iter().any(|f| f.trim().is_empty()) {
            return Err(config_error(self.provider, "empty confirmation field".into()));
        }

        if let Some((token, _)) = self
            .band_synonyms
            .iter()
            .find(|(token, band)| token.is_empty() || !band.is_recognized())
        {
            return Err(config_error(self.provider, format!("bad band synonym '{token}'")));
        }
        if let Some((token, _)) = self
            .mode_synonyms
            .iter()
            .find(|(token, mode)| token.is_empty() || !mode.is_recognized())
        {
            return Err(config_error(self.provider, format!("bad mode synonym '{token}'")));
        }
        Ok(())
    }

    pub fn normalize_band(&self, token: &str) -> Band {
        let token = token.trim();
        self.band_synonyms
            .iter()
            .find(|(synonym, _)| synonym.eq_ignore_ascii_case(token))
            .map(|(_, band)| band.clone())
            .or_else(|| Band::from_canonical(token))
            .unwrap_or_else(|| Band::Other(token.to_string()))
    }

    pub fn normalize_mode(&self, token: &str) -> Mode {
        let token = token.trim();
        self.mode_synonyms
            .iter()
            .find(|(synonym, _)| synonym.eq_ignore_ascii_case(token))
            .map(|(_, mode)| mode.clone())
            .or_else(|| Mode::from_canonical(token))
            .unwrap_or_else(|| Mode::Other(token.to_string()))
    }

    pub fn timestamp(&self, raw: &AdifRecord) -> Result<DateTime<Utc>> {
        for source in self.timestamps {
            match source {
                TimestampSource::Separate { date, time } => {
                    if let (Some(d), Some(t)) = (required(raw, date), required(raw, time)) {
                        return parse_date_time(d, t);
                    }
                }
                TimestampSource::Combined(field) => {
                    if let Some(value) = required(raw, field) {
                        return parse_combined(value);
                    }
                }
            }
        }

        let missing = match self.timestamps.first() {
            Some(TimestampSource::Separate { date, .. }) if required(raw, date).is_none() => *date,
            Some(TimestampSource::Separate { time, .. }) => *time,
            Some(TimestampSource::Combined(field)) => *field,
            None => "timestamp",
        };
        Err(QslError::missing_field(missing))
    }

    pub fn normalize(&self, raw: &AdifRecord) -> Result<ContactRecord> {
        let callsign = required(raw, self.callsign)
            .ok_or_else(|| QslError::missing_field(self.callsign))?
            .to_ascii_uppercase();
        let band = required(raw, self.band).ok_or_else(|| QslError::missing_field(self.band))?;
        let mode = required(raw, self.mode).ok_or_else(|| QslError::missing_field(self.mode))?;

        Ok(ContactRecord {
            callsign,
            band: self.normalize_band(band),
            mode: self.normalize_mode(mode),
            timestamp: self.timestamp(raw)?,
            confirmed: self.confirmation.resolve(raw),
            raw: raw.clone(),
        })
    }
}

/// Trimmed, non-empty field value.
fn required<'a>(raw: &'a AdifRecord, field: &str) -> Option<&'a str> {
    raw.get(field).map(str::trim).filter(|v| !v.is_empty())
}

fn timestamp_error(value: String, reason: &str) -> QslError {
    QslError::TimestampParse {
        value,
        reason: reason.to_string(),
    }
}

fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d"))
        .ok()
}

fn parse_time(time: &str) -> Option<NaiveTime> {
    let digits: String = time.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| digits[range].parse::<u32>().ok();
    match digits.len() {
        4 => NaiveTime::from_hms_opt(field(0..2)?, field(2..4)?, 0),
        6 => NaiveTime::from_hms_opt(field(0..2)?, field(2..4)?, field(4..6)?),
        _ => None,
    }
}

pub fn parse_date_time(date: &str, time: &str) -> Result<DateTime<Utc>> {
    let value = format!("{date} {time}");
    let date = parse_date(date).ok_or_else(|| timestamp_error(value.clone(), "unrecognized date"))?;
    let time = parse_time(time).ok_or_else(|| timestamp_error(value, "unrecognized time"))?;
    Ok(date.and_time(time).and_utc())
}

pub fn parse_combined(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| timestamp_error(value.to_string(), "unrecognized date-time"))
}
