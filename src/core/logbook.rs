use crate::adapters::adif::parse_adi;
use crate::core::normalize::{field_map, FieldMap};
use crate::domain::model::{AdifFile, ContactRecord, Provider};
use crate::utils::error::Result;
use serde::Serialize;

/// Normalized records plus the parsed source log they were projected from.
///
/// `records[i].raw` is always `original_log.records[i]`; a logbook is built once from one
/// response and has no mutators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Logbook {
    owner: String,
    provider: Provider,
    records: Vec<ContactRecord>,
    original_log: AdifFile,
}

impl Logbook {
    /// Parses an ADI body and normalizes every entry with the provider's field map.
    pub fn assemble(provider: Provider, owner: &str, body: &str) -> Result<Self> {
        let original_log = parse_adi(body)?;
        Self::from_parsed(field_map(provider), owner, original_log)
    }

    /// All-or-nothing: the first entry that fails normalization fails the whole log.
    pub fn from_parsed(fields: &FieldMap, owner: &str, original_log: AdifFile) -> Result<Self> {
        let records = original_log
            .records
            .iter()
            .map(|entry| fields.normalize(entry))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "{} logbook for {}: {} records",
            fields.provider,
            owner,
            records.len()
        );

        Ok(Self {
            owner: owner.to_string(),
            provider: fields.provider,
            records,
            original_log,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn records(&self) -> &[ContactRecord] {
        &self.records
    }

    pub fn original_log(&self) -> &AdifFile {
        &self.original_log
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn confirmed(&self) -> impl Iterator<Item = &ContactRecord> {
        self.records.iter().filter(|r| r.confirmed.is_confirmed())
    }

    pub fn into_records(self) -> Vec<ContactRecord> {
        self.records
    }
}
