use crate::adapters::clublog::{ClubLogAdapter, ClubLogCredentials};
use crate::adapters::eqsl::{EqslAdapter, EqslCredentials};
use crate::adapters::http::ReqwestTransport;
use crate::adapters::lotw::{LotwAdapter, LotwCredentials};
use crate::adapters::qrz::{QrzAdapter, QrzCredentials};
use crate::core::logbook::Logbook;
use crate::domain::model::{AwardQuery, ExtraInfo, FetchFilter, Provider, VerifyRequest};
use crate::domain::ports::{Adapter, Transport};
use crate::utils::error::Result;
use std::sync::Arc;

/// Account credentials, one variant per provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Lotw(LotwCredentials),
    Eqsl(EqslCredentials),
    Qrz(QrzCredentials),
    ClubLog(ClubLogCredentials),
}

impl Credentials {
    pub fn provider(&self) -> Provider {
        match self {
            Credentials::Lotw(_) => Provider::Lotw,
            Credentials::Eqsl(_) => Provider::Eqsl,
            Credentials::Qrz(_) => Provider::Qrz,
            Credentials::ClubLog(_) => Provider::ClubLog,
        }
    }
}

/// One authenticated account on one provider. Every operation is a single blocking
/// request/response exchange; nothing is cached between calls.
pub struct Session {
    adapter: Box<dyn Adapter>,
}

impl Session {
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_transport(credentials, Arc::new(ReqwestTransport::new()?))
    }

    pub fn with_transport(credentials: Credentials, transport: Arc<dyn Transport>) -> Result<Self> {
        let adapter: Box<dyn Adapter> = match credentials {
            Credentials::Lotw(c) => Box::new(LotwAdapter::new(c, transport)?),
            Credentials::Eqsl(c) => Box::new(EqslAdapter::new(c, transport)?),
            Credentials::Qrz(c) => Box::new(QrzAdapter::new(c, transport)?),
            Credentials::ClubLog(c) => Box::new(ClubLogAdapter::new(c, transport)?),
        };
        tracing::debug!("{} session ready", adapter.provider());
        Ok(Self { adapter })
    }

    pub fn provider(&self) -> Provider {
        self.adapter.provider()
    }

    pub fn fetch_logbook(&self, filter: &FetchFilter) -> Result<Logbook> {
        tracing::info!("{}: fetching logbook", self.provider());
        let logbook = self.adapter.fetch_logbook(filter)?;
        tracing::info!(
            "{}: {} records, {} confirmed",
            self.provider(),
            logbook.len(),
            logbook.confirmed().count()
        );
        Ok(logbook)
    }

    pub fn verify_confirmation(&self, request: &VerifyRequest) -> Result<(bool, ExtraInfo)> {
        tracing::debug!(
            "{}: verifying {} -> {} on {}",
            self.provider(),
            request.callsign_from,
            request.callsign_to,
            request.band
        );
        self.adapter.verify_confirmation(request)
    }

    pub fn award_credit(&self, query: &AwardQuery) -> Result<Logbook> {
        self.adapter.award_credit(query)
    }

    pub fn last_upload(&self) -> Result<String> {
        self.adapter.last_upload()
    }

    pub fn logbook_status(&self) -> Result<ExtraInfo> {
        self.adapter.logbook_status()
    }

    pub fn delete_records(&self, logids: &[String]) -> Result<ExtraInfo> {
        tracing::info!("{}: deleting {} records", self.provider(), logids.len());
        self.adapter.delete_records(logids)
    }

    pub fn upload_logbook(&self, file_name: &str, contents: &[u8]) -> Result<String> {
        tracing::info!("{}: uploading {file_name} ({} bytes)", self.provider(), contents.len());
        self.adapter.upload_logbook(file_name, contents)
    }

    pub fn lookup_callsign(&self, callsign: &str) -> Result<ExtraInfo> {
        self.adapter.lookup_callsign(callsign)
    }

    pub fn lookup_dxcc(&self, entity: &str) -> Result<ExtraInfo> {
        self.adapter.lookup_dxcc(entity)
    }
}
