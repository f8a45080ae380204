//! Uniform client for amateur-radio QSL services (LoTW, eQSL, QRZ, ClubLog).
//!
//! A [`Session`] wraps one account on one provider. Logbook downloads come back as a
//! [`Logbook`] of normalized [`ContactRecord`]s, each keeping the provider's original ADIF
//! fields in `raw`.

pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::config::AccountsConfig;
pub use crate::core::{Credentials, Logbook, Session};
pub use crate::domain::model::{
    AwardQuery, Band, Confirmation, ContactRecord, ExtraInfo, FetchFilter, Mode, Provider,
    VerifyRequest,
};
pub use crate::utils::error::{ErrorKind, QslError, Result};
