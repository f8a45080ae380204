pub mod logbook;
pub mod normalize;
pub mod session;

pub use crate::domain::model::{Confirmation, ContactRecord, FetchFilter};
pub use crate::utils::error::Result;
pub use logbook::Logbook;
pub use session::{Credentials, Session};
