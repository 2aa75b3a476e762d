//! consumo-ingest: mail export loading and message extractors.

pub mod parsers;
pub mod types;

pub use parsers::Extractor;
pub use parsers::bcp_notification::BcpNotificationExtractor;
pub use parsers::financial_email::FinancialEmailExtractor;
pub use types::{MailExport, RawMessage};
