//! Mailbox access: IMAP session, attachment extraction and the fetch stage.

pub mod attachments;
pub mod fetcher;
pub mod imap;

pub use attachments::{PdfAttachment, extract_pdf_parts};
pub use fetcher::{FetchOptions, FetchSummary, fetch_attachments};
pub use imap::{FetchedMessage, ImapSession, MailSession, SessionGuard};
