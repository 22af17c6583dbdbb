//! pdf-inbox: pull PDF attachments from a mailbox, OCR them, file the results.

pub mod config;
pub mod error;
pub mod logging;
pub mod mail;
pub mod ocr;
pub mod processor;
pub mod staging;
