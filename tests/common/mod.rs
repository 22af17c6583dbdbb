//! Test helpers shared by the integration tests.

#![allow(dead_code)]

use std::ops::{ControlFlow, RangeInclusive};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use pdf_inbox::error::MailError;
use pdf_inbox::mail::{FetchedMessage, MailSession};

/// Everything the fake mailbox was asked to do.
#[derive(Debug, Default)]
pub struct Calls {
    pub selected: Vec<String>,
    pub fetched: Vec<RangeInclusive<u32>>,
    pub delivered: u32,
    pub moved: Vec<(RangeInclusive<u32>, String)>,
    pub logouts: u32,
    /// Thread each logout ran on.
    pub logout_threads: Vec<ThreadId>,
}

/// In-memory mailbox holding raw messages.
pub struct FakeMailbox {
    pub messages: Vec<Vec<u8>>,
    pub fail_select: bool,
    pub fail_fetch: bool,
    pub fail_move: bool,
    pub calls: Arc<Mutex<Calls>>,
}

impl FakeMailbox {
    pub fn new(messages: Vec<Vec<u8>>) -> (Self, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mailbox = Self {
            messages,
            fail_select: false,
            fail_fetch: false,
            fail_move: false,
            calls: Arc::clone(&calls),
        };
        (mailbox, calls)
    }
}

impl MailSession for FakeMailbox {
    fn select(&mut self, mailbox: &str) -> Result<u32, MailError> {
        self.calls.lock().unwrap().selected.push(mailbox.to_string());
        if self.fail_select {
            return Err(MailError::Command {
                command: "SELECT".into(),
                reason: "mailbox unavailable".into(),
            });
        }
        Ok(self.messages.len() as u32)
    }

    fn fetch(
        &mut self,
        range: RangeInclusive<u32>,
        on_message: &mut dyn FnMut(FetchedMessage) -> ControlFlow<()>,
    ) -> Result<(), MailError> {
        self.calls.lock().unwrap().fetched.push(range.clone());
        for seq in range {
            let raw = self.messages[(seq - 1) as usize].clone();
            self.calls.lock().unwrap().delivered += 1;
            if on_message(FetchedMessage { seq, raw }).is_break() {
                return Err(MailError::Abandoned);
            }
        }
        if self.fail_fetch {
            return Err(MailError::Protocol("connection reset".into()));
        }
        Ok(())
    }

    fn move_messages(
        &mut self,
        range: RangeInclusive<u32>,
        mailbox: &str,
    ) -> Result<(), MailError> {
        self.calls
            .lock()
            .unwrap()
            .moved
            .push((range, mailbox.to_string()));
        if self.fail_move {
            return Err(MailError::Command {
                command: "MOVE".into(),
                reason: "no such mailbox".into(),
            });
        }
        Ok(())
    }

    fn logout(&mut self) -> Result<(), MailError> {
        let mut calls = self.calls.lock().unwrap();
        calls.logouts += 1;
        calls.logout_threads.push(std::thread::current().id());
        Ok(())
    }
}

/// Build a multipart message with the given `(content type, name, body)` parts.
pub fn mime(parts: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut raw = String::from(
        "From: scanner@example.com\r\n\
         Subject: scans\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"SEP\"\r\n\r\n",
    );
    for (ctype, name, body) in parts {
        raw.push_str("--SEP\r\n");
        raw.push_str(&format!("Content-Type: {ctype}; name=\"{name}\"\r\n\r\n"));
        raw.push_str(body);
        raw.push_str("\r\n");
    }
    raw.push_str("--SEP--\r\n");
    raw.into_bytes()
}
