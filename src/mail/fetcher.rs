//! Mail fetcher: streams every message out of the mailbox and stages its
//! PDF attachments.
//!
//! One blocking producer task runs the IMAP `FETCH` and pushes messages into
//! a bounded queue; the caller drains it, parses each message and writes
//! attachments to staging. The producer reports its own outcome on a
//! separate single-slot completion channel, checked only after the queue is
//! fully drained.

use std::ops::ControlFlow;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::MailConfig;
use crate::error::{Error, MailError, Result};
use crate::mail::attachments::extract_pdf_parts;
use crate::mail::imap::{FetchedMessage, ImapSession, MailSession, SessionGuard, TlsStream};
use crate::staging::Staging;

/// Capacity of the fetch queue between producer and consumer.
pub const FETCH_BUFFER: usize = 10;

/// Mailbox folders used by a fetch run.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub mailbox: String,
    pub processed_mailbox: String,
}

impl From<&MailConfig> for FetchOptions {
    fn from(config: &MailConfig) -> Self {
        Self {
            mailbox: config.mailbox.clone(),
            processed_mailbox: config.processed_mailbox.clone(),
        }
    }
}

/// Outcome of a fetch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub messages: u32,
    pub attachments: usize,
}

/// What the producer hands back once `FETCH` completes.
type Completion<S> = (SessionGuard<S>, std::result::Result<(), MailError>);

/// Connect and log in over TLS off the runtime.
pub async fn connect(config: &MailConfig) -> Result<SessionGuard<ImapSession<TlsStream>>> {
    let config = config.clone();
    let session = tokio::task::spawn_blocking(move || ImapSession::connect(&config))
        .await
        .map_err(|e| Error::Task(e.to_string()))??;
    Ok(SessionGuard::new(session))
}

/// Run a blocking session operation off the runtime and get the session back.
async fn with_session<S, T, F>(
    mut session: SessionGuard<S>,
    op: F,
) -> Result<(SessionGuard<S>, std::result::Result<T, MailError>)>
where
    S: MailSession + Send + 'static,
    T: Send + 'static,
    F: FnOnce(&mut S) -> std::result::Result<T, MailError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let result = op(&mut session);
        (session, result)
    })
    .await
    .map_err(|e| Error::Task(e.to_string()))
}

/// Fetch every message in the mailbox and stage its PDF attachments.
///
/// Any connection, parse or staging error is fatal. Moving the messages to
/// the processed folder afterwards is best effort. The session is logged out
/// on every path.
pub async fn fetch_attachments<S>(
    session: SessionGuard<S>,
    staging: &Staging,
    options: &FetchOptions,
) -> Result<FetchSummary>
where
    S: MailSession + Send + 'static,
{
    let mailbox = options.mailbox.clone();
    let (session, count) = with_session(session, move |s| s.select(&mailbox)).await?;
    let count = match count {
        Ok(count) => count,
        Err(e) => {
            release(session).await;
            return Err(e.into());
        }
    };

    if count == 0 {
        info!("No messages in {}", options.mailbox);
        release(session).await;
        return Ok(FetchSummary::default());
    }
    debug!(count, mailbox = %options.mailbox, "Fetching messages");

    let (tx, mut rx) = mpsc::channel::<FetchedMessage>(FETCH_BUFFER);
    let (done_tx, done_rx) = oneshot::channel::<Completion<S>>();

    let producer = tokio::task::spawn_blocking(move || {
        let mut session = session;
        let result = session.fetch(1..=count, &mut |message: FetchedMessage| {
            match tx.blocking_send(message) {
                Ok(()) => ControlFlow::Continue(()),
                // Consumer gave up; abandon the rest of the response.
                Err(_) => ControlFlow::Break(()),
            }
        });
        drop(tx);
        // If the consumer is gone the session drops here and sends LOGOUT.
        let _ = done_tx.send((session, result));
    });

    let mut summary = FetchSummary::default();
    while let Some(message) = rx.recv().await {
        summary.messages += 1;
        for attachment in extract_pdf_parts(&message)? {
            info!("Fetch {}", attachment.name);
            staging.write(&attachment.name, &attachment.content).await?;
            summary.attachments += 1;
        }
    }

    let completion = done_rx.await;
    producer.await.map_err(|e| Error::Task(e.to_string()))?;
    let (session, fetched) =
        completion.map_err(|_| Error::Task("fetch task ended without reporting".into()))?;
    if let Err(e) = fetched {
        release(session).await;
        return Err(e.into());
    }

    let processed = options.processed_mailbox.clone();
    let (session, moved) =
        with_session(session, move |s| s.move_messages(1..=count, &processed)).await?;
    if let Err(e) = moved {
        warn!("Could not move messages to {}: {e}", options.processed_mailbox);
    }

    release(session).await;
    info!(
        messages = summary.messages,
        attachments = summary.attachments,
        "Fetch finished"
    );
    Ok(summary)
}

/// Log out off the runtime. Failures only matter to the log.
async fn release<S>(session: SessionGuard<S>)
where
    S: MailSession + Send + 'static,
{
    match tokio::task::spawn_blocking(move || session.logout()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Logout failed: {e}"),
        Err(e) => debug!("Logout task failed: {e}"),
    }
}
