use std::sync::Arc;
use std::time::Duration;

use backoff::future::retry_notify;
use folio_chat_model::{ErrorKind, ModelProviderError};
use tracing::Instrument;

use crate::retry::RetrySchedule;
use crate::session::SessionManager;


/// Shown when the model answered successfully but without any text.
pub const TRANSMISSION_FAILURE_TEXT: &str =
    "Transmission failure. Please try again.";

/// Shown when the model could not be reached at all.
pub const OFFLINE_TEXT: &str = "Connection interrupted. CORE is offline.";

/// How a dispatch ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplyOutcome {
    /// The model replied with text.
    Delivered,
    /// The model replied, but the reply had no text.
    EmptyReply,
    /// Every attempt failed.
    Offline,
    /// The session could not be created, or the model rejected the
    /// credential. Not retried.
    Unavailable,
}

/// The single answer to one user message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    /// The text to show.
    pub text: String,
    /// Whether `text` is a canned message rather than the model's words.
    pub is_fallback: bool,
    /// How the dispatch ended.
    pub outcome: ReplyOutcome,
    /// How many times the model was called.
    pub attempts: u32,
}

impl Reply {
    fn delivered(text: String, attempts: u32) -> Self {
        Self {
            text,
            is_fallback: false,
            outcome: ReplyOutcome::Delivered,
            attempts,
        }
    }

    fn empty(attempts: u32) -> Self {
        // A well-formed reply, just a useless one. Not a fallback.
        Self {
            text: TRANSMISSION_FAILURE_TEXT.to_owned(),
            is_fallback: false,
            outcome: ReplyOutcome::EmptyReply,
            attempts,
        }
    }

    fn fallback(outcome: ReplyOutcome, attempts: u32) -> Self {
        Self {
            text: OFFLINE_TEXT.to_owned(),
            is_fallback: true,
            outcome,
            attempts,
        }
    }
}

/// Turns one user message into exactly one [`Reply`].
///
/// Transport failures are retried along the [`RetrySchedule`] and then
/// masked by a fallback text. The caller never sees an error.
///
/// Dispatches that share a session are serialized: an overlapping
/// [`send`](Self::send) waits until the previous one has resolved, so
/// replies come back in the order the messages were sent.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    retry_schedule: RetrySchedule,
}

impl Dispatcher {
    /// Creates a dispatcher using the default retry schedule.
    #[inline]
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            retry_schedule: RetrySchedule::default(),
        }
    }

    /// Replaces the retry schedule.
    #[inline]
    pub fn with_retry_schedule(
        mut self,
        retry_schedule: RetrySchedule,
    ) -> Self {
        self.retry_schedule = retry_schedule;
        self
    }

    /// Returns the retry schedule.
    #[inline]
    pub fn retry_schedule(&self) -> &RetrySchedule {
        &self.retry_schedule
    }

    /// Returns the session manager this dispatcher sends through.
    #[inline]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Sends `user_text` to the model and resolves to its reply.
    ///
    /// Returns `None` without doing anything when `user_text` is empty or
    /// only whitespace. Otherwise the text is forwarded as is, untrimmed.
    pub async fn send(&self, user_text: &str) -> Option<Reply> {
        if user_text.trim().is_empty() {
            debug!("ignoring a blank message");
            return None;
        }
        let reply = self
            .dispatch(user_text)
            .instrument(debug_span!("dispatch"))
            .await;
        Some(reply)
    }

    async fn dispatch(&self, user_text: &str) -> Reply {
        let session = match self.sessions.get_or_create_session().await {
            Ok(session) => session,
            Err(err) => {
                error!("cannot reach the model: {err}");
                return Reply::fallback(ReplyOutcome::Unavailable, 0);
            }
        };
        let _turn = session.begin_turn().await;
        let session = &*session;

        let mut attempts = 0u32;
        let result = retry_notify(
            self.retry_schedule.start(),
            || {
                attempts += 1;
                trace!("attempt {attempts}");
                async move {
                    session.send_message(user_text).await.map_err(|err| {
                        if err.kind() == ErrorKind::Unauthenticated {
                            backoff::Error::permanent(err)
                        } else {
                            backoff::Error::transient(err)
                        }
                    })
                }
            },
            |err: Box<dyn ModelProviderError>, delay: Duration| {
                error!(
                    "model call failed ({}): {err}, retrying in {delay:?}",
                    err.kind()
                );
            },
        )
        .await;

        match result {
            Ok(text) if text.is_empty() => {
                warn!("the model replied without any text");
                Reply::empty(attempts)
            }
            Ok(text) => Reply::delivered(text, attempts),
            Err(err) if err.kind() == ErrorKind::Unauthenticated => {
                error!("the model rejected the credential: {err}");
                Reply::fallback(ReplyOutcome::Unavailable, attempts)
            }
            Err(err) => {
                error!(
                    "model call failed ({}): {err}, giving up after {attempts} \
                     attempts",
                    err.kind()
                );
                Reply::fallback(ReplyOutcome::Offline, attempts)
            }
        }
    }
}
