use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use folio_chat_core::{Dispatcher, Reply};
use tokio::task::JoinHandle;

/// The first thing the assistant says, before any message is sent.
pub const GREETING: &str =
    "Hello. I am CORE. How can I assist you with your project today? 🛠️";

/// Who wrote a [`Turn`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The visitor.
    User,
    /// The model, or a canned message standing in for it.
    Assistant,
}

/// One entry of the [`Transcript`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    text: String,
    is_error: bool,
}

impl Turn {
    fn user(text: String) -> Self {
        Self {
            role: Role::User,
            text,
            is_error: false,
        }
    }

    fn assistant(text: String, is_error: bool) -> Self {
        Self {
            role: Role::Assistant,
            text,
            is_error,
        }
    }

    /// Returns who wrote this turn.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the text of this turn.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns whether this turn is a fallback shown in place of a reply.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.is_error
    }
}

/// The messages shown in the chat window, oldest first.
///
/// Turns are only ever appended.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Returns all turns.
    #[inline]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Returns the most recent turn.
    #[inline]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Returns the number of turns.
    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns whether there are no turns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }
}

/// Where the widget is in its request cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DispatchState {
    /// Nothing has been sent yet, or the last dispatch was cancelled.
    #[default]
    Idle,
    /// A message is on its way and no new one is accepted.
    Pending,
    /// The last dispatch ended with a reply.
    Resolved,
    /// The last dispatch ended with a fallback.
    Error,
}

/// What a [`PendingReply`] resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The dispatcher answered.
    Replied(Reply),
    /// The dispatch was cancelled before it answered.
    Cancelled,
}

/// A dispatch running in the background.
///
/// Await it to get the [`DispatchOutcome`], then hand that to
/// [`ChatWidget::finish`]. Dropping it does not stop the dispatch, use
/// [`cancel`](Self::cancel) for that. It does give up the widget's pending
/// slot though, so the widget accepts input again and the dropped reply is
/// never shown.
#[derive(Debug)]
pub struct PendingReply {
    handle: JoinHandle<Option<Reply>>,
    _claim: Arc<()>,
}

impl PendingReply {
    /// Stops the dispatch. A retry that has not started yet never will.
    ///
    /// The reply then resolves to [`DispatchOutcome::Cancelled`], unless it
    /// was already available.
    #[inline]
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Future for PendingReply {
    type Output = DispatchOutcome;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|result| match result {
            Ok(Some(reply)) => DispatchOutcome::Replied(reply),
            // Blank input is rejected before a task is spawned.
            Ok(None) => DispatchOutcome::Cancelled,
            Err(err) => {
                if err.is_panic() {
                    error!("dispatch task panicked: {err}");
                }
                DispatchOutcome::Cancelled
            }
        })
    }
}

/// The state behind the floating chat window.
///
/// The widget owns the [`Transcript`]. It accepts one message at a time:
/// while a reply is pending, [`submit`](Self::submit) refuses new input.
#[derive(Debug)]
pub struct ChatWidget {
    dispatcher: Dispatcher,
    transcript: Transcript,
    is_open: bool,
    state: DispatchState,
    pending: Weak<()>,
}

impl ChatWidget {
    /// Creates a closed widget whose transcript holds the [`GREETING`].
    pub fn new(dispatcher: Dispatcher) -> Self {
        let mut transcript = Transcript::default();
        transcript.push(Turn::assistant(GREETING.to_owned(), false));
        Self {
            dispatcher,
            transcript,
            is_open: false,
            state: DispatchState::Idle,
            pending: Weak::new(),
        }
    }

    /// Returns whether the chat window is shown.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Shows the chat window.
    #[inline]
    pub fn open(&mut self) {
        self.is_open = true;
    }

    /// Hides the chat window. A pending reply keeps running.
    #[inline]
    pub fn close(&mut self) {
        self.is_open = false;
    }

    /// Shows the window if hidden, hides it otherwise.
    #[inline]
    pub fn toggle(&mut self) {
        self.is_open = !self.is_open;
    }

    /// Returns the transcript.
    #[inline]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Returns the dispatch state.
    ///
    /// A dispatch whose [`PendingReply`] was dropped without being
    /// finished no longer counts as pending.
    pub fn state(&self) -> DispatchState {
        if self.state == DispatchState::Pending
            && self.pending.strong_count() == 0
        {
            DispatchState::Idle
        } else {
            self.state
        }
    }

    /// Returns whether [`submit`](Self::submit) would accept `input`.
    #[inline]
    pub fn can_submit(&self, input: &str) -> bool {
        self.state() != DispatchState::Pending && !input.trim().is_empty()
    }

    /// Appends `input` to the transcript and starts sending it.
    ///
    /// Returns `None` and changes nothing when the input is blank or a
    /// reply is still pending. The text is sent exactly as given.
    ///
    /// Must be called within a Tokio runtime.
    pub fn submit(&mut self, input: &str) -> Option<PendingReply> {
        if !self.can_submit(input) {
            debug!("input not accepted in state {:?}", self.state());
            return None;
        }
        if self.state == DispatchState::Pending {
            warn!("the previous reply was dropped before it was finished");
        }

        self.transcript.push(Turn::user(input.to_owned()));
        self.state = DispatchState::Pending;

        let dispatcher = self.dispatcher.clone();
        let text = input.to_owned();
        let handle = tokio::spawn(async move { dispatcher.send(&text).await });
        let claim = Arc::new(());
        self.pending = Arc::downgrade(&claim);
        Some(PendingReply {
            handle,
            _claim: claim,
        })
    }

    /// Records how the pending dispatch ended.
    ///
    /// A reply is appended to the transcript, flagged as an error when it
    /// is a fallback. A cancelled dispatch appends nothing.
    pub fn finish(&mut self, outcome: DispatchOutcome) {
        self.pending = Weak::new();
        match outcome {
            DispatchOutcome::Replied(reply) => {
                self.state = if reply.is_fallback {
                    DispatchState::Error
                } else {
                    DispatchState::Resolved
                };
                self.transcript
                    .push(Turn::assistant(reply.text, reply.is_fallback));
            }
            DispatchOutcome::Cancelled => {
                debug!("dispatch cancelled");
                self.state = DispatchState::Idle;
            }
        }
    }
}
