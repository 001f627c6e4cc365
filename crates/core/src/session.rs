use std::error::Error;
use std::fmt::{self, Debug, Display};
use std::sync::{Arc, Mutex, MutexGuard};

use folio_chat_model::{ModelProvider, ModelProviderError, ModelRequest};
use tokio::sync::{
    Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, OnceCell,
};

use crate::conversation::Conversation;
use crate::model_client::ModelClient;

/// The chat session could not be constructed.
///
/// This is never a transient condition, so it is not retried.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConfigurationError {
    /// No credential was found in the named configuration source.
    MissingCredential {
        /// Where the credential was looked up, e.g. an environment variable.
        source: String,
    },
    /// A credential was found but cannot be used.
    InvalidCredential {
        /// Why the credential was rejected.
        reason: String,
    },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::MissingCredential { source } => {
                write!(f, "no API credential configured ({source})")
            }
            ConfigurationError::InvalidCredential { reason } => {
                write!(f, "invalid API credential: {reason}")
            }
        }
    }
}

impl Error for ConfigurationError {}

type SessionFactory =
    Box<dyn Fn() -> Result<ModelClient, ConfigurationError> + Send + Sync>;

/// Owns the single chat session of the process, created on first demand.
///
/// The factory runs at most once. Its outcome, including a
/// [`ConfigurationError`], is kept for the lifetime of the manager, so a
/// missing credential keeps the chat unavailable instead of being probed
/// again on every message.
pub struct SessionManager {
    system_prompt: String,
    factory: SessionFactory,
    session: OnceCell<Result<Arc<ChatSession>, ConfigurationError>>,
}

impl SessionManager {
    /// Creates a manager whose session will be bound to `system_prompt`
    /// and talk to the provider built by `factory`.
    pub fn new<S, F, P>(system_prompt: S, factory: F) -> Self
    where
        S: Into<String>,
        F: Fn() -> Result<P, ConfigurationError> + Send + Sync + 'static,
        P: ModelProvider + 'static,
    {
        Self {
            system_prompt: system_prompt.into(),
            factory: Box::new(move || factory().map(ModelClient::new)),
            session: OnceCell::new(),
        }
    }

    /// Returns the session, creating it if this is the first call.
    ///
    /// Concurrent first calls wait for a single construction.
    pub async fn get_or_create_session(
        &self,
    ) -> Result<Arc<ChatSession>, ConfigurationError> {
        self.session
            .get_or_init(|| async {
                debug!("creating the chat session");
                match (self.factory)() {
                    Ok(model_client) => Ok(Arc::new(ChatSession::new(
                        model_client,
                        self.system_prompt.clone(),
                    ))),
                    Err(err) => {
                        warn!("chat session is unavailable: {err}");
                        Err(err)
                    }
                }
            })
            .await
            .clone()
    }

    /// Returns whether the session (or its construction failure) exists.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.session.initialized()
    }
}

impl Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("session", &self.session.get())
            .finish_non_exhaustive()
    }
}

/// A conversation with the remote model, bound to a fixed system prompt.
///
/// The session keeps the history itself and replays it with every
/// request, the endpoint does not remember anything between calls.
pub struct ChatSession {
    model_client: ModelClient,
    system_prompt: String,
    conversation: Mutex<Conversation>,
    turn: AsyncMutex<()>,
}

impl ChatSession {
    fn new(model_client: ModelClient, system_prompt: String) -> Self {
        Self {
            model_client,
            system_prompt,
            conversation: Default::default(),
            turn: AsyncMutex::new(()),
        }
    }

    /// Returns the system prompt of this session.
    #[inline]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Returns a snapshot of the recorded history.
    pub fn conversation(&self) -> Conversation {
        self.lock_conversation().clone()
    }

    /// Waits until no other turn is in progress and claims the session.
    ///
    /// Turns are granted in the order they were requested. The claim is
    /// released when the guard is dropped.
    pub async fn begin_turn(&self) -> TurnGuard<'_> {
        TurnGuard {
            _guard: self.turn.lock().await,
        }
    }

    /// Sends one message and returns the reply text, which may be empty.
    ///
    /// The exchange is added to the history only when the reply has text.
    pub async fn send_message(
        &self,
        text: &str,
    ) -> Result<String, Box<dyn ModelProviderError>> {
        let request = ModelRequest {
            system: Some(self.system_prompt.clone()),
            messages: self.lock_conversation().messages_with(text),
        };
        let resp = self.model_client.send_request(request).await?;
        trace!("reply finished with {:?}", resp.finish_reason);

        if !resp.text.is_empty() {
            self.lock_conversation()
                .record(text.to_owned(), resp.text.clone());
        }
        Ok(resp.text)
    }

    fn lock_conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }
}

impl Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("system_prompt", &self.system_prompt)
            .field("conversation", &*self.lock_conversation())
            .finish_non_exhaustive()
    }
}

/// Exclusive claim on a [`ChatSession`] for one dispatch.
pub struct TurnGuard<'a> {
    _guard: AsyncMutexGuard<'a, ()>,
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use folio_chat_model::ModelMessage;
    use folio_chat_test_model::{PresetResponse, TestModelProvider};

    use super::*;

    fn counting_manager(
        provider: TestModelProvider,
    ) -> (SessionManager, Arc<AtomicUsize>) {
        let constructions = Arc::new(AtomicUsize::new(0));
        let manager = SessionManager::new("You are CORE.", {
            let constructions = Arc::clone(&constructions);
            move || {
                constructions.fetch_add(1, Ordering::SeqCst);
                Ok(provider.clone())
            }
        });
        (manager, constructions)
    }

    #[tokio::test]
    async fn test_session_is_created_once() {
        let (manager, constructions) =
            counting_manager(TestModelProvider::default());
        assert!(!manager.is_initialized());

        let first = manager.get_or_create_session().await.unwrap();
        for _ in 0..5 {
            let again = manager.get_or_create_session().await.unwrap();
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
        assert_eq!(first.system_prompt(), "You are CORE.");
    }

    #[tokio::test]
    async fn test_configuration_error_is_kept() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let manager = SessionManager::new("You are CORE.", {
            let attempts = Arc::clone(&attempts);
            move || -> Result<TestModelProvider, ConfigurationError> {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ConfigurationError::MissingCredential {
                    source: "GEMINI_API_KEY".to_owned(),
                })
            }
        });

        for _ in 0..3 {
            let err = manager.get_or_create_session().await.unwrap_err();
            assert!(matches!(
                err,
                ConfigurationError::MissingCredential { .. }
            ));
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_history_is_replayed() {
        let mut provider = TestModelProvider::default();
        provider.add_exchange(PresetResponse::with_text("Hello!"));
        provider.add_exchange(PresetResponse::with_text("I am CORE."));
        let (manager, _) = counting_manager(provider.clone());

        let session = manager.get_or_create_session().await.unwrap();
        assert_eq!(session.send_message("Hi").await.unwrap(), "Hello!");
        assert_eq!(
            session.send_message("Who are you?").await.unwrap(),
            "I am CORE."
        );

        let requests = provider.requests();
        assert_eq!(requests[1].system.as_deref(), Some("You are CORE."));
        assert_eq!(
            requests[1].messages,
            vec![
                ModelMessage::User("Hi".to_owned()),
                ModelMessage::Model("Hello!".to_owned()),
                ModelMessage::User("Who are you?".to_owned()),
            ]
        );
        assert_eq!(session.conversation().exchanges().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_and_empty_replies_are_not_recorded() {
        let mut provider = TestModelProvider::default();
        provider.add_exchange(PresetResponse::empty().with_failures(1));
        let (manager, _) = counting_manager(provider);

        let session = manager.get_or_create_session().await.unwrap();
        assert!(session.send_message("Hi").await.is_err());
        assert_eq!(session.send_message("Hi").await.unwrap(), "");
        assert!(session.conversation().exchanges().is_empty());
    }
}
