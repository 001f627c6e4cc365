//! Conversation-related types.

use folio_chat_model::ModelMessage;

/// The history a session replays to the model on every request.
///
/// Only complete exchanges are kept: a user message is recorded together
/// with the model's non-empty reply, never on its own. Failed attempts
/// therefore leave no trace in what the model sees next time.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    pub(crate) exchanges: Vec<Exchange>,
}

/// A user message and the reply it received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Exchange {
    pub(crate) user: String,
    pub(crate) model: String,
}

impl Exchange {
    /// Returns what the user said.
    #[inline]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns what the model replied.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Conversation {
    /// Returns the recorded exchanges, oldest first.
    #[inline]
    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub(crate) fn record(&mut self, user: String, model: String) {
        self.exchanges.push(Exchange { user, model });
    }

    /// Builds the message list for a request that continues this
    /// conversation with `next_input`.
    pub(crate) fn messages_with(&self, next_input: &str) -> Vec<ModelMessage> {
        let mut messages = Vec::with_capacity(self.exchanges.len() * 2 + 1);
        for exchange in &self.exchanges {
            messages.push(ModelMessage::User(exchange.user.clone()));
            messages.push(ModelMessage::Model(exchange.model.clone()));
        }
        messages.push(ModelMessage::User(next_input.to_owned()));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_alternate() {
        let mut conversation = Conversation::default();
        assert_eq!(
            conversation.messages_with("Hi"),
            vec![ModelMessage::User("Hi".to_owned())]
        );

        conversation.record("Hi".to_owned(), "Hello!".to_owned());
        assert_eq!(
            conversation.messages_with("Who are you?"),
            vec![
                ModelMessage::User("Hi".to_owned()),
                ModelMessage::Model("Hello!".to_owned()),
                ModelMessage::User("Who are you?".to_owned()),
            ]
        );
        assert_eq!(conversation.exchanges()[0].model(), "Hello!");
    }
}
