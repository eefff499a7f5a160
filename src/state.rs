use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Per-session conversation record.
///
/// `messages` only ever grows: [`ConversationState::add_messages`] replaces a
/// message in place when its id is already present and appends otherwise.
/// `name` and `birthday` are carried for profile extraction and are not read
/// by the conversation loop.
#[derive(Default, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub birthday: String,
}

impl ConversationState {
    pub fn with_messages(messages: Vec<Message>) -> Self {
        let mut state = Self::default();
        state.add_messages(messages);
        state
    }

    pub fn add_messages(&mut self, incoming: impl IntoIterator<Item = Message>) {
        for message in incoming {
            match self.messages.iter_mut().find(|m| m.id == message.id) {
                Some(existing) => *existing = message,
                None => self.messages.push(message),
            }
        }
    }

    pub fn push(&mut self, message: Message) {
        self.add_messages(std::iter::once(message));
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_arrival_order() {
        let mut state = ConversationState::default();
        state.push(Message::user("Hello"));
        state.push(Message::assistant("Hi there!"));
        state.push(Message::user("How are you?"));

        let contents: Vec<&str> = state.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Hello", "Hi there!", "How are you?"]);
    }

    #[test]
    fn same_id_replaces_in_place() {
        let mut state = ConversationState::default();
        state.push(Message::user("first").with_id("a"));
        state.push(Message::assistant("second").with_id("b"));
        state.push(Message::user("edited").with_id("a"));

        assert_eq!(state.len(), 2);
        assert_eq!(state.messages[0].content, "edited");
        assert_eq!(state.messages[1].id, "b");
    }

    #[test]
    fn profile_fields_start_empty() {
        let state = ConversationState::with_messages(vec![Message::user("hi")]);
        assert!(state.name.is_empty());
        assert!(state.birthday.is_empty());
        assert_eq!(state.len(), 1);
    }
}
