//! Ordered buffer of owned messages exchanged between an operator and its
//! function on one invocation.
//!
//! A [`FunctionResponse`] is never shared: it moves from the operator into
//! the function and a new one moves back. An empty response returned by a
//! source function signals end-of-stream; everywhere else emptiness just
//! means "nothing emitted for this record".

use super::Message;

/// An ordered, move-only sequence of owned messages.
#[derive(Debug, Default)]
pub struct FunctionResponse {
    messages: Vec<Message>,
}

impl FunctionResponse {
    /// Creates an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self { messages: Vec::new() }
    }

    /// Creates a response holding a single message.
    #[must_use]
    pub fn from_message(message: Message) -> Self {
        Self { messages: vec![message] }
    }

    /// Appends a message, preserving insertion order.
    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Releases all contained messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Number of contained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the response holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterates the messages in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    /// Drains the messages in insertion order, leaving the response empty.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Message> {
        self.messages.drain(..)
    }

    /// Consumes the response, yielding its messages.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

impl FromIterator<Message> for FunctionResponse {
    fn from_iter<T: IntoIterator<Item = Message>>(iter: T) -> Self {
        Self { messages: iter.into_iter().collect() }
    }
}

impl IntoIterator for FunctionResponse {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_insertion_order() {
        let mut resp = FunctionResponse::new();
        resp.add(Message::text(3, "c"));
        resp.add(Message::text(1, "a"));
        resp.add(Message::text(2, "b"));

        let uids: Vec<u64> = resp.iter().map(Message::uid).collect();
        assert_eq!(uids, vec![3, 1, 2]);
    }

    #[test]
    fn clear_releases_messages() {
        let mut resp = FunctionResponse::from_message(Message::text(1, "a"));
        assert_eq!(resp.len(), 1);
        resp.clear();
        assert!(resp.is_empty());
    }

    #[test]
    fn drain_empties_in_order() {
        let mut resp: FunctionResponse =
            (0..4).map(|i| Message::text(i, "x")).collect();
        let uids: Vec<u64> = resp.drain().map(|m| m.uid()).collect();
        assert_eq!(uids, vec![0, 1, 2, 3]);
        assert!(resp.is_empty());
    }
}
