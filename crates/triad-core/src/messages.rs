use serde::{Deserialize, Serialize};

/// Who authored a turn. Serialized with the chat-completions role names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    Requester,
    #[serde(rename = "assistant")]
    Responder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "user",
            Self::Responder => "assistant",
        }
    }
}

/// One immutable entry in a run's conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
}

impl ConversationTurn {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("requester turn appended while turn {index} still awaits a response")]
    AwaitingResponse { index: usize },
    #[error("responder turn appended without a pending requester turn")]
    NoPendingRequest,
}

/// Append-only conversation owned by a single run.
///
/// Turns strictly alternate requester → responder, starting with a requester
/// turn. Existing turns cannot be modified or removed.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_request(&mut self, content: impl Into<String>) -> Result<(), HistoryError> {
        if self.awaiting_response() {
            return Err(HistoryError::AwaitingResponse {
                index: self.turns.len() - 1,
            });
        }
        self.turns.push(ConversationTurn {
            role: Role::Requester,
            content: content.into(),
        });
        Ok(())
    }

    pub fn append_response(&mut self, content: impl Into<String>) -> Result<(), HistoryError> {
        if !self.awaiting_response() {
            return Err(HistoryError::NoPendingRequest);
        }
        self.turns.push(ConversationTurn {
            role: Role::Responder,
            content: content.into(),
        });
        Ok(())
    }

    /// True when the last turn is a requester turn with no response yet.
    pub fn awaiting_response(&self) -> bool {
        matches!(self.turns.last(), Some(t) if t.role == Role::Requester)
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternating_appends() {
        let mut history = ConversationHistory::new();
        history.append_request("question").unwrap();
        assert!(history.awaiting_response());
        history.append_response("answer").unwrap();
        history.append_request("follow-up").unwrap();
        history.append_response("more").unwrap();

        assert_eq!(history.len(), 4);
        let roles: Vec<Role> = history.turns().iter().map(|t| t.role()).collect();
        assert_eq!(
            roles,
            vec![Role::Requester, Role::Responder, Role::Requester, Role::Responder]
        );
        assert_eq!(history.turns()[1].content(), "answer");
    }

    #[test]
    fn rejects_double_request() {
        let mut history = ConversationHistory::new();
        history.append_request("one").unwrap();
        let err = history.append_request("two").unwrap_err();
        assert_eq!(err, HistoryError::AwaitingResponse { index: 0 });
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn rejects_response_first() {
        let mut history = ConversationHistory::new();
        assert_eq!(
            history.append_response("orphan").unwrap_err(),
            HistoryError::NoPendingRequest
        );
        assert!(history.is_empty());
    }

    #[test]
    fn rejects_double_response() {
        let mut history = ConversationHistory::new();
        history.append_request("q").unwrap();
        history.append_response("a").unwrap();
        assert!(history.append_response("b").is_err());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn serializes_with_chat_role_names() {
        let mut history = ConversationHistory::new();
        history.append_request("hi").unwrap();
        history.append_response("hello").unwrap();
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json["turns"][0]["role"], "user");
        assert_eq!(json["turns"][1]["role"], "assistant");
        assert_eq!(json["turns"][1]["content"], "hello");
    }
}
