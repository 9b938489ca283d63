use crate::models::chat::{ ChatMessage, Conversation };
use log::debug;

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    current: Option<String>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest first.
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    /// Messages of the current conversation, empty when none is current.
    pub fn active_messages(&self) -> &[ChatMessage] {
        self.current()
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn create_conversation(&mut self) -> &Conversation {
        let conversation = Conversation::new();
        debug!("Created conversation {}", conversation.id);
        self.current = Some(conversation.id.clone());
        self.conversations.insert(0, conversation);
        &self.conversations[0]
    }

    /// Returns false (and changes nothing) when `id` is unknown.
    pub fn select_conversation(&mut self, id: &str) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.current = Some(id.to_string());
        true
    }

    pub fn delete_conversation(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.current.as_deref() == Some(id) {
            self.current = None;
        }
        self.conversations.len() != before
    }

    /// Appends to the current conversation, starting one if none is current.
    /// Returns the id of the conversation the message landed in.
    pub fn append_message(&mut self, message: ChatMessage) -> String {
        let id = match self.current.clone() {
            Some(id) if self.get(&id).is_some() => id,
            _ => self.create_conversation().id.clone(),
        };
        self.append_to(&id, message);
        id
    }

    /// Appends to a specific conversation. Returns false if it no longer exists.
    pub fn append_to(&mut self, conversation_id: &str, message: ChatMessage) -> bool {
        match self.get_mut(conversation_id) {
            Some(conversation) => {
                conversation.push(message);
                true
            }
            None => {
                debug!("Dropping message for deleted conversation {}", conversation_id);
                false
            }
        }
    }
}
