//! In-memory [`ConversationStore`] backed by a `HashMap`. The default store
//! for development and tests; a durable backend implements the same trait.

use super::{Conversation, ConversationStore, SummaryItem, TranscriptItem};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_conversation<F>(&self, conversation_id: &str, mutate: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Conversation),
    {
        let mut conversations = self.conversations.write().await;
        match conversations.get_mut(conversation_id) {
            Some(conversation) => {
                mutate(conversation);
                Ok(())
            }
            None => Err(anyhow!("unknown conversation: {}", conversation_id)),
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, conversation: Conversation) -> anyhow::Result<()> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id.clone(), conversation);
        Ok(())
    }

    async fn get(&self, conversation_id: &str) -> anyhow::Result<Option<Conversation>> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(conversation_id).cloned())
    }

    async fn list(&self, active: Option<bool>) -> anyhow::Result<Vec<Conversation>> {
        let conversations = self.conversations.read().await;
        let mut result: Vec<Conversation> = conversations
            .values()
            .filter(|c| active.map_or(true, |flag| c.active == flag))
            .cloned()
            .collect();
        // Stable output order for the viewer endpoints
        result.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(result)
    }

    async fn set_active(&self, conversation_id: &str, active: bool) -> anyhow::Result<()> {
        self.with_conversation(conversation_id, |c| c.active = active)
            .await
    }

    async fn append_transcript(
        &self,
        conversation_id: &str,
        item: TranscriptItem,
    ) -> anyhow::Result<()> {
        self.with_conversation(conversation_id, |c| c.transcript.push(item))
            .await
    }

    async fn append_summary(
        &self,
        conversation_id: &str,
        item: SummaryItem,
    ) -> anyhow::Result<()> {
        self.with_conversation(conversation_id, |c| c.summary.push(item))
            .await
    }

    async fn append_rtt(&self, conversation_id: &str, rtt: String) -> anyhow::Result<()> {
        self.with_conversation(conversation_id, |c| c.rtt.push(rtt))
            .await
    }

    async fn update_position(
        &self,
        conversation_id: &str,
        position: String,
    ) -> anyhow::Result<()> {
        self.with_conversation(conversation_id, |c| c.position = position)
            .await
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MediaChannel;

    fn conversation(id: &str, active: bool) -> Conversation {
        Conversation {
            id: id.to_string(),
            session_id: format!("session-{}", id),
            active,
            ani: "+1-555-555-1234".into(),
            ani_name: "John Doe".into(),
            dnis: "+1-800-555-6789".into(),
            media: MediaChannel {
                media_type: "audio".into(),
                codec: "PCMU".into(),
                sample_rate: 8000,
                channels: vec!["external".into(), "internal".into()],
            },
            position: "PT0S".into(),
            rtt: Vec::new(),
            transcript: Vec::new(),
            summary: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let store = InMemoryConversationStore::new();
        store.create(conversation("c1", true)).await.unwrap();

        let fetched = store.get("c1").await.unwrap().unwrap();
        assert_eq!(fetched.session_id, "session-c1");
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_with_active_filter() {
        let store = InMemoryConversationStore::new();
        store.create(conversation("a", true)).await.unwrap();
        store.create(conversation("b", false)).await.unwrap();
        store.create(conversation("c", true)).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 3);
        let active: Vec<String> = store
            .list(Some(true))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(active, vec!["a", "c"]);
        assert_eq!(store.list(Some(false)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transcript_appends_preserve_order() {
        let store = InMemoryConversationStore::new();
        store.create(conversation("c1", true)).await.unwrap();

        for i in 0..3 {
            store
                .append_transcript(
                    "c1",
                    TranscriptItem {
                        channel: Some(1),
                        text: format!("utterance {}", i),
                        start: Some(format!("PT{}.00S", i)),
                        end: Some(format!("PT{}.50S", i)),
                    },
                )
                .await
                .unwrap();
        }

        let fetched = store.get("c1").await.unwrap().unwrap();
        let texts: Vec<&str> = fetched.transcript.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["utterance 0", "utterance 1", "utterance 2"]);
    }

    #[tokio::test]
    async fn test_set_active_and_unknown_id_errors() {
        let store = InMemoryConversationStore::new();
        store.create(conversation("c1", true)).await.unwrap();

        store.set_active("c1", false).await.unwrap();
        assert!(!store.get("c1").await.unwrap().unwrap().active);

        assert!(store.set_active("missing", false).await.is_err());
        assert!(store
            .append_transcript(
                "missing",
                TranscriptItem {
                    channel: None,
                    text: "late".into(),
                    start: None,
                    end: None
                }
            )
            .await
            .is_err());
    }
}
