//! In-process broadcast rooms, one per conversation.

use crate::core::traits::RealtimeNotifier;
use crate::infrastructure::entities;
use di::{inject, injectable};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Events queued per subscriber before new ones are dropped.
const SUBSCRIBER_BUFFER: usize = 64;

/// Server to client events.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RealtimeEvent {
    AiTyping {
        #[serde(rename = "conversationId")]
        conversation_id: Uuid,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    NewMessage {
        message: entities::Message,
    },
}

/// Client to server commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientCommand {
    JoinConversation {
        #[serde(rename = "conversationId")]
        conversation_id: Uuid,
    },
    LeaveConversation {
        #[serde(rename = "conversationId")]
        conversation_id: Uuid,
    },
}

/// Handle returned to a connecting client.
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub events: mpsc::Receiver<RealtimeEvent>,
}

#[derive(Default)]
struct Rooms {
    clients: HashMap<u64, mpsc::Sender<RealtimeEvent>>,
    watchers: HashMap<Uuid, HashSet<u64>>,
}

pub struct RoomHub {
    next_id: AtomicU64,
    rooms: Mutex<Rooms>,
}

#[injectable(RealtimeNotifier)]
impl RoomHub {
    #[inject]
    pub fn create() -> RoomHub {
        RoomHub {
            next_id: AtomicU64::new(1),
            rooms: Mutex::new(Rooms::default()),
        }
    }
}

impl RoomHub {
    fn rooms(&self) -> MutexGuard<'_, Rooms> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of subscribers currently in the room.
    pub fn room_size(&self, conversation_id: Uuid) -> usize {
        self.rooms()
            .watchers
            .get(&conversation_id)
            .map_or(0, HashSet::len)
    }
}

impl RealtimeNotifier for RoomHub {
    fn connect(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, events) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.rooms().clients.insert(id, sender);

        Subscription { id, events }
    }

    fn join(&self, subscriber_id: u64, conversation_id: Uuid) {
        let mut rooms = self.rooms();
        if rooms.clients.contains_key(&subscriber_id) {
            rooms
                .watchers
                .entry(conversation_id)
                .or_default()
                .insert(subscriber_id);
        }
    }

    fn leave(&self, subscriber_id: u64, conversation_id: Uuid) {
        let mut rooms = self.rooms();
        if let Some(watchers) = rooms.watchers.get_mut(&conversation_id) {
            watchers.remove(&subscriber_id);
            if watchers.is_empty() {
                rooms.watchers.remove(&conversation_id);
            }
        }
    }

    fn disconnect(&self, subscriber_id: u64) {
        let mut rooms = self.rooms();
        rooms.clients.remove(&subscriber_id);
        rooms.watchers.retain(|_, watchers| {
            watchers.remove(&subscriber_id);
            !watchers.is_empty()
        });
    }

    fn publish(&self, conversation_id: Uuid, event: RealtimeEvent) -> usize {
        let rooms = self.rooms();
        let Some(watchers) = rooms.watchers.get(&conversation_id) else {
            return 0;
        };

        watchers
            .iter()
            .filter_map(|id| rooms.clients.get(id))
            .filter(|sender| match sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(e) => {
                    debug!("dropping event for room {conversation_id}: {e}");
                    false
                }
            })
            .count()
    }
}
