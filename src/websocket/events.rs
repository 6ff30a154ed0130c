//! The JSON grammar spoken over the `/ws` socket.

use serde::{Deserialize, Serialize};

use crate::models::Event;

#[derive(Debug, Default, Deserialize)]
pub struct Subscriptions {
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// The single required first frame from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        after_event_id: i64,
        #[serde(default)]
        subscriptions: Option<Subscriptions>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    HelloOk {
        replay_until: i64,
        instance_id: String,
    },
    Event(Box<Event>),
}

impl ServerMessage {
    pub fn event(event: Event) -> Self {
        ServerMessage::Event(Box::new(event))
    }
}
