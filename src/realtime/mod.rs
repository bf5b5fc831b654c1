//! Live change notifications.
//!
//! The [`Hub`] keeps one outbound queue per authenticated connection,
//! bucketed by user. Publishing targets a set of users; connections of
//! anyone else never see the message.

pub mod ws;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{ActivityDetails, Task, TaskId, TaskShare, User};

/// Identifier of one live connection.
pub type ConnectionId = u64;

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Auth { user_id: String },
    JoinTask { task_id: TaskId },
}

/// Messages pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    AuthSuccess,
    AuthError {
        message: String,
    },
    TaskCreated {
        task_id: TaskId,
        task: Task,
        user: User,
        timestamp: DateTime<Utc>,
    },
    TaskUpdated {
        task_id: TaskId,
        task: Task,
        changes: Value,
        user: User,
        timestamp: DateTime<Utc>,
    },
    TaskDeleted {
        task_id: TaskId,
        user: User,
        timestamp: DateTime<Utc>,
    },
    TaskShared {
        task_id: TaskId,
        share: TaskShare,
        user: User,
        timestamp: DateTime<Utc>,
    },
}

/// A task mutation worth telling collaborators about.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Created { task: Task },
    Updated { task: Task, changes: ActivityDetails },
    Deleted { task_id: TaskId },
    Shared { share: TaskShare },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Created { task } | TaskEvent::Updated { task, .. } => task.id,
            TaskEvent::Deleted { task_id } => *task_id,
            TaskEvent::Shared { share } => share.task_id,
        }
    }

    /// Wrap the event with the acting user and a timestamp.
    pub fn into_message(self, actor: User, timestamp: DateTime<Utc>) -> ServerMessage {
        let task_id = self.task_id();
        match self {
            TaskEvent::Created { task } => ServerMessage::TaskCreated {
                task_id,
                task,
                user: actor,
                timestamp,
            },
            TaskEvent::Updated { task, changes } => ServerMessage::TaskUpdated {
                task_id,
                task,
                changes: Value::Object(changes),
                user: actor,
                timestamp,
            },
            TaskEvent::Deleted { .. } => ServerMessage::TaskDeleted {
                task_id,
                user: actor,
                timestamp,
            },
            TaskEvent::Shared { share } => ServerMessage::TaskShared {
                task_id,
                share,
                user: actor,
                timestamp,
            },
        }
    }
}

type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Registry of live connections keyed by user.
#[derive(Default)]
pub struct Hub {
    next_id: AtomicU64,
    connections: Mutex<HashMap<String, HashMap<ConnectionId, Outbox>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user and return its receiving end.
    pub fn register(&self, user_id: &str) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut conns = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        conns.entry(user_id.to_string()).or_default().insert(id, tx);
        debug!(user_id, connection_id = id, "Connection registered");
        (id, rx)
    }

    /// Remove a connection. Returns true if it was registered.
    pub fn unregister(&self, user_id: &str, id: ConnectionId) -> bool {
        let mut conns = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        let Some(bucket) = conns.get_mut(user_id) else {
            return false;
        };
        let removed = bucket.remove(&id).is_some();
        if bucket.is_empty() {
            conns.remove(user_id);
        }
        if removed {
            debug!(user_id, connection_id = id, "Connection unregistered");
        }
        removed
    }

    /// Deliver to every connection of one user. Returns how many accepted it.
    pub fn publish_to_user(&self, user_id: &str, message: &ServerMessage) -> usize {
        let mut conns = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        Self::deliver(&mut conns, user_id, message)
    }

    /// Deliver to every connection of every user in `audience`.
    pub fn publish(&self, audience: &[String], message: &ServerMessage) -> usize {
        let mut conns = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        let unique: HashSet<&str> = audience.iter().map(String::as_str).collect();
        unique
            .into_iter()
            .map(|user_id| Self::deliver(&mut conns, user_id, message))
            .sum()
    }

    /// Send to one user's bucket, pruning connections whose receiver is gone.
    fn deliver(
        conns: &mut HashMap<String, HashMap<ConnectionId, Outbox>>,
        user_id: &str,
        message: &ServerMessage,
    ) -> usize {
        let Some(bucket) = conns.get_mut(user_id) else {
            return 0;
        };
        bucket.retain(|_, tx| tx.send(message.clone()).is_ok());
        let delivered = bucket.len();
        if bucket.is_empty() {
            conns.remove(user_id);
        }
        delivered
    }

    /// Number of live connections for a user.
    pub fn connection_count(&self, user_id: &str) -> usize {
        let conns = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        conns.get(user_id).map_or(0, HashMap::len)
    }

    /// Number of users with at least one live connection.
    pub fn user_count(&self) -> usize {
        let conns = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        conns.len()
    }
}
