//! Job event system.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. Subscribers see
//! only events published after they subscribed; current job state is read
//! from the queue snapshot instead of replayed. Publishing never blocks and never fails; slow receivers observe
//! `RecvError::Lagged` instead of stalling the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::JobId;
use crate::job::{JobState, ProgressSnapshot};

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    JobQueued {
        job_id: JobId,
        path: PathBuf,
    },
    JobStateChanged {
        job_id: JobId,
        from: JobState,
        to: JobState,
    },
    JobProgress {
        job_id: JobId,
        progress: ProgressSnapshot,
    },
    JobRemoved {
        job_id: JobId,
    },
    QueueShutdown,
}

impl EventPayload {
    /// The job this event concerns, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            EventPayload::JobQueued { job_id, .. }
            | EventPayload::JobStateChanged { job_id, .. }
            | EventPayload::JobProgress { job_id, .. }
            | EventPayload::JobRemoved { job_id } => Some(*job_id),
            EventPayload::QueueShutdown => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel for job events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus; `capacity` is how far a receiver may fall
    /// behind before it lags.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers.
    pub fn broadcast(&self, payload: EventPayload) {
        // Ignore send errors (no subscribers).
        let _ = self.tx.send(Event::new(payload));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let job_id = JobId::new();
        bus.broadcast(EventPayload::JobQueued {
            job_id,
            path: PathBuf::from("/films/clip.mkv"),
        });

        let event = rx.try_recv().unwrap();
        match &event.payload {
            EventPayload::JobQueued { job_id: received, path } => {
                assert_eq!(*received, job_id);
                assert_eq!(path, &PathBuf::from("/films/clip.mkv"));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn late_subscriber_sees_only_new_events() {
        let bus = EventBus::new(4);
        bus.broadcast(EventPayload::QueueShutdown);

        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());

        let job_id = JobId::new();
        bus.broadcast(EventPayload::JobRemoved { job_id });
        assert_eq!(rx.try_recv().unwrap().payload.job_id(), Some(job_id));
    }

    #[test]
    fn slow_receiver_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        let job_id = JobId::new();

        for _ in 0..5 {
            bus.broadcast(EventPayload::JobRemoved { job_id });
        }

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(3))
        ));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn state_change_serializes_with_type_tag() {
        let event = Event::new(EventPayload::JobStateChanged {
            job_id: JobId::new(),
            from: JobState::Probing,
            to: JobState::Converting,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "job_state_changed");
        assert_eq!(json["payload"]["to"]["state"], "converting");
    }
}
