use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::{Employee, LeaveRequest, Notification, UserId};

/// Severity hint shown by real-time clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushKind {
    Info,
    Success,
    Error,
    Warning,
}

/// Payload delivered over the real-time channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: PushKind,
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("no connected subscribers")]
    NoSubscribers,
    #[error("push transport failed: {0}")]
    Transport(String),
}

/// Best-effort real-time delivery addressed by recipient.
///
/// Failures are logged by the caller and never undo a committed transition;
/// the persisted [`Notification`] is the recovery path.
pub trait PushChannel: Send + Sync {
    fn notify(&self, recipient: UserId, message: &PushMessage) -> Result<(), PushError>;
}

/// Writes every push to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPush;

impl PushChannel for LogPush {
    fn notify(&self, recipient: UserId, message: &PushMessage) -> Result<(), PushError> {
        tracing::info!(%recipient, title = %message.title, kind = ?message.kind, "push notification");
        Ok(())
    }
}

/// Fans pushes out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastPush {
    sender: broadcast::Sender<(UserId, PushMessage)>,
}

impl BroadcastPush {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(UserId, PushMessage)> {
        self.sender.subscribe()
    }
}

impl PushChannel for BroadcastPush {
    fn notify(&self, recipient: UserId, message: &PushMessage) -> Result<(), PushError> {
        self.sender
            .send((recipient, message.clone()))
            .map(|_| ())
            .map_err(|_| PushError::NoSubscribers)
    }
}

/// A status change that someone has to hear about.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    Applied {
        applicant: &'a Employee,
        admins: &'a [UserId],
    },
    Approved(&'a LeaveRequest),
    Rejected(&'a LeaveRequest),
    Cancelled(&'a LeaveRequest),
}

/// One notification to persist plus the push that mirrors it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub record: Notification,
    pub push: PushMessage,
}

impl Dispatch {
    fn new(recipient: UserId, title: &str, message: String, kind: PushKind, at: DateTime<Utc>) -> Self {
        Self {
            record: Notification::new(recipient, title, message.clone(), at),
            push: PushMessage {
                title: title.to_string(),
                message,
                kind,
            },
        }
    }

    pub fn recipient(&self) -> UserId {
        self.record.user_id
    }
}

/// Build the notifications for `event`: one per administrator when a leave is
/// filed, one for the requester on every later transition.
pub fn compose(event: LifecycleEvent<'_>, at: DateTime<Utc>) -> Vec<Dispatch> {
    match event {
        LifecycleEvent::Applied { applicant, admins } => admins
            .iter()
            .map(|admin| {
                Dispatch::new(
                    *admin,
                    "New Leave Application",
                    format!("{} applied for leave.", applicant.full_name),
                    PushKind::Info,
                    at,
                )
            })
            .collect(),
        LifecycleEvent::Approved(leave) => vec![Dispatch::new(
            leave.user_id,
            "Leave Approved",
            "Your leave has been approved.".to_string(),
            PushKind::Success,
            at,
        )],
        LifecycleEvent::Rejected(leave) => vec![Dispatch::new(
            leave.user_id,
            "Leave Rejected",
            "Your leave has been rejected.".to_string(),
            PushKind::Error,
            at,
        )],
        LifecycleEvent::Cancelled(leave) => vec![Dispatch::new(
            leave.user_id,
            "Leave Cancelled",
            format!(
                "Your leave from {} to {} has been cancelled.",
                leave.start_date, leave.end_date
            ),
            PushKind::Warning,
            at,
        )],
    }
}
