// ============================
// crates/backend-lib/src/meeting.rs
// ============================
//! Meeting document and its state transitions.
//!
//! A [`Meeting`] is mutated only through [`Meeting::apply`], which the room
//! actor calls on a private copy before persisting it.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use templemeet_common::{ParticipantId, ServerEvent};

/// One participant entry, created per join
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: ParticipantId,
    pub user_name: String,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn is_open(&self) -> bool {
        self.left_at.is_none()
    }
}

/// One chat transcript line
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub sender: String,
    pub message: String,
    pub time: DateTime<Utc>,
}

/// Kinds of entries in the audit log
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Join,
    Leave,
    ScreenShareStart,
    ScreenShareEnd,
    RaiseHand,
}

/// One audit log entry
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MeetingEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub user: String,
    pub time: DateTime<Utc>,
}

/// Pandit approval status of a booked meeting
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    Pending,
    Approved,
    Rejected,
}

/// Derived lifecycle state of a room
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MeetingState {
    New,
    Active,
    Ended,
}

/// Room signals that are logged and relayed but carry no payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    ScreenShareStart,
    ScreenShareEnd,
    RaiseHand,
}

impl Signal {
    fn event_kind(self) -> EventKind {
        match self {
            Signal::ScreenShareStart => EventKind::ScreenShareStart,
            Signal::ScreenShareEnd => EventKind::ScreenShareEnd,
            Signal::RaiseHand => EventKind::RaiseHand,
        }
    }
}

/// Booking details attached when a meeting is created explicitly
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BookingDetails {
    #[serde(default)]
    pub booking_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub pandit_requested: Option<String>,
}

/// A single change applied to one room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomDelta {
    Join {
        participant_id: ParticipantId,
        user_name: String,
    },
    /// `participant_id` is `None` when the leaving connection holds no open
    /// entry for this user; the event is logged but nothing is closed.
    Leave {
        participant_id: Option<ParticipantId>,
        user_name: String,
    },
    Chat {
        sender: String,
        message: String,
    },
    Signal {
        signal: Signal,
        sender: String,
    },
    Book(BookingDetails),
    RequestPandit {
        pandit_id: String,
    },
    PanditDecision {
        pandit_id: String,
        approve: bool,
    },
}

impl RoomDelta {
    /// Deltas that address an existing meeting and must not create one
    pub fn requires_existing(&self) -> bool {
        matches!(
            self,
            RoomDelta::RequestPandit { .. } | RoomDelta::PanditDecision { .. }
        )
    }
}

/// Result of applying a delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// State after the delta
    pub state: MeetingState,
    /// Participant entry closed by a leave
    pub closed: Option<ParticipantId>,
    /// True when this delta ended the meeting
    pub ended: bool,
    /// Event to relay to the room, sender excluded
    pub broadcast: Option<ServerEvent>,
}

/// The authoritative record of one room
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub room_id: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub messages: Vec<ChatRecord>,
    #[serde(default)]
    pub events: Vec<MeetingEvent>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pandit_requested: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pandit_approved: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
}

impl Meeting {
    pub fn new(room_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            room_id: room_id.into(),
            participants: Vec::new(),
            messages: Vec::new(),
            events: Vec::new(),
            started_at: now,
            ended_at: None,
            booking_id: None,
            title: None,
            created_by: None,
            pandit_requested: None,
            pandit_approved: None,
            approval: None,
        }
    }

    /// Participants that have joined and not left
    pub fn open_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_open())
    }

    pub fn state(&self) -> MeetingState {
        if self.open_participants().next().is_some() {
            MeetingState::Active
        } else if self.ended_at.is_some() {
            MeetingState::Ended
        } else {
            MeetingState::New
        }
    }

    fn log(&mut self, kind: EventKind, user: &str, now: DateTime<Utc>) {
        self.events.push(MeetingEvent {
            kind,
            user: user.to_string(),
            time: now,
        });
    }

    /// Apply one delta at time `now`
    pub fn apply(&mut self, delta: &RoomDelta, now: DateTime<Utc>) -> Applied {
        let mut closed = None;
        let mut ended = false;
        let mut broadcast = None;

        match delta {
            RoomDelta::Join {
                participant_id,
                user_name,
            } => {
                self.participants.push(Participant {
                    participant_id: *participant_id,
                    user_name: user_name.clone(),
                    joined_at: now,
                    left_at: None,
                });
                self.log(EventKind::Join, user_name, now);
                // re-entry after the room ended
                self.ended_at = None;
            },
            RoomDelta::Leave {
                participant_id,
                user_name,
            } => {
                if let Some(pid) = participant_id {
                    if let Some(entry) = self
                        .participants
                        .iter_mut()
                        .find(|p| p.participant_id == *pid && p.is_open())
                    {
                        entry.left_at = Some(now);
                        closed = Some(*pid);
                    }
                }
                self.log(EventKind::Leave, user_name, now);
                if closed.is_some() && self.open_participants().next().is_none() {
                    self.ended_at = Some(now);
                    ended = true;
                }
            },
            RoomDelta::Chat { sender, message } => {
                self.messages.push(ChatRecord {
                    sender: sender.clone(),
                    message: message.clone(),
                    time: now,
                });
                broadcast = Some(ServerEvent::ChatMessage {
                    room_id: self.room_id.clone(),
                    sender: sender.clone(),
                    message: message.clone(),
                    time: now,
                });
            },
            RoomDelta::Signal { signal, sender } => {
                self.log(signal.event_kind(), sender, now);
                let room_id = self.room_id.clone();
                let sender = sender.clone();
                broadcast = Some(match signal {
                    Signal::ScreenShareStart => ServerEvent::ScreenShareStart { room_id, sender },
                    Signal::ScreenShareEnd => ServerEvent::ScreenShareEnd { room_id, sender },
                    Signal::RaiseHand => ServerEvent::RaiseHand { room_id, sender },
                });
            },
            RoomDelta::Book(details) => {
                if details.booking_id.is_some() {
                    self.booking_id.clone_from(&details.booking_id);
                }
                if details.title.is_some() {
                    self.title.clone_from(&details.title);
                }
                if details.created_by.is_some() {
                    self.created_by.clone_from(&details.created_by);
                }
                if details.pandit_requested.is_some() {
                    self.pandit_requested.clone_from(&details.pandit_requested);
                }
                self.approval.get_or_insert(Approval::Pending);
            },
            RoomDelta::RequestPandit { pandit_id } => {
                self.pandit_requested = Some(pandit_id.clone());
                self.pandit_approved = None;
                self.approval = Some(Approval::Pending);
            },
            RoomDelta::PanditDecision { pandit_id, approve } => {
                if *approve {
                    self.approval = Some(Approval::Approved);
                    self.pandit_approved = Some(pandit_id.clone());
                } else {
                    self.approval = Some(Approval::Rejected);
                }
            },
        }

        Applied {
            state: self.state(),
            closed,
            ended,
            broadcast,
        }
    }
}
