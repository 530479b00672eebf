use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Upcoming,
    Active,
    Completed,
    Processing,
    Cancelled,
}

impl MeetingStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Processing => "processing",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "upcoming" => Some(Self::Upcoming),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "processing" => Some(Self::Processing),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub agent_id: String,
    pub status: MeetingStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A meeting joined to the agent it references. List and read operations
/// return this projection; the join never widens the owner scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingView {
    pub meeting: MeetingRecord,
    pub agent: AgentRecord,
}

impl MeetingView {
    /// Elapsed seconds between start and end; None until the meeting ended.
    #[must_use]
    pub fn duration_seconds(&self) -> Option<i64> {
        let started_at = self.meeting.started_at?;
        let ended_at = self.meeting.ended_at?;
        Some((ended_at - started_at).num_seconds())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeetingPatch {
    pub name: Option<String>,
    pub agent_id: Option<String>,
    pub status: Option<MeetingStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Common shape the predicate and ordering logic need from a stored record.
pub trait OwnedRecord {
    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
    fn search_text(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
}

impl OwnedRecord for AgentRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn search_text(&self) -> &str {
        &self.name
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl OwnedRecord for MeetingRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn search_text(&self) -> &str {
        &self.name
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl OwnedRecord for MeetingView {
    fn id(&self) -> &str {
        &self.meeting.id
    }

    fn owner_id(&self) -> &str {
        &self.meeting.owner_id
    }

    fn search_text(&self) -> &str {
        &self.meeting.name
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.meeting.created_at
    }
}

/// Deterministic list order: creation time descending, record id descending
/// as the tie-break. Creation timestamps are not unique, and without the
/// tie-break a record could surface on two pages or on none.
pub fn newest_first<R: OwnedRecord>(left: &R, right: &R) -> Ordering {
    right
        .created_at()
        .cmp(&left.created_at())
        .then_with(|| right.id().cmp(left.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn agent(id: &str, created_at: DateTime<Utc>) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            owner_id: "user-1".to_string(),
            name: "Agent".to_string(),
            instructions: String::new(),
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn newest_first_orders_by_creation_time_descending() {
        let older = agent("a", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let newer = agent("b", Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap());

        let mut rows = vec![older.clone(), newer.clone()];
        rows.sort_by(newest_first);
        assert_eq!(rows[0].id, newer.id);
        assert_eq!(rows[1].id, older.id);
    }

    #[test]
    fn newest_first_breaks_creation_ties_by_id_descending() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut rows = vec![agent("a", at), agent("c", at), agent("b", at)];
        rows.sort_by(newest_first);

        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn meeting_status_round_trips_through_parse() {
        for status in [
            MeetingStatus::Upcoming,
            MeetingStatus::Active,
            MeetingStatus::Completed,
            MeetingStatus::Processing,
            MeetingStatus::Cancelled,
        ] {
            assert_eq!(MeetingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MeetingStatus::parse("adjourned"), None);
    }

    #[test]
    fn duration_is_absent_until_the_meeting_ended() {
        let started = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let meeting = MeetingRecord {
            id: "m-1".to_string(),
            owner_id: "user-1".to_string(),
            name: "Standup".to_string(),
            agent_id: "a-1".to_string(),
            status: MeetingStatus::Active,
            started_at: Some(started),
            ended_at: None,
            created_at: started,
            updated_at: started,
        };
        let agent = agent("a-1", started);

        let mut view = MeetingView {
            meeting,
            agent,
        };
        assert_eq!(view.duration_seconds(), None);

        view.meeting.ended_at = Some(started + chrono::Duration::seconds(1800));
        assert_eq!(view.duration_seconds(), Some(1800));
    }
}
