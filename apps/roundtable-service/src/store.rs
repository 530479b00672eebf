use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use roundtable_domain::{
    AgentPatch, AgentRecord, MeetingPatch, MeetingRecord, MeetingView, Predicate, newest_first,
};

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{message}")]
    Persistence { message: String },
}

/// The record store the query engine and mutation gateway are written
/// against. `select` returns rows in the deterministic list order (creation
/// time descending, id descending); `select` and `count` over the same
/// predicate always see the same row set.
#[async_trait]
pub trait RecordStore<R>: Send + Sync {
    type Patch: Send;

    async fn select(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<R>, StoreError>;

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError>;

    async fn insert(&self, record: R) -> Result<R, StoreError>;

    /// Applies the patch to the single record matching the predicate.
    /// Zero matches yield `None`; the caller decides what that means.
    async fn update(
        &self,
        predicate: &Predicate,
        patch: Self::Patch,
    ) -> Result<Option<R>, StoreError>;

    async fn delete(&self, predicate: &Predicate) -> Result<Option<R>, StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct WorkspaceState {
    agents: HashMap<String, AgentRecord>,
    meetings: HashMap<String, MeetingRecord>,
}

#[derive(Clone)]
pub struct WorkspaceStore {
    state: Arc<RwLock<WorkspaceState>>,
    path: Option<PathBuf>,
}

impl WorkspaceStore {
    pub fn from_config(config: &Config) -> Self {
        let path = config.workspace_store_path.clone();
        let state = Self::load_state(path.as_ref());
        Self {
            state: Arc::new(RwLock::new(state)),
            path,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(RwLock::new(WorkspaceState::default())),
            path: None,
        }
    }

    pub fn agents(&self) -> AgentCollection {
        AgentCollection {
            store: self.clone(),
        }
    }

    pub fn meetings(&self) -> MeetingCollection {
        MeetingCollection {
            store: self.clone(),
        }
    }

    fn load_state(path: Option<&PathBuf>) -> WorkspaceState {
        let Some(path) = path else {
            return WorkspaceState::default();
        };

        let raw = match std::fs::read_to_string(path) {
            Ok(value) => value,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return WorkspaceState::default();
            }
            Err(error) => {
                tracing::warn!(
                    target: "roundtable.store",
                    path = %path.display(),
                    error = %error,
                    "failed to read workspace store; booting with empty state",
                );
                return WorkspaceState::default();
            }
        };

        match serde_json::from_str::<WorkspaceState>(&raw) {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(
                    target: "roundtable.store",
                    path = %path.display(),
                    error = %error,
                    "failed to parse workspace store; booting with empty state",
                );
                WorkspaceState::default()
            }
        }
    }

    async fn persist_state(&self, snapshot: &WorkspaceState) -> Result<(), StoreError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| StoreError::Persistence {
                    message: format!("failed to prepare workspace store directory: {error}"),
                })?;
        }

        let payload = serde_json::to_vec(snapshot).map_err(|error| StoreError::Persistence {
            message: format!("failed to encode workspace store payload: {error}"),
        })?;

        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|error| StoreError::Persistence {
                message: format!("failed to write workspace store payload: {error}"),
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|error| StoreError::Persistence {
                message: format!("failed to finalize workspace store payload: {error}"),
            })?;

        Ok(())
    }

    async fn mutate<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut WorkspaceState) -> Result<T, StoreError>,
    {
        let (result, snapshot) = {
            let mut state = self.state.write().await;
            let result = operation(&mut state)?;
            (result, state.clone())
        };

        self.persist_state(&snapshot).await?;
        Ok(result)
    }
}

fn agent_rows(state: &WorkspaceState, predicate: &Predicate) -> Vec<AgentRecord> {
    let mut rows: Vec<AgentRecord> = state
        .agents
        .values()
        .filter(|record| predicate.matches(*record))
        .cloned()
        .collect();
    rows.sort_by(newest_first);
    rows
}

/// Meetings are read through the agent join. The predicate is evaluated
/// against the meeting row alone; the join only attaches the agent and drops
/// rows whose agent is gone, identically for `select` and `count`.
fn meeting_rows(state: &WorkspaceState, predicate: &Predicate) -> Vec<MeetingView> {
    let mut rows: Vec<MeetingView> = state
        .meetings
        .values()
        .filter(|meeting| predicate.matches(*meeting))
        .filter_map(|meeting| {
            state.agents.get(&meeting.agent_id).map(|agent| MeetingView {
                meeting: meeting.clone(),
                agent: agent.clone(),
            })
        })
        .collect();
    rows.sort_by(newest_first);
    rows
}

fn slice_rows<T: Clone>(rows: &[T], offset: u64, limit: u64) -> Vec<T> {
    let start = (offset as usize).min(rows.len());
    let end = start.saturating_add(limit as usize).min(rows.len());
    rows[start..end].to_vec()
}

#[derive(Clone)]
pub struct AgentCollection {
    store: WorkspaceStore,
}

#[async_trait]
impl RecordStore<AgentRecord> for AgentCollection {
    type Patch = AgentPatch;

    async fn select(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<AgentRecord>, StoreError> {
        let state = self.store.state.read().await;
        Ok(slice_rows(&agent_rows(&state, predicate), offset, limit))
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        let state = self.store.state.read().await;
        Ok(agent_rows(&state, predicate).len() as u64)
    }

    async fn insert(&self, record: AgentRecord) -> Result<AgentRecord, StoreError> {
        self.store
            .mutate(|state| {
                state.agents.insert(record.id.clone(), record.clone());
                Ok(record)
            })
            .await
    }

    async fn update(
        &self,
        predicate: &Predicate,
        patch: AgentPatch,
    ) -> Result<Option<AgentRecord>, StoreError> {
        self.store
            .mutate(|state| {
                let Some(id) = agent_rows(state, predicate)
                    .first()
                    .map(|record| record.id.clone())
                else {
                    return Ok(None);
                };
                let Some(record) = state.agents.get_mut(&id) else {
                    return Ok(None);
                };
                if let Some(name) = patch.name {
                    record.name = name;
                }
                if let Some(instructions) = patch.instructions {
                    record.instructions = instructions;
                }
                record.updated_at = Utc::now();
                Ok(Some(record.clone()))
            })
            .await
    }

    async fn delete(&self, predicate: &Predicate) -> Result<Option<AgentRecord>, StoreError> {
        self.store
            .mutate(|state| {
                let Some(id) = agent_rows(state, predicate)
                    .first()
                    .map(|record| record.id.clone())
                else {
                    return Ok(None);
                };
                Ok(state.agents.remove(&id))
            })
            .await
    }
}

#[derive(Clone)]
pub struct MeetingCollection {
    store: WorkspaceStore,
}

#[async_trait]
impl RecordStore<MeetingView> for MeetingCollection {
    type Patch = MeetingPatch;

    async fn select(
        &self,
        predicate: &Predicate,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<MeetingView>, StoreError> {
        let state = self.store.state.read().await;
        Ok(slice_rows(&meeting_rows(&state, predicate), offset, limit))
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64, StoreError> {
        let state = self.store.state.read().await;
        Ok(meeting_rows(&state, predicate).len() as u64)
    }

    async fn insert(&self, record: MeetingView) -> Result<MeetingView, StoreError> {
        self.store
            .mutate(|state| {
                state
                    .meetings
                    .insert(record.meeting.id.clone(), record.meeting.clone());
                Ok(record)
            })
            .await
    }

    async fn update(
        &self,
        predicate: &Predicate,
        patch: MeetingPatch,
    ) -> Result<Option<MeetingView>, StoreError> {
        self.store
            .mutate(|state| {
                let Some(id) = meeting_rows(state, predicate)
                    .first()
                    .map(|view| view.meeting.id.clone())
                else {
                    return Ok(None);
                };
                let Some(meeting) = state.meetings.get(&id) else {
                    return Ok(None);
                };

                let mut updated = meeting.clone();
                if let Some(name) = patch.name {
                    updated.name = name;
                }
                if let Some(agent_id) = patch.agent_id {
                    updated.agent_id = agent_id;
                }
                if let Some(status) = patch.status {
                    updated.status = status;
                }
                if let Some(started_at) = patch.started_at {
                    updated.started_at = Some(started_at);
                }
                if let Some(ended_at) = patch.ended_at {
                    updated.ended_at = Some(ended_at);
                }
                updated.updated_at = Utc::now();

                // The row only commits if its agent join still resolves.
                let Some(agent) = state.agents.get(&updated.agent_id).cloned() else {
                    return Ok(None);
                };
                state.meetings.insert(id, updated.clone());
                Ok(Some(MeetingView {
                    meeting: updated,
                    agent,
                }))
            })
            .await
    }

    async fn delete(&self, predicate: &Predicate) -> Result<Option<MeetingView>, StoreError> {
        self.store
            .mutate(|state| {
                let Some(view) = meeting_rows(state, predicate).into_iter().next() else {
                    return Ok(None);
                };
                state.meetings.remove(&view.meeting.id);
                Ok(Some(view))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use roundtable_domain::MeetingStatus;

    fn agent_at(id: &str, owner_id: &str, name: &str, created_at: DateTime<Utc>) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            instructions: "be helpful".to_string(),
            created_at,
            updated_at: created_at,
        }
    }

    fn meeting_at(
        id: &str,
        owner_id: &str,
        name: &str,
        agent_id: &str,
        created_at: DateTime<Utc>,
    ) -> MeetingRecord {
        MeetingRecord {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            agent_id: agent_id.to_string(),
            status: MeetingStatus::Upcoming,
            started_at: None,
            ended_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn ts(day: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, day, 0, 0, second)
            .single()
            .unwrap_or_else(Utc::now)
    }

    #[tokio::test]
    async fn select_orders_newest_first_with_id_tie_break() {
        let store = WorkspaceStore::in_memory();
        let agents = store.agents();
        let tied = ts(1, 0);
        for id in ["a", "c", "b"] {
            agents
                .insert(agent_at(id, "user-1", "Agent", tied))
                .await
                .expect("insert agent");
        }

        let rows = agents
            .select(&Predicate::owner("user-1"), 0, 10)
            .await
            .expect("select agents");
        let ids: Vec<&str> = rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn meeting_select_and_count_agree_when_the_join_drops_rows() {
        let store = WorkspaceStore::in_memory();
        let agents = store.agents();
        let meetings = store.meetings();

        agents
            .insert(agent_at("a-1", "user-1", "Coach", ts(1, 0)))
            .await
            .expect("insert agent");
        meetings
            .insert(MeetingView {
                meeting: meeting_at("m-1", "user-1", "Kickoff", "a-1", ts(2, 0)),
                agent: agent_at("a-1", "user-1", "Coach", ts(1, 0)),
            })
            .await
            .expect("insert meeting");
        // Orphan: references an agent that does not exist.
        meetings
            .insert(MeetingView {
                meeting: meeting_at("m-2", "user-1", "Ghost", "a-missing", ts(3, 0)),
                agent: agent_at("a-missing", "user-1", "Gone", ts(1, 0)),
            })
            .await
            .expect("insert meeting");

        let predicate = Predicate::owner("user-1");
        let rows = meetings.select(&predicate, 0, 10).await.expect("select meetings");
        let total = meetings.count(&predicate).await.expect("count meetings");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].meeting.id, "m-1");
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn meeting_delete_honors_the_owner_scope() {
        let store = WorkspaceStore::in_memory();
        let agents = store.agents();
        let meetings = store.meetings();
        let coach = agent_at("a-1", "user-1", "Coach", ts(1, 0));
        agents.insert(coach.clone()).await.expect("insert agent");
        meetings
            .insert(MeetingView {
                meeting: meeting_at("m-1", "user-1", "Kickoff", "a-1", ts(2, 0)),
                agent: coach,
            })
            .await
            .expect("insert meeting");

        let foreign = meetings
            .delete(&Predicate::owner("user-2").with_id("m-1"))
            .await
            .expect("delete meeting");
        assert!(foreign.is_none());

        let removed = meetings
            .delete(&Predicate::owner("user-1").with_id("m-1"))
            .await
            .expect("delete meeting");
        assert_eq!(removed.map(|view| view.meeting.id), Some("m-1".to_string()));
        let remaining = meetings
            .count(&Predicate::owner("user-1"))
            .await
            .expect("count meetings");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn update_misses_when_the_predicate_matches_nothing() {
        let store = WorkspaceStore::in_memory();
        let agents = store.agents();
        agents
            .insert(agent_at("a-1", "user-1", "Coach", ts(1, 0)))
            .await
            .expect("insert agent");

        let cross_owner = Predicate::owner("user-2").with_id("a-1");
        let patch = AgentPatch {
            name: Some("Stolen".to_string()),
            instructions: None,
        };
        let updated = agents.update(&cross_owner, patch).await.expect("update agent");
        assert!(updated.is_none());

        let untouched = agents
            .select(&Predicate::owner("user-1").with_id("a-1"), 0, 1)
            .await
            .expect("select agent");
        assert_eq!(untouched[0].name, "Coach");
    }

    #[tokio::test]
    async fn state_survives_a_restart_when_a_path_is_configured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::for_tests();
        config.workspace_store_path = Some(dir.path().join("workspace.json"));

        let store = WorkspaceStore::from_config(&config);
        store
            .agents()
            .insert(agent_at("a-1", "user-1", "Coach", ts(1, 0)))
            .await
            .expect("insert agent");

        let reopened = WorkspaceStore::from_config(&config);
        let rows = reopened
            .agents()
            .select(&Predicate::owner("user-1"), 0, 10)
            .await
            .expect("select agents");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "a-1");
    }
}
