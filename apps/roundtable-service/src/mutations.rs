use chrono::Utc;
use uuid::Uuid;

use roundtable_domain::{
    AgentPatch, AgentRecord, MeetingPatch, MeetingRecord, MeetingStatus, MeetingView, Predicate,
    Principal,
};

use crate::store::{AgentCollection, MeetingCollection, RecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Covers both "no such record" and "owned by someone else"; callers can
    /// never tell the two apart.
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct CreateAgentInput {
    pub name: String,
    pub instructions: String,
}

#[derive(Debug, Clone)]
pub struct CreateMeetingInput {
    pub name: String,
    pub agent_id: String,
}

/// Owner comes from the resolved principal, never from client input; the
/// input types carry no owner field at all.
pub async fn create_agent(
    agents: &AgentCollection,
    principal: &Principal,
    input: CreateAgentInput,
) -> Result<AgentRecord, GatewayError> {
    let now = Utc::now();
    let record = AgentRecord {
        id: Uuid::new_v4().to_string(),
        owner_id: principal.id.clone(),
        name: input.name,
        instructions: input.instructions,
        created_at: now,
        updated_at: now,
    };
    Ok(agents.insert(record).await?)
}

pub async fn update_agent(
    agents: &AgentCollection,
    principal: &Principal,
    id: &str,
    patch: AgentPatch,
) -> Result<AgentRecord, GatewayError> {
    let predicate = owned_record(principal, id);
    agents
        .update(&predicate, patch)
        .await?
        .ok_or(GatewayError::NotFound)
}

pub async fn remove_agent(
    agents: &AgentCollection,
    principal: &Principal,
    id: &str,
) -> Result<AgentRecord, GatewayError> {
    let predicate = owned_record(principal, id);
    agents
        .delete(&predicate)
        .await?
        .ok_or(GatewayError::NotFound)
}

/// Creating a meeting resolves the referenced agent under the caller's own
/// scope first; a missing or foreign agent fails `NotFound` so nothing is
/// disclosed about other tenants.
pub async fn create_meeting(
    agents: &AgentCollection,
    meetings: &MeetingCollection,
    principal: &Principal,
    input: CreateMeetingInput,
) -> Result<MeetingView, GatewayError> {
    let agent = resolve_owned_agent(agents, principal, &input.agent_id).await?;

    let now = Utc::now();
    let meeting = MeetingRecord {
        id: Uuid::new_v4().to_string(),
        owner_id: principal.id.clone(),
        name: input.name,
        agent_id: agent.id.clone(),
        status: MeetingStatus::Upcoming,
        started_at: None,
        ended_at: None,
        created_at: now,
        updated_at: now,
    };
    Ok(meetings.insert(MeetingView { meeting, agent }).await?)
}

pub async fn update_meeting(
    agents: &AgentCollection,
    meetings: &MeetingCollection,
    principal: &Principal,
    id: &str,
    patch: MeetingPatch,
) -> Result<MeetingView, GatewayError> {
    if let Some(agent_id) = patch.agent_id.as_deref() {
        resolve_owned_agent(agents, principal, agent_id).await?;
    }

    let predicate = owned_record(principal, id);
    meetings
        .update(&predicate, patch)
        .await?
        .ok_or(GatewayError::NotFound)
}

fn owned_record(principal: &Principal, id: &str) -> Predicate {
    Predicate::owner(principal.id.as_str()).with_id(id)
}

async fn resolve_owned_agent(
    agents: &AgentCollection,
    principal: &Principal,
    agent_id: &str,
) -> Result<AgentRecord, GatewayError> {
    let predicate = owned_record(principal, agent_id);
    agents
        .select(&predicate, 0, 1)
        .await?
        .pop()
        .ok_or(GatewayError::NotFound)
}
