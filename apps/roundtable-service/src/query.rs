use roundtable_domain::{
    FilterState, Page, Predicate, Principal,
    page::{DEFAULT_PAGE_SIZE, clamp_page_size, page_offset, total_pages},
};

use crate::store::{RecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub search: String,
    pub page: u64,
    pub page_size: u64,
}

impl ListParams {
    #[must_use]
    pub fn from_filter(filter: &FilterState, page_size: u64) -> Self {
        Self {
            search: filter.search.clone(),
            page: filter.page,
            page_size,
        }
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self::from_filter(&FilterState::default(), DEFAULT_PAGE_SIZE)
    }
}

/// The scoped list query shared by both resource kinds. The owner clause is
/// conjoined unconditionally; the search clause joins it when non-empty. The
/// bounded item fetch and the unbounded count run concurrently over the same
/// predicate value, so the pagination metadata can never disagree with the
/// rows. A page past the end returns empty items with the true totals.
pub async fn list_for<R, S>(
    store: &S,
    principal: &Principal,
    params: &ListParams,
) -> Result<Page<R>, QueryError>
where
    S: RecordStore<R> + ?Sized,
    R: Send,
{
    let page_size = clamp_page_size(params.page_size);
    let page = params.page.max(1);
    let predicate = Predicate::owner(principal.id.as_str()).with_search(&params.search);
    let offset = page_offset(page, page_size);

    let (items, total) = tokio::join!(
        store.select(&predicate, offset, page_size),
        store.count(&predicate),
    );
    let items = items?;
    let total = total?;

    Ok(Page {
        items,
        total,
        total_pages: total_pages(total, page_size),
    })
}

/// Single-record read under the same owner scope. A record owned by someone
/// else and a record that does not exist are indistinguishable.
pub async fn find_for<R, S>(store: &S, principal: &Principal, id: &str) -> Result<R, QueryError>
where
    S: RecordStore<R> + ?Sized,
    R: Send,
{
    let predicate = Predicate::owner(principal.id.as_str()).with_id(id);
    let mut rows = store.select(&predicate, 0, 1).await?;
    rows.pop().ok_or(QueryError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::WorkspaceStore;
    use chrono::{DateTime, TimeZone, Utc};
    use roundtable_domain::AgentRecord;

    fn principal(id: &str) -> Principal {
        Principal {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
        }
    }

    fn ts(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, second)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn agent(id: &str, owner_id: &str, name: &str, created_at: DateTime<Utc>) -> AgentRecord {
        AgentRecord {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            instructions: "be helpful".to_string(),
            created_at,
            updated_at: created_at,
        }
    }

    async fn seed(store: &WorkspaceStore, records: &[AgentRecord]) {
        for record in records {
            store
                .agents()
                .insert(record.clone())
                .await
                .expect("insert agent");
        }
    }

    fn params(search: &str, page: u64, page_size: u64) -> ListParams {
        ListParams {
            search: search.to_string(),
            page,
            page_size,
        }
    }

    #[tokio::test]
    async fn search_scopes_to_the_owner_and_matches_substrings() {
        let store = WorkspaceStore::in_memory();
        seed(
            &store,
            &[
                agent("a-1", "user-a", "Alpha", ts(1)),
                agent("a-2", "user-a", "Beta", ts(2)),
                agent("b-1", "user-b", "Alpine", ts(3)),
            ],
        )
        .await;

        let page = list_for(&store.agents(), &principal("user-a"), &params("al", 1, 10))
            .await
            .expect("list agents");

        let names: Vec<&str> = page.items.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha"]);
        assert_eq!(page.total, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn other_owners_records_never_leak_for_any_search() {
        let store = WorkspaceStore::in_memory();
        seed(
            &store,
            &[
                agent("b-1", "user-b", "Alpha", ts(1)),
                agent("b-2", "user-b", "", ts(2)),
            ],
        )
        .await;

        for search in ["", "alpha", "a", "ALPHA"] {
            let page = list_for(&store.agents(), &principal("user-a"), &params(search, 1, 10))
                .await
                .expect("list agents");
            assert!(page.items.is_empty(), "search {search:?} leaked rows");
            assert_eq!(page.total, 0);
        }
    }

    #[tokio::test]
    async fn three_records_paginate_as_two_one_zero() {
        let store = WorkspaceStore::in_memory();
        seed(
            &store,
            &[
                agent("a-1", "user-a", "One", ts(1)),
                agent("a-2", "user-a", "Two", ts(2)),
                agent("a-3", "user-a", "Three", ts(3)),
            ],
        )
        .await;
        let owner = principal("user-a");

        let first = list_for(&store.agents(), &owner, &params("", 1, 2))
            .await
            .expect("page 1");
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, 3);
        assert_eq!(first.total_pages, 2);

        let second = list_for(&store.agents(), &owner, &params("", 2, 2))
            .await
            .expect("page 2");
        assert_eq!(second.items.len(), 1);

        let third = list_for(&store.agents(), &owner, &params("", 3, 2))
            .await
            .expect("page 3");
        assert!(third.items.is_empty());
        assert_eq!(third.total, 3);
        assert_eq!(third.total_pages, 2);
    }

    #[tokio::test]
    async fn page_beyond_the_end_keeps_true_metadata() {
        let store = WorkspaceStore::in_memory();
        seed(&store, &[agent("a-1", "user-a", "Solo", ts(1))]).await;

        let page = list_for(&store.agents(), &principal("user-a"), &params("", 99, 10))
            .await
            .expect("list agents");
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn page_size_is_clamped_and_page_zero_is_page_one() {
        let store = WorkspaceStore::in_memory();
        let records: Vec<AgentRecord> = (0..3u32)
            .map(|index| agent(&format!("a-{index}"), "user-a", "Agent", ts(index)))
            .collect();
        seed(&store, &records).await;
        let owner = principal("user-a");

        let oversized = list_for(&store.agents(), &owner, &params("", 1, 100_000))
            .await
            .expect("oversized page size");
        assert_eq!(oversized.items.len(), 3);
        assert_eq!(oversized.total_pages, 1);

        let undersized = list_for(&store.agents(), &owner, &params("", 0, 0))
            .await
            .expect("undersized request");
        assert_eq!(undersized.items.len(), 1);
        assert_eq!(undersized.total_pages, 3);
    }

    #[tokio::test]
    async fn tie_broken_ordering_keeps_pages_disjoint_under_concurrent_insert() {
        let store = WorkspaceStore::in_memory();
        let tied = ts(0);
        seed(
            &store,
            &[
                agent("b", "user-a", "Agent", tied),
                agent("c", "user-a", "Agent", tied),
                agent("d", "user-a", "Agent", tied),
            ],
        )
        .await;
        let owner = principal("user-a");

        let first = list_for(&store.agents(), &owner, &params("", 1, 2))
            .await
            .expect("page 1");

        // A record landing after the already-read pages must not shift them.
        seed(&store, &[agent("a", "user-a", "Agent", tied)]).await;

        let second = list_for(&store.agents(), &owner, &params("", 2, 2))
            .await
            .expect("page 2");

        let mut seen: Vec<String> = first
            .items
            .iter()
            .chain(second.items.iter())
            .map(|record| record.id.clone())
            .collect();
        seen.sort();
        seen.dedup();
        for id in ["b", "c", "d"] {
            assert!(
                seen.iter().any(|seen_id| seen_id == id),
                "record {id} was skipped"
            );
        }
        assert_eq!(seen.len(), 4, "a record appeared on two pages");
    }

    #[tokio::test]
    async fn find_for_hides_other_owners_records() {
        let store = WorkspaceStore::in_memory();
        seed(&store, &[agent("b-1", "user-b", "Alpha", ts(1))]).await;

        let missing = find_for(&store.agents(), &principal("user-a"), "b-1").await;
        assert!(matches!(missing, Err(QueryError::NotFound)));

        let found = find_for(&store.agents(), &principal("user-b"), "b-1")
            .await
            .expect("owner sees the record");
        assert_eq!(found.id, "b-1");
    }
}
