use crate::records::OwnedRecord;

/// One clause of a scoped query. Clauses are only ever combined by
/// conjunction, replacing ad hoc conditional filter merging with an explicit
/// tagged set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// Exact match on the record id.
    IdEquals(String),
    /// Exact match on the owning principal id.
    OwnerEquals(String),
    /// Case-insensitive substring match on the record's searchable text.
    /// The needle is stored lowercase-folded.
    SearchContains(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    /// Every scoped query starts from the owner clause; there is no way to
    /// build a predicate without one.
    #[must_use]
    pub fn owner(principal_id: impl Into<String>) -> Self {
        Self {
            clauses: vec![Clause::OwnerEquals(principal_id.into())],
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.clauses.push(Clause::IdEquals(id.into()));
        self
    }

    /// Appends a search clause for non-empty input; blank input leaves the
    /// predicate unchanged.
    #[must_use]
    pub fn with_search(mut self, search: &str) -> Self {
        let needle = search.trim();
        if !needle.is_empty() {
            self.clauses.push(Clause::SearchContains(needle.to_lowercase()));
        }
        self
    }

    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    #[must_use]
    pub fn matches<R: OwnedRecord>(&self, record: &R) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::IdEquals(id) => record.id() == id,
            Clause::OwnerEquals(owner_id) => record.owner_id() == owner_id,
            Clause::SearchContains(needle) => {
                record.search_text().to_lowercase().contains(needle.as_str())
            }
        })
    }
}
