//! Bidirectional mapping between list-view filter state and its URL query
//! string form. Default values are elided on encode and restored on decode,
//! so `decode(encode(f)) == f` and a pristine view keeps a clean URL.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::page::DEFAULT_PAGE;

pub const QUERY_KEY_SEARCH: &str = "search";
pub const QUERY_KEY_PAGE: &str = "page";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub search: String,
    pub page: u64,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search: String::new(),
            page: DEFAULT_PAGE,
        }
    }
}

impl FilterState {
    #[must_use]
    pub fn new(search: impl Into<String>, page: u64) -> Self {
        Self {
            search: search.into(),
            page: normalize_page(page),
        }
    }

    #[must_use]
    pub fn has_search(&self) -> bool {
        !self.search.is_empty()
    }

    #[must_use]
    pub fn with_page(&self, page: u64) -> Self {
        Self {
            search: self.search.clone(),
            page: normalize_page(page),
        }
    }

    /// A new search term restarts pagination; the old page position is
    /// meaningless against the narrowed result set.
    #[must_use]
    pub fn with_search(&self, search: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            page: DEFAULT_PAGE,
        }
    }

    /// Decodes raw query pairs. Unknown keys are ignored; malformed values
    /// fall back to the field default rather than failing.
    #[must_use]
    pub fn decode<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut state = Self::default();
        for (key, value) in pairs {
            match key {
                QUERY_KEY_SEARCH => state.search = value.to_string(),
                QUERY_KEY_PAGE => state.page = parse_page(value),
                _ => {}
            }
        }
        state
    }

    /// Encodes to query pairs with default-value elision: an empty search
    /// and page 1 emit no keys at all.
    #[must_use]
    pub fn encode(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if !self.search.is_empty() {
            pairs.push((QUERY_KEY_SEARCH.to_string(), self.search.clone()));
        }
        if self.page != DEFAULT_PAGE {
            pairs.push((QUERY_KEY_PAGE.to_string(), self.page.to_string()));
        }
        pairs
    }

    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let decoded: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self::decode(
            decoded
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        )
    }

    #[must_use]
    pub fn to_query(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.encode() {
            serializer.append_pair(&key, &value);
        }
        serializer.finish()
    }
}

fn normalize_page(page: u64) -> u64 {
    page.max(DEFAULT_PAGE)
}

fn parse_page(raw: &str) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(page) if page >= 1 => page,
        _ => DEFAULT_PAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_of_encode_is_identity() {
        let cases = [
            FilterState::default(),
            FilterState::new("alpha", 1),
            FilterState::new("", 7),
            FilterState::new("weekly sync", 3),
            FilterState::new("über & co", 12),
        ];
        for filter in cases {
            assert_eq!(FilterState::from_query(&filter.to_query()), filter);
        }
    }

    #[test]
    fn defaults_are_elided_from_the_query() {
        assert_eq!(FilterState::default().to_query(), "");
        assert_eq!(FilterState::new("alpha", 1).to_query(), "search=alpha");
        assert_eq!(FilterState::new("", 2).to_query(), "page=2");
    }

    #[test]
    fn malformed_page_values_fall_back_to_the_default() {
        for query in ["page=abc", "page=0", "page=-3", "page=1.5", "page="] {
            assert_eq!(FilterState::from_query(query).page, DEFAULT_PAGE);
        }
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let filter = FilterState::from_query("search=alpha&utm_source=mail&page=2");
        assert_eq!(filter, FilterState::new("alpha", 2));
    }

    #[test]
    fn search_values_survive_url_escaping() {
        let filter = FilterState::new("a+b &c", 1);
        assert_eq!(FilterState::from_query(&filter.to_query()), filter);
    }

    #[test]
    fn changing_search_resets_the_page() {
        let filter = FilterState::new("alpha", 5).with_search("beta");
        assert_eq!(filter.page, DEFAULT_PAGE);
        assert_eq!(filter.search, "beta");
    }

    #[test]
    fn changing_page_preserves_the_search() {
        let filter = FilterState::new("alpha", 1).with_page(4);
        assert_eq!(filter.search, "alpha");
        assert_eq!(filter.page, 4);
    }
}
