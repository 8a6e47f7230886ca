//! Name comparison policy for schema lookups

use serde::{Deserialize, Serialize};

/// How entity set and type names are compared during lookups.
///
/// An exact match always wins; `CaseInsensitive` only widens the search when
/// no exact match exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatching {
    Exact,
    #[default]
    CaseInsensitive,
}

impl NameMatching {
    /// Check whether two names match under this policy
    pub fn matches(self, candidate: &str, wanted: &str) -> bool {
        match self {
            NameMatching::Exact => candidate == wanted,
            NameMatching::CaseInsensitive => candidate.eq_ignore_ascii_case(wanted),
        }
    }

    /// Find the best match in `items`, preferring an exact hit.
    pub fn find<'a, T, F>(self, items: &'a [T], wanted: &str, name_of: F) -> Option<&'a T>
    where
        F: Fn(&T) -> &str,
    {
        items
            .iter()
            .find(|item| name_of(item) == wanted)
            .or_else(|| match self {
                NameMatching::Exact => None,
                NameMatching::CaseInsensitive => {
                    items.iter().find(|item| self.matches(name_of(item), wanted))
                }
            })
    }
}
