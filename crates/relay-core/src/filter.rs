//! Item qualification.

use crate::domain::Item;

/// Which items are eligible for delivery.
///
/// An empty dimension matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub allowed_sources: Vec<String>,
    pub keywords: Vec<String>,
}

impl FilterCriteria {
    pub fn new(allowed_sources: Vec<String>, keywords: Vec<String>) -> Self {
        Self {
            allowed_sources,
            keywords,
        }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }
}

/// Source allowed (exact match) AND some keyword occurs in the title
/// (case-insensitive substring). Items without a title never match a
/// non-empty keyword set.
pub fn qualifies(item: &Item, criteria: &FilterCriteria) -> bool {
    let source_ok = criteria.allowed_sources.is_empty()
        || criteria
            .allowed_sources
            .iter()
            .any(|s| s == &item.source_name);
    if !source_ok {
        return false;
    }

    if criteria.keywords.is_empty() {
        return true;
    }
    let Some(title) = item.title.as_deref() else {
        return false;
    };
    let title = title.to_lowercase();
    criteria
        .keywords
        .iter()
        .any(|k| title.contains(&k.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemId;

    fn item(title: Option<&str>, source: &str) -> Item {
        Item {
            id: ItemId(1),
            title: title.map(str::to_string),
            body: String::new(),
            source_name: source.to_string(),
            url: String::new(),
            media: Vec::new(),
            published_at: None,
        }
    }

    #[test]
    fn forbes_ai_example() {
        let c = FilterCriteria::new(vec!["Forbes".into()], vec!["AI".into()]);
        assert!(qualifies(&item(Some("New AI chip unveiled"), "Forbes"), &c));
        assert!(!qualifies(
            &item(Some("New AI chip unveiled"), "RandomBlog"),
            &c
        ));
        assert!(!qualifies(&item(Some("Quarterly earnings"), "Forbes"), &c));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let c = FilterCriteria::new(vec![], vec!["Machine Learning".into()]);
        assert!(qualifies(
            &item(Some("Why MACHINE LEARNING stalls"), "Wired"),
            &c
        ));
    }

    #[test]
    fn source_match_is_exact() {
        let c = FilterCriteria::new(vec!["Wired".into()], vec![]);
        assert!(qualifies(&item(None, "Wired"), &c));
        assert!(!qualifies(&item(None, "wired"), &c));
    }

    #[test]
    fn empty_criteria_match_everything() {
        let c = FilterCriteria::allow_all();
        assert!(qualifies(&item(None, "anything"), &c));
    }

    #[test]
    fn untitled_items_fail_keyword_filter() {
        let c = FilterCriteria::new(vec![], vec!["ai".into()]);
        assert!(!qualifies(&item(None, "Forbes"), &c));
    }
}
