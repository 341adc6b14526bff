//! Page fetching for a load identity: query construction per feed type and
//! cursor bookkeeping between pages.

use anyhow::{Context, Result};

use crate::client::{PageTarget, LINKS_PATH, SUBMISSIONS_PATH};
use crate::data::FeedApi;
use crate::feed::{Item, LoadIdentity, Page, SortMethod};

/// Smaller first page so the first paint arrives quickly.
pub const FIRST_PAGE_LIMIT: usize = 20;
pub const NEXT_PAGE_LIMIT: usize = 50;
pub const CURATED_MIN_SCORE: u32 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchCursor {
    /// Opaque continuation from the previous response; wins over `after_id`.
    pub next_url: Option<String>,
    pub after_id: Option<String>,
    pub has_more: bool,
}

impl FetchCursor {
    pub fn is_first_page(&self) -> bool {
        self.next_url.is_none() && self.after_id.is_none()
    }
}

pub fn build_target(load_id: &LoadIdentity, cursor: &FetchCursor) -> PageTarget {
    if let Some(next) = &cursor.next_url {
        return PageTarget::Continuation(next.clone());
    }

    let mut params: Vec<(String, String)> = Vec::new();
    let path = if load_id.sort_method == SortMethod::Curated {
        set_param(&mut params, "min_score", CURATED_MIN_SCORE.to_string());
        if let Some(feed_id) = &load_id.feed_id {
            set_param(&mut params, "feeds", feed_id.clone());
        }
        LINKS_PATH
    } else {
        if let Some(user) = &load_id.reddit_user {
            set_param(&mut params, "user", user.clone());
        }
        set_param(&mut params, "sort", load_id.sort_method.as_str().to_string());
        if load_id.sort_method.has_time_filter() {
            set_param(&mut params, "time", load_id.time_filter.as_str().to_string());
        }
        if let Some(subreddit) = &load_id.subreddit {
            set_param(&mut params, "subreddit", subreddit.clone());
        } else if let (Some(owner), Some(name)) = (&load_id.multi_owner, &load_id.multi_name) {
            set_param(&mut params, "multi_owner", owner.clone());
            set_param(&mut params, "multi_name", name.clone());
        }
        if let Some(after) = &cursor.after_id {
            set_param(&mut params, "after", after.clone());
        }
        let limit = if cursor.is_first_page() {
            FIRST_PAGE_LIMIT
        } else {
            NEXT_PAGE_LIMIT
        };
        set_param(&mut params, "limit", limit.to_string());
        SUBMISSIONS_PATH
    };

    for (key, value) in load_id.search_params() {
        set_param(&mut params, &key, value);
    }

    PageTarget::Path { path, params }
}

fn set_param(params: &mut Vec<(String, String)>, key: &str, value: String) {
    match params.iter_mut().find(|(k, _)| k == key) {
        Some(slot) => slot.1 = value,
        None => params.push((key.to_string(), value)),
    }
}

/// Cursor for the request after `page`.
pub fn advance_cursor(load_id: &LoadIdentity, cursor: &FetchCursor, page: &Page<Item>) -> FetchCursor {
    let after_id = page
        .results
        .last()
        .map(|item| item.id.clone())
        .or_else(|| cursor.after_id.clone());
    let next_url = page.next.clone();
    let offers_after = after_id.is_some()
        && !page.results.is_empty()
        && !load_id.pins_ids()
        && load_id.sort_method != SortMethod::Curated;
    FetchCursor {
        has_more: next_url.is_some() || offers_after,
        next_url,
        after_id,
    }
}

pub fn fetch_next_page(
    api: &dyn FeedApi,
    load_id: &LoadIdentity,
    cursor: &FetchCursor,
) -> Result<(Vec<Item>, FetchCursor)> {
    let target = build_target(load_id, cursor);
    let page = api
        .get_page(&target)
        .with_context(|| format!("load page for {load_id}"))?;
    let new_cursor = advance_cursor(load_id, cursor, &page);
    Ok((page.results, new_cursor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::TimeFilter;
    use chrono::Utc;

    fn item(id: &str) -> Item {
        Item {
            id: id.into(),
            title: String::new(),
            posted_at: Utc::now(),
            subreddit: String::new(),
            score: 0,
            url: String::new(),
            permalink: String::new(),
            num_comments: 0,
            embed: None,
        }
    }

    fn params(target: &PageTarget) -> Vec<(String, String)> {
        match target {
            PageTarget::Path { params, .. } => params.clone(),
            PageTarget::Continuation(_) => panic!("expected a path target"),
        }
    }

    fn get<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn continuation_wins_over_everything() {
        let id = LoadIdentity {
            sort_method: SortMethod::Hot,
            search_query: "q=cats".into(),
            ..LoadIdentity::default()
        };
        let cursor = FetchCursor {
            next_url: Some("/svc/api/links/?cursor=abc".into()),
            after_id: Some("x1".into()),
            has_more: true,
        };
        assert_eq!(
            build_target(&id, &cursor),
            PageTarget::Continuation("/svc/api/links/?cursor=abc".into())
        );
    }

    #[test]
    fn curated_targets_links_endpoint() {
        let id = LoadIdentity {
            feed_id: Some("4".into()),
            sort_method: SortMethod::Curated,
            search_query: "?is_read=false".into(),
            ..LoadIdentity::default()
        };
        let target = build_target(&id, &FetchCursor::default());
        let PageTarget::Path { path, params } = target else {
            panic!("expected a path target");
        };
        assert_eq!(path, LINKS_PATH);
        assert_eq!(get(&params, "min_score"), Some("500"));
        assert_eq!(get(&params, "feeds"), Some("4"));
        assert_eq!(get(&params, "is_read"), Some("false"));
        assert!(get(&params, "limit").is_none());
    }

    #[test]
    fn submissions_query_tiers_limit() {
        let id = LoadIdentity {
            reddit_user: Some("alice".into()),
            subreddit: Some("pics".into()),
            sort_method: SortMethod::Top,
            time_filter: TimeFilter::Month,
            ..LoadIdentity::default()
        };
        let first = params(&build_target(&id, &FetchCursor::default()));
        assert_eq!(get(&first, "user"), Some("alice"));
        assert_eq!(get(&first, "sort"), Some("top"));
        assert_eq!(get(&first, "time"), Some("month"));
        assert_eq!(get(&first, "subreddit"), Some("pics"));
        assert_eq!(get(&first, "limit"), Some("20"));
        assert!(get(&first, "after").is_none());

        let cursor = FetchCursor {
            after_id: Some("x9".into()),
            has_more: true,
            ..FetchCursor::default()
        };
        let next = params(&build_target(&id, &cursor));
        assert_eq!(get(&next, "after"), Some("x9"));
        assert_eq!(get(&next, "limit"), Some("50"));
    }

    #[test]
    fn time_only_sent_for_sorts_that_use_it() {
        let id = LoadIdentity {
            sort_method: SortMethod::Hot,
            time_filter: TimeFilter::Day,
            multi_owner: Some("bob".into()),
            multi_name: Some("cats".into()),
            ..LoadIdentity::default()
        };
        let p = params(&build_target(&id, &FetchCursor::default()));
        assert!(get(&p, "time").is_none());
        assert_eq!(get(&p, "multi_owner"), Some("bob"));
        assert_eq!(get(&p, "multi_name"), Some("cats"));
    }

    #[test]
    fn search_overrides_defaults() {
        let id = LoadIdentity {
            sort_method: SortMethod::New,
            search_query: "limit=5&reddit_ids=a,b".into(),
            ..LoadIdentity::default()
        };
        let p = params(&build_target(&id, &FetchCursor::default()));
        assert_eq!(get(&p, "limit"), Some("5"));
        assert_eq!(get(&p, "reddit_ids"), Some("a,b"));
        assert_eq!(p.iter().filter(|(k, _)| k == "limit").count(), 1);
    }

    #[test]
    fn cursor_advances_to_last_id() {
        let id = LoadIdentity {
            sort_method: SortMethod::Hot,
            ..LoadIdentity::default()
        };
        let page = Page {
            results: vec![item("x1"), item("x9")],
            next: None,
        };
        let cursor = advance_cursor(&id, &FetchCursor::default(), &page);
        assert!(cursor.has_more);
        assert_eq!(cursor.after_id.as_deref(), Some("x9"));
        assert!(cursor.next_url.is_none());
    }

    #[test]
    fn pinned_ids_stop_paging() {
        let id = LoadIdentity {
            sort_method: SortMethod::Hot,
            search_query: "?reddit_ids=a,b".into(),
            ..LoadIdentity::default()
        };
        let page = Page {
            results: vec![item("a"), item("x9")],
            next: None,
        };
        let cursor = advance_cursor(&id, &FetchCursor::default(), &page);
        assert!(!cursor.has_more);
        assert_eq!(cursor.after_id.as_deref(), Some("x9"));
    }

    #[test]
    fn curated_pages_only_by_continuation() {
        let id = LoadIdentity::default();
        let page = Page {
            results: vec![item("l1")],
            next: None,
        };
        assert!(!advance_cursor(&id, &FetchCursor::default(), &page).has_more);

        let page = Page {
            results: vec![item("l1")],
            next: Some("/svc/api/links/?offset=20".into()),
        };
        let cursor = advance_cursor(&id, &FetchCursor::default(), &page);
        assert!(cursor.has_more);
        assert_eq!(cursor.next_url.as_deref(), Some("/svc/api/links/?offset=20"));
    }

    #[test]
    fn empty_page_keeps_after_and_ends_paging() {
        let id = LoadIdentity {
            sort_method: SortMethod::Hot,
            ..LoadIdentity::default()
        };
        let cursor = FetchCursor {
            after_id: Some("x9".into()),
            has_more: true,
            next_url: None,
        };
        let page = Page {
            results: Vec::new(),
            next: None,
        };
        let next = advance_cursor(&id, &cursor, &page);
        assert_eq!(next.after_id.as_deref(), Some("x9"));
        assert!(!next.has_more);
    }
}
