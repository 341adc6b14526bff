use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{TimeZone, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use url::Url;

use crate::client::{self, PageTarget};
use crate::feed::{Embed, Item, Page};

/// The service calls the feed core depends on.
pub trait FeedApi: Send + Sync {
    fn get_page(&self, target: &PageTarget) -> Result<Page<Item>>;
    fn mark_seen(&self, ids: &[String]) -> Result<()>;
}

pub struct ServiceFeedApi {
    client: Arc<client::Client>,
}

impl ServiceFeedApi {
    pub fn new(client: Arc<client::Client>) -> Self {
        Self { client }
    }
}

impl FeedApi for ServiceFeedApi {
    fn get_page(&self, target: &PageTarget) -> Result<Page<Item>> {
        self.client.get_page(target).context("fetch feed page")
    }

    fn mark_seen(&self, ids: &[String]) -> Result<()> {
        self.client.mark_seen(ids).context("mark items seen")
    }
}

const MOCK_PAGE_LIMIT: usize = 50;
const MOCK_LINKS_PAGE: usize = 20;

#[derive(Default)]
struct MockState {
    catalogue: Vec<Item>,
    scripted: VecDeque<Page<Item>>,
    failures: usize,
    fail_mark_seen: bool,
    requests: Vec<PageTarget>,
    marked: Vec<Vec<String>>,
}

/// In-memory service: serves a fixed catalogue with the same paging rules as
/// the real endpoints, or scripted pages when queued.
#[derive(Default)]
pub struct MockFeedApi {
    state: Mutex<MockState>,
    gate: Option<Receiver<()>>,
}

impl MockFeedApi {
    pub fn new(catalogue: Vec<Item>) -> Self {
        Self {
            state: Mutex::new(MockState {
                catalogue,
                ..MockState::default()
            }),
            gate: None,
        }
    }

    /// Makes every page request wait for one message on the returned sender.
    pub fn gated(mut self) -> (Self, Sender<()>) {
        let (tx, rx) = unbounded();
        self.gate = Some(rx);
        (self, tx)
    }

    pub fn queue_page(&self, page: Page<Item>) {
        self.state.lock().scripted.push_back(page);
    }

    pub fn fail_next(&self, count: usize) {
        self.state.lock().failures += count;
    }

    pub fn fail_mark_seen(&self, fail: bool) {
        self.state.lock().fail_mark_seen = fail;
    }

    pub fn requests(&self) -> Vec<PageTarget> {
        self.state.lock().requests.clone()
    }

    pub fn marked(&self) -> Vec<Vec<String>> {
        self.state.lock().marked.clone()
    }

    fn serve(state: &MockState, target: &PageTarget) -> Result<Page<Item>> {
        let (path, params) = match target {
            PageTarget::Path { path, params } => (path.to_string(), params.clone()),
            PageTarget::Continuation(next) => {
                let url = Url::parse("http://mock.invalid/")?.join(next)?;
                let params = url.query_pairs().into_owned().collect();
                (url.path().to_string(), params)
            }
        };
        let param = |key: &str| {
            params
                .iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        if path == client::LINKS_PATH {
            let offset: usize = param("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
            let end = (offset + MOCK_LINKS_PAGE).min(state.catalogue.len());
            let results = state.catalogue.get(offset..end).unwrap_or_default().to_vec();
            let next = (end < state.catalogue.len()).then(|| {
                let feeds = param("feeds").unwrap_or_default();
                format!("{}?feeds={feeds}&offset={end}", client::LINKS_PATH)
            });
            return Ok(Page { results, next });
        }

        if let Some(ids) = param("reddit_ids") {
            let wanted: Vec<&str> = ids.split(',').collect();
            let results = state
                .catalogue
                .iter()
                .filter(|item| wanted.contains(&item.id.as_str()))
                .cloned()
                .collect();
            return Ok(Page {
                results,
                next: None,
            });
        }

        let limit: usize = param("limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(MOCK_PAGE_LIMIT);
        let start = match param("after") {
            Some(after) => state
                .catalogue
                .iter()
                .position(|item| item.id == after)
                .map(|pos| pos + 1)
                .ok_or_else(|| anyhow!("mock: unknown cursor {after}"))?,
            None => 0,
        };
        let end = (start + limit).min(state.catalogue.len());
        Ok(Page {
            results: state.catalogue[start..end].to_vec(),
            next: None,
        })
    }
}

impl FeedApi for MockFeedApi {
    fn get_page(&self, target: &PageTarget) -> Result<Page<Item>> {
        if let Some(gate) = &self.gate {
            gate.recv().context("mock: gate closed")?;
        }
        let mut state = self.state.lock();
        state.requests.push(target.clone());
        if state.failures > 0 {
            state.failures -= 1;
            return Err(anyhow!("mock: request failed"));
        }
        if let Some(page) = state.scripted.pop_front() {
            return Ok(page);
        }
        Self::serve(&state, target)
    }

    fn mark_seen(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        state.marked.push(ids.to_vec());
        if state.fail_mark_seen {
            return Err(anyhow!("mock: mark seen failed"));
        }
        Ok(())
    }
}

/// Deterministic catalogue mixing landscape, portrait and text-only items.
pub fn sample_items(count: usize) -> Vec<Item> {
    const RATIOS: [(u32, u32); 5] = [(1600, 900), (600, 900), (1000, 1000), (2400, 800), (300, 1200)];
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    (0..count)
        .map(|i| {
            let embed = if i % 4 == 3 {
                None
            } else {
                let (width, height) = RATIOS[i % RATIOS.len()];
                Some(Embed::Image {
                    url: format!("https://i.example/{i}.jpg"),
                    width: Some(width),
                    height: Some(height),
                    over_18: Some(i % 11 == 10),
                })
            };
            Item {
                id: format!("s{i}"),
                title: format!("Sample submission {i}"),
                posted_at: base + chrono::Duration::minutes(i as i64),
                subreddit: "noscroll".into(),
                score: 1000 - i as i64,
                url: format!("https://example.com/{i}"),
                permalink: format!("/r/noscroll/comments/s{i}/"),
                num_comments: (i % 17) as i64,
                embed,
            }
        })
        .collect()
}
