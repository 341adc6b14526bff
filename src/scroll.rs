//! Scroll and resize coordination for one feed view.
//!
//! [`FeedState`] holds pagination and reveal state and only changes through
//! its transition methods. [`FeedView`] owns a `FeedState` together with the
//! observer, read tracker and timers, runs page fetches on worker threads and
//! folds their results back in from [`FeedView::poll_responses`].

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::clock::{Clock, Interval};
use crate::config::{FeedConfig, LayoutConfig};
use crate::data::FeedApi;
use crate::feed::{AppDetails, Item, LoadIdentity};
use crate::fetcher::{fetch_next_page, FetchCursor};
use crate::layout::{pack_items, LayoutParams, Row};
use crate::observer::{ItemFlags, Size, ViewportGeometry, ViewportObserver, Visibility};
use crate::read_tracker::{send_batch, ReadTracker};

pub const PAGE_SIZE: usize = 10;
/// The next page is revealed this many items before the reveal boundary.
pub const SHOW_NEXT_LEAD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    LoadingFirstPage,
    Ready,
    LoadingNextPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Replace,
    Append,
}

/// Everything a worker needs to run one page fetch.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    pub generation: u64,
    pub identity: LoadIdentity,
    pub cursor: FetchCursor,
    pub mode: LoadMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Completion for a superseded load or an abandoned request.
    Stale,
    Appended { added: usize, first_page: bool },
}

#[derive(Debug)]
pub struct FeedState {
    identity: Option<LoadIdentity>,
    generation: u64,
    buffer: Arc<Vec<Item>>,
    page_index: i64,
    cursor: FetchCursor,
    in_flight: Option<u64>,
    first_page_loaded: bool,
}

impl Default for FeedState {
    fn default() -> Self {
        Self {
            identity: None,
            generation: 0,
            buffer: Arc::new(Vec::new()),
            page_index: -1,
            cursor: FetchCursor::default(),
            in_flight: None,
            first_page_loaded: false,
        }
    }
}

impl FeedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&LoadIdentity> {
        self.identity.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn page_index(&self) -> i64 {
        self.page_index
    }

    pub fn cursor(&self) -> &FetchCursor {
        &self.cursor
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn phase(&self) -> Phase {
        match (&self.identity, self.in_flight.is_some(), self.first_page_loaded) {
            (None, _, _) => Phase::Idle,
            (Some(_), true, false) => Phase::LoadingFirstPage,
            (Some(_), true, true) => Phase::LoadingNextPage,
            (Some(_), false, _) => Phase::Ready,
        }
    }

    pub fn buffer(&self) -> Arc<Vec<Item>> {
        Arc::clone(&self.buffer)
    }

    pub fn loaded(&self) -> usize {
        self.buffer.len()
    }

    pub fn items_shown(&self) -> usize {
        let target = (self.page_index + 1).max(0) as usize * PAGE_SIZE;
        target.min(self.buffer.len())
    }

    pub fn revealed(&self) -> &[Item] {
        &self.buffer[..self.items_shown()]
    }

    pub fn item(&self, index: usize) -> Option<&Item> {
        self.buffer.get(index)
    }

    /// Starts a new load unless `identity` is the one already loaded.
    pub fn set_identity(&mut self, identity: LoadIdentity) -> Option<FetchTicket> {
        if self
            .identity
            .as_ref()
            .is_some_and(|current| current.load_key() == identity.load_key())
        {
            return None;
        }
        self.generation = self.generation.wrapping_add(1);
        self.identity = Some(identity);
        self.buffer = Arc::new(Vec::new());
        self.page_index = -1;
        self.cursor = FetchCursor::default();
        self.in_flight = None;
        self.first_page_loaded = false;
        self.next_fetch()
    }

    /// Markers the renderer attaches to item `index` for the current state.
    pub fn flags_for(&self, index: usize) -> ItemFlags {
        let shown = self.items_shown();
        let loaded = self.loaded();
        ItemFlags {
            show_next_page: shown > 0 && index == shown.saturating_sub(SHOW_NEXT_LEAD),
            load_more: loaded > 0 && index == loaded.saturating_sub(2 * PAGE_SIZE),
        }
    }

    /// Reveals one more page. The reveal target may run at most one page past
    /// the buffer so a page still in flight shows up as soon as it lands.
    pub fn reveal_next_page(&mut self) -> bool {
        if !self.first_page_loaded {
            return false;
        }
        let target = (self.page_index + 1).max(0) as usize * PAGE_SIZE;
        if target > self.buffer.len() {
            return false;
        }
        self.page_index += 1;
        true
    }

    /// Handles an item entering the viewport with its render-time markers.
    pub fn item_entered(&mut self, index: usize, flags: ItemFlags) -> Option<FetchTicket> {
        if flags.show_next_page && self.reveal_next_page() {
            debug!(index, page_index = self.page_index, "revealed next page");
        }
        if flags.load_more {
            return self.next_fetch();
        }
        None
    }

    /// Claims the single fetch slot if another page can be requested.
    pub fn next_fetch(&mut self) -> Option<FetchTicket> {
        let identity = self.identity.as_ref()?;
        if self.in_flight.is_some() {
            return None;
        }
        if self.first_page_loaded && !self.cursor.has_more {
            return None;
        }
        self.in_flight = Some(self.generation);
        Some(FetchTicket {
            generation: self.generation,
            identity: identity.clone(),
            cursor: self.cursor.clone(),
            mode: if self.first_page_loaded {
                LoadMode::Append
            } else {
                LoadMode::Replace
            },
        })
    }

    /// Folds a finished fetch in. Errors are returned with cursor and reveal
    /// state untouched so the same trigger can try again.
    pub fn complete_fetch(
        &mut self,
        generation: u64,
        result: Result<(Vec<Item>, FetchCursor)>,
    ) -> Result<FetchOutcome> {
        if generation != self.generation || self.in_flight != Some(generation) {
            return Ok(FetchOutcome::Stale);
        }
        self.in_flight = None;
        let (items, cursor) = result?;

        let mut seen: HashSet<String> = self.buffer.iter().map(|item| item.id.clone()).collect();
        let mut next: Vec<Item> = Vec::with_capacity(self.buffer.len() + items.len());
        next.extend(self.buffer.iter().cloned());
        let before = next.len();
        for item in items {
            if seen.insert(item.id.clone()) {
                next.push(item);
            }
        }
        let added = next.len() - before;
        self.buffer = Arc::new(next);
        self.cursor = cursor;

        let first_page = !self.first_page_loaded;
        if first_page {
            self.first_page_loaded = true;
            self.page_index = 0;
        }
        Ok(FetchOutcome::Appended { added, first_page })
    }
}

/// Top edge of an item element at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub index: usize,
    pub top: f64,
}

/// Detects settled viewport size changes and holds the scroll anchor until the
/// next render pass.
#[derive(Debug, Default)]
pub struct ResizeTracker {
    applied: Option<Size>,
    resizing: bool,
    anchor: Option<Anchor>,
}

impl ResizeTracker {
    pub fn new(initial: Size) -> Self {
        Self {
            applied: Some(initial),
            ..Self::default()
        }
    }

    pub fn is_resizing(&self) -> bool {
        self.resizing
    }

    /// Compares `current` with the last applied size. Returns true when a new
    /// size should be laid out.
    pub fn check(&mut self, current: Size, anchor: Option<Anchor>) -> bool {
        if self.applied == Some(current) {
            return false;
        }
        let first = self.applied.is_none();
        self.applied = Some(current);
        if first {
            return false;
        }
        self.resizing = true;
        self.anchor = anchor;
        true
    }

    pub fn finish(&mut self) -> Option<Anchor> {
        self.resizing = false;
        self.anchor.take()
    }

    pub fn reset(&mut self) {
        self.resizing = false;
        self.anchor = None;
    }
}

enum FeedResponse {
    Page {
        generation: u64,
        result: Result<(Vec<Item>, FetchCursor)>,
    },
}

/// A feed view bound to one rendering surface.
pub struct FeedView {
    api: Arc<dyn FeedApi>,
    clock: Arc<dyn Clock>,
    details: AppDetails,
    layout_cfg: LayoutConfig,
    state: FeedState,
    observer: ViewportObserver,
    reads: ReadTracker,
    resize: ResizeTracker,
    flush_timer: Interval,
    resize_timer: Interval,
    response_tx: Sender<FeedResponse>,
    response_rx: Receiver<FeedResponse>,
    flushes: Vec<JoinHandle<()>>,
    viewport: Size,
    rows: Vec<Row>,
    last_anchor: Option<Anchor>,
    last_error: Option<Error>,
    closed: bool,
}

impl FeedView {
    pub fn new(
        api: Arc<dyn FeedApi>,
        clock: Arc<dyn Clock>,
        details: AppDetails,
        feed_cfg: &FeedConfig,
        layout_cfg: LayoutConfig,
        viewport: Size,
    ) -> Self {
        let (response_tx, response_rx) = unbounded();
        let now = clock.now();
        let mut flush_timer = Interval::new(feed_cfg.flush_interval);
        let mut resize_timer = Interval::new(feed_cfg.resize_poll_interval);
        flush_timer.due(now);
        resize_timer.due(now);
        Self {
            api,
            clock,
            details,
            layout_cfg,
            state: FeedState::new(),
            observer: ViewportObserver::new(),
            reads: ReadTracker::new(),
            resize: ResizeTracker::new(viewport),
            flush_timer,
            resize_timer,
            response_tx,
            response_rx,
            flushes: Vec::new(),
            viewport,
            rows: Vec::new(),
            last_anchor: None,
            last_error: None,
            closed: false,
        }
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn observer(&self) -> &ViewportObserver {
        &self.observer
    }

    pub fn read_tracker(&self) -> &ReadTracker {
        &self.reads
    }

    pub fn details(&self) -> &AppDetails {
        &self.details
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn show_nsfw(&self) -> bool {
        self.layout_cfg.show_nsfw
    }

    /// Rows for the currently revealed items.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn last_anchor(&self) -> Option<Anchor> {
        self.last_anchor
    }

    /// Most recent fetch failure, if any, cleared on read.
    pub fn take_error(&mut self) -> Option<Error> {
        self.last_error.take()
    }

    /// Switches to `identity`. Reads gathered for the previous feed are
    /// flushed first; everything else about the old load is dropped.
    pub fn navigate(&mut self, identity: LoadIdentity) {
        if self
            .state
            .identity()
            .is_some_and(|current| current.load_key() == identity.load_key())
        {
            return;
        }
        self.flush_reads();
        self.reads.clear();
        self.observer.clear();
        self.resize.reset();
        self.last_anchor = None;
        self.rows.clear();
        debug!(identity = %identity, "navigating");
        if let Some(ticket) = self.state.set_identity(identity) {
            self.spawn_fetch(ticket);
        }
    }

    fn spawn_fetch(&self, ticket: FetchTicket) {
        let api = Arc::clone(&self.api);
        let tx = self.response_tx.clone();
        debug!(
            generation = ticket.generation,
            mode = ?ticket.mode,
            after = ticket.cursor.after_id.as_deref().unwrap_or(""),
            "dispatching page fetch"
        );
        thread::spawn(move || {
            let result = fetch_next_page(api.as_ref(), &ticket.identity, &ticket.cursor);
            let _ = tx.send(FeedResponse::Page {
                generation: ticket.generation,
                result,
            });
        });
    }

    /// Applies finished fetches. Returns true when the rows changed.
    pub fn poll_responses(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.response_rx.try_recv() {
            changed |= self.handle_response(message);
        }
        changed
    }

    /// Waits up to `timeout` for the in-flight fetch to land.
    pub fn block_on_pending(&mut self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while self.state.is_fetching() {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.response_rx.recv_timeout(remaining) {
                Ok(message) => {
                    self.handle_response(message);
                }
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
        true
    }

    fn handle_response(&mut self, message: FeedResponse) -> bool {
        match message {
            FeedResponse::Page { generation, result } => {
                match self.state.complete_fetch(generation, result) {
                    Ok(FetchOutcome::Stale) => {
                        debug!(generation, "discarding stale page");
                        false
                    }
                    Ok(FetchOutcome::Appended { added, first_page }) => {
                        if first_page {
                            if let Some(identity) = self.state.identity() {
                                info!(identity = %identity, items = added, "first page loaded");
                            }
                        } else {
                            debug!(items = added, loaded = self.state.loaded(), "page appended");
                        }
                        self.relayout();
                        true
                    }
                    Err(err) => {
                        warn!("page fetch failed: {err:#}");
                        self.last_error = Some(err);
                        false
                    }
                }
            }
        }
    }

    /// Processes visibility changes after the host scrolled. Returns true when
    /// more items were revealed and the host should render again.
    pub fn on_scroll(&mut self, geometry: &dyn ViewportGeometry) -> bool {
        let shown_before = self.state.items_shown();
        for event in self.observer.poll(geometry) {
            match event {
                Visibility::Entered { index, flags } => {
                    if let Some(ticket) = self.state.item_entered(index, flags) {
                        self.spawn_fetch(ticket);
                    }
                }
                Visibility::Left { index, top } => {
                    if let Some(item) = self.state.item(index) {
                        if self.reads.on_left(&item.id, top) {
                            debug!(id = %item.id, "scrolled past");
                        }
                    }
                }
            }
        }
        self.last_anchor = self.observer.anchor().and_then(|index| {
            geometry
                .element_rect(index)
                .map(|rect| Anchor { index, top: rect.top })
        });
        if self.state.items_shown() != shown_before {
            self.relayout();
            return true;
        }
        false
    }

    /// Drives the flush and resize timers and drains fetch results. Returns
    /// true when the host should render again.
    pub fn tick(&mut self, geometry: &dyn ViewportGeometry) -> bool {
        if self.closed {
            return false;
        }
        let mut changed = self.poll_responses();
        let now = self.clock.now();
        if self.flush_timer.due(now) {
            self.flush_reads();
        }
        if self.resize_timer.due(now) {
            let size = geometry.viewport();
            if self.resize.check(size, self.last_anchor) {
                debug!(width = size.width, height = size.height, "viewport resized");
                self.viewport = size;
                self.relayout();
                changed = true;
            }
        }
        changed
    }

    /// Completes a render pass: restores the scroll anchor after a resize and
    /// registers rendered items with the observer.
    pub fn after_render(&mut self, geometry: &mut dyn ViewportGeometry) {
        let count = self.state.items_shown();
        if self.resize.is_resizing() {
            if let Some(anchor) = self.resize.finish() {
                match geometry.element_rect(anchor.index) {
                    Some(rect) => {
                        geometry.scroll_by(rect.top - anchor.top);
                        debug!(index = anchor.index, top = anchor.top, "restored scroll anchor");
                    }
                    None => debug!(index = anchor.index, "scroll anchor no longer rendered"),
                }
            }
            self.observer.reobserve_all(count);
        } else {
            self.observer.observe_new(count);
        }
        let state = &self.state;
        self.observer.set_flags(|index| state.flags_for(index));
    }

    /// Reveals the next page and fetches ahead when possible. Used by hosts
    /// that cannot report visibility.
    pub fn request_more(&mut self) -> bool {
        let revealed = self.state.reveal_next_page();
        let fetching = match self.state.next_fetch() {
            Some(ticket) => {
                self.spawn_fetch(ticket);
                true
            }
            None => false,
        };
        if revealed {
            self.relayout();
        }
        revealed || fetching
    }

    fn flush_reads(&mut self) {
        let Some(identity) = self.state.identity() else {
            self.reads.clear();
            return;
        };
        let sort = identity.sort_method;
        if let Some(ids) = self.reads.take_batch(self.details.is_authenticated, sort) {
            let api = Arc::clone(&self.api);
            self.flushes.retain(|handle| !handle.is_finished());
            self.flushes
                .push(thread::spawn(move || send_batch(api.as_ref(), &ids)));
        }
    }

    /// Stops the timers, flushes outstanding reads and waits for flushes in
    /// flight.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.flush_reads();
        for handle in self.flushes.drain(..) {
            if handle.join().is_err() {
                warn!("read flush worker panicked");
            }
        }
    }

    fn relayout(&mut self) {
        let params = LayoutParams::for_viewport(self.viewport, &self.layout_cfg);
        self.rows = pack_items(self.state.revealed(), &params);
    }
}

impl Drop for FeedView {
    fn drop(&mut self) {
        self.close();
    }
}
