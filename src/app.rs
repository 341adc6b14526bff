use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::client::Client;
use crate::clock::SystemClock;
use crate::config;
use crate::data::{sample_items, FeedApi, MockFeedApi, ServiceFeedApi};
use crate::feed::{Item, LoadIdentity};
use crate::layout::Row;
use crate::logging;
use crate::observer::{Rect, Size, ViewportGeometry};
use crate::scroll::FeedView;

pub const USAGE: &str = "noscroll - load a feed and print its masonry rows.\n\n\
Usage: noscroll [LOCATION] [--pages N] [--width PX] [--height PX] [--offline]\n\n  \
LOCATION             Feed location, e.g. r/pics/top?t=week (default: curated front page)\n  \
--pages N            Pages to reveal (default 1)\n  \
--width PX           Viewport width (default 1280)\n  \
--height PX          Viewport height (default 800)\n  \
--offline            Use the built-in sample catalogue instead of the service\n  \
--version, -V        Show version and exit\n  \
--help,    -h        Show this help message";

const OFFLINE_ITEMS: usize = 120;
/// Height given to a row of text-only items by [`HeadlessSurface`].
pub const TEXT_ROW_HEIGHT: f64 = 160.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub location: String,
    pub pages: usize,
    pub width: f64,
    pub height: f64,
    pub offline: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            location: String::new(),
            pages: 1,
            width: 1280.0,
            height: 800.0,
            offline: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Version,
    Help,
    Run(RunOptions),
}

pub fn parse_args<I>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = String>,
{
    let mut options = RunOptions::default();
    let mut location: Option<String> = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return Ok(Invocation::Version),
            "--help" | "-h" => return Ok(Invocation::Help),
            "--offline" => options.offline = true,
            "--pages" => {
                let value = flag_value(&mut args, "--pages")?;
                options.pages = value
                    .parse()
                    .with_context(|| format!("--pages expects a number, got {value}"))?;
            }
            "--width" => {
                let value = flag_value(&mut args, "--width")?;
                options.width = parse_pixels(&value, "--width")?;
            }
            "--height" => {
                let value = flag_value(&mut args, "--height")?;
                options.height = parse_pixels(&value, "--height")?;
            }
            flag if flag.starts_with('-') => bail!("unknown flag {flag}"),
            _ => {
                if location.is_some() {
                    bail!("only one location may be given");
                }
                location = Some(arg);
            }
        }
    }
    options.location = location.unwrap_or_default();
    options.pages = options.pages.max(1);
    Ok(Invocation::Run(options))
}

fn flag_value<I>(args: &mut I, flag: &str) -> Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .with_context(|| format!("{flag} expects a value"))
}

fn parse_pixels(value: &str, flag: &str) -> Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("{flag} expects a number of pixels, got {value}"))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        bail!("{flag} must be positive");
    }
    Ok(parsed)
}

/// Splits `r/pics/top?t=day` into its path and search parts.
pub fn split_location(location: &str) -> (&str, &str) {
    match location.split_once('?') {
        Some((path, search)) => (path, search),
        None => (location, ""),
    }
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    logging::init(&cfg.logging.level);

    let api: Arc<dyn FeedApi> = if options.offline {
        Arc::new(MockFeedApi::new(sample_items(OFFLINE_ITEMS)))
    } else {
        let client =
            Client::new(cfg.service.client_config()).context("create service client")?;
        Arc::new(ServiceFeedApi::new(Arc::new(client)))
    };

    let details = cfg.service.app_details();
    let (path, search) = split_location(&options.location);
    let identity = LoadIdentity::from_location(&details, path, search);
    let viewport = Size::new(options.width, options.height);
    let wait = cfg.service.timeout + Duration::from_secs(5);

    let mut view = FeedView::new(
        api,
        Arc::new(SystemClock),
        details,
        &cfg.feed,
        cfg.layout.clone(),
        viewport,
    );
    let mut surface = HeadlessSurface::new(viewport);

    view.navigate(identity.clone());
    settle(&mut view, wait)?;
    for _ in 1..options.pages {
        if !view.request_more() {
            break;
        }
        settle(&mut view, wait)?;
    }

    surface.render(view.rows());
    view.after_render(&mut surface);

    let state = view.state();
    println!(
        "{identity}: showing {} of {} items",
        state.items_shown(),
        state.loaded()
    );
    let buffer = state.buffer();
    for row in view.rows() {
        println!("{}", describe_row(row, &buffer));
    }
    view.close();
    Ok(())
}

fn settle(view: &mut FeedView, wait: Duration) -> Result<()> {
    if !view.block_on_pending(wait) {
        bail!("timed out waiting for the feed service");
    }
    if let Some(err) = view.take_error() {
        return Err(err);
    }
    Ok(())
}

/// One line per row, e.g. `media 320px | s0 569px, s1 120px cropped`.
pub fn describe_row(row: &Row, items: &[Item]) -> String {
    let id = |index: usize| {
        items
            .get(index)
            .map(|item| item.id.as_str())
            .unwrap_or("?")
    };
    match row {
        Row::Media { height, tiles } => {
            let tiles: Vec<String> = tiles
                .iter()
                .map(|tile| {
                    let mut label = format!("{} {:.0}px", id(tile.index), tile.width);
                    if tile.cropped {
                        label.push_str(" cropped");
                    }
                    label
                })
                .collect();
            format!("media {:.0}px | {}", height, tiles.join(", "))
        }
        Row::Text { items: indices, slots } => {
            let ids: Vec<&str> = indices.iter().map(|index| id(*index)).collect();
            format!("text {slots} slots | {}", ids.join(", "))
        }
    }
}

/// Lays rows out top to bottom in document order, the way a browser would
/// stack them, and serves element bounds relative to the scroll offset.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    viewport: Size,
    offset: f64,
    content_height: f64,
    rects: Vec<Option<Rect>>,
}

impl HeadlessSurface {
    pub fn new(viewport: Size) -> Self {
        Self {
            viewport,
            offset: 0.0,
            content_height: 0.0,
            rects: Vec::new(),
        }
    }

    pub fn resize(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn content_height(&self) -> f64 {
        self.content_height
    }

    pub fn render(&mut self, rows: &[Row]) {
        self.rects.clear();
        let mut y = 0.0;
        for row in rows {
            match row {
                Row::Media { height, tiles } => {
                    let mut x = 0.0;
                    for tile in tiles {
                        self.place(
                            tile.index,
                            Rect {
                                top: y,
                                left: x,
                                width: tile.width,
                                height: *height,
                            },
                        );
                        x += tile.width;
                    }
                    y += height;
                }
                Row::Text { items, slots } => {
                    let width = self.viewport.width / (*slots).max(1) as f64;
                    for (column, index) in items.iter().enumerate() {
                        self.place(
                            *index,
                            Rect {
                                top: y,
                                left: column as f64 * width,
                                width,
                                height: TEXT_ROW_HEIGHT,
                            },
                        );
                    }
                    y += TEXT_ROW_HEIGHT;
                }
            }
        }
        self.content_height = y;
    }

    fn place(&mut self, index: usize, rect: Rect) {
        if self.rects.len() <= index {
            self.rects.resize(index + 1, None);
        }
        self.rects[index] = Some(rect);
    }
}

impl ViewportGeometry for HeadlessSurface {
    fn viewport(&self) -> Size {
        self.viewport
    }

    fn element_rect(&self, index: usize) -> Option<Rect> {
        self.rects.get(index).copied().flatten().map(|rect| Rect {
            top: rect.top - self.offset,
            ..rect
        })
    }

    fn scroll_by(&mut self, dy: f64) {
        self.offset += dy;
    }
}
