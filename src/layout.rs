//! Masonry row packing.
//!
//! Media items are packed greedily into rows that share one height, text-only
//! items are collected into chunks laid out on a fixed number of slots per
//! row. A single pass over the items produces the rows, so appending items only
//! changes the tail of the layout.

use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::feed::{Item, DEFAULT_ASPECT_RATIO};
use crate::observer::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Low,
    #[default]
    Medium,
    High,
}

impl Density {
    pub fn as_str(&self) -> &'static str {
        match self {
            Density::Low => "low",
            Density::Medium => "medium",
            Density::High => "high",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "low" => Some(Density::Low),
            "medium" => Some(Density::Medium),
            "high" => Some(Density::High),
            _ => None,
        }
    }

    /// Shortest acceptable shared row height, as a fraction of the viewport.
    pub fn min_height_fraction(&self) -> f64 {
        match self {
            Density::Low => 0.6,
            Density::Medium => 0.5,
            Density::High => 0.35,
        }
    }

    pub fn max_height_fraction(&self) -> f64 {
        match self {
            Density::Low => 0.95,
            Density::Medium => 0.8,
            Density::High => 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutParams {
    pub row_width: f64,
    pub max_row_height: f64,
    pub min_row_height: f64,
    /// A row counts as full once its tiles cover this share of `row_width`.
    pub overflow_fraction: f64,
    pub min_item_width: f64,
    /// Widest an undersized tile may be stretched, relative to its natural width.
    pub max_expansion: f64,
    pub lookahead: usize,
    pub text_slots: usize,
}

impl LayoutParams {
    pub fn for_viewport(viewport: Size, cfg: &LayoutConfig) -> Self {
        let slot_width = cfg.no_embed_slot_width.max(1.0);
        let text_slots = ((viewport.width / slot_width).floor() as usize).clamp(1, cfg.max_columns.max(1));
        Self {
            row_width: viewport.width.max(1.0),
            max_row_height: viewport.height * cfg.density.max_height_fraction(),
            min_row_height: viewport.height * cfg.density.min_height_fraction(),
            overflow_fraction: cfg.overflow_fraction,
            min_item_width: cfg.min_item_width,
            max_expansion: cfg.max_expansion.max(1.0),
            lookahead: cfg.lookahead,
            text_slots,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub index: usize,
    pub width: f64,
    /// Tile is wider than the media; the renderer letterboxes it.
    pub cropped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Media { height: f64, tiles: Vec<Tile> },
    Text { items: Vec<usize>, slots: usize },
}

impl Row {
    pub fn indices(&self) -> Vec<usize> {
        match self {
            Row::Media { tiles, .. } => tiles.iter().map(|t| t.index).collect(),
            Row::Text { items, .. } => items.clone(),
        }
    }
}

pub fn pack_items(items: &[Item], params: &LayoutParams) -> Vec<Row> {
    let ratios: Vec<Option<f64>> = items.iter().map(Item::aspect_ratio).collect();
    pack(&ratios, params)
}

/// Packs a sequence of aspect ratios, `None` marking text-only items.
pub fn pack(ratios: &[Option<f64>], params: &LayoutParams) -> Vec<Row> {
    let mut packer = RowPacker::new(params);
    for (pos, ratio) in ratios.iter().enumerate() {
        packer.push(pos, *ratio);
    }
    packer.finish()
}

#[derive(Debug, Clone, PartialEq)]
struct RowFit {
    height: f64,
    widths: Vec<f64>,
    cropped: Vec<bool>,
}

impl RowFit {
    fn total_width(&self) -> f64 {
        self.widths.iter().sum()
    }
}

/// Shared height and tile widths for `ratios`, widening tiles that fall under
/// the width floor. Rows of two or more are rejected when that cannot be done
/// within the height and expansion limits.
fn fit_row(ratios: &[f64], params: &LayoutParams) -> Option<RowFit> {
    let budget = params.row_width.max(1.0);
    let strict = ratios.len() > 1;
    let floor = params.min_item_width.min(budget);
    let sum: f64 = ratios.iter().sum();
    let mut height = (budget / sum).min(params.max_row_height);
    let mut undersized = vec![false; ratios.len()];

    loop {
        let mut grew = false;
        for (i, ar) in ratios.iter().enumerate() {
            if !undersized[i] && ar * height < floor {
                undersized[i] = true;
                grew = true;
            }
        }
        if !grew {
            break;
        }
        let fixed = undersized.iter().filter(|u| **u).count() as f64 * floor;
        if fixed > budget {
            if strict {
                return None;
            }
            break;
        }
        let flexible: f64 = ratios
            .iter()
            .zip(&undersized)
            .filter(|(_, u)| !**u)
            .map(|(ar, _)| ar)
            .sum();
        if flexible > 0.0 {
            height = height.min((budget - fixed) / flexible);
        }
    }

    if strict && height < params.min_row_height {
        return None;
    }

    let mut widths = Vec::with_capacity(ratios.len());
    let mut cropped = Vec::with_capacity(ratios.len());
    for (ar, under) in ratios.iter().zip(&undersized) {
        let natural = ar * height;
        if !under {
            widths.push(natural);
            cropped.push(false);
            continue;
        }
        let cap = natural * params.max_expansion;
        if strict && cap < floor {
            return None;
        }
        let width = floor.min(cap).max(natural);
        widths.push(width);
        cropped.push(width > natural);
    }

    Some(RowFit {
        height,
        widths,
        cropped,
    })
}

fn sanitize_ratio(ratio: f64) -> f64 {
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        DEFAULT_ASPECT_RATIO
    }
}

struct RowPacker<'a> {
    params: &'a LayoutParams,
    rows: Vec<Row>,
    open: Vec<usize>,
    open_ratios: Vec<f64>,
    open_fit: Option<RowFit>,
    open_since: usize,
    chunk: Vec<usize>,
    chunk_since: usize,
}

impl<'a> RowPacker<'a> {
    fn new(params: &'a LayoutParams) -> Self {
        Self {
            params,
            rows: Vec::new(),
            open: Vec::new(),
            open_ratios: Vec::new(),
            open_fit: None,
            open_since: 0,
            chunk: Vec::new(),
            chunk_since: 0,
        }
    }

    fn push(&mut self, pos: usize, ratio: Option<f64>) {
        self.expire(pos, ratio.is_some());
        match ratio {
            Some(ar) => self.push_media(pos, sanitize_ratio(ar)),
            None => {
                if self.chunk.is_empty() {
                    self.chunk_since = pos;
                }
                self.chunk.push(pos);
            }
        }
    }

    /// Flushes whatever has been held back longer than the lookahead. Text
    /// chunks only give up waiting when media arrives to interleave with.
    fn expire(&mut self, pos: usize, media_arrival: bool) {
        let lookahead = self.params.lookahead;
        let row_expired = !self.open.is_empty() && pos - self.open_since > lookahead;
        let chunk_expired =
            media_arrival && !self.chunk.is_empty() && pos - self.chunk_since > lookahead;

        if row_expired && (!chunk_expired || self.open_since < self.chunk_since) {
            self.close_row();
        }
        if chunk_expired {
            self.flush_chunk();
        }
        if row_expired && !self.open.is_empty() {
            self.close_row();
        }
    }

    fn push_media(&mut self, pos: usize, ar: f64) {
        if let Some(fit) = &self.open_fit {
            let full =
                fit.total_width() >= self.params.overflow_fraction * self.params.row_width;
            if !full {
                let mut candidate = self.open_ratios.clone();
                candidate.push(ar);
                if let Some(next_fit) = fit_row(&candidate, self.params) {
                    self.open.push(pos);
                    self.open_ratios = candidate;
                    self.open_fit = Some(next_fit);
                    return;
                }
            }
            self.close_row();
        }

        self.open_since = pos;
        self.open.push(pos);
        self.open_ratios.push(ar);
        self.open_fit = fit_row(&self.open_ratios, self.params);
    }

    fn close_row(&mut self) {
        let Some(fit) = self.open_fit.take() else {
            self.open.clear();
            self.open_ratios.clear();
            return;
        };
        let tiles = self
            .open
            .drain(..)
            .zip(fit.widths)
            .zip(fit.cropped)
            .map(|((index, width), cropped)| Tile {
                index,
                width,
                cropped,
            })
            .collect();
        self.open_ratios.clear();
        self.rows.push(Row::Media {
            height: fit.height,
            tiles,
        });
    }

    fn flush_chunk(&mut self) {
        if self.chunk.is_empty() {
            return;
        }
        let slots = self.params.text_slots.max(1);
        let row_count = self.chunk.len().div_ceil(slots);
        let per_row = self.chunk.len().div_ceil(row_count);
        for group in self.chunk.chunks(per_row) {
            self.rows.push(Row::Text {
                items: group.to_vec(),
                slots,
            });
        }
        self.chunk.clear();
    }

    fn finish(mut self) -> Vec<Row> {
        if !self.open.is_empty() && (self.chunk.is_empty() || self.open_since < self.chunk_since) {
            self.close_row();
        }
        self.flush_chunk();
        if !self.open.is_empty() {
            self.close_row();
        }
        self.rows
    }
}
