//! Fullscreen gallery state for a single item.

use anyhow::{bail, Result};

use crate::feed::{Embed, Item};

#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub embed: Embed,
    pub nsfw: bool,
}

#[derive(Debug, Clone)]
pub struct GalleryViewer {
    slides: Vec<Slide>,
    index: usize,
    show_nsfw: bool,
}

impl GalleryViewer {
    pub fn open(item: &Item, show_nsfw: bool) -> Result<Self> {
        let Some(embed) = &item.embed else {
            bail!("item {} has no media to show", item.id);
        };
        let slides = match embed {
            Embed::Gallery {
                gallery, over_18, ..
            } if !gallery.is_empty() => {
                let parent_nsfw = over_18.unwrap_or(false);
                gallery
                    .iter()
                    .map(|slide| Slide {
                        embed: slide.clone(),
                        nsfw: parent_nsfw || slide.is_nsfw(),
                    })
                    .collect()
            }
            other => vec![Slide {
                embed: other.clone(),
                nsfw: other.is_nsfw(),
            }],
        };
        Ok(Self {
            slides,
            index: 0,
            show_nsfw,
        })
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &Slide {
        &self.slides[self.index]
    }

    pub fn next(&mut self) -> &Slide {
        self.index = (self.index + 1) % self.slides.len();
        self.current()
    }

    pub fn previous(&mut self) -> &Slide {
        self.index = (self.index + self.slides.len() - 1) % self.slides.len();
        self.current()
    }

    /// One-based position, e.g. `2/5`.
    pub fn position(&self) -> String {
        format!("{}/{}", self.index + 1, self.slides.len())
    }

    pub fn set_show_nsfw(&mut self, show: bool) {
        self.show_nsfw = show;
    }

    pub fn is_blurred(&self) -> bool {
        self.current().nsfw && !self.show_nsfw
    }
}
