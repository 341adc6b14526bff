//! Visibility tracking for rendered feed items.
//!
//! Items are registered by their index in the result buffer, which is stable
//! for the lifetime of a load because the buffer only grows. Geometry comes
//! from the host through [`ViewportGeometry`]; [`ViewportObserver::poll`]
//! turns the current geometry into enter/leave transitions.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Element bounds relative to the viewport's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// The rendering surface as seen by the feed core.
pub trait ViewportGeometry {
    fn viewport(&self) -> Size;
    /// Bounds of the element rendered for item `index`, if it is rendered.
    fn element_rect(&self, index: usize) -> Option<Rect>;
    fn scroll_by(&mut self, dy: f64);
}

/// Render-time markers attached to an item element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ItemFlags {
    pub show_next_page: bool,
    pub load_more: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Visibility {
    Entered { index: usize, flags: ItemFlags },
    Left { index: usize, top: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Registered, not yet evaluated.
    Pending,
    Outside,
    Inside,
    /// Left through the top edge; no longer observed unless it carries
    /// `load_more`.
    Retired,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: SlotState,
    flags: ItemFlags,
}

#[derive(Debug, Default)]
pub struct ViewportObserver {
    slots: Vec<Slot>,
    inside: Vec<usize>,
    full_reobserves: usize,
}

impl ViewportObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.inside.clear();
    }

    /// Registers items `len()..count`. Existing registrations are untouched.
    pub fn observe_new(&mut self, count: usize) -> usize {
        let before = self.slots.len();
        while self.slots.len() < count {
            self.slots.push(Slot {
                state: SlotState::Pending,
                flags: ItemFlags::default(),
            });
        }
        self.slots.len() - before
    }

    /// Re-registers every item after positions were invalidated. Items that
    /// are currently inside stay inside so they do not enter twice.
    pub fn reobserve_all(&mut self, count: usize) {
        self.observe_new(count);
        for slot in &mut self.slots {
            if slot.state != SlotState::Inside {
                slot.state = SlotState::Pending;
            }
        }
        self.full_reobserves += 1;
    }

    pub fn full_reobserves(&self) -> usize {
        self.full_reobserves
    }

    /// Updates render markers. A retired item that now carries `load_more`
    /// is observed again.
    pub fn set_flags<F>(&mut self, flags_for: F)
    where
        F: Fn(usize) -> ItemFlags,
    {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.flags = flags_for(index);
            if slot.flags.load_more && slot.state == SlotState::Retired {
                slot.state = SlotState::Pending;
            }
        }
    }

    pub fn is_inside(&self, index: usize) -> bool {
        self.inside.contains(&index)
    }

    /// Most recently entered item that has not left yet.
    pub fn anchor(&self) -> Option<usize> {
        self.inside.last().copied()
    }

    pub fn poll(&mut self, geometry: &dyn ViewportGeometry) -> Vec<Visibility> {
        let viewport = geometry.viewport();
        let mut events = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state == SlotState::Retired {
                continue;
            }
            let Some(rect) = geometry.element_rect(index) else {
                continue;
            };
            let intersecting = rect.top < viewport.height && rect.bottom() > 0.0;
            match (slot.state, intersecting) {
                (SlotState::Pending | SlotState::Outside, true) => {
                    slot.state = SlotState::Inside;
                    self.inside.push(index);
                    events.push(Visibility::Entered {
                        index,
                        flags: slot.flags,
                    });
                }
                (SlotState::Pending, false) => slot.state = SlotState::Outside,
                (SlotState::Inside, false) => {
                    // The load_more item stays observed until the fetch it
                    // guards succeeds and moves the marker.
                    slot.state = if rect.top <= 0.0 && !slot.flags.load_more {
                        SlotState::Retired
                    } else {
                        SlotState::Outside
                    };
                    self.inside.retain(|i| *i != index);
                    events.push(Visibility::Left {
                        index,
                        top: rect.top,
                    });
                }
                _ => {}
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Items stacked vertically, 100px each, scrolled by `offset`.
    struct Column {
        offset: f64,
        count: usize,
        viewport: Size,
    }

    impl ViewportGeometry for Column {
        fn viewport(&self) -> Size {
            self.viewport
        }

        fn element_rect(&self, index: usize) -> Option<Rect> {
            (index < self.count).then(|| Rect {
                top: index as f64 * 100.0 - self.offset,
                left: 0.0,
                width: 300.0,
                height: 100.0,
            })
        }

        fn scroll_by(&mut self, dy: f64) {
            self.offset += dy;
        }
    }

    fn column(count: usize) -> Column {
        Column {
            offset: 0.0,
            count,
            viewport: Size::new(300.0, 250.0),
        }
    }

    fn entered(events: &[Visibility]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                Visibility::Entered { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn reports_entries_once() {
        let geometry = column(10);
        let mut observer = ViewportObserver::new();
        observer.observe_new(10);
        assert_eq!(entered(&observer.poll(&geometry)), vec![0, 1, 2]);
        assert!(observer.poll(&geometry).is_empty());
        assert_eq!(observer.anchor(), Some(2));
    }

    #[test]
    fn leaving_through_top_retires_item() {
        let mut geometry = column(10);
        let mut observer = ViewportObserver::new();
        observer.observe_new(10);
        observer.poll(&geometry);
        geometry.scroll_by(150.0);
        let events = observer.poll(&geometry);
        assert!(events.contains(&Visibility::Left {
            index: 0,
            top: -150.0
        }));
        assert_eq!(entered(&events), vec![3]);

        // Scrolling back does not bring a retired item back.
        geometry.scroll_by(-150.0);
        let events = observer.poll(&geometry);
        assert!(!entered(&events).contains(&0));
    }

    #[test]
    fn leaving_downward_keeps_observing() {
        let mut geometry = column(10);
        let mut observer = ViewportObserver::new();
        observer.observe_new(10);
        geometry.scroll_by(300.0);
        observer.poll(&geometry);
        assert!(observer.is_inside(3));
        geometry.scroll_by(-300.0);
        let events = observer.poll(&geometry);
        assert!(events.contains(&Visibility::Left {
            index: 3,
            top: 300.0
        }));
        geometry.scroll_by(300.0);
        assert!(entered(&observer.poll(&geometry)).contains(&3));
    }

    #[test]
    fn incremental_registration_skips_existing() {
        let geometry = column(10);
        let mut observer = ViewportObserver::new();
        assert_eq!(observer.observe_new(2), 2);
        assert_eq!(entered(&observer.poll(&geometry)), vec![0, 1]);
        assert_eq!(observer.observe_new(5), 3);
        assert_eq!(entered(&observer.poll(&geometry)), vec![2]);
    }

    #[test]
    fn reobserve_all_revives_retired_items() {
        let mut geometry = column(10);
        let mut observer = ViewportObserver::new();
        observer.observe_new(10);
        observer.poll(&geometry);
        geometry.scroll_by(200.0);
        observer.poll(&geometry);
        geometry.scroll_by(-200.0);
        observer.reobserve_all(10);
        let events = observer.poll(&geometry);
        assert_eq!(entered(&events), vec![0, 1]);
        assert_eq!(observer.full_reobserves(), 1);
    }

    #[test]
    fn load_more_item_survives_leaving_through_top() {
        let mut geometry = column(10);
        let mut observer = ViewportObserver::new();
        observer.observe_new(10);
        observer.set_flags(|i| ItemFlags {
            show_next_page: false,
            load_more: i == 0,
        });
        observer.poll(&geometry);
        geometry.scroll_by(400.0);
        observer.poll(&geometry);
        geometry.scroll_by(-400.0);
        let events = observer.poll(&geometry);
        // Item 1 retired normally; only the marked item comes back.
        assert_eq!(entered(&events), vec![0]);
        assert_eq!(
            events[0],
            Visibility::Entered {
                index: 0,
                flags: ItemFlags {
                    show_next_page: false,
                    load_more: true
                }
            }
        );
    }

    #[test]
    fn gaining_load_more_revives_retired_item() {
        let mut geometry = column(10);
        let mut observer = ViewportObserver::new();
        observer.observe_new(10);
        observer.poll(&geometry);
        geometry.scroll_by(400.0);
        observer.poll(&geometry);
        observer.set_flags(|i| ItemFlags {
            show_next_page: false,
            load_more: i == 1,
        });
        geometry.scroll_by(-400.0);
        assert_eq!(entered(&observer.poll(&geometry)), vec![1]);
    }

    #[test]
    fn entries_carry_render_flags() {
        let geometry = column(3);
        let mut observer = ViewportObserver::new();
        observer.observe_new(3);
        observer.set_flags(|i| ItemFlags {
            show_next_page: i == 1,
            load_more: i == 0,
        });
        let events = observer.poll(&geometry);
        assert_eq!(
            events[1],
            Visibility::Entered {
                index: 1,
                flags: ItemFlags {
                    show_next_page: true,
                    load_more: false
                }
            }
        );
    }
}
