//! Belt alignment classification and debouncing
//!
//! The classifier buckets the belt's lateral center position into five
//! zones. The debouncer only confirms a zone change after three consecutive
//! equal classifications, so single noisy profiles never raise an alert.

use crate::domain::types::AlignmentZone;
use tracing::{debug, info};

pub const WINDOW_LEN: usize = 3;

/// Center position of the belt, normalized so that ±1 marks the outer zones
#[inline]
pub fn center_position(right_align: f64, left_align: f64) -> f64 {
    (right_align + left_align) / 20.0
}

/// Map a center position to its zone; upper bounds are inclusive
pub fn zone_for_center(center: f64) -> AlignmentZone {
    if center <= -1.0 {
        AlignmentZone::FarLeft
    } else if center <= -0.5 {
        AlignmentZone::SlightLeft
    } else if center <= 0.5 {
        AlignmentZone::Centered
    } else if center <= 1.0 {
        AlignmentZone::SlightRight
    } else {
        AlignmentZone::FarRight
    }
}

pub fn classify(right_align: f64, left_align: f64) -> AlignmentZone {
    zone_for_center(center_position(right_align, left_align))
}

/// Fixed-capacity sliding window of the latest classifications
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentWindow {
    slots: [Option<AlignmentZone>; WINDOW_LEN],
    len: usize,
}

impl AlignmentWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a zone; once full, the oldest entry is shifted out
    pub fn push(&mut self, zone: AlignmentZone) {
        if self.len < WINDOW_LEN {
            self.slots[self.len] = Some(zone);
            self.len += 1;
        } else {
            self.slots.rotate_left(1);
            self.slots[WINDOW_LEN - 1] = Some(zone);
        }
    }

    /// The zone shared by every slot, if the window is full and unanimous
    pub fn unanimous(&self) -> Option<AlignmentZone> {
        if self.len < WINDOW_LEN {
            return None;
        }
        let first = self.slots[0]?;
        self.slots.iter().all(|slot| *slot == Some(first)).then_some(first)
    }

    pub fn clear(&mut self) {
        self.slots = [None; WINDOW_LEN];
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn entries(&self) -> impl Iterator<Item = AlignmentZone> + '_ {
        self.slots[..self.len].iter().filter_map(|slot| *slot)
    }
}

/// A confirmed zone change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneTransition {
    pub from: AlignmentZone,
    pub to: AlignmentZone,
}

impl ZoneTransition {
    pub fn message(&self) -> &'static str {
        self.to.transition_message()
    }
}

/// Confirmed conveyor state plus the pending classification window
#[derive(Debug, Clone)]
pub struct AlignmentDebouncer {
    confirmed: AlignmentZone,
    window: AlignmentWindow,
}

impl AlignmentDebouncer {
    /// Start from a zone taken directly from the bootstrap reading
    pub fn new(initial: AlignmentZone) -> Self {
        Self { confirmed: initial, window: AlignmentWindow::new() }
    }

    pub fn confirmed(&self) -> AlignmentZone {
        self.confirmed
    }

    pub fn window(&self) -> &AlignmentWindow {
        &self.window
    }

    /// Classify the alignment and feed it to the window
    pub fn observe(&mut self, right_align: f64, left_align: f64) -> Option<ZoneTransition> {
        self.push(classify(right_align, left_align))
    }

    /// Feed one classification; returns the transition if it confirms one
    pub fn push(&mut self, zone: AlignmentZone) -> Option<ZoneTransition> {
        self.window.push(zone);

        match self.window.unanimous() {
            Some(agreed) if agreed != self.confirmed => {
                let transition = ZoneTransition { from: self.confirmed, to: agreed };
                self.confirmed = agreed;
                self.window.clear();
                info!(from = %transition.from, to = %transition.to, "alignment_transition_confirmed");
                Some(transition)
            }
            _ => {
                debug!(
                    zone = %zone,
                    confirmed = %self.confirmed,
                    pending = self.window.len(),
                    "alignment_observed"
                );
                None
            }
        }
    }
}
