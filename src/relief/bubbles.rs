//! Bubble-pop loop: a randomly placed bubble per spawn tick, removed on pop.
//! The field is capped; spawn ticks are skipped while it is full.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bubble {
    pub id: u64,
    /// Left offset, percent of the play area [0, 90).
    pub x_pct: f32,
    /// Top offset, percent of the play area [0, 80).
    pub y_pct: f32,
    /// Diameter in px [30, 80).
    pub size_px: f32,
}

pub struct BubbleField {
    bubbles: Vec<Bubble>,
    next_id: u64,
    cap: usize,
}

impl BubbleField {
    pub fn new(cap: usize) -> Self {
        Self {
            bubbles: Vec::with_capacity(cap),
            next_id: 1,
            cap,
        }
    }

    /// Spawn one bubble. Returns None when the field is full.
    pub fn spawn<R: Rng>(&mut self, rng: &mut R) -> Option<Bubble> {
        if self.bubbles.len() >= self.cap {
            return None;
        }
        let bubble = Bubble {
            id: self.next_id,
            x_pct: rng.gen_range(0.0..90.0),
            y_pct: rng.gen_range(0.0..80.0),
            size_px: rng.gen_range(30.0..80.0),
        };
        self.next_id += 1;
        self.bubbles.push(bubble.clone());
        Some(bubble)
    }

    /// Remove a bubble by id. Returns false for unknown ids (already popped).
    pub fn pop(&mut self, id: u64) -> bool {
        let before = self.bubbles.len();
        self.bubbles.retain(|b| b.id != id);
        self.bubbles.len() != before
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}
