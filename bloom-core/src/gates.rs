//! Multi-step answers that only become submittable once complete.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::models::Answer;

/// Pick exactly `required` distinct items, e.g. the memory-recall grid.
#[derive(Debug, Clone)]
pub struct SelectionGate {
    required: usize,
    expected: BTreeSet<u32>,
    chosen: Vec<u32>,
}

impl SelectionGate {
    pub fn new(required: usize, expected: impl IntoIterator<Item = u32>) -> Self {
        Self {
            required,
            expected: expected.into_iter().collect(),
            chosen: Vec::new(),
        }
    }

    /// Selects `item`, or deselects it when already chosen. Selecting past
    /// the required count is ignored. Returns whether `item` is now chosen.
    pub fn toggle(&mut self, item: u32) -> bool {
        if let Some(pos) = self.chosen.iter().position(|&c| c == item) {
            self.chosen.remove(pos);
            return false;
        }
        if self.chosen.len() >= self.required {
            return false;
        }
        self.chosen.push(item);
        true
    }

    pub fn chosen(&self) -> &[u32] {
        &self.chosen
    }

    pub fn is_ready(&self) -> bool {
        self.chosen.len() == self.required
    }

    pub fn is_correct(&self) -> bool {
        self.is_ready() && self.chosen.iter().all(|c| self.expected.contains(c))
    }

    /// The graded answer, once exactly `required` items are chosen.
    pub fn answer(&self) -> Option<Answer> {
        self.is_ready().then(|| {
            Answer::graded(
                Value::from(self.chosen.clone()),
                self.is_correct(),
            )
        })
    }
}

/// Coin denominations offered by the shopping question.
pub const COINS: [u32; 4] = [1, 2, 5, 10];

/// Add coins until the running total is the price, e.g. the coin game.
#[derive(Debug, Clone)]
pub struct TotalGate {
    target: u32,
    coins: Vec<u32>,
}

impl TotalGate {
    pub fn new(target: u32) -> Self {
        Self {
            target,
            coins: Vec::new(),
        }
    }

    /// Adds one coin. Values outside [`COINS`] are refused.
    pub fn add(&mut self, coin: u32) -> bool {
        if !COINS.contains(&coin) {
            return false;
        }
        self.coins.push(coin);
        true
    }

    /// Takes back the last coin.
    pub fn undo(&mut self) -> Option<u32> {
        self.coins.pop()
    }

    pub fn clear(&mut self) {
        self.coins.clear();
    }

    pub fn coins(&self) -> &[u32] {
        &self.coins
    }

    pub fn total(&self) -> u32 {
        self.coins.iter().sum()
    }

    pub fn is_ready(&self) -> bool {
        !self.coins.is_empty()
    }

    pub fn is_correct(&self) -> bool {
        self.total() == self.target
    }

    pub fn answer(&self) -> Option<Answer> {
        self.is_ready()
            .then(|| Answer::graded(self.total(), self.is_correct()))
    }
}
