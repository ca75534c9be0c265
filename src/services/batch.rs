//! Batch planner
//!
//! Splits pending items into contiguous batches capped by the operating
//! mode. Concatenating the batches always reproduces the input exactly.

use crate::models::{BatchToken, OperatingMode};

/// A contiguous slice of pending items sent to the oracle together
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    /// Identifies the batch when responses come back out of order
    pub token: BatchToken,
    pub items: Vec<T>,
}

impl<T> Batch<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            token: BatchToken::new(),
            items,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Groups items into mode-sized batches
pub struct BatchPlanner;

impl BatchPlanner {
    /// Plan batches using the mode's size cap
    pub fn plan<T>(items: Vec<T>, mode: OperatingMode) -> Vec<Batch<T>> {
        Self::plan_with_cap(items, mode.batch_size())
    }

    /// Plan batches with an explicit size cap
    ///
    /// # Panics
    ///
    /// Panics if `cap` is zero.
    pub fn plan_with_cap<T>(items: Vec<T>, cap: usize) -> Vec<Batch<T>> {
        assert!(cap > 0, "batch cap must be positive");

        let mut batches = Vec::with_capacity(items.len().div_ceil(cap));
        let mut iter = items.into_iter().peekable();
        while iter.peek().is_some() {
            let chunk: Vec<T> = iter.by_ref().take(cap).collect();
            batches.push(Batch::new(chunk));
        }
        batches
    }
}
