use rand::seq::SliceRandom;
use rand::Rng;

/// Ordered media references with per-item usage counters.
#[derive(Debug, Clone, Default)]
pub struct MediaPool {
    items: Vec<String>,
    usage: Vec<u32>,
}

impl MediaPool {
    pub fn new(items: Vec<String>) -> Self {
        let mut deduped: Vec<String> = Vec::with_capacity(items.len());
        for item in items {
            if !deduped.contains(&item) {
                deduped.push(item);
            }
        }
        let usage = vec![0; deduped.len()];
        Self {
            items: deduped,
            usage,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn usage_of(&self, item: &str) -> Option<u32> {
        let idx = self.items.iter().position(|i| i == item)?;
        Some(self.usage[idx])
    }

    pub fn reset_usage(&mut self) {
        self.usage.iter_mut().for_each(|c| *c = 0);
    }

    /// Pick a least-used item at random and count it as used.
    ///
    /// Returns `None` only for an empty pool.
    pub fn select_fair(&mut self) -> Option<String> {
        self.select_fair_with(&mut rand::thread_rng())
    }

    pub fn select_fair_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<String> {
        let min_count = *self.usage.iter().min()?;
        let least_used: Vec<usize> = self
            .usage
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == min_count)
            .map(|(idx, _)| idx)
            .collect();
        let idx = *least_used.choose(rng)?;
        self.usage[idx] = self.usage[idx].saturating_add(1);

        tracing::debug!(
            media = %self.items[idx],
            usage = self.usage[idx],
            min_count,
            "Fair selection"
        );
        Some(self.items[idx].clone())
    }
}
