//! Fixed-threshold batch accumulator. Pure and single-threaded by
//! construction; callers serialize access.

/// Groups items into batches of a configured size. `add` hands back a
/// full batch exactly when the threshold is reached; `flush` force-
/// returns whatever is held (shutdown or idle timeout).
#[derive(Debug)]
pub struct BatchAccumulator<T> {
    threshold: usize,
    items: Vec<T>,
}

impl<T> BatchAccumulator<T> {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            items: Vec::with_capacity(threshold.max(1)),
        }
    }

    /// Add one item; returns the accumulated batch when it fills up.
    pub fn add(&mut self, item: T) -> Option<Vec<T>> {
        self.items.push(item);
        if self.items.len() >= self.threshold {
            Some(std::mem::take(&mut self.items))
        } else {
            None
        }
    }

    /// Return whatever is currently held and clear state.
    pub fn flush(&mut self) -> Vec<T> {
        std::mem::take(&mut self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
