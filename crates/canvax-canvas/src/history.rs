//! Bounded, append-only event history.

use canvax_core::protocol::{DrawEvent, History};

pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Ordered event record that halves itself when it reaches its ceiling.
///
/// When an append finds `limit` events already stored, the oldest half is
/// discarded first, so the length never exceeds `limit`.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    events: Vec<DrawEvent>,
    limit: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            events: Vec::new(),
            limit: limit.max(2),
        }
    }

    pub fn push(&mut self, event: DrawEvent) {
        if self.events.len() >= self.limit {
            let half = self.events.len() / 2;
            self.events.drain(..half);
        }
        self.events.push(event);
    }

    /// Replace everything with `event`.
    pub fn reset_to(&mut self, event: DrawEvent) {
        self.events.clear();
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn events(&self) -> &[DrawEvent] {
        &self.events
    }

    /// Owned copy of the current contents.
    pub fn snapshot(&self) -> History {
        History::from(self.events.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(n: i32) -> DrawEvent {
        DrawEvent::stroke("black", 1, (n, n), (n + 1, n + 1))
    }

    #[test]
    fn test_push_preserves_order() {
        let mut history = HistoryBuffer::default();
        for i in 0..5 {
            history.push(stroke(i));
        }
        let xs: Vec<i32> = history.events().iter().map(|e| e.prev_x).collect();
        assert_eq!(xs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_never_exceeds_limit() {
        let mut history = HistoryBuffer::default();
        for i in 0..5000 {
            history.push(stroke(i));
            assert!(history.len() <= DEFAULT_HISTORY_LIMIT);
        }
    }

    #[test]
    fn test_halving_keeps_most_recent() {
        let mut history = HistoryBuffer::default();
        for i in 0..1001 {
            history.push(stroke(i));
        }
        assert_eq!(history.len(), 501);
        assert_eq!(history.events()[0].prev_x, 500);
        assert_eq!(history.events().last().unwrap().prev_x, 1000);
    }

    #[test]
    fn test_small_limit() {
        let mut history = HistoryBuffer::new(4);
        for i in 0..4 {
            history.push(stroke(i));
        }
        history.push(stroke(4));
        let xs: Vec<i32> = history.events().iter().map(|e| e.prev_x).collect();
        assert_eq!(xs, vec![2, 3, 4]);
    }

    #[test]
    fn test_reset_to() {
        let mut history = HistoryBuffer::default();
        for i in 0..10 {
            history.push(stroke(i));
        }
        let clear = DrawEvent::of_kind("clear");
        history.reset_to(clear.clone());
        assert_eq!(history.snapshot().events, vec![clear]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut history = HistoryBuffer::default();
        history.push(stroke(1));
        let snap = history.snapshot();
        history.push(stroke(2));
        assert_eq!(snap.len(), 1);
        assert_eq!(history.len(), 2);
    }
}
