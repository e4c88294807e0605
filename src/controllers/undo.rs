use std::time::{Duration, Instant};

/// How long a delete can be undone
pub const UNDO_WINDOW: Duration = Duration::from_secs(4);

/// A deleted item and where it was
#[derive(Debug, Clone, PartialEq)]
pub struct Deleted<T> {
    pub item: T,
    pub index: usize,
    /// Owning list (project id) for nested items
    pub parent: Option<String>,
    pub deleted_at: Instant,
}

/// Single-slot undo record. A newer delete replaces the older one.
#[derive(Debug)]
pub struct UndoSlot<T> {
    slot: Option<Deleted<T>>,
    window: Duration,
}

impl<T> Default for UndoSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UndoSlot<T> {
    pub fn new() -> Self {
        Self::with_window(UNDO_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self { slot: None, window }
    }

    pub fn put(&mut self, item: T, index: usize, parent: Option<String>, now: Instant) {
        self.slot = Some(Deleted {
            item,
            index,
            parent,
            deleted_at: now,
        });
    }

    pub fn is_open(&self, now: Instant) -> bool {
        self.remaining(now).is_some()
    }

    /// Time left to undo, if a record is still inside its window
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let deleted = self.slot.as_ref()?;
        let elapsed = now.saturating_duration_since(deleted.deleted_at);
        (elapsed < self.window).then(|| self.window - elapsed)
    }

    pub fn peek(&self) -> Option<&Deleted<T>> {
        self.slot.as_ref()
    }

    /// Take the record if still undoable; the slot is empty afterwards
    pub fn take(&mut self, now: Instant) -> Option<Deleted<T>> {
        if self.is_open(now) {
            self.slot.take()
        } else {
            self.slot = None;
            None
        }
    }

    /// Drop a record whose window has passed. Returns true if one was dropped.
    pub fn expire(&mut self, now: Instant) -> bool {
        if self.slot.is_some() && !self.is_open(now) {
            self.slot = None;
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_inside_window_once() {
        let start = Instant::now();
        let mut slot = UndoSlot::new();
        slot.put("step", 2, Some("p1".to_string()), start);

        let now = start + Duration::from_secs(3);
        assert!(slot.is_open(now));
        let record = slot.take(now).unwrap();
        assert_eq!(record.item, "step");
        assert_eq!(record.index, 2);
        assert_eq!(record.parent.as_deref(), Some("p1"));

        assert!(slot.take(now).is_none());
    }

    #[test]
    fn test_take_after_window_is_noop() {
        let start = Instant::now();
        let mut slot = UndoSlot::new();
        slot.put(1, 0, None, start);

        assert!(slot.take(start + UNDO_WINDOW).is_none());
        assert!(slot.peek().is_none());
    }

    #[test]
    fn test_expire_clears_stale_record() {
        let start = Instant::now();
        let mut slot = UndoSlot::new();
        slot.put(1, 0, None, start);

        assert!(!slot.expire(start + Duration::from_secs(1)));
        assert!(slot.expire(start + Duration::from_secs(5)));
        assert!(slot.peek().is_none());
    }

    #[test]
    fn test_newer_delete_replaces_older() {
        let start = Instant::now();
        let mut slot = UndoSlot::new();
        slot.put("a", 0, None, start);
        slot.put("b", 1, None, start);
        assert_eq!(slot.take(start).unwrap().item, "b");
    }

    #[test]
    fn test_remaining_counts_down() {
        let start = Instant::now();
        let mut slot = UndoSlot::with_window(Duration::from_secs(4));
        slot.put((), 0, None, start);
        assert_eq!(
            slot.remaining(start + Duration::from_secs(1)),
            Some(Duration::from_secs(3))
        );
    }
}
