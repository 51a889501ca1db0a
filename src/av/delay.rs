/// One-slot look-behind buffer.
///
/// Holds the most recent item back until either a successor arrives or the
/// stream ends. Whoever drains the slot therefore knows whether the item is
/// the last one, which is what end-of-stream signalling needs.
#[derive(Debug, Clone)]
pub struct DelaySlot<T> {
    held: Option<T>,
}

impl<T> DelaySlot<T> {
    pub fn new() -> Self {
        Self { held: None }
    }

    /// Holds `item` and returns the previously held one, which is known not to be the last.
    pub fn push(&mut self, item: T) -> Option<T> {
        self.held.replace(item)
    }

    /// Empties the slot. The returned item is the last one.
    pub fn take(&mut self) -> Option<T> {
        self.held.take()
    }

    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }
}

impl<T> Default for DelaySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_push_returns_previous() {
        let mut slot = DelaySlot::new();
        assert_eq!(slot.push(1), None);
        assert_eq!(slot.push(2), Some(1));
        assert!(slot.is_holding());
        assert_eq!(slot.take(), Some(2));
        assert!(!slot.is_holding());
        assert_eq!(slot.take(), None);
    }

    // Draining through the slot preserves order and releases exactly one item at the end.
    #[quickcheck]
    fn prop_order_preserved(items: Vec<u32>) -> bool {
        let mut slot = DelaySlot::new();
        let mut out: Vec<u32> = items.iter().filter_map(|&item| slot.push(item)).collect();
        let last = slot.take();
        out.extend(last);
        out == items && last == items.last().copied()
    }
}
