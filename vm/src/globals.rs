use crate::value::Value;

/// Upper bound on global slots; `GetGlobal`/`SetGlobal` carry a `u16`.
pub const GLOBALS_SIZE: usize = 1 << 16;

/// Global slots shared by every run of a session.
///
/// Owned by the caller and lent to each [`VM`](crate::VM), so bindings made
/// by one compiled statement are visible to the next. Slots are allocated
/// on first write; reading a slot that was never written yields `null`.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    slots: Vec<Value>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, idx: usize) -> Value {
        self.slots.get(idx).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, idx: usize, value: Value) {
        debug_assert!(idx < GLOBALS_SIZE);
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, Value::Null);
        }
        self.slots[idx] = value;
    }

    /// Number of slots allocated so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_slots_read_null() {
        let globals = Globals::new();
        assert_eq!(globals.get(0), Value::Null);
        assert_eq!(globals.get(GLOBALS_SIZE - 1), Value::Null);
        assert!(globals.is_empty());
    }

    #[test]
    fn set_grows_on_demand() {
        let mut globals = Globals::new();
        globals.set(3, Value::Number(7.0));
        assert_eq!(globals.len(), 4);
        assert_eq!(globals.get(3), Value::Number(7.0));
        assert_eq!(globals.get(1), Value::Null);

        globals.set(0, Value::from("a"));
        assert_eq!(globals.len(), 4);
        assert_eq!(globals.get(0), Value::from("a"));
    }
}
