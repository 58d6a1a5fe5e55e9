use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Interned string id used for metric names and tag keys/values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Debug, Default)]
struct Table {
    ids: AHashMap<Arc<str>, KeyId>,
    strings: Vec<Arc<str>>,
}

#[derive(Debug, Default)]
pub struct Interner {
    table: RwLock<Table>,
}

impl Interner {
    pub fn intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.table.read().ids.get(s) {
            return *id;
        }

        let mut table = self.table.write();
        // Another writer may have won the race between the two locks.
        if let Some(id) = table.ids.get(s) {
            return *id;
        }

        let id = KeyId(table.strings.len() as u32);
        let s: Arc<str> = Arc::from(s);
        table.strings.push(s.clone());
        table.ids.insert(s, id);
        id
    }

    pub fn lookup(&self, s: &str) -> Option<KeyId> {
        self.table.read().ids.get(s).copied()
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.table.read().strings.get(id.0 as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable_and_resolvable() {
        let interner = Interner::default();
        let a = interner.intern("scenario");
        let b = interner.intern("status");
        assert_ne!(a, b);
        assert_eq!(interner.intern("scenario"), a);
        assert_eq!(interner.resolve(b).as_deref(), Some("status"));
        assert_eq!(interner.lookup("missing"), None);
    }
}
