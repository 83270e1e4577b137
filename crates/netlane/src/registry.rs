//! Live connection table.
//!
//! Keyed by `ConnId`, with the remote address as a secondary index. The
//! live counter moves with insert/remove so `len()` always equals the
//! number of entries once a close has finished.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::conn::{Conn, ConnId};

pub struct Registry {
    conns: DashMap<ConnId, Arc<Conn>>,
    by_addr: DashMap<String, ConnId>,
    live: AtomicI64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            conns: DashMap::new(),
            by_addr: DashMap::new(),
            live: AtomicI64::new(0),
        }
    }

    pub(crate) fn insert(&self, conn: Arc<Conn>) {
        let id = conn.id();
        self.by_addr.insert(conn.addr().to_string(), id);
        if self.conns.insert(id, conn).is_none() {
            self.live.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Returns `false` if the entry was already gone.
    pub(crate) fn remove(&self, conn: &Conn) -> bool {
        let id = conn.id();
        // the address may already belong to a newer connection
        self.by_addr.remove_if(conn.addr(), |_, owner| *owner == id);
        match self.conns.remove(&id) {
            Some(_) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ConnId) -> Option<Arc<Conn>> {
        self.conns.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Lookup by remote `ip:port`.
    pub fn get_by_addr(&self, addr: &str) -> Option<Arc<Conn>> {
        let id = *self.by_addr.get(addr)?.value();
        self.get(id)
    }

    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of all live connections.
    pub fn snapshot(&self) -> Vec<Arc<Conn>> {
        self.conns
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conn::tests::detached;

    #[test]
    fn test_insert_get_remove() {
        let registry = Registry::new();
        let (_c1, a) = detached(1);
        let (_c2, b) = detached(2);
        registry.insert(Arc::clone(&a));
        registry.insert(Arc::clone(&b));
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.get(a.id()).unwrap().id(), a.id());
        assert_eq!(registry.get_by_addr(b.addr()).unwrap().id(), b.id());

        assert!(registry.remove(&a));
        assert!(!registry.remove(&a));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(a.id()).is_none());
        assert!(registry.get_by_addr(a.addr()).is_none());
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_double_insert_counts_once() {
        let registry = Registry::new();
        let (_c, a) = detached(7);
        registry.insert(Arc::clone(&a));
        registry.insert(Arc::clone(&a));
        assert_eq!(registry.len(), 1);
        registry.remove(&a);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = Registry::new();
        assert!(registry.get(ConnId::new(99)).is_none());
        assert!(registry.get_by_addr("127.0.0.1:1").is_none());
    }
}
