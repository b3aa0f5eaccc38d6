//! An in-memory KV backend implementing the [`crate::kv`] boundary.
//!
//! This is the crate's only concrete backend (concrete KV backends are out
//! of scope per the core specification); it exists so the transaction core,
//! index engine, and listener subsystem can be exercised end-to-end in
//! tests and examples, the way `sov_schema_db::test` ships hand-rolled
//! fixtures rather than requiring a real RocksDB instance for unit tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::kv::{KvPair, KvStore, KvTransaction};

/// A shared, in-memory sorted map guarded by a single mutex. Transactions
/// are not snapshot-isolated: each [`MemTxn`] reads and writes the shared
/// map directly and "commits" by simply dropping its guard, matching the
/// core's assumption (spec §5) that isolation is a property of the
/// concrete backend rather than the core itself.
#[derive(Debug, Clone, Default)]
pub struct MemKv {
    inner: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemKv {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemKv {
    type Txn = MemTxn;

    fn begin(&self) -> Result<MemTxn> {
        Ok(MemTxn {
            store: self.inner.clone(),
            pending: BTreeMap::new(),
        })
    }
}

#[derive(Debug, Clone)]
enum PendingOp {
    Put(Vec<u8>),
    Remove,
}

/// A transaction over [`MemKv`]. Writes are buffered in `pending` and
/// applied to the shared map on [`KvTransaction::commit`]; reads check
/// `pending` first so a transaction observes its own writes before commit.
#[derive(Debug)]
pub struct MemTxn {
    store: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
    pending: BTreeMap<Vec<u8>, PendingOp>,
}

impl KvTransaction for MemTxn {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(op) = self.pending.get(key) {
            return Ok(match op {
                PendingOp::Put(v) => Some(v.clone()),
                PendingOp::Remove => None,
            });
        }
        Ok(self.store.lock().unwrap().get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending
            .insert(key.to_vec(), PendingOp::Put(value.to_vec()));
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<()> {
        self.pending.insert(key.to_vec(), PendingOp::Remove);
        Ok(())
    }

    fn remove_range(&mut self, min: &[u8], max: Option<&[u8]>) -> Result<()> {
        let keys: Vec<Vec<u8>> = self.collect_range(min, max)?.into_iter().map(|(k, _)| k).collect();
        for k in keys {
            self.pending.insert(k, PendingOp::Remove);
        }
        Ok(())
    }

    fn range_scan<'a>(
        &'a self,
        min: &[u8],
        max: Option<&[u8]>,
        reverse: bool,
    ) -> Result<Box<dyn Iterator<Item = KvPair> + 'a>> {
        let mut pairs = self.collect_range(min, max)?;
        if reverse {
            pairs.reverse();
        }
        Ok(Box::new(pairs.into_iter()))
    }

    fn atomic_add(&mut self, key: &[u8], delta: i64) -> Result<Option<i64>> {
        let current = match self.get(key)? {
            Some(bytes) => crate::codec::decode_i64(&bytes)?.0,
            None => 0,
        };
        let updated = current.wrapping_add(delta);
        let mut out = Vec::with_capacity(8);
        crate::codec::encode_i64(updated, &mut out);
        self.put(key, &out)?;
        Ok(Some(updated))
    }

    fn commit(self) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        for (key, op) in self.pending {
            match op {
                PendingOp::Put(value) => {
                    store.insert(key, value);
                }
                PendingOp::Remove => {
                    store.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        Ok(())
    }
}

impl MemTxn {
    fn collect_range(&self, min: &[u8], max: Option<&[u8]>) -> Result<Vec<KvPair>> {
        let store = self.store.lock().unwrap();
        let base = store.range(min.to_vec()..).map(|(k, v)| (k.clone(), v.clone()));
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = base
            .take_while(|(k, _)| max.map(|m| k.as_slice() < m).unwrap_or(true))
            .collect();
        for (key, op) in self.pending.range(min.to_vec()..) {
            if let Some(m) = max {
                if key.as_slice() >= m {
                    continue;
                }
            }
            match op {
                PendingOp::Put(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                PendingOp::Remove => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_commit_roundtrip() {
        let kv = MemKv::new();
        let mut txn = kv.begin().unwrap();
        txn.put(b"a", b"1").unwrap();
        assert_eq!(txn.get(b"a").unwrap(), Some(b"1".to_vec()));
        txn.commit().unwrap();

        let txn2 = kv.begin().unwrap();
        assert_eq!(txn2.get(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn rollback_discards_writes() {
        let kv = MemKv::new();
        let mut txn = kv.begin().unwrap();
        txn.put(b"a", b"1").unwrap();
        txn.rollback().unwrap();

        let txn2 = kv.begin().unwrap();
        assert_eq!(txn2.get(b"a").unwrap(), None);
    }

    #[test]
    fn range_scan_respects_pending_writes() {
        let kv = MemKv::new();
        let mut txn = kv.begin().unwrap();
        txn.put(b"a", b"1").unwrap();
        txn.put(b"b", b"2").unwrap();
        txn.put(b"c", b"3").unwrap();
        txn.commit().unwrap();

        let mut txn2 = kv.begin().unwrap();
        txn2.remove(b"b").unwrap();
        let results: Vec<_> = txn2.range_scan(b"a", None, false).unwrap().collect();
        assert_eq!(results, vec![(b"a".to_vec(), b"1".to_vec()), (b"c".to_vec(), b"3".to_vec())]);
    }

    #[test]
    fn atomic_add_creates_and_updates() {
        let kv = MemKv::new();
        let mut txn = kv.begin().unwrap();
        assert_eq!(txn.atomic_add(b"ctr", 5).unwrap(), Some(5));
        assert_eq!(txn.atomic_add(b"ctr", -2).unwrap(), Some(3));
    }
}
