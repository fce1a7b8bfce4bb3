use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use stratus_types::{ObjectHeader, ObjectId, PackId};

use super::{Intercept, Oracle, OracleLocation};
use crate::remote::ByteRange;

/// How many times each hook was invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OracleCalls {
    pub register_object: usize,
    pub register_pack: usize,
    pub lookup_object: usize,
    pub lookup_pack: usize,
    pub head_object: usize,
    pub get_object: usize,
    pub put_object: usize,
    pub update_ref: usize,
    pub shutting_down: usize,
}

#[derive(Debug, Default)]
struct Counters {
    register_object: AtomicUsize,
    register_pack: AtomicUsize,
    lookup_object: AtomicUsize,
    lookup_pack: AtomicUsize,
    head_object: AtomicUsize,
    get_object: AtomicUsize,
    put_object: AtomicUsize,
    update_ref: AtomicUsize,
    shutting_down: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A map-backed oracle for tests and single-process deployments.
///
/// Remembers every registration and answers lookups from them. Created with
/// [`intercepting`](Self::intercepting), it also serves head/get/put from an
/// internal blob map so the real store is never reached.
#[derive(Debug, Default)]
pub struct InMemoryOracle {
    objects: Mutex<HashMap<ObjectId, OracleLocation>>,
    packs: Mutex<HashMap<PackId, Vec<ObjectId>>>,
    pack_log: Mutex<Vec<(PackId, Vec<ObjectId>)>>,
    refs: Mutex<HashMap<String, String>>,
    locks: Mutex<HashSet<String>>,
    mock_store: Option<Mutex<HashMap<(String, String), Bytes>>>,
    calls: Counters,
    shut_down: AtomicBool,
}

impl InMemoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// An oracle that also stands in for the blob store.
    pub fn intercepting() -> Self {
        Self {
            mock_store: Some(Mutex::new(HashMap::new())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> OracleCalls {
        let c = &self.calls;
        let load = |a: &AtomicUsize| a.load(Ordering::SeqCst);
        OracleCalls {
            register_object: load(&c.register_object),
            register_pack: load(&c.register_pack),
            lookup_object: load(&c.lookup_object),
            lookup_pack: load(&c.lookup_pack),
            head_object: load(&c.head_object),
            get_object: load(&c.get_object),
            put_object: load(&c.put_object),
            update_ref: load(&c.update_ref),
            shutting_down: load(&c.shutting_down),
        }
    }

    /// Every `register_pack` call, in order.
    pub fn pack_registrations(&self) -> Vec<(PackId, Vec<ObjectId>)> {
        lock(&self.pack_log).clone()
    }

    /// Teach the oracle about an object without counting a call.
    pub fn seed_object(&self, id: ObjectId, location: OracleLocation) {
        lock(&self.objects).insert(id, location);
    }

    /// Teach the oracle about a pack and its members without counting a call.
    pub fn seed_pack(&self, pack: PackId, ids: &[ObjectId]) {
        {
            let mut objects = lock(&self.objects);
            for id in ids {
                objects.insert(*id, OracleLocation::Packed(pack));
            }
        }
        lock(&self.packs).insert(pack, ids.to_vec());
    }

    /// A blob held by the intercepting store.
    pub fn mocked_blob(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let store = self.mock_store.as_ref()?;
        lock(store).get(&(bucket.to_string(), key.to_string())).cloned()
    }

    pub fn ref_target(&self, name: &str) -> Option<String> {
        lock(&self.refs).get(name).cloned()
    }

    pub fn is_locked(&self, name: &str) -> bool {
        lock(&self.locks).contains(name)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Oracle for InMemoryOracle {
    fn register_object(&self, id: &ObjectId, _header: Option<&ObjectHeader>) {
        bump(&self.calls.register_object);
        lock(&self.objects).insert(*id, OracleLocation::Loose);
    }

    fn register_pack(&self, pack: &PackId, ids: &[ObjectId]) {
        bump(&self.calls.register_pack);
        {
            let mut objects = lock(&self.objects);
            for id in ids {
                objects.insert(*id, OracleLocation::Packed(*pack));
            }
        }
        lock(&self.packs).insert(*pack, ids.to_vec());
        lock(&self.pack_log).push((*pack, ids.to_vec()));
    }

    fn lookup_object(&self, id: &ObjectId) -> OracleLocation {
        bump(&self.calls.lookup_object);
        lock(&self.objects)
            .get(id)
            .copied()
            .unwrap_or(OracleLocation::Unknown)
    }

    fn lookup_pack(&self, pack: &PackId) -> bool {
        bump(&self.calls.lookup_pack);
        lock(&self.packs).contains_key(pack)
    }

    fn head_object(&self, bucket: &str, key: &str) -> Intercept<bool> {
        bump(&self.calls.head_object);
        match &self.mock_store {
            Some(store) => Intercept::Mocked(lock(store).contains_key(&(bucket.to_string(), key.to_string()))),
            None => Intercept::NotMocked,
        }
    }

    fn get_object(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> Intercept<Option<Bytes>> {
        bump(&self.calls.get_object);
        match &self.mock_store {
            Some(store) => {
                let blob = lock(store).get(&(bucket.to_string(), key.to_string())).cloned();
                Intercept::Mocked(blob.map(|body| match range {
                    Some(range) => range.apply(&body),
                    None => body,
                }))
            }
            None => Intercept::NotMocked,
        }
    }

    fn put_object(&self, bucket: &str, key: &str, body: &Bytes) -> Intercept<()> {
        bump(&self.calls.put_object);
        match &self.mock_store {
            Some(store) => {
                lock(store).insert((bucket.to_string(), key.to_string()), body.clone());
                Intercept::Mocked(())
            }
            None => Intercept::NotMocked,
        }
    }

    fn update_ref(&self, name: &str, target: &str) {
        bump(&self.calls.update_ref);
        lock(&self.refs).insert(name.to_string(), target.to_string());
    }

    fn resolve_ref(&self, name: &str) -> Option<String> {
        self.ref_target(name)
    }

    fn acquire_lock(&self, name: &str) -> bool {
        lock(&self.locks).insert(name.to_string())
    }

    fn release_lock(&self, name: &str) {
        lock(&self.locks).remove(name);
    }

    fn shutting_down(&self) {
        bump(&self.calls.shutting_down);
        self.shut_down.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> ObjectId {
        ObjectId::from_hash([byte; 32])
    }

    #[test]
    fn registrations_answer_lookups() {
        let oracle = InMemoryOracle::new();
        let pack = PackId::from_hash([7; 32]);
        oracle.register_object(&id(1), None);
        oracle.register_pack(&pack, &[id(2), id(3)]);

        assert_eq!(oracle.lookup_object(&id(1)), OracleLocation::Loose);
        assert_eq!(oracle.lookup_object(&id(2)), OracleLocation::Packed(pack));
        assert_eq!(oracle.lookup_object(&id(4)), OracleLocation::Unknown);
        assert!(oracle.lookup_pack(&pack));
        assert!(!oracle.lookup_pack(&PackId::null()));

        let calls = oracle.calls();
        assert_eq!(calls.register_object, 1);
        assert_eq!(calls.register_pack, 1);
        assert_eq!(calls.lookup_object, 3);
        assert_eq!(oracle.pack_registrations(), vec![(pack, vec![id(2), id(3)])]);
    }

    #[test]
    fn plain_oracle_does_not_intercept() {
        let oracle = InMemoryOracle::new();
        assert_eq!(oracle.head_object("b", "k"), Intercept::NotMocked);
        assert_eq!(oracle.put_object("b", "k", &Bytes::new()), Intercept::NotMocked);
        assert_eq!(oracle.calls().head_object, 1);
    }

    #[test]
    fn intercepting_oracle_serves_blobs() {
        let oracle = InMemoryOracle::intercepting();
        assert_eq!(oracle.head_object("b", "k"), Intercept::Mocked(false));
        assert_eq!(oracle.get_object("b", "k", None), Intercept::Mocked(None));

        oracle.put_object("b", "k", &Bytes::from_static(b"0123456789"));
        assert_eq!(oracle.head_object("b", "k"), Intercept::Mocked(true));
        assert_eq!(
            oracle.get_object("b", "k", Some(ByteRange::new(0, 4))),
            Intercept::Mocked(Some(Bytes::from_static(b"0123")))
        );
        assert_eq!(oracle.mocked_blob("b", "k").unwrap().len(), 10);
    }

    #[test]
    fn locks_are_exclusive() {
        let oracle = InMemoryOracle::new();
        assert!(oracle.acquire_lock("refs"));
        assert!(!oracle.acquire_lock("refs"));
        assert!(oracle.is_locked("refs"));
        oracle.release_lock("refs");
        assert!(oracle.acquire_lock("refs"));
    }

    #[test]
    fn refs_and_shutdown() {
        let oracle = InMemoryOracle::new();
        oracle.update_ref("refs/heads/main", "abc");
        assert_eq!(oracle.resolve_ref("refs/heads/main").as_deref(), Some("abc"));
        assert!(!oracle.is_shut_down());
        oracle.shutting_down();
        assert!(oracle.is_shut_down());
        assert_eq!(oracle.calls().shutting_down, 1);
    }
}
