//! Process-wide arena of open backends, addressed by integer handles.
//!
//! A host holds a [`BackendHandle`] instead of a pointer and passes it back on
//! every call. Handles are never reused; zero is never issued.

use std::collections::HashMap;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::error::{BackendError, BackendResult};
use crate::odb::{status, to_status, BlockingBackend, OdbBackend, OdbWritePack};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WritePackHandle(pub u64);

#[derive(Default)]
pub struct BackendRegistry {
    next: AtomicU64,
    backends: Mutex<HashMap<u64, Arc<BlockingBackend>>>,
    write_packs: Mutex<HashMap<u64, Box<dyn OdbWritePack>>>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &lock(&self.backends).len())
            .field("write_packs", &lock(&self.write_packs).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unknown_handle(kind: &str, raw: u64) -> BackendError {
    BackendError::Configuration(format!("unknown {kind} handle {raw}"))
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static BackendRegistry {
        static GLOBAL: OnceLock<BackendRegistry> = OnceLock::new();
        GLOBAL.get_or_init(BackendRegistry::new)
    }

    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn insert(&self, backend: BlockingBackend) -> BackendHandle {
        let id = self.next_id();
        lock(&self.backends).insert(id, Arc::new(backend));
        BackendHandle(id)
    }

    pub fn get(&self, handle: BackendHandle) -> Option<Arc<BlockingBackend>> {
        lock(&self.backends).get(&handle.0).cloned()
    }

    /// Forget a backend. Calls already in flight keep their reference.
    pub fn remove(&self, handle: BackendHandle) -> Option<Arc<BlockingBackend>> {
        lock(&self.backends).remove(&handle.0)
    }

    pub fn len(&self) -> usize {
        lock(&self.backends).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `op` against the backend behind `handle` and return a status code.
    ///
    /// The registry lock is released before `op` runs.
    pub fn dispatch<T>(
        &self,
        handle: BackendHandle,
        op: impl FnOnce(&BlockingBackend) -> BackendResult<T>,
        on_ok: impl FnOnce(T),
    ) -> c_int {
        let result = self
            .get(handle)
            .ok_or_else(|| unknown_handle("backend", handle.0))
            .and_then(|backend| op(&backend));
        to_status(result, on_ok)
    }

    /// Open a write-pack session on a backend.
    pub fn open_write_pack(&self, handle: BackendHandle) -> BackendResult<WritePackHandle> {
        let backend = self
            .get(handle)
            .ok_or_else(|| unknown_handle("backend", handle.0))?;
        let pack = backend.write_pack()?;
        let id = self.next_id();
        lock(&self.write_packs).insert(id, pack);
        Ok(WritePackHandle(id))
    }

    /// Run `op` against a write-pack session and return a status code.
    ///
    /// The session is taken out of the registry while `op` runs, so a
    /// concurrent call on the same handle sees it as unknown.
    pub fn dispatch_write_pack<T>(
        &self,
        handle: WritePackHandle,
        op: impl FnOnce(&mut dyn OdbWritePack) -> BackendResult<T>,
        on_ok: impl FnOnce(T),
    ) -> c_int {
        let Some(mut pack) = lock(&self.write_packs).remove(&handle.0) else {
            return to_status::<T>(Err(unknown_handle("write-pack", handle.0)), on_ok);
        };
        let result = op(pack.as_mut());
        lock(&self.write_packs).insert(handle.0, pack);
        to_status(result, on_ok)
    }

    /// Release a write-pack session and anything it still buffers.
    pub fn free_write_pack(&self, handle: WritePackHandle) -> c_int {
        match lock(&self.write_packs).remove(&handle.0) {
            Some(pack) => {
                pack.free();
                status::OK
            }
            None => to_status::<()>(Err(unknown_handle("write-pack", handle.0)), |_| {}),
        }
    }

    /// Remove a backend and tear it down.
    pub fn free(&self, handle: BackendHandle) -> c_int {
        let result = self
            .remove(handle)
            .ok_or_else(|| unknown_handle("backend", handle.0))
            .and_then(|backend| backend.free());
        to_status(result, |_| {})
    }
}
