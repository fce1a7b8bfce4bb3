//! The host engine's primitive contract.
//!
//! The host calls synchronously and expects integer status codes. The
//! [`OdbBackend`] trait is that contract in Rust terms; [`BlockingBackend`]
//! implements it by driving the async [`Backend`] on its own runtime.

use std::cell::RefCell;
use std::sync::Arc;

use stratus_pack::PackFile;
use stratus_types::{ObjectHeader, ObjectId, ObjectType};
use tokio::runtime::Runtime;

use crate::backend::{Backend, ObjectData};
use crate::config::BackendConfig;
use crate::error::BackendResult;
use crate::oracle::Oracle;
use crate::writepack::PackWriteSession;

/// Status codes returned across the host boundary.
pub mod status {
    use std::os::raw::c_int;

    pub const OK: c_int = 0;
    pub const ERROR: c_int = -1;
    pub const NOT_FOUND: c_int = -3;
    /// Not implemented here; the host should fall back to its own strategy.
    pub const PASSTHROUGH: c_int = -30;
}

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Record the message of the most recent failure on this thread.
pub fn set_last_error(message: impl Into<String>) {
    let message = message.into();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
}

/// The message of the most recent failure on this thread, if any.
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Object database backend as seen by the host engine.
pub trait OdbBackend: Send + Sync {
    fn read(&self, id: &ObjectId) -> BackendResult<ObjectData>;
    fn read_prefix(&self, prefix: &str) -> BackendResult<ObjectId>;
    fn read_header(&self, id: &ObjectId) -> BackendResult<ObjectHeader>;
    fn write(&self, id: &ObjectId, data: &[u8], object_type: ObjectType) -> BackendResult<()>;
    fn exists(&self, id: &ObjectId) -> BackendResult<bool>;
    fn refresh(&self) -> BackendResult<()>;
    /// Call `visit` for every object until it returns `false`.
    fn foreach(&self, visit: &mut dyn FnMut(&ObjectId) -> bool) -> BackendResult<()>;
    fn write_pack(&self) -> BackendResult<Box<dyn OdbWritePack>>;
    fn free(&self) -> BackendResult<()>;
}

/// Pack stream writer handed out by [`OdbBackend::write_pack`].
pub trait OdbWritePack: Send {
    fn add(&mut self, bytes: &[u8]) -> BackendResult<()>;
    fn commit(&mut self) -> BackendResult<Vec<PackFile>>;
    fn free(self: Box<Self>);
}

/// A [`Backend`] behind a dedicated multi-threaded runtime.
#[derive(Debug)]
pub struct BlockingBackend {
    runtime: Arc<Runtime>,
    backend: Backend,
}

impl BlockingBackend {
    pub fn new(backend: Backend) -> BackendResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("stratus-io")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
            backend,
        })
    }

    /// Build the configured blob store and a backend over it.
    pub fn open(config: BackendConfig, oracle: Arc<dyn Oracle>) -> BackendResult<Self> {
        Self::new(Backend::from_config(config, oracle)?)
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Run any other async backend operation, such as ref publishing, to completion.
    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl OdbBackend for BlockingBackend {
    fn read(&self, id: &ObjectId) -> BackendResult<ObjectData> {
        self.runtime.block_on(self.backend.read(id))
    }

    fn read_prefix(&self, prefix: &str) -> BackendResult<ObjectId> {
        self.runtime.block_on(self.backend.read_prefix(prefix))
    }

    fn read_header(&self, id: &ObjectId) -> BackendResult<ObjectHeader> {
        self.runtime.block_on(self.backend.read_header(id))
    }

    fn write(&self, id: &ObjectId, data: &[u8], object_type: ObjectType) -> BackendResult<()> {
        self.runtime.block_on(self.backend.write(id, data, object_type))
    }

    fn exists(&self, id: &ObjectId) -> BackendResult<bool> {
        self.runtime.block_on(self.backend.exists(id))
    }

    fn refresh(&self) -> BackendResult<()> {
        self.runtime.block_on(self.backend.refresh())
    }

    fn foreach(&self, visit: &mut dyn FnMut(&ObjectId) -> bool) -> BackendResult<()> {
        for id in self.runtime.block_on(self.backend.foreach())? {
            if !visit(&id) {
                break;
            }
        }
        Ok(())
    }

    fn write_pack(&self) -> BackendResult<Box<dyn OdbWritePack>> {
        Ok(Box::new(BlockingWritePack {
            runtime: self.runtime.clone(),
            session: self.backend.write_pack(),
        }))
    }

    fn free(&self) -> BackendResult<()> {
        self.backend.free()
    }
}

#[derive(Debug)]
struct BlockingWritePack {
    runtime: Arc<Runtime>,
    session: PackWriteSession,
}

impl OdbWritePack for BlockingWritePack {
    fn add(&mut self, bytes: &[u8]) -> BackendResult<()> {
        self.runtime.block_on(self.session.add(bytes))
    }

    fn commit(&mut self) -> BackendResult<Vec<PackFile>> {
        self.runtime.block_on(self.session.commit())
    }

    fn free(self: Box<Self>) {
        self.session.free();
    }
}

/// Translate a result into a status code. Successful values go to `on_ok`
/// and clear [`last_error`]; failures leave their message there.
pub fn to_status<T>(result: BackendResult<T>, on_ok: impl FnOnce(T)) -> std::os::raw::c_int {
    match result {
        Ok(value) => {
            clear_last_error();
            on_ok(value);
            status::OK
        }
        Err(err) => {
            let code = err.status();
            if code == status::ERROR {
                tracing::warn!(error = %err, "backend call failed");
            }
            set_last_error(err.to_string());
            code
        }
    }
}
