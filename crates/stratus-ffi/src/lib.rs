//! C entry points for hosting a Stratus backend.
//!
//! A host opens a backend from a TOML document and receives a non-zero
//! handle. Every other call takes that handle and returns one of the
//! [`status`] codes; on failure the message is available from
//! [`stratus_last_error`] on the same thread.
//!
//! # Memory
//!
//! - Object ids are passed as 32 raw bytes, owned by the caller.
//! - [`stratus_odb_read`] allocates the returned body; the caller releases it
//!   with [`stratus_buffer_free`].
//! - The string from [`stratus_last_error`] is owned by the library and
//!   stays valid until the next call on the same thread.

use std::cell::RefCell;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::sync::Arc;

use stratus_store::odb::set_last_error;
use stratus_store::{
    status, BackendConfig, BackendHandle, BackendRegistry, BlockingBackend, NoopOracle, OdbBackend,
    WritePackHandle,
};
use stratus_types::{ObjectId, ObjectType, DIGEST_LEN};

/// Called once per object by [`stratus_odb_foreach`]. Return 0 to continue.
pub type ForeachCallback = extern "C" fn(id: *const u8, payload: *mut c_void) -> c_int;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn registry() -> &'static BackendRegistry {
    BackendRegistry::global()
}

fn null_argument(name: &str) -> c_int {
    set_last_error(format!("{name} must not be null"));
    status::ERROR
}

/// # Safety
/// `ptr` must be null or point to `DIGEST_LEN` readable bytes.
unsafe fn read_id(ptr: *const u8) -> Option<ObjectId> {
    if ptr.is_null() {
        return None;
    }
    let mut hash = [0u8; DIGEST_LEN];
    std::ptr::copy_nonoverlapping(ptr, hash.as_mut_ptr(), DIGEST_LEN);
    Some(ObjectId::from_hash(hash))
}

/// # Safety
/// `ptr` must be null only when `len` is zero, otherwise point to `len`
/// readable bytes.
unsafe fn read_bytes<'a>(ptr: *const u8, len: usize) -> Option<&'a [u8]> {
    match (ptr.is_null(), len) {
        (true, 0) => Some(&[] as &[u8]),
        (true, _) => None,
        (false, _) => Some(std::slice::from_raw_parts(ptr, len)),
    }
}

/// Open a backend described by a TOML document. Returns 0 on failure.
///
/// The backend consults no oracle; every lookup falls through to the
/// configured remote.
///
/// # Safety
/// `config_toml` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn stratus_backend_open(config_toml: *const c_char) -> u64 {
    if config_toml.is_null() {
        null_argument("config_toml");
        return 0;
    }
    let text = match CStr::from_ptr(config_toml).to_str() {
        Ok(text) => text,
        Err(e) => {
            set_last_error(format!("config is not UTF-8: {e}"));
            return 0;
        }
    };
    let opened = BackendConfig::from_toml_str(text)
        .and_then(|config| BlockingBackend::open(config, Arc::new(NoopOracle)));
    match opened {
        Ok(backend) => {
            let handle = registry().insert(backend);
            tracing::debug!(handle = handle.0, "opened backend");
            handle.0
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to open backend");
            set_last_error(e.to_string());
            0
        }
    }
}

/// Tear down a backend and delete its scratch directory.
#[no_mangle]
pub extern "C" fn stratus_backend_free(handle: u64) -> c_int {
    registry().free(BackendHandle(handle))
}

/// Write 1 to `out_found` if the object exists, else 0.
///
/// # Safety
/// `id` must point to 32 bytes; `out_found` must be writable.
#[no_mangle]
pub unsafe extern "C" fn stratus_odb_exists(handle: u64, id: *const u8, out_found: *mut c_int) -> c_int {
    let Some(id) = read_id(id) else {
        return null_argument("id");
    };
    if out_found.is_null() {
        return null_argument("out_found");
    }
    registry().dispatch(BackendHandle(handle), |b| b.exists(&id), |found| {
        *out_found = c_int::from(found);
    })
}

/// Read a full object. The body is allocated by the library and must be
/// released with [`stratus_buffer_free`].
///
/// # Safety
/// `id` must point to 32 bytes; every out pointer must be writable.
#[no_mangle]
pub unsafe extern "C" fn stratus_odb_read(
    handle: u64,
    id: *const u8,
    out_data: *mut *mut u8,
    out_len: *mut usize,
    out_type: *mut u8,
) -> c_int {
    let Some(id) = read_id(id) else {
        return null_argument("id");
    };
    if out_data.is_null() || out_len.is_null() || out_type.is_null() {
        return null_argument("out_data, out_len and out_type");
    }
    registry().dispatch(BackendHandle(handle), |b| b.read(&id), |object| {
        let body: Box<[u8]> = object.data.to_vec().into_boxed_slice();
        *out_len = body.len();
        *out_type = object.header.object_type.code();
        *out_data = Box::into_raw(body) as *mut u8;
    })
}

/// Release a body returned by [`stratus_odb_read`].
///
/// # Safety
/// `data` and `len` must come from one successful `stratus_odb_read` call,
/// and the buffer must not be released twice.
#[no_mangle]
pub unsafe extern "C" fn stratus_buffer_free(data: *mut u8, len: usize) {
    if data.is_null() {
        return;
    }
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(data, len)));
}

/// Read only the type and length of an object.
///
/// # Safety
/// `id` must point to 32 bytes; both out pointers must be writable.
#[no_mangle]
pub unsafe extern "C" fn stratus_odb_read_header(
    handle: u64,
    id: *const u8,
    out_len: *mut u64,
    out_type: *mut u8,
) -> c_int {
    let Some(id) = read_id(id) else {
        return null_argument("id");
    };
    if out_len.is_null() || out_type.is_null() {
        return null_argument("out_len and out_type");
    }
    registry().dispatch(BackendHandle(handle), |b| b.read_header(&id), |header| {
        *out_len = header.length;
        *out_type = header.object_type.code();
    })
}

/// Store an object under `id`.
///
/// # Safety
/// `id` must point to 32 bytes and `data` to `len` bytes (null when `len` is 0).
#[no_mangle]
pub unsafe extern "C" fn stratus_odb_write(
    handle: u64,
    id: *const u8,
    data: *const u8,
    len: usize,
    object_type: u8,
) -> c_int {
    let Some(id) = read_id(id) else {
        return null_argument("id");
    };
    let Some(data) = read_bytes(data, len) else {
        return null_argument("data");
    };
    let Some(object_type) = ObjectType::from_code(u64::from(object_type)) else {
        set_last_error(format!("unknown object type code {object_type}"));
        return status::ERROR;
    };
    registry().dispatch(BackendHandle(handle), |b| b.write(&id, data, object_type), |_| {})
}

/// Resolve an abbreviated hex id into `out_id` (32 bytes).
///
/// # Safety
/// `prefix` must be a NUL-terminated string; `out_id` must have room for 32 bytes.
#[no_mangle]
pub unsafe extern "C" fn stratus_odb_read_prefix(handle: u64, prefix: *const c_char, out_id: *mut u8) -> c_int {
    if prefix.is_null() || out_id.is_null() {
        return null_argument("prefix and out_id");
    }
    let prefix = CStr::from_ptr(prefix).to_string_lossy();
    registry().dispatch(BackendHandle(handle), |b| b.read_prefix(&prefix), |id| {
        std::ptr::copy_nonoverlapping(id.as_bytes().as_ptr(), out_id, DIGEST_LEN);
    })
}

/// Visit every object until `callback` returns non-zero.
///
/// # Safety
/// `payload` is passed through to `callback` untouched.
#[no_mangle]
pub unsafe extern "C" fn stratus_odb_foreach(
    handle: u64,
    callback: Option<ForeachCallback>,
    payload: *mut c_void,
) -> c_int {
    let Some(callback) = callback else {
        return null_argument("callback");
    };
    registry().dispatch(
        BackendHandle(handle),
        |b| b.foreach(&mut |id: &ObjectId| callback(id.as_bytes().as_ptr(), payload) == 0),
        |_| {},
    )
}

#[no_mangle]
pub extern "C" fn stratus_odb_refresh(handle: u64) -> c_int {
    registry().dispatch(BackendHandle(handle), |b| b.refresh(), |_| {})
}

/// Start receiving a pack stream; the session handle goes to `out_writepack`.
///
/// # Safety
/// `out_writepack` must be writable.
#[no_mangle]
pub unsafe extern "C" fn stratus_writepack_open(handle: u64, out_writepack: *mut u64) -> c_int {
    if out_writepack.is_null() {
        return null_argument("out_writepack");
    }
    let opened = registry().open_write_pack(BackendHandle(handle));
    stratus_store::odb::to_status(opened, |session| *out_writepack = session.0)
}

/// Append a chunk of the pack stream.
///
/// # Safety
/// `data` must point to `len` bytes (null when `len` is 0).
#[no_mangle]
pub unsafe extern "C" fn stratus_writepack_add(writepack: u64, data: *const u8, len: usize) -> c_int {
    let Some(data) = read_bytes(data, len) else {
        return null_argument("data");
    };
    registry().dispatch_write_pack(WritePackHandle(writepack), |p| p.add(data), |_| {})
}

/// Finish the stream. Fails if a partial pack is still buffered.
#[no_mangle]
pub extern "C" fn stratus_writepack_commit(writepack: u64) -> c_int {
    registry().dispatch_write_pack(WritePackHandle(writepack), |p| p.commit(), |packs| {
        tracing::debug!(packs = packs.len(), "write-pack committed");
    })
}

#[no_mangle]
pub extern "C" fn stratus_writepack_free(writepack: u64) -> c_int {
    registry().free_write_pack(WritePackHandle(writepack))
}

/// The message of the last failed call on this thread, or null.
#[no_mangle]
pub extern "C" fn stratus_last_error() -> *const c_char {
    let Some(message) = stratus_store::last_error() else {
        return std::ptr::null();
    };
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| {
        let mut slot = slot.borrow_mut();
        *slot = Some(message);
        slot.as_ref().map_or(std::ptr::null(), |s| s.as_ptr())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(toml: &str) -> u64 {
        let config = CString::new(toml).unwrap();
        unsafe { stratus_backend_open(config.as_ptr()) }
    }

    fn last_error() -> String {
        let ptr = stratus_last_error();
        assert!(!ptr.is_null());
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    #[test]
    fn open_rejects_bad_config() {
        assert_eq!(unsafe { stratus_backend_open(std::ptr::null()) }, 0);
        assert!(last_error().contains("config_toml"));
        assert_eq!(open("bucket = \"\""), 0);
        assert!(last_error().contains("bucket"));
    }

    #[test]
    fn write_read_and_free() {
        let handle = open("bucket = \"test-bucket\"");
        assert_ne!(handle, 0);
        let id = [0xaa; 32];

        let code = unsafe { stratus_odb_write(handle, id.as_ptr(), b"hello".as_ptr(), 5, 3) };
        assert_eq!(code, status::OK);

        let mut found = 0;
        assert_eq!(unsafe { stratus_odb_exists(handle, id.as_ptr(), &mut found) }, status::OK);
        assert_eq!(found, 1);

        let (mut len, mut ty) = (0u64, 0u8);
        assert_eq!(
            unsafe { stratus_odb_read_header(handle, id.as_ptr(), &mut len, &mut ty) },
            status::OK
        );
        assert_eq!((len, ty), (5, 3));

        let mut data: *mut u8 = std::ptr::null_mut();
        let mut size = 0usize;
        let code = unsafe { stratus_odb_read(handle, id.as_ptr(), &mut data, &mut size, &mut ty) };
        assert_eq!(code, status::OK);
        assert_eq!(unsafe { std::slice::from_raw_parts(data, size) }, b"hello");
        unsafe { stratus_buffer_free(data, size) };

        assert_eq!(stratus_odb_refresh(handle), status::OK);
        assert_eq!(stratus_backend_free(handle), status::OK);
        assert_eq!(stratus_odb_refresh(handle), status::ERROR);
    }

    #[test]
    fn missing_objects_and_fallbacks() {
        let handle = open("bucket = \"test-bucket\"");
        let id = [0xbb; 32];
        let mut found = 1;
        assert_eq!(unsafe { stratus_odb_exists(handle, id.as_ptr(), &mut found) }, status::OK);
        assert_eq!(found, 0);

        let (mut len, mut ty) = (0u64, 0u8);
        let code = unsafe { stratus_odb_read_header(handle, id.as_ptr(), &mut len, &mut ty) };
        assert_eq!(code, status::NOT_FOUND);

        let prefix = CString::new("bb").unwrap();
        let mut out = [0u8; 32];
        let code = unsafe { stratus_odb_read_prefix(handle, prefix.as_ptr(), out.as_mut_ptr()) };
        assert_eq!(code, status::PASSTHROUGH);

        extern "C" fn visit(_id: *const u8, _payload: *mut c_void) -> c_int {
            0
        }
        let code = unsafe { stratus_odb_foreach(handle, Some(visit), std::ptr::null_mut()) };
        assert_eq!(code, status::PASSTHROUGH);
        assert_eq!(stratus_backend_free(handle), status::OK);
    }

    #[test]
    fn null_pointers_are_rejected() {
        let handle = open("bucket = \"test-bucket\"");
        let mut found = 0;
        assert_eq!(
            unsafe { stratus_odb_exists(handle, std::ptr::null(), &mut found) },
            status::ERROR
        );
        assert!(last_error().contains("id"));
        let id = [1u8; 32];
        assert_eq!(
            unsafe { stratus_odb_write(handle, id.as_ptr(), std::ptr::null(), 4, 3) },
            status::ERROR
        );
        assert_eq!(
            unsafe { stratus_odb_write(handle, id.as_ptr(), std::ptr::null(), 0, 9) },
            status::ERROR
        );
        assert!(last_error().contains("object type"));
        assert_eq!(stratus_backend_free(handle), status::OK);
    }

    #[test]
    fn successful_call_clears_the_last_error() {
        let handle = open("bucket = \"test-bucket\"");
        let mut found = 0;
        assert_eq!(
            unsafe { stratus_odb_exists(handle, std::ptr::null(), &mut found) },
            status::ERROR
        );
        assert!(!stratus_last_error().is_null());

        let id = [3u8; 32];
        found = 1;
        assert_eq!(unsafe { stratus_odb_exists(handle, id.as_ptr(), &mut found) }, status::OK);
        assert_eq!(found, 0);
        assert!(stratus_last_error().is_null());
        assert_eq!(stratus_backend_free(handle), status::OK);
    }

    #[test]
    fn write_pack_session_over_handles() {
        let handle = open("bucket = \"test-bucket\"");
        let mut session = 0u64;
        assert_eq!(unsafe { stratus_writepack_open(handle, &mut session) }, status::OK);
        assert_ne!(session, 0);

        let garbage = b"definitely not a pack";
        let code = unsafe { stratus_writepack_add(session, garbage.as_ptr(), garbage.len()) };
        assert_eq!(code, status::ERROR);
        assert!(last_error().contains("corrupt pack"));

        assert_eq!(stratus_writepack_commit(session), status::OK);
        assert_eq!(stratus_writepack_free(session), status::OK);
        assert_eq!(stratus_writepack_free(session), status::ERROR);
        assert_eq!(stratus_backend_free(handle), status::OK);
    }
}
