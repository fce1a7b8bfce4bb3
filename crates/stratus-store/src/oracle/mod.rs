//! The external location oracle.
//!
//! An oracle is a set of caller-supplied hooks the backend consults before
//! the blob store: it can say where an object lives, whether a pack is
//! already uploaded, intercept remote calls outright, and coordinate ref
//! updates. Every hook is a hint. An oracle that knows nothing (see
//! [`NoopOracle`]) costs performance, never correctness.

mod memory;

use bytes::Bytes;
use stratus_types::{ObjectHeader, ObjectId, PackId};

use crate::remote::ByteRange;

pub use memory::{InMemoryOracle, OracleCalls};

/// Where the oracle believes an object lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OracleLocation {
    Loose,
    Packed(PackId),
    Unknown,
}

/// Outcome of offering a remote call to the oracle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intercept<T> {
    /// The oracle answered; the blob store must not be contacted.
    Mocked(T),
    NotMocked,
}

/// Location and coordination hooks. Every method defaults to "don't know".
pub trait Oracle: Send + Sync {
    /// A loose object now exists remotely.
    fn register_object(&self, _id: &ObjectId, _header: Option<&ObjectHeader>) {}

    /// A pack and its full membership now exist.
    fn register_pack(&self, _pack: &PackId, _ids: &[ObjectId]) {}

    fn lookup_object(&self, _id: &ObjectId) -> OracleLocation {
        OracleLocation::Unknown
    }

    /// Whether the pack is known to be uploaded already.
    fn lookup_pack(&self, _pack: &PackId) -> bool {
        false
    }

    fn head_object(&self, _bucket: &str, _key: &str) -> Intercept<bool> {
        Intercept::NotMocked
    }

    /// `Mocked(None)` reports the blob as missing.
    fn get_object(&self, _bucket: &str, _key: &str, _range: Option<ByteRange>) -> Intercept<Option<Bytes>> {
        Intercept::NotMocked
    }

    fn put_object(&self, _bucket: &str, _key: &str, _body: &Bytes) -> Intercept<()> {
        Intercept::NotMocked
    }

    /// A ref was published with the given target (object hex or ref name).
    fn update_ref(&self, _name: &str, _target: &str) {}

    fn resolve_ref(&self, _name: &str) -> Option<String> {
        None
    }

    /// Try to take a named lock. An oracle without locking grants every request.
    fn acquire_lock(&self, _name: &str) -> bool {
        true
    }

    fn release_lock(&self, _name: &str) {}

    /// The backend is about to tear down.
    fn shutting_down(&self) {}
}

/// An oracle that knows nothing and intercepts nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOracle;

impl Oracle for NoopOracle {}
