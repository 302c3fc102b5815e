//! JSON-backed topic/person/entity registry with an alias index (§4.10).
//! Loading the raw JSON (local file, GCS blob) is the caller's job, via
//! `storage-gateway`; this crate only normalizes and indexes.

pub mod normalize;
pub mod registry;

pub use registry::ConfigRegistry;
