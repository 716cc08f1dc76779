/// Last-known score snapshots persisted on the local disk.
pub mod cache;
/// Realtime document store abstraction and its backends.
pub mod document_store;
/// Domain records shared by the store, the engine and the HTTP layer.
pub mod models;
/// Storage error types shared by every backend.
pub mod storage;
