/// Admin service forwarding mutations to the sync coordinator.
pub mod admin_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Public service for read-only leaderboard projections.
pub mod public_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Live store synchronization and the mutation API.
pub mod sync_coordinator;
