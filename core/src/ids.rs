//! Identifier type aliases shared across the workspace.
//!
//! These are plain `String`s rather than newtypes: the wire protocol
//! carries them as JSON strings and every crate in the workspace passes
//! them around by value, so a newtype would mostly add `.0` noise without
//! buying type safety the borrow checker can't already give us via
//! distinct parameter names.

/// Identifies one client/replica across its lifetime.
pub type ClientId = String;

/// Identifies a document a client or server can hold a replica of.
pub type DocumentId = String;

/// A field name within a document's flat namespace.
pub type FieldName = String;

/// Identifies one live server-side connection (spec.md "Session").
pub type SessionId = String;
