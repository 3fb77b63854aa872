/// Router Module Index
///
/// Routing is split by how access is decided.

/// Routes accessible to everyone, anonymous included.
pub mod public;

/// Routes protected by the `AuthUser` middleware layer.
pub mod authenticated;

/// Routes where each handler consults the Authorization Gate with the caller's `Actor`.
pub mod admin;
