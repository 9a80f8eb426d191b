pub mod auth;
pub mod context;
pub mod entitlement;

pub use auth::authenticate;
pub use context::RequestContext;
pub use entitlement::attach_entitlements;
