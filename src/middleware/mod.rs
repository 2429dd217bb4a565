/// Middleware module
///
/// Puts the token manager in front of routes that need an authorized subject.

mod authorization;

pub use authorization::AuthorizationMiddleware;
