/// Authentication module
///
/// Signed token encoding, the token lifecycle manager, and the transport
/// that hands access tokens back to clients.

mod claims;
mod clock;
mod codec;
mod manager;
mod transport;

pub use claims::Claims;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{SignedToken, TokenCodec};
pub use manager::{Authorized, Outcome, TokenManager};
pub use transport::{CookieTransport, PendingCookie, TokenSink};
