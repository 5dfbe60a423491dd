//! Identity provider abstraction.
//!
//! - [`IdentityProvider`] - the SDK surface consumed by the session store
//! - [`HostIdentity`] - a provider whose session is pushed by the embedding host

mod host;
mod traits;

pub use host::HostIdentity;
pub use traits::{AccessToken, AuthError, IdentityProvider, SessionHandler, TokenError};
