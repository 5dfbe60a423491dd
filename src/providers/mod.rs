//! External collaborators.
//!
//! - [`identity`] - the primary identity provider seam
//! - [`backend`] - the backend REST surface behind the authenticated gateway

pub mod backend;
pub mod identity;
