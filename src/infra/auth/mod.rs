//! [`AuthBackend`](crate::application::session::AuthBackend) implementations.

mod hosted;
mod local;

pub use hosted::HostedAuthBackend;
pub use local::LocalAuthBackend;
