//! Authorization for container registry requests.
//!
//! [`CredentialResolver`] turns a stored [`CredentialRecord`] (plus an optional
//! [`ChallengeContext`] from a `401` response) into an `Authorization` header,
//! and into the credentials a container CLI needs for `login`.

pub mod challenge;
#[cfg(feature = "cli")]
pub mod config;
pub mod error;
pub mod record;
pub mod resolver;
pub mod secrets;

pub use challenge::ChallengeContext;
pub use error::{AuthError, TransportError};
pub use record::{CliAuth, CliCredentials, CredentialRecord, Secret};
pub use resolver::{
    AuthStrategy, Authorize, CredentialResolver, ReqwestTransport, ResolverSettings,
    TokenRequest, TokenTransport,
};
pub use secrets::{FileSecretStore, MemorySecretStore, SecretStore};
