/// Request authentication
///
/// Canonical message construction and signature verification for
/// policy-managed namespaces.

pub mod verifier;

pub use verifier::{
    entry_message, list_message, AuthError, Credentials, SignatureAlgorithm, SignatureVerifier,
};
