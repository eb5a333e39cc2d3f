pub mod beacon;
pub mod blockchain;
pub mod canonical_hash;
pub mod canonicalization;
pub mod chain;
pub mod cryptosuite;
pub mod document;
pub mod error;
pub mod identifier;
pub mod key;
pub mod resolution;
pub mod service;
pub mod update;
pub mod verification;
pub mod zcap;

mod json_tools;

// Re-exports of key components
pub use blockchain::{CancellationToken, resolve};
pub use document::{Document, InitialDocument};
pub use error::Btc1Error;
pub use identifier::Did;
pub use key::{KeyPair, Multikey, PublicKey, SecretKey};
pub use resolution::{Resolution, ResolutionOptions};
