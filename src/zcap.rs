//! Authorization capabilities (ZCAP-LD) for did:btc1 updates.
//!
//! Every DID has exactly one root capability, `urn:zcap:root:<url-encoded DID>`. Updates invoke it
//! with a `capabilityInvocation` proof and the `Write` action.

use onlyerror::Error;

pub mod proof;
mod root_capability;

pub use proof::{Proof, ProofPurpose, ProofType};
pub use root_capability::{RootCapability, dereference_root_capability, derive_root_capability};

/// JSON-LD context for capability objects.
pub const ZCAP_CONTEXT: &str = "https://w3id.org/zcap/v1";

pub const ROOT_CAPABILITY_PREFIX: &str = "urn:zcap:root:";

/// The only action did:btc1 updates invoke.
pub const CAPABILITY_ACTION_WRITE: &str = "Write";

#[derive(Error, Debug)]
pub enum Error {
    /// Capability id is not a root capability
    #[error("Invalid root capability id `{0}`")]
    InvalidCapabilityId(String),

    /// Failed to decode DID from capability ID
    UrlDecode(#[from] std::string::FromUtf8Error),

    /// Invalid DID in root capability
    InvalidDid(#[from] crate::identifier::Error),

    /// Invalid capability context
    #[error("Invalid context: expected https://w3id.org/zcap/v1, got {0}")]
    InvalidContext(String),

    /// Capability id and controller disagree
    #[error("Controller mismatch: capability ID contains `{0}` but controller is `{1}`")]
    ControllerMismatch(String, String),

    /// Root capability must have same controller and invocation target
    TargetMismatch,
}
