use super::{Error, ROOT_CAPABILITY_PREFIX, ZCAP_CONTEXT};
use crate::identifier::Did;
use serde::{Deserialize, Serialize};

/// A ZCAP-LD root capability object
///
/// Root capabilities in DID:BTC1 are deterministically derived from DID identifiers
/// and provide the authorization to update that specific DID's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCapability {
    /// JSON-LD context - always "https://w3id.org/zcap/v1" for ZCAP-LD
    #[serde(rename = "@context")]
    pub context: String,

    /// Capability identifier in format: urn:zcap:root:{url_encoded_did}
    pub id: String,

    /// Controller of the capability (the DID identifier)
    pub controller: String,

    /// Target that this capability can invoke actions on (same as controller for root capabilities)
    #[serde(rename = "invocationTarget")]
    pub invocation_target: String,
}

impl RootCapability {
    fn new(capability_id: String, did: &Did) -> Self {
        Self {
            context: ZCAP_CONTEXT.to_string(),
            id: capability_id,
            controller: did.encode().to_string(),
            invocation_target: did.encode().to_string(),
        }
    }

    /// Validate that this root capability is well-formed
    pub fn validate(&self) -> Result<(), Error> {
        if self.context != ZCAP_CONTEXT {
            return Err(Error::InvalidContext(self.context.clone()));
        }

        let did = did_from_capability_id(&self.id)?;
        if did.encode() != self.controller {
            return Err(Error::ControllerMismatch(
                did.encode().to_string(),
                self.controller.clone(),
            ));
        }

        // For root capabilities, controller and invocation target must be the same
        if self.controller != self.invocation_target {
            return Err(Error::TargetMismatch);
        }

        Ok(())
    }
}

fn did_from_capability_id(capability_id: &str) -> Result<Did, Error> {
    let Some(encoded) = capability_id.strip_prefix(ROOT_CAPABILITY_PREFIX) else {
        return Err(Error::InvalidCapabilityId(capability_id.to_string()));
    };

    Ok(urlencoding::decode(encoded)?.parse()?)
}

/// Derive the root capability of a did:btc1 identifier.
pub fn derive_root_capability(did: &Did) -> RootCapability {
    let encoded_identifier = urlencoding::encode(did.encode());

    RootCapability::new(format!("{ROOT_CAPABILITY_PREFIX}{encoded_identifier}"), did)
}

/// Dereference a root capability identifier to the capability object.
pub fn dereference_root_capability(capability_id: &str) -> Result<RootCapability, Error> {
    let did = did_from_capability_id(capability_id)?;
    let root_capability = RootCapability::new(capability_id.to_string(), &did);
    root_capability.validate()?;

    Ok(root_capability)
}
