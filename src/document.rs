use crate::beacon::{self, Beacon, BeaconType};
use crate::canonical_hash::{CanonicalHash, Sha256Hash, canonical_hash};
use crate::error::{Btc1Error, ProblemDetails};
use crate::identifier::{Did, DidComponents, DidVersion, IdType, Network};
use crate::json_tools::{self, string_from_object, strings_from_object, vec_from_object, vec_from_value};
use crate::key::{MULTIKEY_TYPE, PublicKey, PublicKeyExt as _};
use crate::resolution::ResolutionOptions;
use crate::service::Service;
use crate::verification::{
    self, VerificationMethod, VerificationMethodId, VerificationMethodResolver,
    VerificationMethodType, VerificationRelationship,
};
use bitcoin::key::CompressedPublicKey;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Network as BitcoinNetwork};
use onlyerror::Error;
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::{fs, path::Path};

pub const DID_CORE_V1_1_CONTEXT: &str = "https://www.w3.org/ns/did/v1.1";
pub const DID_BTC1_CONTEXT: &str = "https://btc1.dev/context/v1";

/// Stands in for the DID inside an intermediate document, which is hashed before the DID exists.
pub const DID_PLACEHOLDER: &str =
    "did:btc1:xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";

#[derive(Error, Debug)]
pub enum Error {
    /// Error during document I/O operations
    #[error("Document I/O error")]
    DocumentIO(#[from] std::io::Error),

    /// Error parsing JSON document
    #[error("JSON parse error")]
    JsonParse(#[from] serde_json::Error),

    /// Document root must be a JSON object
    DocumentNotObject,

    /// Malformed document field
    Json(#[from] json_tools::Error),

    /// Document id does not match the expected DID
    #[error("Document id `{0}` does not match `{1}`")]
    IdMismatch(String, String),

    /// Verification method ids must be unique
    #[error("Duplicate verification method id `{0}`")]
    DuplicateVerificationMethod(String),

    /// Error with key operations
    Key(#[from] crate::key::Error),

    /// DID Encoding error
    DidEncoding(#[from] crate::identifier::Error),

    /// Verification Error
    Verification(#[from] verification::Error),

    /// Beacon service error
    Beacon(#[from] beacon::Error),

    /// DID:BTC1 error
    Btc1Error(#[from] Btc1Error),
}

impl ProblemDetails for Error {
    fn details(&self) -> Option<Value> {
        match self {
            Self::Btc1Error(err) => err.details(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DocumentFields {
    /// DID identifier (or the placeholder in intermediate documents)
    id: String,

    /// Document context
    context: Vec<String>,

    /// Document controller
    controller: Vec<String>,

    verification_method: Vec<VerificationMethod>,

    authentication: Vec<VerificationMethodId>,
    assertion_method: Vec<VerificationMethodId>,
    capability_invocation: Vec<VerificationMethodId>,
    capability_delegation: Vec<VerificationMethodId>,

    service: Vec<Service>,

    deactivated: bool,
}

impl TryFrom<&Value> for DocumentFields {
    type Error = Error;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        if !value.is_object() {
            return Err(Error::DocumentNotObject);
        }

        let id = string_from_object(value, "id")?.to_string();

        let context = strings_from_object(value, "@context")?;
        if context.is_empty() {
            return Err(Error::Json(json_tools::Error::JsonMissingElement(
                "@context".into(),
            )));
        }

        let controller = strings_from_object(value, "controller")?;
        let verification_method =
            vec_from_object(value, "verificationMethod", VerificationMethod::from_json)?;
        let authentication = vec_from_value(value, "authentication")?;
        let assertion_method = vec_from_value(value, "assertionMethod")?;
        let capability_invocation = vec_from_value(value, "capabilityInvocation")?;
        let capability_delegation = vec_from_value(value, "capabilityDelegation")?;
        let service = vec_from_object(value, "service", Service::from_json)?;

        let mut seen = HashSet::new();
        for method in &verification_method {
            if !seen.insert(method.id.absolute(&id)) {
                return Err(Error::DuplicateVerificationMethod(method.id.to_string()));
            }
        }

        Ok(DocumentFields {
            id,
            context,
            controller,
            verification_method,
            authentication,
            assertion_method,
            capability_invocation,
            capability_delegation,
            service,
            deactivated: value["deactivated"].as_bool().unwrap_or(false),
        })
    }
}

impl DocumentFields {
    fn relationship(&self, relationship: VerificationRelationship) -> &[VerificationMethodId] {
        match relationship {
            VerificationRelationship::Authentication => &self.authentication,
            VerificationRelationship::AssertionMethod => &self.assertion_method,
            VerificationRelationship::CapabilityInvocation => &self.capability_invocation,
            VerificationRelationship::CapabilityDelegation => &self.capability_delegation,
        }
    }
}

/// A validated did:btc1 DID document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    did: Did,
    /// All structural Document fields
    fields: DocumentFields,
    /// The document data as a JSON Value
    json: Value,
}

impl Document {
    /// Load a document from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        Self::from_json_string(&content)
    }

    /// Create a document from a JSON string
    pub fn from_json_string(json: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(value)
    }

    /// Create a document from a JSON Value
    ///
    /// The `id` must be a did:btc1 identifier and every Multikey verification method must carry a
    /// decodable public key.
    pub fn from_json_value(value: Value) -> Result<Self, Error> {
        let fields = DocumentFields::try_from(&value)?;
        let did: Did = fields.id.parse()?;

        for method in &fields.verification_method {
            if method.type_ == VerificationMethodType::Multikey {
                method.to_multikey(did.encode())?;
            }
        }

        Ok(Self {
            did,
            fields,
            json: value,
        })
    }

    /// Parse a document that must belong to `did`.
    pub fn for_did(did: &Did, value: Value) -> Result<Self, Error> {
        let document = Self::from_json_value(value)?;
        if &document.did != did {
            return Err(Error::IdMismatch(
                document.did.to_string(),
                did.to_string(),
            ));
        }

        Ok(document)
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    pub fn into_json(self) -> Value {
        self.json
    }

    pub fn context(&self) -> &[String] {
        &self.fields.context
    }

    pub fn controller(&self) -> &[String] {
        &self.fields.controller
    }

    pub fn verification_methods(&self) -> &[VerificationMethod] {
        &self.fields.verification_method
    }

    /// Find a verification method by absolute or relative id.
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        self.fields
            .verification_method
            .iter()
            .find(|method| method.id.matches(id, self.did.encode()))
    }

    /// Whether the method `id` is listed under `relationship`.
    pub fn authorizes(&self, relationship: VerificationRelationship, id: &str) -> bool {
        self.fields
            .relationship(relationship)
            .iter()
            .any(|listed| listed.matches(id, self.did.encode()))
    }

    pub fn services(&self) -> &[Service] {
        &self.fields.service
    }

    /// Every service whose type names a beacon, established for the DID's network.
    pub fn beacons(&self) -> Result<Vec<Beacon>, Error> {
        let network = BitcoinNetwork::from(self.did.components().network());

        self.fields
            .service
            .iter()
            .filter(|service| service.types().iter().any(|ty| BeaconType::is_beacon_type(ty)))
            .map(|service| Ok(beacon::establish(service, network)?))
            .collect()
    }

    pub fn is_deactivated(&self) -> bool {
        self.fields.deactivated
    }

    /// Save the document to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let json = self.to_json_string()?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Convert the document to a JSON string
    pub fn to_json_string(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&self.json)?)
    }
}

impl AsRef<Value> for Document {
    fn as_ref(&self) -> &Value {
        &self.json
    }
}

impl CanonicalHash for Document {}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.json.serialize(serializer)
    }
}

impl VerificationMethodResolver for Document {
    fn resolve_verification_method(&self, id: &str) -> Result<VerificationMethod, verification::Error> {
        self.verification_method(id)
            .cloned()
            .ok_or_else(|| verification::Error::VerificationMethodNotFound(id.to_string()))
    }
}

/// The document a DID starts from, before any update is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitialDocument {
    document: Document,
}

impl InitialDocument {
    /// Load an initial document from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        Self::from_json_string(&content)
    }

    /// Create an initial document from a JSON string
    pub fn from_json_string(json: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(value)
    }

    /// Create an initial document from a JSON Value
    pub fn from_json_value(value: Value) -> Result<Self, Error> {
        Ok(Self {
            document: Document::from_json_value(value)?,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    // did:btc1 section 4.1.2
    /// Create a document from an external intermediate DID Document that has been prepared
    /// externally.
    pub fn from_external_intermediate(
        doc: IntermediateDocument,
        version: Option<DidVersion>,
        network: Option<Network>,
    ) -> Result<(Did, Self), Error> {
        let genesis_bytes = doc.compute_hash();

        let id_type = IdType::External(genesis_bytes.0);

        let did = Did::new(DidComponents::new(
            version.unwrap_or_default(),
            network.unwrap_or_default(),
            id_type,
        ))?;

        let initial_document = doc.into_initial(&did)?;

        // Publishing the canonical bytes to content addressable storage is the caller's job.

        Ok((did, initial_document))
    }

    // did:btc1 section 4.2.1
    /// Create an initial document from an existing DID.
    pub fn from_did(did: &Did, resolution_options: &ResolutionOptions) -> Result<Self, Error> {
        match did.components().id_type() {
            IdType::Key(_) => Self::deterministically_generate(did),
            IdType::External(_) => Self::resolve_external(did, resolution_options),
        }
    }

    // did:btc1 section 4.2.1.1
    fn deterministically_generate(did: &Did) -> Result<Self, Error> {
        let public_key = did.public_key().ok_or_else(|| {
            Btc1Error::InvalidDid(format!("`{did}` does not encode a genesis key"))
        })?;

        let verification_method_id = format!("{}#initialKey", did.encode());
        let verification_method_ids = json!([verification_method_id]);

        let json = json!({
            "id": did.encode(),
            "@context": [DID_CORE_V1_1_CONTEXT, DID_BTC1_CONTEXT],
            "verificationMethod": [{
                "id": verification_method_id,
                "type": MULTIKEY_TYPE,
                "controller": did.encode(),
                "publicKeyMultibase": public_key.to_multikey(),
            }],
            "authentication": verification_method_ids,
            "assertionMethod": verification_method_ids,
            "capabilityInvocation": verification_method_ids,
            "capabilityDelegation": verification_method_ids,
            "service": generate_beacon_services(did, &public_key)?,
        });

        Self::from_json_value(json)
    }

    // did:btc1 section 4.2.1.2
    fn resolve_external(did: &Did, resolution_options: &ResolutionOptions) -> Result<Self, Error> {
        // Step 1
        let initial_document = resolution_options
            .sidecar_data
            .as_ref()
            .and_then(|data| data.initial_document.as_ref())
            .ok_or_else(|| {
                Btc1Error::InvalidDid(format!(
                    "`{did}` is an external identifier and no initialDocument was supplied"
                ))
            })?;

        Self::from_json_value(initial_document.clone())?.sidecar_initial_validation(did)
    }

    // did:btc1 section 4.2.1.2.1
    fn sidecar_initial_validation(self, did: &Did) -> Result<Self, Error> {
        let IdType::External(expected) = did.components().id_type() else {
            return Err(Btc1Error::InvalidDid(format!("`{did}` is not an external identifier")))?;
        };

        if self.document.did() != did {
            return Err(Btc1Error::InvalidDid(format!(
                "initialDocument id `{}` does not match `{did}`",
                self.document.did()
            )))?;
        }

        let intermediate_doc = IntermediateDocument::from_initial(did, &self);
        if intermediate_doc.compute_hash().0 != expected {
            return Err(Btc1Error::InvalidDid(format!(
                "initialDocument does not hash to the genesis bytes of `{did}`"
            )))?;
        }

        Ok(self)
    }
}

/// A DID document template whose DID is still [`DID_PLACEHOLDER`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntermediateDocument {
    json: Value,
}

impl IntermediateDocument {
    /// Load an intermediate document from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = fs::read_to_string(path)?;
        Self::from_json_string(&content)
    }

    /// Create an intermediate document from a JSON string
    pub fn from_json_string(json: &str) -> Result<Self, Error> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(value)
    }

    /// Create an intermediate document from a JSON Value
    pub fn from_json_value(value: Value) -> Result<Self, Error> {
        // validate structural integrity
        let fields = DocumentFields::try_from(&value)?;
        if fields.id != DID_PLACEHOLDER {
            return Err(Error::IdMismatch(fields.id, DID_PLACEHOLDER.to_string()));
        }

        Ok(Self { json: value })
    }

    pub fn json(&self) -> &Value {
        &self.json
    }

    fn into_initial(self, did: &Did) -> Result<InitialDocument, Error> {
        // Find and replace all DID placeholder strings with the DID.
        let mut json = self.json;
        find_and_replace(&mut json, DID_PLACEHOLDER, did.encode());

        InitialDocument::from_json_value(json)
    }

    fn from_initial(did: &Did, initial_doc: &InitialDocument) -> Self {
        // Find and replace all DIDs with the DID placeholder string.
        let mut json = initial_doc.document.json.clone();
        find_and_replace(&mut json, did.encode(), DID_PLACEHOLDER);

        Self { json }
    }

    fn compute_hash(&self) -> Sha256Hash {
        canonical_hash(&self.json)
    }
}

/// Create a KEY identifier and its deterministic initial document.
pub fn create_deterministic(
    public_key: PublicKey,
    network: Network,
    version: DidVersion,
) -> Result<(Did, InitialDocument), Error> {
    let did = Did::new(DidComponents::new(version, network, IdType::from(public_key)))?;
    let initial_document = InitialDocument::deterministically_generate(&did)?;

    Ok((did, initial_document))
}

/// Create an EXTERNAL identifier committing to `intermediate_document`.
pub fn create_external(
    intermediate_document: IntermediateDocument,
    network: Network,
    version: DidVersion,
) -> Result<(Did, InitialDocument), Error> {
    InitialDocument::from_external_intermediate(intermediate_document, Some(version), Some(network))
}

fn find_and_replace(value: &mut Value, from: &str, to: &str) {
    match value {
        Value::String(s) => {
            *s = s.replace(from, to);
        }
        Value::Array(array) => {
            for item in array {
                find_and_replace(item, from, to);
            }
        }
        Value::Object(obj) => {
            for (_, value) in obj {
                find_and_replace(value, from, to);
            }
        }
        _ => (),
    }
}

// did:btc1 section 4.2.1.1.1
fn generate_beacon_services(did: &Did, public_key: &PublicKey) -> Result<Value, Error> {
    let network = BitcoinNetwork::from(did.components().network());
    let compressed = CompressedPublicKey(*public_key);
    let (internal_key, _parity) = public_key.x_only_public_key();

    let p2pkh_beacon = Address::p2pkh(compressed.pubkey_hash(), network);
    let p2wpkh_beacon = Address::p2wpkh(&compressed, network);
    let p2tr_beacon = Address::p2tr(&Secp256k1::verification_only(), internal_key, None, network);

    let services = [
        ("initialP2PKH", p2pkh_beacon),
        ("initialP2WPKH", p2wpkh_beacon),
        ("initialP2TR", p2tr_beacon),
    ]
    .into_iter()
    .map(|(fragment, address)| {
        Service::new(
            Some(format!("{}#{fragment}", did.encode())),
            [BeaconType::Singleton.to_string()],
            [format!("bitcoin:{address}")],
        )
        .map(|service| service.to_json())
        .map_err(json_tools::Error::from)
    })
    .collect::<Result<Vec<_>, _>>()?;

    Ok(Value::Array(services))
}
