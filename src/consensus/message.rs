use std::fmt;
use std::sync::OnceLock;

use sha2::{Digest as ShaDigest, Sha512};

use crate::common::crypto::{finalize_digest, Digest, Keypair, Pubkey, Signature};
use crate::common::RequestError;

/*
    A client request is identified by the pair (identifier, reqId) and is
    compared across nodes by the digest of its content. Nodes attest to a
    request they received by sending PROPAGATE to every peer; a peer that is
    missing a PROPAGATE for some digest can ask for it with a
    PropagateRequest.
*/

pub trait Hashable {
    fn hash(&self) -> Digest;
}

/// Name of a node in the pool. Vote maps are keyed by it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        NodeName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty, at most 64 characters, ASCII alphanumerics plus `-_.`.
    /// Votes under any other name are ignored when counting quorums.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 64
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        NodeName::new(name)
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct RequestKey {
    pub identifier: String,
    pub req_id: u64,
}

impl RequestKey {
    pub fn new(identifier: impl Into<String>, req_id: u64) -> Self {
        RequestKey {
            identifier: identifier.into(),
            req_id,
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.identifier, self.req_id)
    }
}

/// Request as it travels inside a PROPAGATE. Nothing about it is trusted
/// until it has been turned into a [`Request`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RequestBody {
    pub identifier: String,
    pub req_id: u64,
    pub operation: Vec<u8>,
}

/// A validated client request.
#[derive(Clone, Debug)]
pub struct Request {
    key: RequestKey,
    operation: Vec<u8>,
    digest: OnceLock<Digest>,
}

impl Request {
    pub fn new(
        identifier: impl Into<String>,
        req_id: u64,
        operation: impl Into<Vec<u8>>,
    ) -> Result<Self, RequestError> {
        let identifier = identifier.into();
        let operation = operation.into();

        if identifier.is_empty() {
            return Err(RequestError::EmptyIdentifier);
        }
        if let Some(c) = identifier
            .chars()
            .find(|c| c.is_whitespace() || c.is_control())
        {
            return Err(RequestError::InvalidIdentifier(c));
        }
        if operation.is_empty() {
            return Err(RequestError::EmptyOperation);
        }

        Ok(Request {
            key: RequestKey { identifier, req_id },
            operation,
            digest: OnceLock::new(),
        })
    }

    pub fn key(&self) -> &RequestKey {
        &self.key
    }

    pub fn operation(&self) -> &[u8] {
        &self.operation
    }

    /// Content hash, computed on first use.
    pub fn digest(&self) -> Digest {
        *self.digest.get_or_init(|| {
            let mut hasher = Sha512::new();
            hasher.update(self.key.identifier.as_bytes());
            hasher.update([0u8]);
            hasher.update(self.key.req_id.to_be_bytes());
            hasher.update(&self.operation);
            finalize_digest(hasher)
        })
    }

    pub fn to_body(&self) -> RequestBody {
        RequestBody {
            identifier: self.key.identifier.clone(),
            req_id: self.key.req_id,
            operation: self.operation.clone(),
        }
    }
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.operation == other.operation
    }
}

impl Eq for Request {}

impl TryFrom<RequestBody> for Request {
    type Error = RequestError;

    fn try_from(body: RequestBody) -> Result<Self, Self::Error> {
        Request::new(body.identifier, body.req_id, body.operation)
    }
}

#[derive(Clone, Debug)]
pub enum Message {
    Propagate(Propagate),
    PropagateRequest(PropagateRequest),
}

/// A node's vote that it received `request` from `sender_client`.
#[derive(Clone, Debug)]
pub struct Propagate {
    pub request: RequestBody,
    pub sender_client: String,
    pub sig: Signature,
}

impl Propagate {
    /// Builds a PROPAGATE signed by `keypair`.
    pub fn new(request: RequestBody, sender_client: impl Into<String>, keypair: &Keypair) -> Self {
        let sender_client = sender_client.into();
        let sig = keypair.sign(&propagate_payload_hash(&request, &sender_client));
        Propagate {
            request,
            sender_client,
            sig,
        }
    }

    /// True if the signature covers this payload and was made by `signer`.
    pub fn is_signed_by(&self, signer: &Pubkey) -> bool {
        self.sig.signer == *signer && self.sig.verify(&self.hash())
    }
}

/// Ask a peer for its PROPAGATE of the request with this digest.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PropagateRequest {
    pub digest: Digest,
}

/// Signed payload of a PROPAGATE: the request fields and the client name.
pub fn propagate_payload_hash(request: &RequestBody, sender_client: &str) -> Digest {
    let mut hasher = Sha512::new();
    hasher.update(request.identifier.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.req_id.to_be_bytes());
    hasher.update(&request.operation);
    hasher.update([0u8]);
    hasher.update(sender_client.as_bytes());
    finalize_digest(hasher)
}

impl Hashable for Propagate {
    fn hash(&self) -> Digest {
        propagate_payload_hash(&self.request, &self.sender_client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejects_malformed_input() {
        assert_eq!(Request::new("", 1, b"op".to_vec()), Err(RequestError::EmptyIdentifier));
        assert_eq!(
            Request::new("client 1", 1, b"op".to_vec()),
            Err(RequestError::InvalidIdentifier(' '))
        );
        assert_eq!(Request::new("client1", 1, Vec::new()), Err(RequestError::EmptyOperation));
    }

    #[test]
    fn test_digest_depends_on_content() {
        let a = Request::new("client1", 1, b"transfer 10".to_vec()).unwrap();
        let b = Request::new("client1", 1, b"transfer 99".to_vec()).unwrap();
        let a_again = Request::try_from(a.to_body()).unwrap();

        assert_eq!(a.key(), b.key());
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest(), a_again.digest());
        // cached value is stable across calls
        assert_eq!(a.digest(), a.digest());
    }

    #[test]
    fn test_node_name_well_formed() {
        assert!(NodeName::new("Alpha").is_well_formed());
        assert!(NodeName::new("node-2.pool_a").is_well_formed());
        assert!(!NodeName::new("").is_well_formed());
        assert!(!NodeName::new("bad name").is_well_formed());
        assert!(!NodeName::new("x".repeat(65)).is_well_formed());
    }

    #[test]
    fn test_propagate_signature_covers_payload() {
        let keypair = Keypair::from_seed([1; 32]);
        let other = Keypair::from_seed([2; 32]);
        let req = Request::new("client1", 1, b"op".to_vec()).unwrap();

        let mut propagate = Propagate::new(req.to_body(), "client1", &keypair);
        assert!(propagate.is_signed_by(&keypair.pubkey()));
        assert!(!propagate.is_signed_by(&other.pubkey()));

        propagate.request.operation = b"forged".to_vec();
        assert!(!propagate.is_signed_by(&keypair.pubkey()));
    }

    #[test]
    fn test_request_key_display() {
        assert_eq!(RequestKey::new("client1", 42).to_string(), "client1:42");
    }
}
