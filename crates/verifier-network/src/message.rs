//! Wire envelopes exchanged on signature streams and the announcement topic
//!
//! Every frame carries exactly one [`Envelope`], bincode-encoded.

use serde::{Deserialize, Serialize};
use verifier_core::{Address, OptimismSignature, SignatureId, SignaturePointer};

use crate::error::Result;

/// `Misc` code acknowledging receipt of one exchange page
pub const MISC_SIG_RECEIVED: u32 = 1;

/// Common-ancestor search.
///
/// Requests carry `locals`, a page of the requester's `(id, previous_id)`
/// pairs newest first. Responses carry `found`: the first pair the
/// responder also has, or `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindCommonSignature {
    pub locals: Option<Vec<SignaturePointer>>,
    pub found: Option<SignaturePointer>,
}

/// Ask for `signer`'s records with id strictly greater than `id_after`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub signer: Address,
    pub id_after: Option<SignatureId>,
}

/// Bulk record transfer; exactly one field is set per envelope
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureExchange {
    pub requests: Option<Vec<ExchangeRequest>>,
    pub responses: Option<Vec<OptimismSignature>>,
    /// Per-signer tips, published on the announcement topic
    pub latests: Option<Vec<OptimismSignature>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misc {
    pub code: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    FindCommonSignature(FindCommonSignature),
    SignatureExchange(SignatureExchange),
    Misc(Misc),
    /// End of messages
    Eom,
}

impl Envelope {
    pub fn find_request(locals: Vec<SignaturePointer>) -> Self {
        Self::FindCommonSignature(FindCommonSignature {
            locals: Some(locals),
            found: None,
        })
    }

    pub fn find_response(found: Option<SignaturePointer>) -> Self {
        Self::FindCommonSignature(FindCommonSignature {
            locals: None,
            found,
        })
    }

    pub fn exchange_request(requests: Vec<ExchangeRequest>) -> Self {
        Self::SignatureExchange(SignatureExchange {
            requests: Some(requests),
            ..Default::default()
        })
    }

    pub fn exchange_response(responses: Vec<OptimismSignature>) -> Self {
        Self::SignatureExchange(SignatureExchange {
            responses: Some(responses),
            ..Default::default()
        })
    }

    pub fn announcement(latests: Vec<OptimismSignature>) -> Self {
        Self::SignatureExchange(SignatureExchange {
            latests: Some(latests),
            ..Default::default()
        })
    }

    pub fn received_ack() -> Self {
        Self::Misc(Misc {
            code: MISC_SIG_RECEIVED,
        })
    }

    pub fn is_received_ack(&self) -> bool {
        matches!(self, Self::Misc(Misc { code }) if *code == MISC_SIG_RECEIVED)
    }

    /// Short name for logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FindCommonSignature(_) => "FindCommonSignature",
            Self::SignatureExchange(_) => "SignatureExchange",
            Self::Misc(_) => "Misc",
            Self::Eom => "Eom",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
