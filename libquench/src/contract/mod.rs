//! Typed view of the on-chain escrow: the swap struct, its id, the stage
//! machine and the events the engine filters for. The contract is the
//! consensus source of truth; peer messages about stage transitions are
//! only hints that must be confirmed here.

mod chain;
#[cfg(feature = "dummy")]
pub mod mock;

pub use chain::{EthChain, NewSwapReceipt};

use crate::amount::EtherAmount;
use crate::crypto::keccak256;
use crate::types::{EthAddress, SwapId};
use ciphersuite::group::ff::PrimeField;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::ProjectivePoint;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Mirror of the contract's swap struct. The swap id is the keccak hash of
/// the ABI encoding, so every field is consensus-critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowSwap {
    pub owner: EthAddress,
    pub claimer: EthAddress,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub pub_key_claim: [u8; 32],
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub pub_key_refund: [u8; 32],
    pub timeout_0: u64,
    pub timeout_1: u64,
    pub value: EtherAmount,
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    pub nonce: [u8; 32],
}

impl EscrowSwap {
    /// Solidity `abi.encode` of the struct: eight 32-byte words, addresses
    /// left-padded, integers big-endian.
    pub fn abi_encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 * 32);
        out.extend_from_slice(&pad_address(&self.owner));
        out.extend_from_slice(&pad_address(&self.claimer));
        out.extend_from_slice(&self.pub_key_claim);
        out.extend_from_slice(&self.pub_key_refund);
        out.extend_from_slice(&pad_u64(self.timeout_0));
        out.extend_from_slice(&pad_u64(self.timeout_1));
        out.extend_from_slice(&self.value.to_be_bytes32());
        out.extend_from_slice(&self.nonce);
        out
    }

    pub fn swap_id(&self) -> SwapId {
        SwapId(keccak256(&self.abi_encode()))
    }
}

fn pad_address(addr: &EthAddress) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(&addr.0);
    out
}

fn pad_u64(v: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&v.to_be_bytes());
    out
}

/// On-chain stage of a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Invalid,
    Pending,
    Ready,
    Completed,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Invalid => "Invalid",
            Stage::Pending => "Pending",
            Stage::Ready => "Ready",
            Stage::Completed => "Completed",
        };
        write!(f, "{s}")
    }
}

/// `keccak256(s * G) == q_keccak` over secp256k1; the check the contract
/// applies to claim/refund secrets. `secret` is big-endian.
pub fn mul_verify(secret: [u8; 32], q_keccak: [u8; 32]) -> bool {
    let scalar: Option<k256::Scalar> = k256::Scalar::from_repr(secret.into()).into();
    let scalar = match scalar {
        Some(s) => s,
        None => return false,
    };
    let point = ProjectivePoint::GENERATOR * scalar;
    let encoded = point.to_affine().to_encoded_point(false);
    keccak256(&encoded.as_bytes()[1..]) == q_keccak
}

#[derive(Debug, Clone, Error)]
pub enum ContractError {
    /// Consensus rejected the call; retrying without a state change is
    /// pointless.
    #[error("transaction reverted: {0}")]
    Reverted(String),
    /// Transient node/transport failure; the call may be retried.
    #[error("chain error: {0}")]
    Chain(String),
    #[error("no swap with id {0} on chain")]
    UnknownSwap(SwapId),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::dleq;
    use crate::crypto::keys::{contract_secret, Curve25519Secret};
    use rand_core::OsRng;

    fn sample_swap() -> EscrowSwap {
        EscrowSwap {
            owner: EthAddress([0x11; 20]),
            claimer: EthAddress([0x22; 20]),
            pub_key_claim: [0x33; 32],
            pub_key_refund: [0x44; 32],
            timeout_0: 1_700_000_000,
            timeout_1: 1_700_000_600,
            value: EtherAmount::from_eth("0.05").unwrap(),
            nonce: [0x55; 32],
        }
    }

    #[test]
    fn abi_encoding_layout() {
        let swap = sample_swap();
        let encoded = swap.abi_encode();
        assert_eq!(encoded.len(), 256);
        // address words are left-padded with 12 zero bytes
        assert_eq!(&encoded[..12], &[0u8; 12]);
        assert_eq!(&encoded[12..32], &[0x11; 20]);
        assert_eq!(&encoded[32..44], &[0u8; 12]);
        // value word is big-endian
        assert_eq!(&encoded[192..208], &[0u8; 16]);
    }

    #[test]
    fn swap_id_is_deterministic_and_field_sensitive() {
        let swap = sample_swap();
        assert_eq!(swap.swap_id(), swap.swap_id());

        let mut other = swap;
        other.nonce[0] ^= 1;
        assert_ne!(swap.swap_id(), other.swap_id());

        let mut other = swap;
        other.timeout_1 += 1;
        assert_ne!(swap.swap_id(), other.swap_id());
    }

    #[test]
    fn mul_verify_accepts_matching_secret() {
        let (proof, witness) = dleq::generate(&mut OsRng).unwrap();
        let spend = Curve25519Secret::from(witness.ed25519.0);
        let secret = contract_secret(&spend);

        let encoded = proof.secp_point().to_affine().to_encoded_point(false);
        let q_keccak = crate::crypto::keccak256(&encoded.as_bytes()[1..]);

        assert!(mul_verify(secret, q_keccak));

        let mut wrong = secret;
        wrong[31] ^= 1;
        assert!(!mul_verify(wrong, q_keccak));
    }
}
