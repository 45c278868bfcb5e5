pub mod dleq;
pub mod keys;

use sha3::{Digest, Keccak256};

/// Keccak-256, the hash used by the escrow contract for swap ids and
/// public-key commitments, and by Monero for view-key derivation.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

#[cfg(test)]
mod test {
    use super::keccak256;

    #[test]
    fn keccak_empty_vector() {
        // keccak256("") from the Ethereum yellow paper
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }
}
