//! Cross-group discrete-log equality proofs binding an ed25519 point and a
//! secp256k1 point to the same 252-bit witness. The witness doubles as the
//! Monero private spend key on one side and the contract claim/refund
//! secret on the other.

use blake2::Blake2b512;
use ciphersuite::group::GroupEncoding;
use ciphersuite::{Ciphersuite, Ed25519, Secp256k1};
use dalek_ff_group::{EdwardsPoint as XmrPoint, Scalar as XmrScalar};
use digest::{Digest, Update};
use dleq::cross_group::{ConciseLinearDLEq, Generators};
use flexible_transcript::{RecommendedTranscript, Transcript};
use k256::ProjectivePoint;
use rand_core::{CryptoRng, RngCore};
use std::io::{self, Read, Write};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

type CrossGroupProof = ConciseLinearDLEq<<Ed25519 as Ciphersuite>::G, <Secp256k1 as Ciphersuite>::G>;

/// The proof together with the two public points it commits to.
#[derive(Clone)]
pub struct DleqProof {
    proof: CrossGroupProof,
    xmr_point: XmrPoint,
    secp_point: ProjectivePoint,
}

/// The shared witness, reinterpreted in each group.
pub struct DleqWitness {
    pub ed25519: XmrScalar,
    pub secp256k1: k256::Scalar,
}

/// Generates a fresh witness valid in both groups and the proof of
/// equality. The prover draws the scalar itself, which guarantees it fits
/// under both group orders.
pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<(DleqProof, DleqWitness), DleqError> {
    let mut transcript = dleq_transcript();
    let mut nonce = Zeroizing::new([0u8; 64]);
    rng.fill_bytes(nonce.as_mut_slice());
    let digest = Blake2b512::new().chain(&nonce);
    nonce.zeroize();
    let (proof, (ed, fk)) = CrossGroupProof::prove(rng, &mut transcript, generators(), digest);
    let xmr_point = Ed25519::generator() * *ed;
    let secp_point = Secp256k1::generator() * *fk;
    Ok((
        DleqProof { proof, xmr_point, secp_point },
        DleqWitness { ed25519: *ed, secp256k1: *fk },
    ))
}

impl DleqProof {
    pub fn xmr_point(&self) -> &XmrPoint {
        &self.xmr_point
    }

    pub fn secp_point(&self) -> &ProjectivePoint {
        &self.secp_point
    }

    /// Verifies the proof and returns the two public points on success.
    /// Fails if the proof is inconsistent with the attached points.
    pub fn verify(&self) -> Result<(XmrPoint, ProjectivePoint), DleqError> {
        let mut transcript = dleq_transcript();
        let mut rng = rand_core::OsRng;
        let (x_rec, y_rec) = self
            .proof
            .verify(&mut rng, &mut transcript, generators())
            .map_err(|_| DleqError::VerificationFailure)?;
        match self.xmr_point.eq(&x_rec) && self.secp_point.eq(&y_rec) {
            true => Ok((x_rec, y_rec)),
            false => Err(DleqError::VerificationFailure),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.proof.write(writer)?;
        writer.write_all(self.xmr_point.to_bytes().as_ref())?;
        writer.write_all(self.secp_point.to_bytes().as_ref())?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self, DleqError> {
        let proof = CrossGroupProof::read(reader)
            .map_err(|e| DleqError::InvalidEncoding(format!("failed to read proof: {e}")))?;
        let xmr_point = Ed25519::read_G(reader)
            .map_err(|e| DleqError::InvalidEncoding(format!("failed to read ed25519 point: {e}")))?;
        let secp_point = Secp256k1::read_G(reader)
            .map_err(|e| DleqError::InvalidEncoding(format!("failed to read secp256k1 point: {e}")))?;
        Ok(DleqProof { proof, xmr_point, secp_point })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out).expect("writing a proof to a Vec cannot fail");
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DleqError> {
        let mut reader = bytes;
        let proof = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(DleqError::InvalidEncoding("trailing bytes after proof".into()));
        }
        Ok(proof)
    }
}

impl std::fmt::Debug for DleqProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DleqProof")
            .field("xmr_point", &hex::encode(self.xmr_point.to_bytes()))
            .field("secp_point", &hex::encode(self.secp_point.to_bytes()))
            .finish()
    }
}

fn dleq_transcript() -> RecommendedTranscript {
    RecommendedTranscript::new(b"Quench Ed25519/Secp256k1 DLEQ")
}

fn generators() -> (Generators<XmrPoint>, Generators<ProjectivePoint>) {
    let monero_gen = Generators::new(
        Ed25519::generator(),
        str_to_g("8b655970153799af2aeadc9ff1add0ea6c7251d54154cfa92c173a0dd39c1f94"),
    )
    .expect("Hardcoded generators for Monero failed to generate");
    let eth_gen = Generators::new(
        Secp256k1::generator(),
        str_to_g("0250929b74c1a04954b78b4b6035e97a5e078a5a0f28ec96d547bfee9ace803ac0"),
    )
    .expect("Hardcoded generators for secp256k1 failed to generate");
    (monero_gen, eth_gen)
}

fn str_to_g<G: GroupEncoding>(s: &str) -> G {
    let mut encoding = <G as GroupEncoding>::Repr::default();
    if let Err(e) = hex::decode_to_slice(s, encoding.as_mut()) {
        panic!("Hardcoded generator point is not valid hex: {e}");
    }
    G::from_bytes(&encoding).unwrap()
}

#[derive(Debug, Clone, Error)]
pub enum DleqError {
    #[error("DLEQ proof verification failed")]
    VerificationFailure,
    #[error("Malformed DLEQ proof: {0}")]
    InvalidEncoding(String),
}

#[cfg(test)]
mod test {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn round_trip() {
        let mut rng = OsRng;
        let (proof, witness) = generate(&mut rng).unwrap();
        let x_point = Ed25519::generator() * witness.ed25519;
        let y_point = Secp256k1::generator() * witness.secp256k1;
        assert_eq!(*proof.xmr_point(), x_point);
        assert_eq!(*proof.secp_point(), y_point);

        let (x_rec, y_rec) = proof.verify().expect("freshly generated proof must verify");
        assert_eq!(x_rec, x_point);
        assert_eq!(y_rec, y_point);
    }

    #[test]
    fn witness_interpretations_agree() {
        use ciphersuite::group::ff::PrimeFieldBits;
        let (_, witness) = generate(&mut OsRng).unwrap();
        assert_eq!(witness.ed25519.to_le_bits(), witness.secp256k1.to_le_bits());
    }

    #[test]
    fn tampered_points_rejected() {
        let (proof, _) = generate(&mut OsRng).unwrap();
        let forged = DleqProof {
            proof: proof.proof.clone(),
            xmr_point: proof.xmr_point + proof.xmr_point,
            secp_point: proof.secp_point,
        };
        assert!(matches!(forged.verify(), Err(DleqError::VerificationFailure)));
    }

    #[test]
    fn serialization_round_trip() {
        let (proof, _) = generate(&mut OsRng).unwrap();
        let bytes = proof.to_bytes();
        let restored = DleqProof::from_bytes(&bytes).unwrap();
        assert_eq!(restored.xmr_point(), proof.xmr_point());
        assert_eq!(restored.secp_point(), proof.secp_point());
        restored.verify().expect("restored proof must verify");

        assert!(DleqProof::from_bytes(&bytes[..bytes.len() - 3]).is_err());
        assert!(DleqProof::from_bytes(&[]).is_err());
    }
}
