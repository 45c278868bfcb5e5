use crate::crypto::keccak256;
use crate::types::{Environment, EthAddress};
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::{EdwardsPoint, Scalar};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::ProjectivePoint;
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Clone, PartialEq, Eq)]
pub struct Curve25519Secret(Scalar);

impl Curve25519Secret {
    pub fn as_scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn to_scalar(self) -> Scalar {
        self.0
    }

    pub fn random<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        let mut scalar_bytes = [0u8; 64];
        rng.fill_bytes(&mut scalar_bytes);
        let s = Scalar::from_bytes_mod_order_wide(&scalar_bytes);
        scalar_bytes.zeroize();
        Self(s)
    }

    /// Accepts only canonically-reduced little-endian scalar bytes.
    pub fn from_canonical_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        Option::from(Scalar::from_canonical_bytes(bytes)).map(Self).ok_or(KeyError::InvalidScalar)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| KeyError::InvalidEncoding)?;
        Self::from_canonical_bytes(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl From<Scalar> for Curve25519Secret {
    fn from(value: Scalar) -> Self {
        Self(value)
    }
}

impl std::fmt::Debug for Curve25519Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Curve25519Secret(****)")
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Curve25519PublicKey {
    compressed_point: CompressedEdwardsY,
    point: EdwardsPoint,
}

impl Curve25519PublicKey {
    pub fn as_compressed(&self) -> &CompressedEdwardsY {
        &self.compressed_point
    }

    pub fn as_point(&self) -> &EdwardsPoint {
        &self.point
    }

    pub fn from_secret(secret_key: &Curve25519Secret) -> Self {
        let point = secret_key.as_scalar() * ED25519_BASEPOINT_TABLE;
        point.into()
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| KeyError::InvalidEncoding)?;
        let compressed = CompressedEdwardsY(bytes);
        compressed.try_into()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.compressed_point.as_bytes())
    }

    /// The sum of two public keys, the public half of the summed secret.
    pub fn sum(a: &Curve25519PublicKey, b: &Curve25519PublicKey) -> Self {
        (a.point + b.point).into()
    }
}

impl From<EdwardsPoint> for Curve25519PublicKey {
    fn from(value: EdwardsPoint) -> Self {
        let compressed_point = value.compress();
        Self { compressed_point, point: value }
    }
}

impl TryFrom<CompressedEdwardsY> for Curve25519PublicKey {
    type Error = KeyError;
    fn try_from(value: CompressedEdwardsY) -> Result<Self, Self::Error> {
        let point = value.decompress().ok_or(KeyError::InvalidPoint)?;
        Ok(Self { compressed_point: value, point })
    }
}

impl std::fmt::Debug for Curve25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Curve25519PublicKey({})", self.to_hex())
    }
}

/// Derives the Monero private view key from a private spend key:
/// `H_s(spend) = keccak256(spend_bytes) mod l`.
pub fn derive_view_key(spend: &Curve25519Secret) -> Curve25519Secret {
    let hashed = keccak256(spend.as_bytes());
    Curve25519Secret(Scalar::from_bytes_mod_order(hashed))
}

/// A Monero private key pair. The view key is always derived from the
/// spend key with the standard hash-to-scalar, so any stock wallet can
/// re-derive it.
#[derive(Clone)]
pub struct PrivateKeyPair {
    spend: Curve25519Secret,
    view: Curve25519Secret,
}

impl PrivateKeyPair {
    pub fn from_spend_key(spend: Curve25519Secret) -> Self {
        let view = derive_view_key(&spend);
        PrivateKeyPair { spend, view }
    }

    /// Builds a pair from explicit keys, e.g. summed halves where the view
    /// key is no longer a hash of the spend key.
    pub fn from_keys(spend: Curve25519Secret, view: Curve25519Secret) -> Self {
        PrivateKeyPair { spend, view }
    }

    pub fn spend(&self) -> &Curve25519Secret {
        &self.spend
    }

    pub fn view(&self) -> &Curve25519Secret {
        &self.view
    }

    pub fn public(&self) -> PublicKeyPair {
        PublicKeyPair {
            spend: Curve25519PublicKey::from_secret(&self.spend),
            view: Curve25519PublicKey::from_secret(&self.view),
        }
    }

    pub fn address(&self, env: Environment) -> Result<String, KeyError> {
        self.public().address(env)
    }

    /// Element-wise scalar sum. The resulting pair spends the output of a
    /// swap where both parties contributed one half.
    pub fn sum(a: &PrivateKeyPair, b: &PrivateKeyPair) -> Self {
        PrivateKeyPair {
            spend: Curve25519Secret(a.spend.0 + b.spend.0),
            view: Curve25519Secret(a.view.0 + b.view.0),
        }
    }
}

impl std::fmt::Debug for PrivateKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKeyPair(****)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyPair {
    spend: Curve25519PublicKey,
    view: Curve25519PublicKey,
}

impl PublicKeyPair {
    pub fn new(spend: Curve25519PublicKey, view: Curve25519PublicKey) -> Self {
        PublicKeyPair { spend, view }
    }

    pub fn spend(&self) -> &Curve25519PublicKey {
        &self.spend
    }

    pub fn view(&self) -> &Curve25519PublicKey {
        &self.view
    }

    /// Element-wise point sum of two public pairs.
    pub fn sum(a: &PublicKeyPair, b: &PublicKeyPair) -> Self {
        PublicKeyPair {
            spend: Curve25519PublicKey::sum(&a.spend, &b.spend),
            view: Curve25519PublicKey::sum(&a.view, &b.view),
        }
    }

    /// The standard Monero address for this pair on the given network.
    pub fn address(&self, env: Environment) -> Result<String, KeyError> {
        let spend = monero::PublicKey::from_slice(self.spend.as_compressed().as_bytes())
            .map_err(|_| KeyError::InvalidPoint)?;
        let view = monero::PublicKey::from_slice(self.view.as_compressed().as_bytes())
            .map_err(|_| KeyError::InvalidPoint)?;
        Ok(monero::Address::standard(env.monero_network(), spend, view).to_string())
    }
}

/// A secp256k1 public key as committed to by the escrow contract.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Secp256k1Public(ProjectivePoint);

impl Secp256k1Public {
    pub fn new(point: ProjectivePoint) -> Self {
        Secp256k1Public(point)
    }

    pub fn as_point(&self) -> &ProjectivePoint {
        &self.0
    }

    /// 33-byte SEC1 compressed encoding.
    pub fn to_compressed_bytes(&self) -> [u8; 33] {
        let encoded = self.0.to_affine().to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(encoded.as_bytes());
        out
    }

    pub fn from_compressed_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let encoded =
            k256::EncodedPoint::from_bytes(bytes).map_err(|_| KeyError::InvalidEncoding)?;
        let point: Option<k256::AffinePoint> =
            k256::elliptic_curve::sec1::FromEncodedPoint::from_encoded_point(&encoded).into();
        let point = point.ok_or(KeyError::InvalidPoint)?;
        Ok(Secp256k1Public(ProjectivePoint::from(point)))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidEncoding)?;
        Self::from_compressed_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_compressed_bytes())
    }

    /// `keccak256(x || y)` over the uncompressed coordinates; the value the
    /// contract stores as `pubKeyClaim`/`pubKeyRefund`.
    pub fn keccak256(&self) -> [u8; 32] {
        let encoded = self.0.to_affine().to_encoded_point(false);
        keccak256(&encoded.as_bytes()[1..])
    }

    /// The Ethereum account address controlled by the corresponding secret.
    pub fn eth_address(&self) -> EthAddress {
        let hash = self.keccak256();
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..]);
        EthAddress(addr)
    }
}

impl std::fmt::Debug for Secp256k1Public {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secp256k1Public({})", self.to_hex())
    }
}

/// Converts an ed25519 scalar to the big-endian `uint256` form the escrow
/// contract takes for `claim`/`refund` secrets.
pub fn contract_secret(spend: &Curve25519Secret) -> [u8; 32] {
    let mut bytes = *spend.as_bytes();
    bytes.reverse();
    bytes
}

/// Rebuilds an ed25519 spend key from a secret revealed on-chain
/// (big-endian `uint256`).
pub fn spend_key_from_contract_secret(secret: [u8; 32]) -> Result<Curve25519Secret, KeyError> {
    let mut bytes = secret;
    bytes.reverse();
    Curve25519Secret::from_canonical_bytes(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Invalid point on curve")]
    InvalidPoint,
    #[error("Scalar is not canonically reduced")]
    InvalidScalar,
    #[error("Invalid key encoding")]
    InvalidEncoding,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::Environment;
    use rand_core::OsRng;

    #[test]
    fn public_key_round_trip() {
        let secret = Curve25519Secret::random(&mut OsRng);
        let public = Curve25519PublicKey::from_secret(&secret);
        let back = Curve25519PublicKey::from_hex(&public.to_hex()).unwrap();
        assert_eq!(public, back);
    }

    #[test]
    fn summed_private_pair_matches_summed_public_pair() {
        let a = PrivateKeyPair::from_spend_key(Curve25519Secret::random(&mut OsRng));
        let b = PrivateKeyPair::from_spend_key(Curve25519Secret::random(&mut OsRng));

        let summed_private = PrivateKeyPair::sum(&a, &b);
        let summed_public = PublicKeyPair::sum(&a.public(), &b.public());
        assert_eq!(summed_private.public(), summed_public);

        // the address each party derives independently must agree
        assert_eq!(
            summed_private.address(Environment::Development).unwrap(),
            summed_public.address(Environment::Development).unwrap()
        );
    }

    #[test]
    fn view_key_is_deterministic() {
        let spend = Curve25519Secret::random(&mut OsRng);
        let v1 = derive_view_key(&spend);
        let v2 = derive_view_key(&spend);
        assert_eq!(v1.as_bytes(), v2.as_bytes());
        assert_ne!(v1.as_bytes(), spend.as_bytes());
    }

    #[test]
    fn contract_secret_round_trip() {
        let spend = Curve25519Secret::random(&mut OsRng);
        let secret = contract_secret(&spend);
        let back = spend_key_from_contract_secret(secret).unwrap();
        assert_eq!(spend.as_bytes(), back.as_bytes());
    }

    #[test]
    fn non_canonical_scalar_rejected() {
        assert!(Curve25519Secret::from_canonical_bytes([0xff; 32]).is_err());
    }
}
