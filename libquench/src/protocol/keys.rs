use crate::amount::{EtherAmount, MoneroAmount};
use crate::crypto::dleq::{self, DleqError, DleqProof};
use crate::crypto::keys::{
    contract_secret, Curve25519PublicKey, Curve25519Secret, PrivateKeyPair, PublicKeyPair,
    Secp256k1Public,
};
use crate::error::ProtocolError;
use crate::message::SendKeysMessage;
use crate::types::{EthAddress, OfferId};
use rand_core::{CryptoRng, RngCore};

/// A party's complete key material for one swap: the Monero key pair whose
/// spend key is the DLEQ witness, the matching secp256k1 public key, and
/// the proof binding the two.
pub struct SwapKeySet {
    keypair: PrivateKeyPair,
    public: PublicKeyPair,
    secp_public: Secp256k1Public,
    proof: DleqProof,
}

impl SwapKeySet {
    /// Generates fresh keys. The DLEQ prover draws the witness, which
    /// guarantees the spend scalar is valid under both group orders.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, DleqError> {
        let (proof, witness) = dleq::generate(rng)?;
        let spend = Curve25519Secret::from(witness.ed25519.0);
        let keypair = PrivateKeyPair::from_spend_key(spend);
        let public = keypair.public();
        let secp_public = Secp256k1Public::new(*proof.secp_point());
        Ok(SwapKeySet { keypair, public, secp_public, proof })
    }

    pub fn keypair(&self) -> &PrivateKeyPair {
        &self.keypair
    }

    pub fn public(&self) -> &PublicKeyPair {
        &self.public
    }

    pub fn secp_public(&self) -> &Secp256k1Public {
        &self.secp_public
    }

    pub fn proof(&self) -> &DleqProof {
        &self.proof
    }

    /// The spend scalar in the big-endian form `claim`/`refund` take.
    pub fn contract_secret(&self) -> [u8; 32] {
        contract_secret(self.keypair.spend())
    }

    pub fn send_keys_message(
        &self,
        offer_id: OfferId,
        eth_address: EthAddress,
        xmr_amount: Option<MoneroAmount>,
        eth_amount: Option<EtherAmount>,
    ) -> SendKeysMessage {
        SendKeysMessage {
            offer_id,
            public_spend_key: self.public.spend().to_hex(),
            private_view_key: self.keypair.view().to_hex(),
            dleq_proof: hex::encode(self.proof.to_bytes()),
            secp256k1_public_key: self.secp_public.to_hex(),
            eth_address,
            xmr_amount,
            eth_amount,
        }
    }
}

impl std::fmt::Debug for SwapKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapKeySet")
            .field("public_spend", &self.public.spend().to_hex())
            .field("secp256k1", &self.secp_public.to_hex())
            .finish()
    }
}

/// The peer's verified key material. Constructing this type is the only
/// way key material enters a swap, and construction verifies the DLEQ
/// proof against the claimed points.
#[derive(Debug, Clone)]
pub struct CounterpartyKeys {
    public_spend: Curve25519PublicKey,
    private_view: Curve25519Secret,
    public_pair: PublicKeyPair,
    secp_public: Secp256k1Public,
    eth_address: EthAddress,
    xmr_amount: Option<MoneroAmount>,
    eth_amount: Option<EtherAmount>,
}

impl CounterpartyKeys {
    pub fn verify(msg: &SendKeysMessage) -> Result<Self, ProtocolError> {
        let public_spend = Curve25519PublicKey::from_hex(&msg.public_spend_key)?;
        let private_view = Curve25519Secret::from_hex(&msg.private_view_key)?;
        let secp_public = Secp256k1Public::from_hex(&msg.secp256k1_public_key)?;

        let proof_bytes = hex::decode(&msg.dleq_proof)
            .map_err(|_| DleqError::InvalidEncoding("proof is not valid hex".into()))?;
        let proof = DleqProof::from_bytes(&proof_bytes)?;
        proof.verify()?;

        // the proven points must be exactly the keys the peer claims to use
        if proof.xmr_point().0 != *public_spend.as_point()
            || proof.secp_point() != secp_public.as_point()
        {
            return Err(ProtocolError::InvalidProof(DleqError::VerificationFailure));
        }

        let view_public = Curve25519PublicKey::from_secret(&private_view);
        let public_pair = PublicKeyPair::new(public_spend.clone(), view_public);
        Ok(CounterpartyKeys {
            public_spend,
            private_view,
            public_pair,
            secp_public,
            eth_address: msg.eth_address,
            xmr_amount: msg.xmr_amount,
            eth_amount: msg.eth_amount,
        })
    }

    pub fn public_spend(&self) -> &Curve25519PublicKey {
        &self.public_spend
    }

    pub fn private_view(&self) -> &Curve25519Secret {
        &self.private_view
    }

    pub fn public_pair(&self) -> &PublicKeyPair {
        &self.public_pair
    }

    pub fn secp_public(&self) -> &Secp256k1Public {
        &self.secp_public
    }

    pub fn eth_address(&self) -> EthAddress {
        self.eth_address
    }

    pub fn xmr_amount(&self) -> Option<MoneroAmount> {
        self.xmr_amount
    }

    pub fn eth_amount(&self) -> Option<EtherAmount> {
        self.eth_amount
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand_core::OsRng;

    fn sample_message(keys: &SwapKeySet) -> SendKeysMessage {
        keys.send_keys_message(
            OfferId([1; 32]),
            EthAddress([2; 20]),
            Some(MoneroAmount::from_xmr("1").unwrap()),
            None,
        )
    }

    #[test]
    fn own_keys_verify_as_counterparty() {
        let keys = SwapKeySet::generate(&mut OsRng).unwrap();
        let msg = sample_message(&keys);
        let verified = CounterpartyKeys::verify(&msg).unwrap();
        assert_eq!(verified.public_spend(), keys.public().spend());
        assert_eq!(verified.secp_public(), keys.secp_public());
        assert_eq!(verified.private_view().as_bytes(), keys.keypair().view().as_bytes());
    }

    #[test]
    fn substituted_spend_key_is_rejected() {
        let keys = SwapKeySet::generate(&mut OsRng).unwrap();
        let other = SwapKeySet::generate(&mut OsRng).unwrap();
        let mut msg = sample_message(&keys);
        // proof stays valid, but the claimed spend key no longer matches it
        msg.public_spend_key = other.public().spend().to_hex();
        assert!(matches!(
            CounterpartyKeys::verify(&msg),
            Err(ProtocolError::InvalidProof(_))
        ));
    }

    #[test]
    fn garbage_proof_is_rejected() {
        let keys = SwapKeySet::generate(&mut OsRng).unwrap();
        let mut msg = sample_message(&keys);
        msg.dleq_proof = "00ff00ff".into();
        assert!(matches!(
            CounterpartyKeys::verify(&msg),
            Err(ProtocolError::InvalidProof(_))
        ));
    }

    #[test]
    fn contract_secret_passes_mul_verify() {
        let keys = SwapKeySet::generate(&mut OsRng).unwrap();
        assert!(crate::contract::mul_verify(
            keys.contract_secret(),
            keys.secp_public().keccak256()
        ));
    }
}
