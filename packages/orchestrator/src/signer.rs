//! Builds signed confirm messages for attestations

use alloy::primitives::{Address, B256};
use qgb_rs::{
    bytes32_to_hex, DataCommitment, DataCommitmentConfirm, EvmEncoder, EvmSigner,
    SignatureError, Valset, ValsetConfirm,
};

/// Signs attestation digests with the orchestrator's EVM key
pub struct ConfirmSigner {
    signer: EvmSigner,
    encoder: EvmEncoder,
}

impl ConfirmSigner {
    pub fn new(signer: EvmSigner, encoder: EvmEncoder) -> Self {
        Self { signer, encoder }
    }

    pub fn evm_address(&self) -> Address {
        self.signer.address()
    }

    /// Confirm approving the contract's move to `valset`
    pub fn sign_valset(
        &self,
        valset: &Valset,
        orchestrator: &str,
    ) -> Result<ValsetConfirm, SignatureError> {
        let digest = self.encoder.valset_digest(valset);
        let signature = self.signer.sign_digest(digest)?;
        Ok(ValsetConfirm {
            nonce: valset.nonce,
            orchestrator: orchestrator.to_string(),
            eth_address: self.evm_address().to_checksum(None),
            signature: signature.to_hex(),
        })
    }

    /// Confirm over the tuple root of `data_commitment`'s block range
    pub fn sign_data_commitment(
        &self,
        data_commitment: &DataCommitment,
        root: B256,
        orchestrator: &str,
    ) -> Result<DataCommitmentConfirm, SignatureError> {
        let digest = self
            .encoder
            .data_commitment_digest(data_commitment.nonce, root);
        let signature = self.signer.sign_digest(digest)?;
        Ok(DataCommitmentConfirm {
            nonce: data_commitment.nonce,
            begin_block: data_commitment.begin_block,
            end_block: data_commitment.end_block,
            validator_address: orchestrator.to_string(),
            eth_address: self.evm_address().to_checksum(None),
            commitment: bytes32_to_hex(&root.0),
            signature: signature.to_hex(),
        })
    }
}
