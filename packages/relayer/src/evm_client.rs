//! EVM client for the QGB contract
//!
//! Submits valset updates and data root tuple roots, and reads the contract's
//! nonces.

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::str::FromStr;
use tracing::{debug, info};

use qgb_rs::{compute_valset_hash, EthSignature, Valset};

sol! {
    struct Validator {
        address addr;
        uint256 power;
    }

    struct Signature {
        uint8 v;
        bytes32 r;
        bytes32 s;
    }

    struct DataRootTuple {
        uint256 height;
        bytes32 dataRoot;
    }

    struct BinaryMerkleProof {
        bytes32[] sideNodes;
        uint256 key;
        uint256 numLeaves;
    }

    /// Quantum Gravity Bridge contract interface
    #[sol(rpc)]
    contract QuantumGravityBridge {
        function updateValidatorSet(
            uint256 _newNonce,
            uint256 _newPowerThreshold,
            bytes32 _newValidatorSetHash,
            Validator[] calldata _currentValidatorSet,
            Signature[] calldata _sigs
        ) external;

        function submitDataRootTupleRoot(
            uint256 _nonce,
            bytes32 _dataRootTupleRoot,
            Validator[] calldata _currentValidatorSet,
            Signature[] calldata _sigs
        ) external;

        function verifyAttestation(
            uint256 _tupleRootNonce,
            DataRootTuple memory _tuple,
            BinaryMerkleProof memory _proof
        ) external view returns (bool);

        function state_eventNonce() external view returns (uint256);
        function state_lastValidatorSetNonce() external view returns (uint256);
        function state_lastDataRootTupleRootNonce() external view returns (uint256);
    }
}

/// Contract operations the relayer needs
#[async_trait]
pub trait BridgeContract: Send + Sync {
    /// Nonce of the last attestation of either kind the contract accepted
    async fn last_event_nonce(&self) -> Result<u64>;

    async fn last_valset_nonce(&self) -> Result<u64>;

    async fn last_data_root_tuple_root_nonce(&self) -> Result<u64>;

    /// Move the contract to `new_valset`, signed by `current_valset`.
    /// Returns the transaction hash.
    async fn update_validator_set(
        &self,
        new_valset: &Valset,
        current_valset: &Valset,
        signatures: &[EthSignature],
    ) -> Result<B256>;

    async fn submit_data_root_tuple_root(
        &self,
        nonce: u64,
        tuple_root: B256,
        current_valset: &Valset,
        signatures: &[EthSignature],
    ) -> Result<B256>;
}

/// Contract validator array in member order
pub fn to_contract_validators(valset: &Valset) -> Vec<Validator> {
    valset
        .members
        .iter()
        .map(|m| Validator {
            addr: m.evm_address,
            power: U256::from(m.power),
        })
        .collect()
}

pub fn to_contract_signatures(signatures: &[EthSignature]) -> Vec<Signature> {
    signatures
        .iter()
        .map(|sig| Signature {
            v: sig.v(),
            r: sig.r(),
            s: sig.s(),
        })
        .collect()
}

fn nonce_to_u64(value: U256, name: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| eyre!("{} does not fit in u64: {}", name, value))
}

/// QGB contract client over JSON-RPC
///
/// The provider is built once by [`connect`] and shared by every read and
/// submission.
pub struct EvmBridgeContract<P> {
    provider: P,
    address: Address,
    relayer_address: Address,
}

/// Connect to the QGB contract at `address`, signing with `private_key`.
///
/// Uses `ProviderBuilder::with_recommended_fillers()` so nonce, gas and fees
/// are populated by the provider.
pub fn connect(
    rpc_url: &str,
    address: &str,
    private_key: &str,
) -> Result<EvmBridgeContract<impl Provider<Http<Client>> + Clone>> {
    let address = Address::from_str(address).wrap_err("Invalid QGB contract address")?;
    let signer: PrivateKeySigner = private_key
        .trim()
        .parse()
        .wrap_err("Invalid private key")?;
    let relayer_address = signer.address();

    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(EthereumWallet::from(signer))
        .on_http(rpc_url.parse().wrap_err("Invalid RPC URL")?);

    info!(
        relayer_address = %relayer_address,
        contract = %address,
        "EVM client initialized"
    );

    Ok(EvmBridgeContract {
        provider,
        address,
        relayer_address,
    })
}

impl<P> EvmBridgeContract<P>
where
    P: Provider<Http<Client>> + Clone,
{
    /// Address paying for submissions
    pub fn relayer_address(&self) -> Address {
        self.relayer_address
    }

    pub fn contract_address(&self) -> Address {
        self.address
    }

    /// Fail unless the node reports `expected` as its chain ID
    pub async fn check_chain_id(&self, expected: u64) -> Result<()> {
        let actual = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| eyre!("Failed to get chain ID: {}", e))?;
        if actual != expected {
            return Err(eyre!(
                "EVM chain ID mismatch: node reports {}, configured {}",
                actual,
                expected
            ));
        }
        Ok(())
    }

    /// Check a data root inclusion proof against a committed tuple root
    pub async fn verify_attestation(
        &self,
        tuple_root_nonce: u64,
        tuple: DataRootTuple,
        proof: BinaryMerkleProof,
    ) -> Result<bool> {
        let contract = QuantumGravityBridge::new(self.address, &self.provider);
        let result = contract
            .verifyAttestation(U256::from(tuple_root_nonce), tuple, proof)
            .call()
            .await
            .map_err(|e| eyre!("Failed to call verifyAttestation: {}", e))?;
        Ok(result._0)
    }

    async fn read_nonce(&self, which: NonceGetter) -> Result<u64> {
        let contract = QuantumGravityBridge::new(self.address, &self.provider);

        let value = match which {
            NonceGetter::Event => contract.state_eventNonce().call().await.map(|r| r._0),
            NonceGetter::Valset => contract
                .state_lastValidatorSetNonce()
                .call()
                .await
                .map(|r| r._0),
            NonceGetter::DataRoot => contract
                .state_lastDataRootTupleRootNonce()
                .call()
                .await
                .map(|r| r._0),
        }
        .map_err(|e| eyre!("Failed to read {}: {}", which.name(), e))?;

        nonce_to_u64(value, which.name())
    }
}

#[derive(Clone, Copy)]
enum NonceGetter {
    Event,
    Valset,
    DataRoot,
}

impl NonceGetter {
    fn name(self) -> &'static str {
        match self {
            NonceGetter::Event => "state_eventNonce",
            NonceGetter::Valset => "state_lastValidatorSetNonce",
            NonceGetter::DataRoot => "state_lastDataRootTupleRootNonce",
        }
    }
}

#[async_trait]
impl<P> BridgeContract for EvmBridgeContract<P>
where
    P: Provider<Http<Client>> + Clone + 'static,
{
    async fn last_event_nonce(&self) -> Result<u64> {
        self.read_nonce(NonceGetter::Event).await
    }

    async fn last_valset_nonce(&self) -> Result<u64> {
        self.read_nonce(NonceGetter::Valset).await
    }

    async fn last_data_root_tuple_root_nonce(&self) -> Result<u64> {
        self.read_nonce(NonceGetter::DataRoot).await
    }

    async fn update_validator_set(
        &self,
        new_valset: &Valset,
        current_valset: &Valset,
        signatures: &[EthSignature],
    ) -> Result<B256> {
        let contract = QuantumGravityBridge::new(self.address, &self.provider);

        let valset_hash = compute_valset_hash(&new_valset.members);
        debug!(
            nonce = new_valset.nonce,
            threshold = %new_valset.two_thirds_threshold(),
            valset_hash = %valset_hash,
            "Submitting updateValidatorSet"
        );

        let pending_tx = contract
            .updateValidatorSet(
                U256::from(new_valset.nonce),
                U256::from(new_valset.two_thirds_threshold()),
                valset_hash,
                to_contract_validators(current_valset),
                to_contract_signatures(signatures),
            )
            .send()
            .await
            .map_err(|e| eyre!("Failed to send updateValidatorSet tx: {}", e))?;

        let tx_hash = *pending_tx.tx_hash();
        info!(tx_hash = %tx_hash, nonce = new_valset.nonce, "Valset update sent");

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get receipt: {}", e))?;

        if !receipt.status() {
            return Err(eyre!("updateValidatorSet transaction reverted"));
        }

        Ok(tx_hash)
    }

    async fn submit_data_root_tuple_root(
        &self,
        nonce: u64,
        tuple_root: B256,
        current_valset: &Valset,
        signatures: &[EthSignature],
    ) -> Result<B256> {
        let contract = QuantumGravityBridge::new(self.address, &self.provider);

        debug!(nonce, tuple_root = %tuple_root, "Submitting submitDataRootTupleRoot");

        let pending_tx = contract
            .submitDataRootTupleRoot(
                U256::from(nonce),
                tuple_root,
                to_contract_validators(current_valset),
                to_contract_signatures(signatures),
            )
            .send()
            .await
            .map_err(|e| eyre!("Failed to send submitDataRootTupleRoot tx: {}", e))?;

        let tx_hash = *pending_tx.tx_hash();
        info!(tx_hash = %tx_hash, nonce, "Data root tuple root sent");

        let receipt = pending_tx
            .get_receipt()
            .await
            .map_err(|e| eyre!("Failed to get receipt: {}", e))?;

        if !receipt.status() {
            return Err(eyre!("submitDataRootTupleRoot transaction reverted"));
        }

        Ok(tx_hash)
    }
}
