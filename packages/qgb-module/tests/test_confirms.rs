//! Confirm acceptance and EVM address registry tests

use alloy::primitives::B256;
use bech32::{ToBase32, Variant};
use cosmwasm_std::testing::{
    mock_dependencies, mock_env, mock_info, MockApi, MockQuerier, MockStorage,
};
use cosmwasm_std::{from_json, Env, OwnedDeps, Response};
use serde::de::DeserializeOwned;

use qgb_module::contract::{execute, instantiate, query, sudo};
use qgb_module::msg::{
    DataCommitmentConfirmResponse, EvmAddressResponse, ExecuteMsg, InstantiateMsg,
    LatestValsetResponse, ParamsResponse, QueryMsg, StakingValidator, SudoMsg,
    ValsetConfirmResponse, ValsetConfirmsResponse,
};
use qgb_module::ModuleError;
use qgb_rs::{EncoderConfig, EvmEncoder, EvmSigner, Params, Valset};

type Deps = OwnedDeps<MockStorage, MockApi, MockQuerier>;

// ============================================================================
// Test Setup
// ============================================================================

const BRIDGE_ID: [u8; 32] = [0xbb; 32];

fn encode(prefix: &str, byte: u8) -> String {
    bech32::encode(prefix, [byte; 20].to_base32(), Variant::Bech32).unwrap()
}

fn valoper(i: u8) -> String {
    encode("celestiavaloper", i)
}

/// Account address of the validator operator key
fn operator_account(i: u8) -> String {
    encode("celestia", i)
}

fn orchestrator(i: u8) -> String {
    encode("celestia", 100 + i)
}

fn signer(i: u8) -> EvmSigner {
    EvmSigner::from_hex(&format!("{:064x}", i as u64 + 1)).unwrap()
}

fn encoder() -> EvmEncoder {
    EvmEncoder::new(EncoderConfig::new(B256::from(BRIDGE_ID)))
}

fn env_at(height: u64) -> Env {
    let mut env = mock_env();
    env.block.height = height;
    env
}

fn params() -> Params {
    Params {
        data_commitment_window: 100,
        significant_power_diff_bps: 500,
        pruning_threshold: 100_000,
    }
}

fn register(deps: &mut Deps, i: u8) -> Result<Response, ModuleError> {
    execute(
        deps.as_mut(),
        mock_env(),
        mock_info(&operator_account(i), &[]),
        ExecuteMsg::RegisterEvmAddress {
            validator: valoper(i),
            orchestrator: orchestrator(i),
            evm_address: signer(i).address().to_checksum(None),
        },
    )
}

fn end_block(deps: &mut Deps, height: u64) {
    let validators = (1..=3)
        .map(|i| StakingValidator {
            operator: valoper(i),
            power: 100,
        })
        .collect();
    sudo(deps.as_mut(), env_at(height), SudoMsg::EndBlock { validators }).unwrap();
}

/// Three registered validators, valset 1 at height 1
fn setup() -> (Deps, Valset) {
    let mut deps = mock_dependencies();
    instantiate(
        deps.as_mut(),
        mock_env(),
        mock_info("admin", &[]),
        InstantiateMsg {
            admin: "admin".to_string(),
            bridge_id: hex::encode(BRIDGE_ID),
            valset_domain_separator: None,
            data_root_domain_separator: None,
            params: Some(params()),
        },
    )
    .unwrap();

    for i in 1..=3 {
        sudo(
            deps.as_mut(),
            env_at(1),
            SudoMsg::AfterValidatorCreated {
                operator: valoper(i),
            },
        )
        .unwrap();
        register(&mut deps, i).unwrap();
    }
    end_block(&mut deps, 1);

    let valset = query_json::<LatestValsetResponse>(&deps, QueryMsg::LatestValset {})
        .valset
        .unwrap();
    (deps, valset)
}

fn query_json<T: DeserializeOwned>(deps: &Deps, msg: QueryMsg) -> T {
    from_json(query(deps.as_ref(), mock_env(), msg).unwrap()).unwrap()
}

fn valset_confirm_msg(nonce: u64, i: u8, eth_signer: &EvmSigner, digest: B256) -> ExecuteMsg {
    ExecuteMsg::ValsetConfirm {
        nonce,
        orchestrator: orchestrator(i),
        eth_address: signer(i).address().to_checksum(None),
        signature: eth_signer.sign_digest(digest).unwrap().to_hex(),
    }
}

fn send(deps: &mut Deps, sender: &str, msg: ExecuteMsg) -> Result<Response, ModuleError> {
    execute(deps.as_mut(), mock_env(), mock_info(sender, &[]), msg)
}

// ============================================================================
// Valset Confirms
// ============================================================================

#[test]
fn test_valset_uses_registered_addresses() {
    let (_deps, valset) = setup();
    for i in 1..=3 {
        assert!(valset.member(&signer(i).address()).is_some());
    }
}

#[test]
fn test_valset_confirm_accepted() {
    let (mut deps, valset) = setup();
    let digest = encoder().valset_digest(&valset);

    send(
        &mut deps,
        &orchestrator(1),
        valset_confirm_msg(1, 1, &signer(1), digest),
    )
    .unwrap();

    let stored = query_json::<ValsetConfirmResponse>(
        &deps,
        QueryMsg::ValsetConfirm {
            nonce: 1,
            orchestrator: orchestrator(1),
        },
    );
    assert!(stored.confirm.is_some());

    let by_eth = query_json::<ValsetConfirmResponse>(
        &deps,
        QueryMsg::ValsetConfirmByEthAddress {
            nonce: 1,
            eth_address: format!("{:#x}", signer(1).address()),
        },
    );
    assert_eq!(by_eth.confirm, stored.confirm);
}

#[test]
fn test_valset_confirm_resubmission_replaces() {
    let (mut deps, valset) = setup();
    let digest = encoder().valset_digest(&valset);

    for _ in 0..2 {
        send(
            &mut deps,
            &orchestrator(2),
            valset_confirm_msg(1, 2, &signer(2), digest),
        )
        .unwrap();
    }

    let confirms = query_json::<ValsetConfirmsResponse>(
        &deps,
        QueryMsg::ValsetConfirmsByNonce { nonce: 1 },
    );
    assert_eq!(confirms.confirms.len(), 1);
}

#[test]
fn test_valset_confirm_wrong_signer_rejected() {
    let (mut deps, valset) = setup();
    let digest = encoder().valset_digest(&valset);

    // orchestrator 1 submits a signature made with key 2
    let err = send(
        &mut deps,
        &orchestrator(1),
        valset_confirm_msg(1, 1, &signer(2), digest),
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::InvalidSignature { .. }));

    // signature over a different digest
    let err = send(
        &mut deps,
        &orchestrator(1),
        valset_confirm_msg(1, 1, &signer(1), B256::repeat_byte(1)),
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::InvalidSignature { .. }));
}

#[test]
fn test_valset_confirm_validation_errors() {
    let (mut deps, valset) = setup();
    let digest = encoder().valset_digest(&valset);
    let signature = signer(1).sign_digest(digest).unwrap().to_hex();

    // sender is not the orchestrator
    let err = send(
        &mut deps,
        &orchestrator(2),
        valset_confirm_msg(1, 1, &signer(1), digest),
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::InvalidAddress { .. }));

    // EVM address of another validator
    let err = send(
        &mut deps,
        &orchestrator(1),
        ExecuteMsg::ValsetConfirm {
            nonce: 1,
            orchestrator: orchestrator(1),
            eth_address: signer(2).address().to_checksum(None),
            signature: signature.clone(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::EvmAddressMismatch { .. }));

    // malformed EVM address
    let err = send(
        &mut deps,
        &orchestrator(1),
        ExecuteMsg::ValsetConfirm {
            nonce: 1,
            orchestrator: orchestrator(1),
            eth_address: "0x1234".to_string(),
            signature: signature.clone(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::InvalidEvmAddress { .. }));

    // truncated signature
    let err = send(
        &mut deps,
        &orchestrator(1),
        ExecuteMsg::ValsetConfirm {
            nonce: 1,
            orchestrator: orchestrator(1),
            eth_address: signer(1).address().to_checksum(None),
            signature: signature[..128].to_string(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::InvalidSignature { .. }));

    // unknown nonce
    let err = send(
        &mut deps,
        &orchestrator(1),
        valset_confirm_msg(7, 1, &signer(1), digest),
    )
    .unwrap_err();
    assert_eq!(err, ModuleError::AttestationNotFound { nonce: 7 });
}

#[test]
fn test_unregistered_orchestrator_rejected() {
    let (mut deps, valset) = setup();
    let digest = encoder().valset_digest(&valset);
    let stranger = orchestrator(9);

    let err = send(
        &mut deps,
        &stranger,
        ExecuteMsg::ValsetConfirm {
            nonce: 1,
            orchestrator: stranger.clone(),
            eth_address: signer(9).address().to_checksum(None),
            signature: signer(9).sign_digest(digest).unwrap().to_hex(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::OrchestratorNotRegistered { .. }));
}

// ============================================================================
// Data Commitment Confirms
// ============================================================================

fn data_commitment_confirm_msg(
    i: u8,
    begin_block: u64,
    end_block: u64,
    commitment: B256,
) -> ExecuteMsg {
    let digest = encoder().data_commitment_digest(2, commitment);
    ExecuteMsg::DataCommitmentConfirm {
        nonce: 2,
        begin_block,
        end_block,
        validator_address: orchestrator(i),
        eth_address: signer(i).address().to_checksum(None),
        commitment: hex::encode(commitment),
        signature: signer(i).sign_digest(digest).unwrap().to_hex(),
    }
}

#[test]
fn test_data_commitment_confirm_accepted() {
    let (mut deps, _) = setup();
    end_block(&mut deps, 100);
    let commitment = B256::repeat_byte(7);

    send(
        &mut deps,
        &orchestrator(3),
        data_commitment_confirm_msg(3, 1, 101, commitment),
    )
    .unwrap();

    let stored = query_json::<DataCommitmentConfirmResponse>(
        &deps,
        QueryMsg::DataCommitmentConfirm {
            begin_block: 1,
            end_block: 101,
            orchestrator: orchestrator(3),
        },
    );
    let confirm = stored.confirm.unwrap();
    assert_eq!(confirm.nonce, 2);
    assert_eq!(confirm.commitment, hex::encode(commitment));

    let by_eth = query_json::<DataCommitmentConfirmResponse>(
        &deps,
        QueryMsg::DataCommitmentConfirmByEthAddress {
            begin_block: 1,
            end_block: 101,
            eth_address: signer(3).address().to_checksum(None),
        },
    );
    assert!(by_eth.confirm.is_some());
}

#[test]
fn test_data_commitment_confirm_validation_errors() {
    let (mut deps, valset) = setup();
    end_block(&mut deps, 100);
    let commitment = B256::repeat_byte(7);

    let err = send(
        &mut deps,
        &orchestrator(1),
        data_commitment_confirm_msg(1, 1, 201, commitment),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ModuleError::RangeMismatch {
            nonce: 2,
            begin_block: 1,
            end_block: 201,
        }
    );

    let mut bad_commitment = data_commitment_confirm_msg(1, 1, 101, commitment);
    if let ExecuteMsg::DataCommitmentConfirm { commitment, .. } = &mut bad_commitment {
        *commitment = "abcd".to_string();
    }
    let err = send(&mut deps, &orchestrator(1), bad_commitment).unwrap_err();
    assert!(matches!(err, ModuleError::InvalidCommitment { .. }));

    // a valset confirm aimed at the data commitment nonce
    let digest = encoder().valset_digest(&valset);
    let err = send(
        &mut deps,
        &orchestrator(1),
        valset_confirm_msg(2, 1, &signer(1), digest),
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::WrongAttestationKind { nonce: 2, .. }));
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_hook_assigns_default_evm_address() {
    let mut deps = mock_dependencies();
    instantiate(
        deps.as_mut(),
        mock_env(),
        mock_info("admin", &[]),
        InstantiateMsg {
            admin: "admin".to_string(),
            bridge_id: hex::encode(BRIDGE_ID),
            valset_domain_separator: None,
            data_root_domain_separator: None,
            params: None,
        },
    )
    .unwrap();

    sudo(
        deps.as_mut(),
        mock_env(),
        SudoMsg::AfterValidatorCreated {
            operator: valoper(4),
        },
    )
    .unwrap();

    let record = query_json::<EvmAddressResponse>(
        &deps,
        QueryMsg::EvmAddress {
            validator: valoper(4),
        },
    )
    .record
    .unwrap();
    assert_eq!(
        record.evm_address.to_lowercase(),
        format!("0x{}", "04".repeat(20))
    );
    assert_eq!(record.orchestrator, None);
}

#[test]
fn test_register_requires_operator_key() {
    let (mut deps, _) = setup();

    let err = execute(
        deps.as_mut(),
        mock_env(),
        mock_info(&operator_account(2), &[]),
        ExecuteMsg::RegisterEvmAddress {
            validator: valoper(1),
            orchestrator: orchestrator(1),
            evm_address: signer(5).address().to_checksum(None),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::NotValidatorOperator { .. }));

    // validator never went through the creation hook
    let err = register(&mut deps, 8).unwrap_err();
    assert!(matches!(err, ModuleError::UnknownValidator { .. }));
}

#[test]
fn test_register_rejects_taken_evm_address() {
    let (mut deps, _) = setup();

    let err = execute(
        deps.as_mut(),
        mock_env(),
        mock_info(&operator_account(2), &[]),
        ExecuteMsg::RegisterEvmAddress {
            validator: valoper(2),
            orchestrator: orchestrator(2),
            evm_address: signer(1).address().to_checksum(None),
        },
    )
    .unwrap_err();
    assert!(matches!(err, ModuleError::EvmAddressTaken { .. }));

    // moving validator 1 to a new key frees the old one
    execute(
        deps.as_mut(),
        mock_env(),
        mock_info(&operator_account(1), &[]),
        ExecuteMsg::RegisterEvmAddress {
            validator: valoper(1),
            orchestrator: orchestrator(1),
            evm_address: signer(6).address().to_checksum(None),
        },
    )
    .unwrap();
    execute(
        deps.as_mut(),
        mock_env(),
        mock_info(&operator_account(2), &[]),
        ExecuteMsg::RegisterEvmAddress {
            validator: valoper(2),
            orchestrator: orchestrator(2),
            evm_address: signer(1).address().to_checksum(None),
        },
    )
    .unwrap();
}

// ============================================================================
// Admin
// ============================================================================

#[test]
fn test_update_params() {
    let (mut deps, _) = setup();
    let mut new_params = params();
    new_params.data_commitment_window = 200;

    let err = send(
        &mut deps,
        "someone",
        ExecuteMsg::UpdateParams {
            params: new_params.clone(),
        },
    )
    .unwrap_err();
    assert_eq!(err, ModuleError::Unauthorized);

    let mut invalid = new_params.clone();
    invalid.data_commitment_window = 10;
    let err = send(&mut deps, "admin", ExecuteMsg::UpdateParams { params: invalid }).unwrap_err();
    assert!(matches!(err, ModuleError::InvalidParams { .. }));

    send(
        &mut deps,
        "admin",
        ExecuteMsg::UpdateParams {
            params: new_params.clone(),
        },
    )
    .unwrap();
    let stored = query_json::<ParamsResponse>(&deps, QueryMsg::Params {});
    assert_eq!(stored.params, new_params);
}
