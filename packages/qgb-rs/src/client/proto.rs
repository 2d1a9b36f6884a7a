//! Protobuf encodings of the confirm transaction messages

use cosmrs::Any;
use prost::Message;

use crate::types::{DataCommitmentConfirm, ValsetConfirm};

pub const MSG_VALSET_CONFIRM_TYPE_URL: &str = "/qgb.MsgValsetConfirm";
pub const MSG_DATA_COMMITMENT_CONFIRM_TYPE_URL: &str = "/qgb.MsgDataCommitmentConfirm";

/// MsgValsetConfirm carries an orchestrator's signature over a valset update
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgValsetConfirm {
    #[prost(uint64, tag = "1")]
    pub nonce: u64,
    #[prost(string, tag = "2")]
    pub orchestrator: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub eth_address: ::prost::alloc::string::String,
    /// hex-encoded 65-byte signature
    #[prost(string, tag = "4")]
    pub signature: ::prost::alloc::string::String,
}

/// MsgDataCommitmentConfirm carries an orchestrator's signature over a tuple root
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MsgDataCommitmentConfirm {
    #[prost(string, tag = "1")]
    pub signature: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub validator_address: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub eth_address: ::prost::alloc::string::String,
    /// hex-encoded tuple root
    #[prost(string, tag = "4")]
    pub commitment: ::prost::alloc::string::String,
    #[prost(uint64, tag = "5")]
    pub begin_block: u64,
    #[prost(uint64, tag = "6")]
    pub end_block: u64,
    #[prost(uint64, tag = "7")]
    pub nonce: u64,
}

impl From<ValsetConfirm> for MsgValsetConfirm {
    fn from(c: ValsetConfirm) -> Self {
        Self {
            nonce: c.nonce,
            orchestrator: c.orchestrator,
            eth_address: c.eth_address,
            signature: c.signature,
        }
    }
}

impl From<DataCommitmentConfirm> for MsgDataCommitmentConfirm {
    fn from(c: DataCommitmentConfirm) -> Self {
        Self {
            signature: c.signature,
            validator_address: c.validator_address,
            eth_address: c.eth_address,
            commitment: c.commitment,
            begin_block: c.begin_block,
            end_block: c.end_block,
            nonce: c.nonce,
        }
    }
}

impl MsgValsetConfirm {
    pub fn to_any(&self) -> Any {
        Any {
            type_url: MSG_VALSET_CONFIRM_TYPE_URL.to_string(),
            value: self.encode_to_vec(),
        }
    }
}

impl MsgDataCommitmentConfirm {
    pub fn to_any(&self) -> Any {
        Any {
            type_url: MSG_DATA_COMMITMENT_CONFIRM_TYPE_URL.to_string(),
            value: self.encode_to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valset_confirm_any() {
        let msg = MsgValsetConfirm::from(ValsetConfirm {
            nonce: 3,
            orchestrator: "celestia1abc".to_string(),
            eth_address: "0x9c2B12b5a07FC6D719Ed7646e5041A7E85758329".to_string(),
            signature: "00".repeat(65),
        });
        let any = msg.to_any();
        assert_eq!(any.type_url, MSG_VALSET_CONFIRM_TYPE_URL);
        // field 1, varint 3
        assert_eq!(&any.value[..2], &[0x08, 0x03]);
        assert_eq!(MsgValsetConfirm::decode(any.value.as_slice()).unwrap(), msg);
    }

    #[test]
    fn test_data_commitment_confirm_field_order() {
        let msg = MsgDataCommitmentConfirm::from(DataCommitmentConfirm {
            nonce: 2,
            begin_block: 1,
            end_block: 401,
            validator_address: "celestia1abc".to_string(),
            eth_address: "0x9c2B12b5a07FC6D719Ed7646e5041A7E85758329".to_string(),
            commitment: "11".repeat(32),
            signature: "22".repeat(65),
        });
        let any = msg.to_any();
        assert_eq!(any.type_url, MSG_DATA_COMMITMENT_CONFIRM_TYPE_URL);
        // signature is field 1, length-delimited
        assert_eq!(any.value[0], 0x0a);
    }
}
