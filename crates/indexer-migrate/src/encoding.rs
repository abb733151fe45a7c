//! Canonical Ethereum encodings used while migrating rows.
//!
//! Logs are re-encoded as RLP `[address, topics, data]` and addressed by the
//! blockstore key of their keccak-256 multihash, the same key layout the v2
//! indexer wrote to `public.blocks`. Headers and transactions are only decoded
//! far enough to recover the fields the v3 schema adds.

use std::str::FromStr;

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, Header, RlpEncodable};
use data_encoding::BASE32_NOPAD;
use thiserror::Error;

/// Prefix of every key in `public.blocks`.
pub const BLOCKSTORE_PREFIX: &str = "/blocks/";

/// Multicodec code of keccak-256 in a multihash.
const KECCAK_256_MULTIHASH: u8 = 0x1b;
const KECCAK_256_LENGTH: u8 = 0x20;

const ACCESS_LIST_TX_TYPE: u8 = 0x01;
const DYNAMIC_FEE_TX_TYPE: u8 = 0x02;
const BLOB_TX_TYPE: u8 = 0x03;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("rlp: {0}")]
    Rlp(#[from] alloy_rlp::Error),

    #[error("invalid hex field {field}: {value}")]
    Hex { field: &'static str, value: String },

    #[error("unsupported transaction type {0:#04x}")]
    UnsupportedTxType(u8),

    #[error("empty payload")]
    Empty,
}

/// An Ethereum log in consensus encoding order.
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable)]
pub struct CanonicalLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl CanonicalLog {
    /// Build a log from the column values stored in `eth.log_cids`.
    ///
    /// Topics are taken in slot order and empty slots are skipped.
    pub fn from_columns(address: &str, topics: [Option<&str>; 4], data: &[u8]) -> Result<Self, CodecError> {
        let address = Address::from_str(address.trim()).map_err(|_| CodecError::Hex {
            field: "address",
            value: address.to_string(),
        })?;

        let mut parsed = Vec::with_capacity(4);
        for topic in topics.into_iter().flatten() {
            let topic = topic.trim();
            if topic.is_empty() {
                continue;
            }
            let hash = B256::from_str(topic).map_err(|_| CodecError::Hex {
                field: "topic",
                value: topic.to_string(),
            })?;
            parsed.push(hash);
        }

        Ok(Self {
            address,
            topics: parsed,
            data: Bytes::copy_from_slice(data),
        })
    }

    /// RLP bytes of the log.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length());
        Encodable::encode(self, &mut out);
        out
    }

    /// Canonical bytes together with their blockstore key.
    pub fn encode_with_key(&self) -> (Vec<u8>, String) {
        let bytes = self.encode();
        let key = blockstore_key(&bytes);
        (bytes, key)
    }
}

/// Blockstore key for a keccak-256 addressed blob:
/// `/blocks/` followed by the unpadded base32 form of the multihash.
pub fn blockstore_key(data: &[u8]) -> String {
    let digest = keccak256(data);
    let mut multihash = Vec::with_capacity(2 + digest.len());
    multihash.push(KECCAK_256_MULTIHASH);
    multihash.push(KECCAK_256_LENGTH);
    multihash.extend_from_slice(digest.as_slice());
    format!("{}{}", BLOCKSTORE_PREFIX, BASE32_NOPAD.encode(&multihash))
}

/// Checksummed beneficiary address of an RLP encoded block header.
pub fn header_coinbase(raw: &[u8]) -> Result<String, CodecError> {
    let mut fields = list_payload(raw)?;
    B256::decode(&mut fields)?; // parent hash
    B256::decode(&mut fields)?; // ommers hash
    let coinbase = Address::decode(&mut fields)?;
    Ok(coinbase.to_checksum(None))
}

/// Decimal value transferred by a raw (legacy or typed) transaction.
pub fn transaction_value(raw: &[u8]) -> Result<String, CodecError> {
    let first = *raw.first().ok_or(CodecError::Empty)?;

    // legacy: [nonce, gas_price, gas, to, value, ...]
    // 2930:   [chain_id, nonce, gas_price, gas, to, value, ...]
    // 1559/4844: [chain_id, nonce, max_priority_fee, max_fee, gas, to, value, ...]
    let (mut fields, skip) = if first >= alloy_rlp::EMPTY_LIST_CODE {
        (list_payload(raw)?, 4)
    } else {
        let skip = match first {
            ACCESS_LIST_TX_TYPE => 5,
            DYNAMIC_FEE_TX_TYPE | BLOB_TX_TYPE => 6,
            other => return Err(CodecError::UnsupportedTxType(other)),
        };
        (list_payload(&raw[1..])?, skip)
    };

    for _ in 0..skip {
        skip_item(&mut fields)?;
    }
    let value = U256::decode(&mut fields)?;
    Ok(value.to_string())
}

fn list_payload(raw: &[u8]) -> Result<&[u8], CodecError> {
    let mut buf = raw;
    Ok(Header::decode_bytes(&mut buf, true)?)
}

fn skip_item(buf: &mut &[u8]) -> Result<(), CodecError> {
    let header = Header::decode(buf)?;
    if buf.len() < header.payload_length {
        return Err(alloy_rlp::Error::InputTooShort.into());
    }
    *buf = &buf[header.payload_length..];
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const ADDRESS: &str = "0x5a0b54d5dc17e0aadc383d2db43b0a0d3e029c4c";
    pub(crate) const TOPIC0: &str =
        "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
    pub(crate) const TOPIC1: &str =
        "0x000000000000000000000000000000000000000000000000000000000000dead";

    #[test]
    fn test_log_encoding_matches_consensus_layout() {
        let log = CanonicalLog::from_columns(ADDRESS, [Some(TOPIC0), None, None, None], &[0xaa])
            .unwrap();
        let encoded = log.encode();

        let mut fields = list_payload(&encoded).unwrap();
        assert_eq!(Address::decode(&mut fields).unwrap(), Address::from_str(ADDRESS).unwrap());
        assert_eq!(
            Vec::<B256>::decode(&mut fields).unwrap(),
            vec![B256::from_str(TOPIC0).unwrap()]
        );
        assert_eq!(Bytes::decode(&mut fields).unwrap(), Bytes::from_static(&[0xaa]));
        assert!(fields.is_empty());
    }

    #[test]
    fn test_empty_topic_slots_are_skipped() {
        let sparse = CanonicalLog::from_columns(ADDRESS, [Some(TOPIC0), Some(""), Some(TOPIC1), None], b"")
            .unwrap();
        let dense = CanonicalLog::from_columns(ADDRESS, [Some(TOPIC0), Some(TOPIC1), None, None], b"")
            .unwrap();
        assert_eq!(sparse.topics.len(), 2);
        assert_eq!(sparse.encode(), dense.encode());
    }

    #[test]
    fn test_bad_hex_is_rejected() {
        assert!(CanonicalLog::from_columns("0xnothex", [None, None, None, None], b"").is_err());
        assert!(CanonicalLog::from_columns(ADDRESS, [Some("0x1234"), None, None, None], b"").is_err());
    }

    #[test]
    fn test_blockstore_key_layout() {
        let key = blockstore_key(b"");
        assert!(key.starts_with(BLOCKSTORE_PREFIX));
        let encoded = &key[BLOCKSTORE_PREFIX.len()..];
        let multihash = BASE32_NOPAD.decode(encoded.as_bytes()).unwrap();
        assert_eq!(multihash.len(), 34);
        assert_eq!(&multihash[..2], &[0x1b, 0x20]);
        assert_eq!(&multihash[2..], keccak256(b"").as_slice());
        assert!(encoded.chars().all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        assert!(!encoded.contains('='));
    }

    #[test]
    fn test_encode_with_key_is_deterministic() {
        let log = CanonicalLog::from_columns(ADDRESS, [Some(TOPIC0), Some(TOPIC1), None, None], b"payload")
            .unwrap();
        assert_eq!(log.encode_with_key(), log.encode_with_key());
    }

    fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
        let payload: Vec<u8> = items.concat();
        let mut out = Vec::new();
        Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend(payload);
        out
    }

    fn rlp<T: Encodable>(value: T) -> Vec<u8> {
        let mut out = Vec::new();
        value.encode(&mut out);
        out
    }

    #[test]
    fn test_header_coinbase() {
        let coinbase = Address::from_str(ADDRESS).unwrap();
        let raw = rlp_list(&[
            rlp(B256::repeat_byte(1)),
            rlp(B256::repeat_byte(2)),
            rlp(coinbase),
            rlp(B256::repeat_byte(3)),
        ]);
        assert_eq!(header_coinbase(&raw).unwrap(), coinbase.to_checksum(None));
        assert!(header_coinbase(&[0x01]).is_err());
    }

    #[test]
    fn test_transaction_value_for_each_envelope() {
        let to = rlp(Address::repeat_byte(9));
        let value = rlp(U256::from(1_000_000_007u64));

        let legacy = rlp_list(&[rlp(1u64), rlp(2u64), rlp(21000u64), to.clone(), value.clone(), rlp(Bytes::new())]);
        assert_eq!(transaction_value(&legacy).unwrap(), "1000000007");

        let mut access_list = vec![ACCESS_LIST_TX_TYPE];
        access_list.extend(rlp_list(&[rlp(1u64), rlp(0u64), rlp(2u64), rlp(21000u64), to.clone(), value.clone()]));
        assert_eq!(transaction_value(&access_list).unwrap(), "1000000007");

        let mut dynamic = vec![DYNAMIC_FEE_TX_TYPE];
        dynamic.extend(rlp_list(&[
            rlp(1u64),
            rlp(0u64),
            rlp(1u64),
            rlp(2u64),
            rlp(21000u64),
            to,
            value,
        ]));
        assert_eq!(transaction_value(&dynamic).unwrap(), "1000000007");

        assert!(matches!(transaction_value(&[0x7f, 0xc0]), Err(CodecError::UnsupportedTxType(0x7f))));
        assert!(matches!(transaction_value(&[]), Err(CodecError::Empty)));
    }
}
