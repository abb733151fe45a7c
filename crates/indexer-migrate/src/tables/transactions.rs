use tokio_postgres::Row;

use super::{Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::encoding::transaction_value;
use crate::error::{MigrateError, Result};
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, Transformed, Transformer};

pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::Transactions,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number, header_cids.block_hash,
            transaction_cids.tx_hash, transaction_cids.index::BIGINT AS index, transaction_cids.cid,
            transaction_cids.mh_key, transaction_cids.dst, transaction_cids.src,
            transaction_cids.tx_data, transaction_cids.tx_type::INTEGER AS tx_type, blocks.data
        FROM eth.transaction_cids
        INNER JOIN eth.header_cids ON (transaction_cids.header_id = header_cids.id)
        INNER JOIN public.blocks ON (transaction_cids.mh_key = blocks.key)
        WHERE header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number, transaction_cids.index",
    write_query: "INSERT INTO eth.transaction_cids (header_id, index, tx_hash, cid, mh_key, dst, src,
            tx_data, tx_type, value)
        SELECT header_id, index, tx_hash, cid, mh_key, dst, src, tx_data, tx_type, value::NUMERIC
        FROM unnest($1::TEXT[], $2::BIGINT[], $3::TEXT[], $4::TEXT[], $5::TEXT[], $6::TEXT[],
            $7::TEXT[], $8::BYTEA[], $9::INTEGER[], $10::TEXT[])
            AS t(header_id, index, tx_hash, cid, mh_key, dst, src, tx_data, tx_type, value)
        ON CONFLICT DO NOTHING",
    continuity: Continuity::None,
    must_exist: false,
    read_failure_gap: None,
    height_segmented: true,
};

/// `eth.transaction_cids` row joined with its header hash and raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionV2 {
    pub block_number: String,
    pub block_hash: String,
    pub tx_hash: String,
    pub index: i64,
    pub cid: String,
    pub mh_key: String,
    pub dst: String,
    pub src: String,
    pub tx_data: Option<Vec<u8>>,
    pub tx_type: Option<i32>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionV3 {
    pub header_id: String,
    pub index: i64,
    pub tx_hash: String,
    pub cid: String,
    pub mh_key: String,
    pub dst: String,
    pub src: String,
    pub tx_data: Option<Vec<u8>>,
    pub tx_type: i32,
    pub value: String,
}

impl FromPgRow for TransactionV2 {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            block_hash: row.try_get("block_hash")?,
            tx_hash: row.try_get("tx_hash")?,
            index: row.try_get("index")?,
            cid: row.try_get("cid")?,
            mh_key: row.try_get("mh_key")?,
            dst: row.try_get("dst")?,
            src: row.try_get("src")?,
            tx_data: row.try_get("tx_data")?,
            tx_type: row.try_get("tx_type")?,
            data: row.try_get("data")?,
        })
    }
}

impl ToColumns for TransactionV3 {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.header_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.index).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.tx_hash.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.cid.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.mh_key.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.dst.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.src.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.tx_data.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.tx_type).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.value.clone()).collect::<Vec<_>>()),
        ]
    }
}

/// Re-keys transactions by header hash and recovers the transferred value
/// from the raw transaction.
pub struct TransactionTransformer;

impl Transformer for TransactionTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let txs = match rows {
            OldRows::Transactions(txs) => txs,
            other => return Err(mismatched_rows(TableName::Transactions, expected, &other)),
        };

        let mut out = Vec::with_capacity(txs.len());
        for tx in txs {
            let value = transaction_value(&tx.data).map_err(|e| {
                MigrateError::transform(
                    TableName::Transactions,
                    expected,
                    format!("transaction {}: {}", tx.tx_hash, e),
                )
            })?;
            out.push(TransactionV3 {
                header_id: tx.block_hash,
                index: tx.index,
                tx_hash: tx.tx_hash,
                cid: tx.cid,
                mh_key: tx.mh_key,
                dst: tx.dst,
                src: tx.src,
                tx_data: tx.tx_data,
                tx_type: tx.tx_type.unwrap_or(0),
                value,
            });
        }

        Ok(Transformed::complete(NewRows::Transactions(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes, U256};
    use alloy_rlp::Encodable;

    fn legacy_tx(value: u64) -> Vec<u8> {
        let mut payload = Vec::new();
        1u64.encode(&mut payload);
        20_000_000_000u64.encode(&mut payload);
        21_000u64.encode(&mut payload);
        Address::repeat_byte(7).encode(&mut payload);
        U256::from(value).encode(&mut payload);
        Bytes::new().encode(&mut payload);
        let mut out = Vec::new();
        alloy_rlp::Header {
            list: true,
            payload_length: payload.len(),
        }
        .encode(&mut out);
        out.extend(payload);
        out
    }

    fn tx(tx_type: Option<i32>, data: Vec<u8>) -> TransactionV2 {
        TransactionV2 {
            block_number: "46147".into(),
            block_hash: "0xheader".into(),
            tx_hash: "0xtx".into(),
            index: 0,
            cid: "cid".into(),
            mh_key: "/blocks/T".into(),
            dst: "0xdst".into(),
            src: "0xsrc".into(),
            tx_data: None,
            tx_type,
            data,
        }
    }

    #[test]
    fn test_value_and_header_key() {
        let out = TransactionTransformer
            .transform(
                OldRows::Transactions(vec![tx(None, legacy_tx(31337))]),
                BlockRange::new(46147, 46147),
            )
            .unwrap();
        match out.rows {
            NewRows::Transactions(rows) => {
                assert_eq!(rows[0].value, "31337");
                assert_eq!(rows[0].header_id, "0xheader");
                assert_eq!(rows[0].tx_type, 0);
            }
            other => panic!("unexpected rows {:?}", other),
        }
    }

    #[test]
    fn test_undecodable_transaction_fails_range() {
        let err = TransactionTransformer
            .transform(
                OldRows::Transactions(vec![tx(Some(2), vec![0x02, 0x01])]),
                BlockRange::new(1, 1),
            )
            .unwrap_err();
        assert!(err.to_string().contains("0xtx"));
    }
}
