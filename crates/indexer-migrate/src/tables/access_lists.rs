use tokio_postgres::Row;

use super::{Column, FromPgRow, NewRows, OldRows, TableName, TableSpec, ToColumns};
use crate::error::Result;
use crate::range::BlockRange;
use crate::transform::{mismatched_rows, Continuity, Transformed, Transformer};

// Storage keys travel as array literals so each row keeps its own key list
// through unnest.
pub(super) const SPEC: TableSpec = TableSpec {
    name: TableName::AccessListElements,
    read_query: "SELECT header_cids.block_number::TEXT AS block_number, transaction_cids.tx_hash,
            access_list_elements.index::BIGINT AS index, access_list_elements.address,
            access_list_elements.storage_keys::TEXT[] AS storage_keys
        FROM eth.access_list_elements
        INNER JOIN eth.transaction_cids ON (access_list_elements.tx_id = transaction_cids.id)
        INNER JOIN eth.header_cids ON (transaction_cids.header_id = header_cids.id)
        WHERE header_cids.block_number BETWEEN $1 AND $2
        ORDER BY header_cids.block_number",
    write_query: "INSERT INTO eth.access_list_elements (tx_id, index, address, storage_keys)
        SELECT tx_id, index, address, storage_keys::VARCHAR(66)[]
        FROM unnest($1::TEXT[], $2::BIGINT[], $3::TEXT[], $4::TEXT[])
            AS t(tx_id, index, address, storage_keys)
        ON CONFLICT DO NOTHING",
    continuity: Continuity::None,
    must_exist: false,
    read_failure_gap: None,
    height_segmented: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListElementV2 {
    pub block_number: String,
    pub tx_hash: String,
    pub index: i64,
    pub address: Option<String>,
    pub storage_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListElementV3 {
    pub tx_id: String,
    pub index: i64,
    pub address: Option<String>,
    pub storage_keys: Option<Vec<String>>,
}

impl AccessListElementV3 {
    /// Postgres array literal of the storage keys, e.g. `{0xab,0xcd}`.
    fn storage_keys_literal(&self) -> Option<String> {
        self.storage_keys
            .as_ref()
            .map(|keys| format!("{{{}}}", keys.join(",")))
    }
}

impl FromPgRow for AccessListElementV2 {
    fn from_pg_row(row: &Row) -> std::result::Result<Self, tokio_postgres::Error> {
        Ok(Self {
            block_number: row.try_get("block_number")?,
            tx_hash: row.try_get("tx_hash")?,
            index: row.try_get("index")?,
            address: row.try_get("address")?,
            storage_keys: row.try_get("storage_keys")?,
        })
    }
}

impl ToColumns for AccessListElementV3 {
    fn to_columns(rows: &[Self]) -> Vec<Column> {
        vec![
            Box::new(rows.iter().map(|r| r.tx_id.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.index).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.address.clone()).collect::<Vec<_>>()),
            Box::new(rows.iter().map(|r| r.storage_keys_literal()).collect::<Vec<_>>()),
        ]
    }
}

pub struct AccessListTransformer;

impl Transformer for AccessListTransformer {
    fn transform(&self, rows: OldRows, expected: BlockRange) -> Result<Transformed> {
        let elements = match rows {
            OldRows::AccessListElements(elements) => elements,
            other => return Err(mismatched_rows(TableName::AccessListElements, expected, &other)),
        };
        let out = elements
            .into_iter()
            .map(|e| AccessListElementV3 {
                tx_id: e.tx_hash,
                index: e.index,
                address: e.address,
                storage_keys: e.storage_keys,
            })
            .collect();
        Ok(Transformed::complete(NewRows::AccessListElements(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elements_keyed_by_tx_hash() {
        let element = AccessListElementV2 {
            block_number: "12244000".into(),
            tx_hash: "0xtx".into(),
            index: 0,
            address: Some("0xaddr".into()),
            storage_keys: Some(vec!["0x01".into(), "0x02".into()]),
        };
        let out = AccessListTransformer
            .transform(OldRows::AccessListElements(vec![element]), BlockRange::new(12244000, 12244000))
            .unwrap();
        match out.rows {
            NewRows::AccessListElements(rows) => {
                assert_eq!(rows[0].tx_id, "0xtx");
                assert_eq!(rows[0].storage_keys_literal().as_deref(), Some("{0x01,0x02}"));
            }
            other => panic!("unexpected rows {:?}", other),
        }
    }

    #[test]
    fn test_empty_key_list_literal() {
        let element = AccessListElementV3 {
            tx_id: "0xtx".into(),
            index: 1,
            address: None,
            storage_keys: Some(vec![]),
        };
        assert_eq!(element.storage_keys_literal().as_deref(), Some("{}"));
    }
}
