use rusqlite::{params, Transaction};

use crate::error::CoreResult;
use crate::time::{to_rfc3339, LocalTime};

pub fn insert(
    tx: &Transaction,
    order_id: i64,
    order_snapshot_json: &str,
    deleted_by: &str,
    motivo: &str,
    now: LocalTime,
    ip_address: Option<&str>,
) -> CoreResult<()> {
    tx.execute(
        "INSERT INTO order_delete_audit \
         (order_id, order_snapshot_json, deleted_by, motivo, deleted_at, ip_address) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            order_id,
            order_snapshot_json,
            deleted_by,
            motivo,
            to_rfc3339(now),
            ip_address,
        ],
    )?;
    Ok(())
}
