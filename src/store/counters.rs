use rusqlite::{params, OptionalExtension, Row, Transaction};

use crate::error::CoreResult;
use crate::models::BottleCounter;
use crate::time::{from_rfc3339, to_rfc3339, LocalTime};

fn row_to_counter(row: &Row) -> rusqlite::Result<BottleCounter> {
    let created_at: String = row.get("created_at")?;
    let last_updated: String = row.get("last_updated")?;
    let last_bottle_counted_at: Option<String> = row.get("last_bottle_counted_at")?;
    Ok(BottleCounter {
        id: row.get("id")?,
        id_order: row.get("id_order")?,
        quantity: row.get("quantity")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: parse_time(&created_at)?,
        last_updated: parse_time(&last_updated)?,
        last_bottle_counted_at: last_bottle_counted_at.as_deref().map(parse_time).transpose()?,
    })
}

fn parse_time(s: &str) -> rusqlite::Result<LocalTime> {
    from_rfc3339(s).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

const COUNTER_COLUMNS: &str =
    "id, id_order, quantity, is_active, created_at, last_updated, last_bottle_counted_at";

pub fn get_by_order(tx: &Transaction, id_order: i64) -> CoreResult<Option<BottleCounter>> {
    let sql = format!("SELECT {COUNTER_COLUMNS} FROM bottle_counters WHERE id_order = ?1");
    tx.query_row(&sql, params![id_order], row_to_counter)
        .optional()
        .map_err(Into::into)
}

/// spec.md invariant #6 (§8): at most one counter with `isActive = true`.
pub fn get_active(tx: &Transaction) -> CoreResult<Option<BottleCounter>> {
    let sql = format!("SELECT {COUNTER_COLUMNS} FROM bottle_counters WHERE is_active = 1 LIMIT 1");
    tx.query_row(&sql, [], row_to_counter)
        .optional()
        .map_err(Into::into)
}

fn create(tx: &Transaction, id_order: i64, now: LocalTime) -> CoreResult<BottleCounter> {
    tx.execute(
        "INSERT INTO bottle_counters (id_order, quantity, is_active, created_at, last_updated) \
         VALUES (?1, 0, 0, ?2, ?2)",
        params![id_order, to_rfc3339(now)],
    )?;
    get_by_order(tx, id_order)?.ok_or_else(|| {
        crate::error::CoreError::Internal(format!("just-inserted counter for order {id_order} vanished"))
    })
}

fn deactivate_all(tx: &Transaction) -> CoreResult<()> {
    tx.execute("UPDATE bottle_counters SET is_active = 0 WHERE is_active = 1", [])?;
    Ok(())
}

/// C8.activate (spec.md §4.8): deactivate every counter, then upsert the
/// one for `id_order` active.
pub fn activate(tx: &Transaction, id_order: i64, now: LocalTime) -> CoreResult<BottleCounter> {
    deactivate_all(tx)?;
    if get_by_order(tx, id_order)?.is_none() {
        create(tx, id_order, now)?;
    }
    tx.execute(
        "UPDATE bottle_counters SET is_active = 1, last_updated = ?1 WHERE id_order = ?2",
        params![to_rfc3339(now), id_order],
    )?;
    get_by_order(tx, id_order)?.ok_or_else(|| {
        crate::error::CoreError::Internal(format!("counter for order {id_order} vanished mid-activate"))
    })
}

/// C8.deactivate (spec.md §4.8).
pub fn deactivate(tx: &Transaction, id_order: i64, now: LocalTime) -> CoreResult<()> {
    tx.execute(
        "UPDATE bottle_counters SET is_active = 0, last_updated = ?1 WHERE id_order = ?2",
        params![to_rfc3339(now), id_order],
    )?;
    Ok(())
}

/// C8.reset (spec.md §4.8).
pub fn reset(tx: &Transaction, id_order: i64, now: LocalTime) -> CoreResult<()> {
    tx.execute(
        "UPDATE bottle_counters SET quantity = 0, last_bottle_counted_at = NULL, \
         last_updated = ?1 WHERE id_order = ?2",
        params![to_rfc3339(now), id_order],
    )?;
    Ok(())
}

/// Falling-edge increment (spec.md §4.8 step 4): load-or-create, set active,
/// bump quantity by one, stamp `lastBottleCountedAt`.
pub fn increment_for_order(tx: &Transaction, id_order: i64, now: LocalTime) -> CoreResult<BottleCounter> {
    if get_by_order(tx, id_order)?.is_none() {
        create(tx, id_order, now)?;
    }
    tx.execute(
        "UPDATE bottle_counters SET quantity = quantity + 1, is_active = 1, \
         last_bottle_counted_at = ?1, last_updated = ?1 WHERE id_order = ?2",
        params![to_rfc3339(now), id_order],
    )?;
    get_by_order(tx, id_order)?.ok_or_else(|| {
        crate::error::CoreError::Internal(format!("counter for order {id_order} vanished mid-increment"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderSpec;
    use crate::store::{orders, Store};
    use crate::time::now;

    fn spec(cod_order: &str) -> OrderSpec {
        OrderSpec {
            cod_order: cod_order.to_string(),
            operario: "A".to_string(),
            lote: "L1".to_string(),
            articulo: "X".to_string(),
            descripcion: String::new(),
            cantidad: 1000.0,
            botes_caja: 10.0,
            std_referencia: 20.0,
            formato_bote: "500ml".to_string(),
            tipo: "Conserva".to_string(),
            uds_bote: 500.0,
            repercap: false,
        }
    }

    /// Invariant #6 (spec.md §8): activating a second order's counter
    /// deactivates the first, so at most one counter is ever active.
    #[test]
    fn activate_deactivates_the_previously_active_counter() {
        let store = Store::open_in_memory().unwrap();
        store
            .with_transaction(|tx| {
                let order_a = orders::insert_order(tx, &spec("OF-A"), now())?;
                let order_b = orders::insert_order(tx, &spec("OF-B"), now())?;

                let a = activate(tx, order_a.id, now())?;
                assert!(a.is_active);

                let b = activate(tx, order_b.id, now())?;
                assert!(b.is_active);

                let a = get_by_order(tx, order_a.id)?.unwrap();
                assert!(!a.is_active);
                assert_eq!(get_active(tx)?.map(|c| c.id_order), Some(order_b.id));
                Ok(())
            })
            .unwrap();
    }
}
