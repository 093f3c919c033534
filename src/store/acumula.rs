use rusqlite::{params, OptionalExtension, Row, Transaction};

use crate::error::{CoreError, CoreResult};
use crate::models::Acumula;
use crate::time::{from_rfc3339, to_rfc3339, LocalTime};

fn row_to_acumula(row: &Row) -> rusqlite::Result<Acumula> {
    let hora_inicio: String = row.get("hora_inicio")?;
    let hora_fin: Option<String> = row.get("hora_fin")?;
    Ok(Acumula {
        id_order: row.get("id_order")?,
        hora_inicio: parse_time(&hora_inicio)?,
        hora_fin: hora_fin.as_deref().map(parse_time).transpose()?,
        tiempo_total: row.get("tiempo_total")?,
        num_cajas_manual: row.get("num_cajas_manual")?,
    })
}

fn parse_time(s: &str) -> rusqlite::Result<LocalTime> {
    from_rfc3339(s).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

const ACUMULA_COLUMNS: &str = "id_order, hora_inicio, hora_fin, tiempo_total, num_cajas_manual";

pub fn get(tx: &Transaction, id_order: i64) -> CoreResult<Option<Acumula>> {
    let sql = format!("SELECT {ACUMULA_COLUMNS} FROM acumula WHERE id_order = ?1");
    tx.query_row(&sql, params![id_order], row_to_acumula)
        .optional()
        .map_err(Into::into)
}

pub fn start(tx: &Transaction, id_order: i64, now: LocalTime) -> CoreResult<Acumula> {
    tx.execute(
        "INSERT INTO acumula (id_order, hora_inicio, num_cajas_manual) VALUES (?1, ?2, 0)",
        params![id_order, to_rfc3339(now)],
    )?;
    get(tx, id_order)?.ok_or_else(|| CoreError::not_found("Acumula", id_order))
}

pub fn finish(
    tx: &Transaction,
    id_order: i64,
    num_cajas_manual: f64,
    now: LocalTime,
) -> CoreResult<Acumula> {
    let existing = get(tx, id_order)?.ok_or_else(|| CoreError::not_found("Acumula", id_order))?;
    let tiempo_total = crate::time::minutes_between(existing.hora_inicio, now);
    tx.execute(
        "UPDATE acumula SET hora_fin = ?1, tiempo_total = ?2, num_cajas_manual = ?3 \
         WHERE id_order = ?4",
        params![to_rfc3339(now), tiempo_total, num_cajas_manual, id_order],
    )?;
    get(tx, id_order)?.ok_or_else(|| CoreError::not_found("Acumula", id_order))
}
