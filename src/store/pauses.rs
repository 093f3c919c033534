use rusqlite::{params, OptionalExtension, Row, Transaction};

use crate::error::{CoreError, CoreResult};
use crate::models::{Pause, TipoPausa};
use crate::time::{from_rfc3339, to_rfc3339, LocalTime};

fn row_to_pause(row: &Row) -> rusqlite::Result<Pause> {
    let tipo_str: Option<String> = row.get("tipo")?;
    let tipo = tipo_str
        .as_deref()
        .map(TipoPausa::from_str)
        .transpose()
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let hora_inicio: String = row.get("hora_inicio")?;
    let hora_fin: Option<String> = row.get("hora_fin")?;
    let computa: Option<i64> = row.get("computa")?;

    Ok(Pause {
        id: row.get("id")?,
        id_order: row.get("id_order")?,
        tipo,
        descripcion: row.get("descripcion")?,
        operario: row.get("operario")?,
        computa: computa.map(|v| v != 0),
        hora_inicio: parse_time(&hora_inicio)?,
        hora_fin: hora_fin.as_deref().map(parse_time).transpose()?,
        tiempo_total_pausa: row.get("tiempo_total_pausa")?,
    })
}

fn parse_time(s: &str) -> rusqlite::Result<LocalTime> {
    from_rfc3339(s).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

const PAUSE_COLUMNS: &str =
    "id, id_order, tipo, descripcion, operario, computa, hora_inicio, hora_fin, tiempo_total_pausa";

/// The open Pause for an order, if any (spec.md §3 invariant: at most one
/// per order with `horaFin = ⊥`).
pub fn get_open(tx: &Transaction, id_order: i64) -> CoreResult<Option<Pause>> {
    let sql = format!(
        "SELECT {PAUSE_COLUMNS} FROM pauses WHERE id_order = ?1 AND hora_fin IS NULL"
    );
    tx.query_row(&sql, params![id_order], row_to_pause)
        .optional()
        .map_err(CoreError::from)
}

pub fn get_by_id(tx: &Transaction, id: i64) -> CoreResult<Pause> {
    let sql = format!("SELECT {PAUSE_COLUMNS} FROM pauses WHERE id = ?1");
    tx.query_row(&sql, params![id], row_to_pause)
        .optional()?
        .ok_or_else(|| CoreError::not_found("Pause", id))
}

pub fn open(
    tx: &Transaction,
    id_order: i64,
    tipo: Option<TipoPausa>,
    descripcion: Option<String>,
    operario: Option<String>,
    now: LocalTime,
) -> CoreResult<Pause> {
    let computa = tipo.map(|t| t.computa());
    tx.execute(
        "INSERT INTO pauses (id_order, tipo, descripcion, operario, computa, hora_inicio) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id_order,
            tipo.map(|t| t.as_str()),
            descripcion,
            operario,
            computa.map(|c| c as i64),
            to_rfc3339(now),
        ],
    )?;
    get_by_id(tx, tx.last_insert_rowid())
}

/// Close a pause, applying spec.md §4.4's merge rules for `tipo` and
/// `descripcion`. `tipo` must resolve to `Some` one way or another, else
/// `InvalidInput`.
pub fn close(
    tx: &Transaction,
    pause: &Pause,
    tipo_override: Option<TipoPausa>,
    descripcion_addition: Option<String>,
    operario_override: Option<String>,
    now: LocalTime,
) -> CoreResult<Pause> {
    let tipo = match (pause.tipo, tipo_override) {
        (_, Some(t)) => t,
        (Some(t), None) => t,
        (None, None) => {
            return Err(CoreError::invalid_input(
                "closePause requires a tipo: pause has none stored and caller supplied none",
            ))
        }
    };
    let computa = tipo.computa();

    let descripcion = match (&pause.descripcion, descripcion_addition) {
        (Some(existing), Some(addition)) if !addition.trim().is_empty() => {
            Some(format!("{existing} | {addition}"))
        }
        (None, Some(addition)) if !addition.trim().is_empty() => Some(addition),
        (existing, _) => existing.clone(),
    };

    let operario = operario_override.or_else(|| pause.operario.clone());

    let tiempo_total_pausa = crate::time::minutes_between(pause.hora_inicio, now);
    if tiempo_total_pausa < 0.0 {
        return Err(CoreError::invalid_state(format!(
            "pause {} would close before it opened",
            pause.id
        )));
    }

    tx.execute(
        "UPDATE pauses SET tipo = ?1, descripcion = ?2, operario = ?3, computa = ?4, \
         hora_fin = ?5, tiempo_total_pausa = ?6 WHERE id = ?7",
        params![
            tipo.as_str(),
            descripcion,
            operario,
            computa as i64,
            to_rfc3339(now),
            tiempo_total_pausa,
            pause.id,
        ],
    )?;
    get_by_id(tx, pause.id)
}

/// Cascading close used by `finalize` when the order is PAUSADA (spec.md
/// §4.3 step 2): just stamps `horaFin`/`tiempoTotalPausa`, leaving
/// `tipo`/`computa`/`descripcion` untouched — unlike the explicit
/// `closePause` operation, finalize supplies no tipo override and does not
/// require one.
pub fn auto_close(tx: &Transaction, pause: &Pause, now: LocalTime) -> CoreResult<Pause> {
    let tiempo_total_pausa = crate::time::minutes_between(pause.hora_inicio, now);
    if tiempo_total_pausa < 0.0 {
        return Err(CoreError::invalid_state(format!(
            "pause {} would close before it opened",
            pause.id
        )));
    }
    let computa = pause.tipo.map(|t| t.computa());
    tx.execute(
        "UPDATE pauses SET hora_fin = ?1, tiempo_total_pausa = ?2, computa = ?3 WHERE id = ?4",
        params![to_rfc3339(now), tiempo_total_pausa, computa.map(|c| c as i64), pause.id],
    )?;
    get_by_id(tx, pause.id)
}

/// Sum of `tiempoTotalPausa` over closed pauses for an order, partitioned by
/// `computa` (spec.md §4.5 inputs).
pub fn closed_pause_minutes_by_computa(
    tx: &Transaction,
    id_order: i64,
    computa: bool,
) -> CoreResult<f64> {
    let total: Option<f64> = tx.query_row(
        "SELECT SUM(tiempo_total_pausa) FROM pauses \
         WHERE id_order = ?1 AND hora_fin IS NOT NULL AND computa = ?2",
        params![id_order, computa as i64],
        |r| r.get(0),
    )?;
    Ok(total.unwrap_or(0.0))
}

pub fn list_for_order(tx: &Transaction, id_order: i64) -> CoreResult<Vec<Pause>> {
    let sql = format!(
        "SELECT {PAUSE_COLUMNS} FROM pauses WHERE id_order = ?1 ORDER BY hora_inicio ASC"
    );
    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt
        .query_map(params![id_order], row_to_pause)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
