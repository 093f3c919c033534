//! Order persistence, operating inside a caller-supplied transaction
//! (SPEC_FULL.md §4.1: "every write path ... reissued inside the write
//! transaction").

use rusqlite::{params, OptionalExtension, Row, Transaction};

use crate::error::{CoreError, CoreResult};
use crate::models::order::ExtraData;
use crate::models::{EstadoOrden, Order, OrderSpec};
use crate::time::{from_rfc3339, to_rfc3339, LocalTime};

fn row_to_order(row: &Row) -> rusqlite::Result<Order> {
    let estado_str: String = row.get("estado")?;
    let estado = EstadoOrden::from_str(&estado_str)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    let hora_creacion: String = row.get("hora_creacion")?;
    let hora_inicio: Option<String> = row.get("hora_inicio")?;
    let hora_fin: Option<String> = row.get("hora_fin")?;

    Ok(Order {
        id: row.get("id")?,
        cod_order: row.get("cod_order")?,
        operario: row.get("operario")?,
        lote: row.get("lote")?,
        articulo: row.get("articulo")?,
        descripcion: row.get("descripcion")?,
        estado,
        cantidad: row.get("cantidad")?,
        botes_caja: row.get("botes_caja")?,
        std_referencia: row.get("std_referencia")?,
        hora_creacion: parse_time(&hora_creacion)?,
        hora_inicio: hora_inicio.as_deref().map(parse_time).transpose()?,
        hora_fin: hora_fin.as_deref().map(parse_time).transpose()?,
        botes_buenos: row.get("botes_buenos")?,
        botes_malos: row.get("botes_malos")?,
        total_cajas_cierre: row.get("total_cajas_cierre")?,
        repercap: row.get::<_, i64>("repercap")? != 0,
        acumula: row.get::<_, i64>("acumula")? != 0,
    })
}

fn parse_time(s: &str) -> rusqlite::Result<LocalTime> {
    from_rfc3339(s).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

const ORDER_COLUMNS: &str = "id, cod_order, operario, lote, articulo, descripcion, estado, \
     cantidad, botes_caja, std_referencia, hora_creacion, hora_inicio, hora_fin, \
     botes_buenos, botes_malos, total_cajas_cierre, repercap, acumula";

pub fn cod_order_exists(tx: &Transaction, cod_order: &str) -> CoreResult<bool> {
    let exists: Option<i64> = tx
        .query_row(
            "SELECT 1 FROM orders WHERE cod_order = ?1",
            params![cod_order],
            |r| r.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub fn insert_order(tx: &Transaction, spec: &OrderSpec, now: LocalTime) -> CoreResult<Order> {
    if cod_order_exists(tx, &spec.cod_order)? {
        return Err(CoreError::already_exists(
            "Order",
            "codOrder",
            &spec.cod_order,
        ));
    }

    tx.execute(
        "INSERT INTO orders (cod_order, operario, lote, articulo, descripcion, estado, \
         cantidad, botes_caja, std_referencia, hora_creacion, repercap, acumula) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)",
        params![
            spec.cod_order,
            spec.operario,
            spec.lote,
            spec.articulo,
            spec.descripcion,
            EstadoOrden::Creada.as_str(),
            spec.cantidad,
            spec.botes_caja,
            spec.std_referencia,
            to_rfc3339(now),
            spec.repercap as i64,
        ],
    )?;
    let id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO extra_data (id_order, formato_bote, tipo, uds_bote) VALUES (?1, ?2, ?3, ?4)",
        params![id, spec.formato_bote, spec.tipo, spec.uds_bote],
    )?;

    get_by_id(tx, id)
}

pub fn get_extra_data(tx: &Transaction, id_order: i64) -> CoreResult<Option<ExtraData>> {
    tx.query_row(
        "SELECT id_order, formato_bote, tipo, uds_bote FROM extra_data WHERE id_order = ?1",
        params![id_order],
        |row| {
            Ok(ExtraData {
                id_order: row.get(0)?,
                formato_bote: row.get(1)?,
                tipo: row.get(2)?,
                uds_bote: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(CoreError::from)
}

pub fn get_by_id(tx: &Transaction, id: i64) -> CoreResult<Order> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
    tx.query_row(&sql, params![id], row_to_order)
        .optional()?
        .ok_or_else(|| CoreError::not_found("Order", id))
}

pub fn get_by_cod_order(tx: &Transaction, cod_order: &str) -> CoreResult<Order> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE cod_order = ?1");
    tx.query_row(&sql, params![cod_order], row_to_order)
        .optional()?
        .ok_or_else(|| CoreError::not_found("Order", cod_order))
}

/// Orders currently in EN_PROCESO, most recently started first (SPEC_FULL.md
/// §12 tie-break decision).
pub fn list_en_proceso(tx: &Transaction) -> CoreResult<Vec<Order>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE estado = ?1 \
         ORDER BY (hora_inicio IS NULL), hora_inicio DESC, id ASC"
    );
    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt
        .query_map(params![EstadoOrden::EnProceso.as_str()], row_to_order)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The single order that is EN_PROCESO and started most recently, if any
/// (used by Counter Ingest, spec.md §4.8 step 3).
pub fn most_recently_started_en_proceso(tx: &Transaction) -> CoreResult<Option<Order>> {
    Ok(list_en_proceso(tx)?.into_iter().next())
}

pub fn iniciar(tx: &Transaction, id: i64, now: LocalTime) -> CoreResult<Order> {
    let order = get_by_id(tx, id)?;
    if order.estado != EstadoOrden::Creada {
        return Err(CoreError::invalid_state(format!(
            "iniciar requires estado=CREADA, order {id} is {}",
            order.estado.as_str()
        )));
    }
    tx.execute(
        "UPDATE orders SET estado = ?1, hora_inicio = ?2 WHERE id = ?3",
        params![EstadoOrden::EnProceso.as_str(), to_rfc3339(now), id],
    )?;
    get_by_id(tx, id)
}

/// Finalize fields set in one shot by `finalize` (spec.md §4.3 step 4-5).
#[allow(clippy::too_many_arguments)]
pub fn finalize(
    tx: &Transaction,
    id: i64,
    botes_buenos: f64,
    botes_malos: f64,
    total_cajas_cierre: f64,
    acumula: bool,
    nuevo_estado: EstadoOrden,
    now: LocalTime,
) -> CoreResult<Order> {
    tx.execute(
        "UPDATE orders SET botes_buenos = ?1, botes_malos = ?2, total_cajas_cierre = ?3, \
         hora_fin = ?4, acumula = ?5, estado = ?6 WHERE id = ?7",
        params![
            botes_buenos,
            botes_malos,
            total_cajas_cierre,
            to_rfc3339(now),
            acumula as i64,
            nuevo_estado.as_str(),
            id,
        ],
    )?;
    get_by_id(tx, id)
}

pub fn set_estado(tx: &Transaction, id: i64, estado: EstadoOrden) -> CoreResult<Order> {
    tx.execute(
        "UPDATE orders SET estado = ?1 WHERE id = ?2",
        params![estado.as_str(), id],
    )?;
    get_by_id(tx, id)
}

/// spec.md §4.6: `startManual` sets `order.acumula = true` (already true in
/// practice, since that flag is what routed the order to ESPERA_MANUAL at
/// finalize time, but the Acumula Engine writes it explicitly to match the
/// operation's own description rather than relying on that history).
pub fn set_acumula(tx: &Transaction, id: i64, acumula: bool) -> CoreResult<Order> {
    tx.execute(
        "UPDATE orders SET acumula = ?1 WHERE id = ?2",
        params![acumula as i64, id],
    )?;
    get_by_id(tx, id)
}

pub fn delete_order(tx: &Transaction, id: i64) -> CoreResult<()> {
    tx.execute("DELETE FROM bottle_counters WHERE id_order = ?1", params![id])?;
    tx.execute("DELETE FROM acumula WHERE id_order = ?1", params![id])?;
    tx.execute("DELETE FROM metricas WHERE id_order = ?1", params![id])?;
    tx.execute("DELETE FROM pauses WHERE id_order = ?1", params![id])?;
    tx.execute("DELETE FROM extra_data WHERE id_order = ?1", params![id])?;
    let affected = tx.execute("DELETE FROM orders WHERE id = ?1", params![id])?;
    if affected == 0 {
        return Err(CoreError::not_found("Order", id));
    }
    Ok(())
}
