use rusqlite::{params, OptionalExtension, Transaction};

use crate::error::CoreResult;
use crate::models::Metricas;

pub fn get(tx: &Transaction, id_order: i64) -> CoreResult<Option<Metricas>> {
    tx.query_row(
        "SELECT id_order, tiempo_total, tiempo_pausado, tiempo_activo, disponibilidad, \
         rendimiento, calidad, oee, std_real, por_cump_pedido FROM metricas WHERE id_order = ?1",
        params![id_order],
        |row| {
            Ok(Metricas {
                id_order: row.get(0)?,
                tiempo_total: row.get(1)?,
                tiempo_pausado: row.get(2)?,
                tiempo_activo: row.get(3)?,
                disponibilidad: row.get(4)?,
                rendimiento: row.get(5)?,
                calidad: row.get(6)?,
                oee: row.get(7)?,
                std_real: row.get(8)?,
                por_cump_pedido: row.get(9)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

pub fn insert(tx: &Transaction, m: &Metricas) -> CoreResult<()> {
    tx.execute(
        "INSERT INTO metricas (id_order, tiempo_total, tiempo_pausado, tiempo_activo, \
         disponibilidad, rendimiento, calidad, oee, std_real, por_cump_pedido) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            m.id_order,
            m.tiempo_total,
            m.tiempo_pausado,
            m.tiempo_activo,
            m.disponibilidad,
            m.rendimiento,
            m.calidad,
            m.oee,
            m.std_real,
            m.por_cump_pedido,
        ],
    )?;
    Ok(())
}

pub fn delete(tx: &Transaction, id_order: i64) -> CoreResult<()> {
    tx.execute("DELETE FROM metricas WHERE id_order = ?1", params![id_order])?;
    Ok(())
}
