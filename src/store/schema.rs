//! Idempotent migration script, run once at startup. Grounded on the
//! teacher's `signals/db_storage.rs::SCHEMA_SQL` constant-plus-`execute_batch`
//! idiom (WAL pragmas + `CREATE TABLE IF NOT EXISTS`).

pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS orders (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    cod_order           TEXT NOT NULL UNIQUE,
    operario            TEXT NOT NULL,
    lote                TEXT NOT NULL,
    articulo            TEXT NOT NULL,
    descripcion         TEXT NOT NULL,
    estado              TEXT NOT NULL,
    cantidad            REAL NOT NULL,
    botes_caja          REAL NOT NULL,
    std_referencia      REAL NOT NULL,
    hora_creacion       TEXT NOT NULL,
    hora_inicio         TEXT,
    hora_fin            TEXT,
    botes_buenos        REAL,
    botes_malos         REAL,
    total_cajas_cierre  REAL,
    repercap            INTEGER NOT NULL DEFAULT 0,
    acumula             INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS extra_data (
    id_order        INTEGER PRIMARY KEY REFERENCES orders(id),
    formato_bote    TEXT NOT NULL,
    tipo            TEXT NOT NULL,
    uds_bote        REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS pauses (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    id_order            INTEGER NOT NULL REFERENCES orders(id),
    tipo                TEXT,
    descripcion         TEXT,
    operario            TEXT,
    computa             INTEGER,
    hora_inicio         TEXT NOT NULL,
    hora_fin            TEXT,
    tiempo_total_pausa  REAL
);

CREATE INDEX IF NOT EXISTS idx_pauses_order ON pauses(id_order);
CREATE INDEX IF NOT EXISTS idx_pauses_open ON pauses(id_order, hora_fin);

CREATE TABLE IF NOT EXISTS metricas (
    id_order            INTEGER PRIMARY KEY REFERENCES orders(id),
    tiempo_total        REAL NOT NULL,
    tiempo_pausado      REAL NOT NULL,
    tiempo_activo       REAL NOT NULL,
    disponibilidad      REAL NOT NULL,
    rendimiento         REAL NOT NULL,
    calidad             REAL NOT NULL,
    oee                 REAL NOT NULL,
    std_real            REAL NOT NULL,
    por_cump_pedido     REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS acumula (
    id_order            INTEGER PRIMARY KEY REFERENCES orders(id),
    hora_inicio          TEXT NOT NULL,
    hora_fin             TEXT,
    tiempo_total         REAL,
    num_cajas_manual     REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bottle_counters (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    id_order                INTEGER NOT NULL UNIQUE REFERENCES orders(id),
    quantity                INTEGER NOT NULL DEFAULT 0,
    is_active               INTEGER NOT NULL DEFAULT 0,
    created_at              TEXT NOT NULL,
    last_updated            TEXT NOT NULL,
    last_bottle_counted_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_bottle_counters_active ON bottle_counters(is_active);

CREATE TABLE IF NOT EXISTS order_delete_audit (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id                INTEGER NOT NULL,
    order_snapshot_json     TEXT NOT NULL,
    deleted_by              TEXT NOT NULL,
    motivo                  TEXT NOT NULL,
    deleted_at              TEXT NOT NULL,
    ip_address              TEXT
);
"#;
