//! SQLite store for gestiones: schema sync, row CRUD and the
//! filtered/paginated list query.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use shared::{Estado, Gestion, Tipificacion};
use sqlx::sqlite::SqliteRow;
use sqlx::{migrate::MigrateDatabase, QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

use crate::validation::GestionDraft;

/// A validated filter set for the list query.
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub page: u32,
    pub limit: u32,
    /// Case-insensitive substring over cliente_nombre / cliente_documento.
    /// SQLite LIKE folds case for ASCII only, so accented letters must
    /// match in the exact case typed ("pérez" finds "Pérez", "PÉREZ" does not).
    pub q: Option<String>,
    pub tipificacion: Option<Tipificacion>,
    pub asesor_id: Option<String>,
    pub estado: Option<Estado>,
    /// Inclusive, from start of day (UTC)
    pub desde: Option<NaiveDate>,
    /// Inclusive, through end of day (UTC)
    pub hasta: Option<NaiveDate>,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            q: None,
            tipificacion: None,
            asesor_id: None,
            estado: None,
            desde: None,
            hasta: None,
        }
    }
}

/// Timestamps are stored as fixed-width RFC 3339 UTC strings
/// (`YYYY-MM-DDTHH:MM:SS.sssZ`) so string comparison equals time comparison.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// DbConnection manages database operations for the gestiones table.
#[derive(Clone)]
pub struct DbConnection {
    pool: Arc<SqlitePool>,
}

impl DbConnection {
    /// Create (if needed) and connect to the database at `url`,
    /// then sync the schema.
    pub async fn new(url: &str) -> Result<Self> {
        if !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?;
        }

        let pool = SqlitePool::connect(url).await?;
        Self::setup_schema(&pool).await?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Initialize a test database with a unique name
    #[cfg(test)]
    pub async fn init_test() -> Result<Self> {
        let test_id = uuid::Uuid::new_v4().to_string();
        let db_url = format!("file:memdb_{}?mode=memory&cache=shared", test_id);

        Self::new(&db_url).await
    }

    /// Create the gestiones table and its indexes. Length and enum bounds
    /// are repeated here as CHECK constraints: the validation layer enforces
    /// them first, the store enforces them last.
    async fn setup_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gestiones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cliente_documento TEXT NOT NULL
                    CHECK (length(cliente_documento) BETWEEN 3 AND 50),
                cliente_nombre TEXT NOT NULL
                    CHECK (length(cliente_nombre) BETWEEN 3 AND 200),
                asesor_id TEXT NOT NULL
                    CHECK (length(asesor_id) > 0),
                tipificacion TEXT NOT NULL
                    CHECK (tipificacion IN (
                        'Contacto Efectivo', 'No Contacto', 'Promesa de Pago',
                        'Pago Realizado', 'Refinanciación', 'Información',
                        'Escalamiento', 'Otros'
                    )),
                subtipificacion TEXT
                    CHECK (subtipificacion IS NULL OR length(subtipificacion) <= 100),
                canal_oficial INTEGER NOT NULL DEFAULT 1,
                valor_compromiso REAL
                    CHECK (valor_compromiso IS NULL OR valor_compromiso >= 0),
                fecha_compromiso TEXT,
                observaciones TEXT
                    CHECK (observaciones IS NULL OR length(observaciones) <= 1000),
                recording_url TEXT
                    CHECK (recording_url IS NULL OR length(recording_url) <= 500),
                estado TEXT NOT NULL DEFAULT 'abierta'
                    CHECK (estado IN ('abierta', 'cerrada')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_cliente_documento ON gestiones (cliente_documento)",
            "CREATE INDEX IF NOT EXISTS idx_asesor_id ON gestiones (asesor_id)",
            "CREATE INDEX IF NOT EXISTS idx_tipificacion ON gestiones (tipificacion)",
            "CREATE INDEX IF NOT EXISTS idx_estado ON gestiones (estado)",
            "CREATE INDEX IF NOT EXISTS idx_created_at ON gestiones (created_at)",
        ] {
            sqlx::query(statement).execute(pool).await?;
        }

        Ok(())
    }

    /// Get the underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new gestion and return the stored row.
    pub async fn insert_gestion(&self, draft: &GestionDraft) -> Result<Gestion, sqlx::Error> {
        let now = format_ts(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO gestiones (
                cliente_documento, cliente_nombre, asesor_id, tipificacion,
                subtipificacion, canal_oficial, valor_compromiso, fecha_compromiso,
                observaciones, recording_url, estado, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.cliente_documento)
        .bind(&draft.cliente_nombre)
        .bind(&draft.asesor_id)
        .bind(draft.tipificacion.as_str())
        .bind(&draft.subtipificacion)
        .bind(draft.canal_oficial)
        .bind(draft.valor_compromiso)
        .bind(draft.fecha_compromiso.map(format_ts))
        .bind(&draft.observaciones)
        .bind(&draft.recording_url)
        .bind(draft.estado.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&*self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_gestion(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Fetch one gestion by id; absence is a normal outcome.
    pub async fn get_gestion(&self, id: i64) -> Result<Option<Gestion>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM gestiones WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await?;

        row.as_ref().map(row_to_gestion).transpose()
    }

    /// Overwrite every mutable column of an existing row.
    pub async fn update_gestion(&self, gestion: &Gestion) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE gestiones SET
                cliente_documento = ?, cliente_nombre = ?, asesor_id = ?,
                tipificacion = ?, subtipificacion = ?, canal_oficial = ?,
                valor_compromiso = ?, fecha_compromiso = ?, observaciones = ?,
                recording_url = ?, estado = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&gestion.cliente_documento)
        .bind(&gestion.cliente_nombre)
        .bind(&gestion.asesor_id)
        .bind(gestion.tipificacion.as_str())
        .bind(&gestion.subtipificacion)
        .bind(gestion.canal_oficial)
        .bind(gestion.valor_compromiso)
        .bind(gestion.fecha_compromiso.map(format_ts))
        .bind(&gestion.observaciones)
        .bind(&gestion.recording_url)
        .bind(gestion.estado.as_str())
        .bind(format_ts(gestion.updated_at))
        .bind(gestion.id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Counted, paginated fetch: total matching rows plus one page,
    /// ordered by ascending id (stable insertion order).
    pub async fn list_gestiones(
        &self,
        filter: &ListFilter,
    ) -> Result<(Vec<Gestion>, i64), sqlx::Error> {
        let mut count_query = QueryBuilder::new("SELECT COUNT(*) AS total FROM gestiones");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build()
            .fetch_one(&*self.pool)
            .await?
            .get("total");

        let offset = i64::from(filter.page.saturating_sub(1)) * i64::from(filter.limit);
        let mut page_query = QueryBuilder::new("SELECT * FROM gestiones");
        push_filters(&mut page_query, filter);
        page_query
            .push(" ORDER BY id ASC LIMIT ")
            .push_bind(i64::from(filter.limit))
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = page_query.build().fetch_all(&*self.pool).await?;
        let gestiones = rows
            .iter()
            .map(row_to_gestion)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((gestiones, total))
    }

    pub async fn count_all(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS c FROM gestiones")
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("c"))
    }

    pub async fn count_by_estado(&self, estado: Estado) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS c FROM gestiones WHERE estado = ?")
            .bind(estado.as_str())
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("c"))
    }

    /// Occurrence count per tipificacion value observed in the table.
    pub async fn counts_by_tipificacion(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT tipificacion, COUNT(*) AS c FROM gestiones GROUP BY tipificacion",
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("tipificacion"), row.get("c")))
            .collect())
    }

    /// Force a row's created_at, for exercising date-range filters.
    #[cfg(test)]
    pub async fn set_created_at(&self, id: i64, ts: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE gestiones SET created_at = ? WHERE id = ?")
            .bind(format_ts(ts))
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }
}

/// Append the WHERE clause for a filter set. Both the count query and the
/// page query go through here, so the two can never disagree.
fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &ListFilter) {
    query.push(" WHERE 1 = 1");

    if let Some(q) = &filter.q {
        // LIKE is case-insensitive for ASCII characters only; accented
        // characters compare byte-exact (no ICU in the bundled SQLite)
        let pattern = format!("%{q}%");
        query
            .push(" AND (cliente_nombre LIKE ")
            .push_bind(pattern.clone())
            .push(" OR cliente_documento LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(tipificacion) = filter.tipificacion {
        query
            .push(" AND tipificacion = ")
            .push_bind(tipificacion.as_str());
    }
    if let Some(asesor_id) = &filter.asesor_id {
        query.push(" AND asesor_id = ").push_bind(asesor_id.clone());
    }
    if let Some(estado) = filter.estado {
        query.push(" AND estado = ").push_bind(estado.as_str());
    }
    if let Some(desde) = filter.desde {
        let start = desde.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        query
            .push(" AND created_at >= ")
            .push_bind(format_ts(start));
    }
    if let Some(hasta) = filter.hasta {
        // Whole calendar day is included regardless of record time-of-day
        let end = hasta
            .and_hms_milli_opt(23, 59, 59, 999)
            .unwrap_or_default()
            .and_utc();
        query.push(" AND created_at <= ").push_bind(format_ts(end));
    }
}

fn row_to_gestion(row: &SqliteRow) -> Result<Gestion, sqlx::Error> {
    let tipificacion_raw: String = row.get("tipificacion");
    let tipificacion = Tipificacion::parse(&tipificacion_raw).ok_or_else(|| {
        sqlx::Error::Decode(format!("tipificación desconocida: {tipificacion_raw}").into())
    })?;

    let estado_raw: String = row.get("estado");
    let estado = Estado::parse(&estado_raw)
        .ok_or_else(|| sqlx::Error::Decode(format!("estado desconocido: {estado_raw}").into()))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let fecha_compromiso: Option<String> = row.get("fecha_compromiso");

    Ok(Gestion {
        id: row.get("id"),
        cliente_documento: row.get("cliente_documento"),
        cliente_nombre: row.get("cliente_nombre"),
        asesor_id: row.get("asesor_id"),
        tipificacion,
        subtipificacion: row.get("subtipificacion"),
        canal_oficial: row.get("canal_oficial"),
        valor_compromiso: row.get("valor_compromiso"),
        fecha_compromiso: fecha_compromiso.as_deref().map(parse_ts).transpose()?,
        observaciones: row.get("observaciones"),
        recording_url: row.get("recording_url"),
        estado,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}
