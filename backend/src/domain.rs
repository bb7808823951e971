//! Record service: owns every operation on gestiones and translates
//! store-level failures into the domain error taxonomy.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use shared::{Estado, Estadisticas, Gestion, Pagination, Tipificacion};
use std::collections::BTreeMap;
use tracing::info;

use crate::db::{DbConnection, ListFilter};
use crate::error::ApiError;
use crate::validation::GestionDraft;

#[derive(Clone)]
pub struct GestionService {
    db: DbConnection,
}

impl GestionService {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Persist a new gestion and return it with its assigned id.
    pub async fn create(&self, draft: GestionDraft) -> Result<Gestion, ApiError> {
        info!(
            "Creating gestion for documento={} asesor={}",
            draft.cliente_documento, draft.asesor_id
        );

        let gestion = self.db.insert_gestion(&draft).await?;
        info!("Created gestion {}", gestion.id);
        Ok(gestion)
    }

    /// Filtered, paginated listing.
    pub async fn list(&self, filter: ListFilter) -> Result<(Vec<Gestion>, Pagination), ApiError> {
        info!("Listing gestiones with filter: {:?}", filter);

        let (rows, total) = self.db.list_gestiones(&filter).await?;
        let limit = i64::from(filter.limit);
        let total_pages = (total + limit - 1) / limit;

        let pagination = Pagination {
            page: filter.page,
            limit: filter.limit,
            total,
            total_pages,
        };
        Ok((rows, pagination))
    }

    /// Absence is a normal outcome, not an error.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Gestion>, ApiError> {
        Ok(self.db.get_gestion(id).await?)
    }

    /// Full replace: every mutable field taken from the draft.
    pub async fn update(&self, id: i64, draft: GestionDraft) -> Result<Option<Gestion>, ApiError> {
        info!("Updating gestion {id}");

        let Some(existing) = self.db.get_gestion(id).await? else {
            return Ok(None);
        };

        let updated = Gestion {
            id: existing.id,
            cliente_documento: draft.cliente_documento,
            cliente_nombre: draft.cliente_nombre,
            asesor_id: draft.asesor_id,
            tipificacion: draft.tipificacion,
            subtipificacion: draft.subtipificacion,
            canal_oficial: draft.canal_oficial,
            valor_compromiso: draft.valor_compromiso,
            fecha_compromiso: draft.fecha_compromiso,
            observaciones: draft.observaciones,
            recording_url: draft.recording_url,
            estado: draft.estado,
            created_at: existing.created_at,
            updated_at: Utc::now(),
        };
        self.db.update_gestion(&updated).await?;

        Ok(self.db.get_gestion(id).await?)
    }

    /// Partial update: only the keys present in the sanitized patch are
    /// applied; explicit nulls clear optional fields.
    pub async fn update_partial(
        &self,
        id: i64,
        patch: Map<String, Value>,
    ) -> Result<Option<Gestion>, ApiError> {
        info!("Partially updating gestion {id} ({} fields)", patch.len());

        let Some(mut gestion) = self.db.get_gestion(id).await? else {
            return Ok(None);
        };

        apply_patch(&mut gestion, &patch)?;
        gestion.updated_at = Utc::now();
        self.db.update_gestion(&gestion).await?;

        Ok(self.db.get_gestion(id).await?)
    }

    /// Soft delete: the record stays, its estado becomes `cerrada`.
    /// Returns false when the id does not exist.
    pub async fn soft_delete(&self, id: i64) -> Result<bool, ApiError> {
        info!("Soft-deleting gestion {id}");

        let Some(mut gestion) = self.db.get_gestion(id).await? else {
            return Ok(false);
        };

        gestion.estado = Estado::Cerrada;
        gestion.updated_at = Utc::now();
        self.db.update_gestion(&gestion).await?;

        Ok(true)
    }

    pub async fn statistics(&self) -> Result<Estadisticas, ApiError> {
        let total = self.db.count_all().await?;
        let abiertas = self.db.count_by_estado(Estado::Abierta).await?;
        let cerradas = self.db.count_by_estado(Estado::Cerrada).await?;

        let por_tipificacion: BTreeMap<String, i64> =
            self.db.counts_by_tipificacion().await?.into_iter().collect();

        Ok(Estadisticas {
            total,
            abiertas,
            cerradas,
            por_tipificacion,
        })
    }
}

/// Apply a sanitized patch onto an existing record. Keys and value shapes
/// were already validated, so any mismatch here is an internal bug.
fn apply_patch(gestion: &mut Gestion, patch: &Map<String, Value>) -> Result<(), ApiError> {
    for (key, value) in patch {
        match key.as_str() {
            "clienteDocumento" => gestion.cliente_documento = expect_str(key, value)?,
            "clienteNombre" => gestion.cliente_nombre = expect_str(key, value)?,
            "asesorId" => gestion.asesor_id = expect_str(key, value)?,
            "tipificacion" => {
                let raw = expect_str(key, value)?;
                gestion.tipificacion = Tipificacion::parse(&raw)
                    .ok_or_else(|| internal(key, "valor fuera del enum"))?;
            }
            "subtipificacion" => gestion.subtipificacion = opt_str(value),
            "canalOficial" => {
                gestion.canal_oficial =
                    value.as_bool().ok_or_else(|| internal(key, "se esperaba bool"))?;
            }
            "valorCompromiso" => gestion.valor_compromiso = value.as_f64(),
            "fechaCompromiso" => {
                gestion.fecha_compromiso = match value.as_str() {
                    Some(raw) => Some(
                        DateTime::parse_from_rfc3339(raw)
                            .map_err(|_| internal(key, "fecha inválida"))?
                            .with_timezone(&Utc),
                    ),
                    None => None,
                };
            }
            "observaciones" => gestion.observaciones = opt_str(value),
            "recordingUrl" => gestion.recording_url = opt_str(value),
            "estado" => {
                let raw = expect_str(key, value)?;
                gestion.estado =
                    Estado::parse(&raw).ok_or_else(|| internal(key, "valor fuera del enum"))?;
            }
            other => return Err(internal(other, "campo no reconocido")),
        }
    }
    Ok(())
}

fn expect_str(key: &str, value: &Value) -> Result<String, ApiError> {
    value
        .as_str()
        .map(String::from)
        .ok_or_else(|| internal(key, "se esperaba texto"))
}

fn opt_str(value: &Value) -> Option<String> {
    value.as_str().map(String::from)
}

fn internal(field: &str, detail: &str) -> ApiError {
    ApiError::Internal(anyhow::anyhow!("patch inválido en '{field}': {detail}"))
}
