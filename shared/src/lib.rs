use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single logged contact attempt between an advisor and a client.
///
/// This is the wire shape: JSON field names are camelCase and match the
/// public API contract exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gestion {
    /// Surrogate key, assigned by the store on creation
    pub id: i64,
    /// Client identifier (document number), 3-50 chars
    pub cliente_documento: String,
    /// Client display name, 3-200 chars
    pub cliente_nombre: String,
    /// Identifier of the handling advisor
    pub asesor_id: String,
    /// Classification of the contact outcome
    pub tipificacion: Tipificacion,
    /// Free-form sub-classification (max 100 chars)
    pub subtipificacion: Option<String>,
    /// Whether the contact happened over an official channel
    pub canal_oficial: bool,
    /// Committed payment amount, >= 0, 2-decimal precision
    pub valor_compromiso: Option<f64>,
    /// Promised payment date
    pub fecha_compromiso: Option<DateTime<Utc>>,
    /// Free-form notes (max 1000 chars)
    pub observaciones: Option<String>,
    /// Link to the call recording (max 500 chars)
    pub recording_url: Option<String>,
    /// Lifecycle flag; soft delete moves this to `Cerrada`
    pub estado: Estado,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fixed classification of the outcome of a contact attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tipificacion {
    #[serde(rename = "Contacto Efectivo")]
    ContactoEfectivo,
    #[serde(rename = "No Contacto")]
    NoContacto,
    #[serde(rename = "Promesa de Pago")]
    PromesaDePago,
    #[serde(rename = "Pago Realizado")]
    PagoRealizado,
    #[serde(rename = "Refinanciación")]
    Refinanciacion,
    #[serde(rename = "Información")]
    Informacion,
    #[serde(rename = "Escalamiento")]
    Escalamiento,
    #[serde(rename = "Otros")]
    Otros,
}

impl Tipificacion {
    /// Every accepted value, in display order.
    pub const VALUES: [Tipificacion; 8] = [
        Tipificacion::ContactoEfectivo,
        Tipificacion::NoContacto,
        Tipificacion::PromesaDePago,
        Tipificacion::PagoRealizado,
        Tipificacion::Refinanciacion,
        Tipificacion::Informacion,
        Tipificacion::Escalamiento,
        Tipificacion::Otros,
    ];

    /// The exact wire/storage spelling of each value.
    pub const NAMES: [&'static str; 8] = [
        "Contacto Efectivo",
        "No Contacto",
        "Promesa de Pago",
        "Pago Realizado",
        "Refinanciación",
        "Información",
        "Escalamiento",
        "Otros",
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tipificacion::ContactoEfectivo => "Contacto Efectivo",
            Tipificacion::NoContacto => "No Contacto",
            Tipificacion::PromesaDePago => "Promesa de Pago",
            Tipificacion::PagoRealizado => "Pago Realizado",
            Tipificacion::Refinanciacion => "Refinanciación",
            Tipificacion::Informacion => "Información",
            Tipificacion::Escalamiento => "Escalamiento",
            Tipificacion::Otros => "Otros",
        }
    }

    /// Parse the wire spelling back into the closed enum.
    pub fn parse(s: &str) -> Option<Tipificacion> {
        Tipificacion::VALUES.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for Tipificacion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a gestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Estado {
    #[serde(rename = "abierta")]
    Abierta,
    #[serde(rename = "cerrada")]
    Cerrada,
}

impl Estado {
    pub const NAMES: [&'static str; 2] = ["abierta", "cerrada"];

    pub fn as_str(self) -> &'static str {
        match self {
            Estado::Abierta => "abierta",
            Estado::Cerrada => "cerrada",
        }
    }

    pub fn parse(s: &str) -> Option<Estado> {
        match s {
            "abierta" => Some(Estado::Abierta),
            "cerrada" => Some(Estado::Cerrada),
            _ => None,
        }
    }
}

impl fmt::Display for Estado {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Pagination metadata returned alongside every list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

/// The response envelope shared by every endpoint:
/// `{success, message, data?, pagination?, errors?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    /// Extra diagnostic detail on failures (debug mode only for 500s)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            pagination: None,
            errors: None,
            error: None,
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            pagination: None,
            errors: None,
            error: None,
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.error = Some(detail.into());
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            pagination: None,
            errors: None,
            error: None,
        }
    }

    pub fn error_with_fields(message: impl Into<String>, errors: Vec<FieldError>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            pagination: None,
            errors: Some(errors),
            error: None,
        }
    }
}

/// Aggregate counters for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Estadisticas {
    pub total: i64,
    pub abiertas: i64,
    pub cerradas: i64,
    /// Occurrence count per observed tipificacion value
    pub por_tipificacion: BTreeMap<String, i64>,
}
