//! Declarative input validation.
//!
//! Schemas are plain data: a list of `FieldRule`s interpreted by a single
//! generic [`validate`] function. Validation strips unknown keys, applies
//! defaults, coerces types (numeric strings, bare dates) and collects every
//! field failure instead of stopping at the first one.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{Map, Value};
use shared::{Estado, FieldError, Tipificacion};

use crate::db::ListFilter;

/// How a single field is checked and coerced.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Trimmed string with length bounds
    Text {
        min: usize,
        max: Option<usize>,
        msg_short: String,
        msg_long: String,
    },
    Bool {
        msg: String,
    },
    /// Non-negative decimal, rounded to 2 decimals
    Money {
        msg_number: String,
        msg_min: String,
    },
    Integer {
        min: i64,
        max: Option<i64>,
        msg_number: String,
        msg_min: String,
        msg_max: String,
    },
    /// Closed string enum
    Enum {
        values: &'static [&'static str],
        msg: String,
    },
    /// ISO 8601 date or datetime, normalized to RFC 3339 UTC
    Date {
        msg: String,
    },
    Url {
        max: usize,
        msg_url: String,
        msg_long: String,
    },
}

/// One entry of a validation schema.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub name: &'static str,
    pub required: bool,
    /// `null` (and empty string) accepted and normalized to `null`
    pub nullable: bool,
    pub default: Option<Value>,
    pub kind: FieldKind,
    pub msg_required: String,
}

/// A named set of field rules plus object-level constraints.
#[derive(Debug, Clone)]
pub struct Schema {
    pub fields: Vec<FieldRule>,
    /// Minimum number of known keys the input must carry (0 = no minimum)
    pub min_keys: usize,
    pub msg_min_keys: String,
}

fn tipificacion_msg() -> String {
    format!(
        "La tipificación debe ser una de: {}",
        Tipificacion::NAMES.join(", ")
    )
}

/// The create/full-update rule set. Field bounds and messages mirror the
/// persistence-layer constraints (defense in depth).
fn gestion_fields(required: bool, with_defaults: bool) -> Vec<FieldRule> {
    vec![
        FieldRule {
            name: "clienteDocumento",
            required,
            nullable: false,
            default: None,
            kind: FieldKind::Text {
                min: 3,
                max: Some(50),
                msg_short: "El documento debe tener al menos 3 caracteres".into(),
                msg_long: "El documento no puede exceder 50 caracteres".into(),
            },
            msg_required: "El documento del cliente es requerido".into(),
        },
        FieldRule {
            name: "clienteNombre",
            required,
            nullable: false,
            default: None,
            kind: FieldKind::Text {
                min: 3,
                max: Some(200),
                msg_short: "El nombre debe tener al menos 3 caracteres".into(),
                msg_long: "El nombre no puede exceder 200 caracteres".into(),
            },
            msg_required: "El nombre del cliente es requerido".into(),
        },
        FieldRule {
            name: "asesorId",
            required,
            nullable: false,
            default: None,
            kind: FieldKind::Text {
                min: 1,
                max: Some(50),
                msg_short: "El ID del asesor es requerido".into(),
                msg_long: "El ID del asesor no puede exceder 50 caracteres".into(),
            },
            msg_required: "El ID del asesor es requerido".into(),
        },
        FieldRule {
            name: "tipificacion",
            required,
            nullable: false,
            default: None,
            kind: FieldKind::Enum {
                values: &Tipificacion::NAMES,
                msg: tipificacion_msg(),
            },
            msg_required: "La tipificación es requerida".into(),
        },
        FieldRule {
            name: "subtipificacion",
            required: false,
            nullable: true,
            default: None,
            kind: FieldKind::Text {
                min: 0,
                max: Some(100),
                msg_short: String::new(),
                msg_long: "La subtipificación no puede exceder 100 caracteres".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "canalOficial",
            required: false,
            nullable: false,
            default: with_defaults.then(|| Value::Bool(true)),
            kind: FieldKind::Bool {
                msg: "El canal oficial debe ser verdadero o falso".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "valorCompromiso",
            required: false,
            nullable: true,
            default: None,
            kind: FieldKind::Money {
                msg_number: "El valor del compromiso debe ser un número".into(),
                msg_min: "El valor del compromiso debe ser mayor o igual a 0".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "fechaCompromiso",
            required: false,
            nullable: true,
            default: None,
            kind: FieldKind::Date {
                msg: "La fecha de compromiso debe estar en formato ISO 8601".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "observaciones",
            required: false,
            nullable: true,
            default: None,
            kind: FieldKind::Text {
                min: 0,
                max: Some(1000),
                msg_short: String::new(),
                msg_long: "Las observaciones no pueden exceder 1000 caracteres".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "recordingUrl",
            required: false,
            nullable: true,
            default: None,
            kind: FieldKind::Url {
                max: 500,
                msg_url: "Debe ser una URL válida".into(),
                msg_long: "La URL no puede exceder 500 caracteres".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "estado",
            required: false,
            nullable: false,
            default: with_defaults.then(|| Value::String("abierta".into())),
            kind: FieldKind::Enum {
                values: &Estado::NAMES,
                msg: "El estado debe ser: abierta o cerrada".into(),
            },
            msg_required: String::new(),
        },
    ]
}

/// Schema for POST (create) and PUT (full replace).
pub static CREATE_GESTION: Lazy<Schema> = Lazy::new(|| Schema {
    fields: gestion_fields(true, true),
    min_keys: 0,
    msg_min_keys: String::new(),
});

/// Schema for PATCH: every field optional, at least one required.
pub static PARTIAL_GESTION: Lazy<Schema> = Lazy::new(|| Schema {
    fields: gestion_fields(false, false),
    min_keys: 1,
    msg_min_keys: "Debe proporcionar al menos un campo para actualizar".into(),
});

/// Schema for the list endpoint query string.
pub static LIST_GESTIONES: Lazy<Schema> = Lazy::new(|| Schema {
    fields: vec![
        FieldRule {
            name: "page",
            required: false,
            nullable: false,
            default: Some(Value::from(1)),
            kind: FieldKind::Integer {
                min: 1,
                max: None,
                msg_number: "La página debe ser un número".into(),
                msg_min: "La página debe ser mayor o igual a 1".into(),
                msg_max: String::new(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "limit",
            required: false,
            nullable: false,
            default: Some(Value::from(10)),
            kind: FieldKind::Integer {
                min: 1,
                max: Some(100),
                msg_number: "El límite debe ser un número".into(),
                msg_min: "El límite debe ser mayor o igual a 1".into(),
                msg_max: "El límite no puede exceder 100".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "q",
            required: false,
            nullable: true,
            default: None,
            kind: FieldKind::Text {
                min: 0,
                max: Some(200),
                msg_short: String::new(),
                msg_long: "La búsqueda no puede exceder 200 caracteres".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "tipificacion",
            required: false,
            nullable: false,
            default: None,
            kind: FieldKind::Enum {
                values: &Tipificacion::NAMES,
                msg: tipificacion_msg(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "asesorId",
            required: false,
            nullable: false,
            default: None,
            kind: FieldKind::Text {
                min: 0,
                max: Some(50),
                msg_short: String::new(),
                msg_long: "El ID del asesor no puede exceder 50 caracteres".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "estado",
            required: false,
            nullable: false,
            default: None,
            kind: FieldKind::Enum {
                values: &Estado::NAMES,
                msg: "El estado debe ser: abierta o cerrada".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "desde",
            required: false,
            nullable: false,
            default: None,
            kind: FieldKind::Date {
                msg: "La fecha \"desde\" debe estar en formato ISO 8601".into(),
            },
            msg_required: String::new(),
        },
        FieldRule {
            name: "hasta",
            required: false,
            nullable: false,
            default: None,
            kind: FieldKind::Date {
                msg: "La fecha \"hasta\" debe estar en formato ISO 8601".into(),
            },
            msg_required: String::new(),
        },
    ],
    min_keys: 0,
    msg_min_keys: String::new(),
});

/// Interpret `schema` against `input`: returns the sanitized object
/// (unknown keys stripped, defaults applied, values coerced) or every
/// field failure found.
pub fn validate(schema: &Schema, input: &Value) -> Result<Map<String, Value>, Vec<FieldError>> {
    let Some(obj) = input.as_object() else {
        return Err(vec![FieldError::new("body", "Se esperaba un objeto JSON")]);
    };

    let mut out = Map::new();
    let mut errors = Vec::new();
    let mut provided = 0usize;

    for rule in &schema.fields {
        match obj.get(rule.name) {
            None => {
                if let Some(default) = &rule.default {
                    out.insert(rule.name.to_string(), default.clone());
                } else if rule.required {
                    errors.push(FieldError::new(rule.name, &rule.msg_required));
                }
            }
            Some(Value::Null) => {
                provided += 1;
                if rule.nullable {
                    out.insert(rule.name.to_string(), Value::Null);
                } else if rule.required {
                    errors.push(FieldError::new(rule.name, &rule.msg_required));
                } else {
                    errors.push(FieldError::new(rule.name, kind_message(&rule.kind)));
                }
            }
            Some(value) => {
                provided += 1;
                match check_field(rule, value) {
                    Ok(sanitized) => {
                        out.insert(rule.name.to_string(), sanitized);
                    }
                    Err(message) => errors.push(FieldError::new(rule.name, message)),
                }
            }
        }
    }

    if provided < schema.min_keys {
        errors.push(FieldError::new("body", &schema.msg_min_keys));
    }

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

/// The generic "this value is invalid" message for a kind.
fn kind_message(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Text { msg_long, .. } => msg_long.clone(),
        FieldKind::Bool { msg } => msg.clone(),
        FieldKind::Money { msg_number, .. } => msg_number.clone(),
        FieldKind::Integer { msg_number, .. } => msg_number.clone(),
        FieldKind::Enum { msg, .. } => msg.clone(),
        FieldKind::Date { msg } => msg.clone(),
        FieldKind::Url { msg_url, .. } => msg_url.clone(),
    }
}

fn check_field(rule: &FieldRule, value: &Value) -> Result<Value, String> {
    match &rule.kind {
        FieldKind::Text {
            min,
            max,
            msg_short,
            msg_long,
        } => {
            let Some(raw) = value.as_str() else {
                return Err(msg_long.clone());
            };
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return if rule.nullable {
                    Ok(Value::Null)
                } else {
                    Err(rule.msg_required.clone())
                };
            }
            let len = trimmed.chars().count();
            if len < *min {
                return Err(msg_short.clone());
            }
            if let Some(max) = max {
                if len > *max {
                    return Err(msg_long.clone());
                }
            }
            Ok(Value::String(trimmed.to_string()))
        }
        FieldKind::Bool { msg } => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => match s.trim() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(msg.clone()),
            },
            _ => Err(msg.clone()),
        },
        FieldKind::Money {
            msg_number,
            msg_min,
        } => {
            let number = coerce_f64(value).ok_or_else(|| msg_number.clone())?;
            if number < 0.0 {
                return Err(msg_min.clone());
            }
            // 2-decimal precision, matching the DECIMAL(12,2) column
            let rounded = (number * 100.0).round() / 100.0;
            Ok(Value::from(rounded))
        }
        FieldKind::Integer {
            min,
            max,
            msg_number,
            msg_min,
            msg_max,
        } => {
            let number = coerce_i64(value).ok_or_else(|| msg_number.clone())?;
            if number < *min {
                return Err(msg_min.clone());
            }
            if let Some(max) = max {
                if number > *max {
                    return Err(msg_max.clone());
                }
            }
            Ok(Value::from(number))
        }
        FieldKind::Enum { values, msg } => {
            let Some(raw) = value.as_str() else {
                return Err(msg.clone());
            };
            let trimmed = raw.trim();
            if values.contains(&trimmed) {
                Ok(Value::String(trimmed.to_string()))
            } else {
                Err(msg.clone())
            }
        }
        FieldKind::Date { msg } => {
            let Some(raw) = value.as_str() else {
                return Err(msg.clone());
            };
            let normalized = coerce_datetime(raw.trim()).ok_or_else(|| msg.clone())?;
            Ok(Value::String(
                normalized.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            ))
        }
        FieldKind::Url {
            max,
            msg_url,
            msg_long,
        } => {
            let Some(raw) = value.as_str() else {
                return Err(msg_url.clone());
            };
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return if rule.nullable {
                    Ok(Value::Null)
                } else {
                    Err(msg_url.clone())
                };
            }
            if trimmed.chars().count() > *max {
                return Err(msg_long.clone());
            }
            url::Url::parse(trimmed).map_err(|_| msg_url.clone())?;
            Ok(Value::String(trimmed.to_string()))
        }
    }
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Accept an RFC 3339 datetime or a bare `YYYY-MM-DD` (midnight UTC).
fn coerce_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_hms_opt(0, 0, 0)?,
        Utc,
    ))
}

/// A validated create/full-update payload, ready to persist.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestionDraft {
    pub cliente_documento: String,
    pub cliente_nombre: String,
    pub asesor_id: String,
    pub tipificacion: Tipificacion,
    #[serde(default)]
    pub subtipificacion: Option<String>,
    pub canal_oficial: bool,
    #[serde(default)]
    pub valor_compromiso: Option<f64>,
    #[serde(default)]
    pub fecha_compromiso: Option<DateTime<Utc>>,
    #[serde(default)]
    pub observaciones: Option<String>,
    #[serde(default)]
    pub recording_url: Option<String>,
    pub estado: Estado,
}

/// Validate a create/PUT body into a typed draft.
pub fn validate_draft(input: &Value) -> Result<GestionDraft, Vec<FieldError>> {
    let sanitized = validate(&CREATE_GESTION, input)?;
    serde_json::from_value(Value::Object(sanitized)).map_err(|e| {
        // Sanitized values always deserialize; treat a mismatch as a bug
        vec![FieldError::new("body", format!("payload inválido: {e}"))]
    })
}

/// Validate a PATCH body into the sanitized subset of fields to apply.
pub fn validate_patch(input: &Value) -> Result<Map<String, Value>, Vec<FieldError>> {
    validate(&PARTIAL_GESTION, input)
}

/// Validate list query parameters and build the typed filter,
/// including the `hasta >= desde` cross-field rule.
pub fn validate_list_query(input: &Value) -> Result<ListFilter, Vec<FieldError>> {
    let sanitized = validate(&LIST_GESTIONES, input)?;

    let desde = sanitized
        .get("desde")
        .and_then(Value::as_str)
        .and_then(coerce_datetime)
        .map(|dt| dt.date_naive());
    let hasta = sanitized
        .get("hasta")
        .and_then(Value::as_str)
        .and_then(coerce_datetime)
        .map(|dt| dt.date_naive());

    if let (Some(d), Some(h)) = (desde, hasta) {
        if h < d {
            return Err(vec![FieldError::new(
                "hasta",
                "La fecha \"hasta\" debe ser posterior o igual a \"desde\"",
            )]);
        }
    }

    // Whitespace-only q is treated as absent
    let q = sanitized
        .get("q")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    Ok(ListFilter {
        page: sanitized["page"].as_u64().unwrap_or(1) as u32,
        limit: sanitized["limit"].as_u64().unwrap_or(10) as u32,
        q,
        tipificacion: sanitized
            .get("tipificacion")
            .and_then(Value::as_str)
            .and_then(Tipificacion::parse),
        asesor_id: sanitized
            .get("asesorId")
            .and_then(Value::as_str)
            .map(String::from),
        estado: sanitized
            .get("estado")
            .and_then(Value::as_str)
            .and_then(Estado::parse),
        desde,
        hasta,
    })
}

/// Validate a path id: positive integer, numeric strings accepted.
pub fn parse_id(raw: &str) -> Result<i64, Vec<FieldError>> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(vec![FieldError::new(
            "id",
            "El ID debe ser un número entero positivo",
        )]),
    }
}
