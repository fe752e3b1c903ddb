//! Repository services over the relational store.
//!
//! One module per domain area. Each module owns its entity structs, its
//! closed status enums, and a service struct holding a `Store` handle (plus
//! the event bus where writes fan out). Row mapping stays next to the entity
//! it maps.

pub mod appointments;
pub mod audit;
pub mod billing;
pub mod clinical;
pub mod identity;
pub mod inpatient;
pub mod laboratory;
pub mod notifications;
pub mod patients;
pub mod pharmacy;
pub mod reference;
pub mod wounds;

use crate::{HmisError, HmisResult};

/// Parse a stored enum column, mapping unknown values to `InvalidEnum`.
pub(crate) fn enum_value<T>(
    field: &'static str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> HmisResult<T> {
    parse(value).ok_or_else(|| HmisError::InvalidEnum {
        field: field.into(),
        value: value.into(),
    })
}

/// Map a rusqlite error on insert/update to a duplicate-field domain error
/// when it is a UNIQUE violation, passing other errors through.
pub(crate) fn map_unique(
    err: rusqlite::Error,
    field: &'static str,
    value: &str,
) -> HmisError {
    if HmisError::is_unique_violation(&err) {
        HmisError::Duplicate {
            field,
            value: value.to_owned(),
        }
    } else {
        HmisError::Sqlite(err)
    }
}
