//! Payload validation before a block is appended.
//!
//! Checks run in a fixed order and stop at the first failure, so the error
//! always names a single field.

use crate::canonical::Value;
use crate::error::ValidationError;
use crate::types::{DeliveryRef, Payload};

/// Payload key that mirrors the block's delivery reference.
pub const DELIVERY_ID_FIELD: &str = "delivery_id";

/// Payload key holding the delivered weight.
pub const QUANTITY_FIELD: &str = "quantity_kg";

/// Fields every delivery snapshot must carry.
pub const DEFAULT_REQUIRED_FIELDS: &[&str] = &[
    "planter_id",
    "date",
    "quantity_kg",
    "quality",
    "load_location",
    "unload_location",
];

/// Check required fields and the quantity.
///
/// A field counts as missing when absent, `null`, or a blank string.
pub fn validate_payload<S: AsRef<str>>(
    payload: &Payload,
    required_fields: &[S],
) -> Result<(), ValidationError> {
    for field in required_fields {
        let field = field.as_ref();
        match payload.get(field) {
            None | Some(Value::Null) => {
                return Err(ValidationError::MissingField(field.to_string()))
            }
            Some(Value::Text(s)) if s.trim().is_empty() => {
                return Err(ValidationError::MissingField(field.to_string()))
            }
            Some(_) => {}
        }
    }

    if let Some(quantity) = payload.get(QUANTITY_FIELD) {
        match quantity.as_f64() {
            Some(q) if q.is_finite() && q > 0.0 => {}
            Some(_) => {
                return Err(ValidationError::invalid(QUANTITY_FIELD, "must be a positive number"))
            }
            None => return Err(ValidationError::invalid(QUANTITY_FIELD, "must be a number")),
        }
    }

    Ok(())
}

/// Bind the payload to its delivery.
///
/// Inserts `delivery_id` when absent. A present `delivery_id` must equal the
/// delivery reference.
pub fn bind_delivery_id(
    payload: &mut Payload,
    delivery_ref: &DeliveryRef,
) -> Result<(), ValidationError> {
    match payload.get(DELIVERY_ID_FIELD) {
        None => {
            payload.insert(DELIVERY_ID_FIELD, delivery_ref.as_str());
            Ok(())
        }
        Some(Value::Text(existing)) if existing == delivery_ref.as_str() => Ok(()),
        Some(_) => Err(ValidationError::invalid(
            DELIVERY_ID_FIELD,
            format!("does not match delivery reference {}", delivery_ref),
        )),
    }
}
