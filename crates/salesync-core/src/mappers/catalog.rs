use serde_json::Value;

use super::{pick_bool, pick_f64, pick_instant, pick_status, pick_str, require_id, unwrap_envelope};
use crate::domain::{CouponRow, DomainError, ProductRow};

pub fn map_product(payload: &Value) -> Result<ProductRow, DomainError> {
    let v = unwrap_envelope(payload);
    let external_id = require_id(v, &["id", "product_id", "external_id", "ucode"], "product")?;

    Ok(ProductRow {
        id: None,
        external_id,
        name: pick_str(v, &["name", "title"]),
        status: pick_status(v, &["status", "state"]),
        format: pick_str(v, &["format", "type", "product_type"]),
        price: pick_f64(v, &["price", "price.value", "amount"]),
        currency: pick_str(v, &["currency", "price.currency_code"]),
        created_at: pick_instant(v, &["created_at", "creation_date"]),
        updated_at: pick_instant(v, &["updated_at"]),
    })
}

pub fn map_coupon(payload: &Value) -> Result<CouponRow, DomainError> {
    let v = unwrap_envelope(payload);
    let id = require_id(v, &["id", "coupon_id", "code"], "coupon")?;

    Ok(CouponRow {
        id,
        code: pick_str(v, &["code", "coupon_code"]),
        product_external_id: pick_str(v, &["product_id", "product.id"]),
        discount: pick_f64(v, &["discount", "discount_value", "value"]),
        active: pick_bool(v, &["active", "enabled", "status"]),
        starts_at: pick_instant(v, &["starts_at", "start_date"]),
        expires_at: pick_instant(v, &["expires_at", "end_date", "expiration_date"]),
    })
}
