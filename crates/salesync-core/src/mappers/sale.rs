use serde_json::Value;

use super::{
    pick, pick_f64, pick_i64, pick_id, pick_instant, pick_ref, pick_status, pick_str, require_id,
    unwrap_envelope,
};
use crate::domain::{CustomerRow, DomainError, SaleRow};

const SALE_ID: &[&str] = &["id", "sale_id", "order_id", "transaction", "code"];
const CUSTOMER_OBJECT: &[&str] = &["customer", "buyer", "client"];

/// Maps a sale payload (list item or webhook body)
pub fn map_sale(payload: &Value) -> Result<SaleRow, DomainError> {
    let v = unwrap_envelope(payload);
    let id = require_id(v, SALE_ID, "sale")?;

    Ok(SaleRow {
        id,
        status: pick_status(v, &["status", "sale_status", "payment.status"]),
        product_external_id: pick_str(v, &["product.id", "product_id", "offer.product_id"]),
        customer_id: None,
        customer_external_id: pick_ref(
            v,
            &["customer.id", "buyer.id", "client.id", "customer_id", "buyer_id"],
        ),
        amount: pick_f64(
            v,
            &["amount", "total", "net_amount", "payment.amount", "price.value"],
        ),
        currency: pick_str(v, &["currency", "payment.currency", "price.currency_code"]),
        payment_method: pick_str(v, &["payment_method", "payment.method", "payment.type"]),
        installments: pick_i64(v, &["installments", "payment.installments"]),
        coupon_code: pick_str(v, &["coupon_code", "coupon.code", "discount_code"]),
        created_at: pick_instant(v, &["created_at", "order_date", "date"]),
        paid_at: pick_instant(v, &["paid_at", "approved_date", "payment.paid_at", "approved_at"]),
        updated_at: pick_instant(v, &["updated_at", "status_updated_at"]),
    })
}

/// Derives the customer embedded in a sale payload
///
/// Returns `None` when the sale carries no customer object with a usable
/// external id.
pub fn customer_from_sale(payload: &Value) -> Option<CustomerRow> {
    let v = unwrap_envelope(payload);
    let customer = pick(v, CUSTOMER_OBJECT).filter(|c| c.is_object())?;
    let external_id = pick_id(customer, &["id", "external_id", "code"])?;

    Some(CustomerRow {
        id: None,
        external_id,
        name: pick_str(customer, &["name", "full_name"]),
        email: pick_str(customer, &["email"]).map(|e| e.to_lowercase()),
        phone: pick_str(customer, &["phone", "mobile", "phone_number"]),
        document: pick_str(customer, &["document", "cpf", "tax_id"]),
        country: pick_str(customer, &["country", "address.country"]),
        created_at: pick_instant(customer, &["created_at"]),
    })
}
