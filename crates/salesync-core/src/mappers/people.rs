use serde_json::Value;

use super::{
    pick_f64, pick_instant, pick_ref, pick_status, pick_str, require_id, unwrap_envelope,
};
use crate::domain::{CustomerRow, DomainError, EnrollmentRow, SubscriptionRow};

pub fn map_customer(payload: &Value) -> Result<CustomerRow, DomainError> {
    let v = unwrap_envelope(payload);
    let external_id = require_id(v, &["id", "customer_id", "external_id", "code"], "customer")?;

    Ok(CustomerRow {
        id: None,
        external_id,
        name: pick_str(v, &["name", "full_name"]),
        email: pick_str(v, &["email"]).map(|e| e.to_lowercase()),
        phone: pick_str(v, &["phone", "mobile", "phone_number"]),
        document: pick_str(v, &["document", "cpf", "tax_id"]),
        country: pick_str(v, &["country", "address.country"]),
        created_at: pick_instant(v, &["created_at", "registered_at"]),
    })
}

pub fn map_subscription(payload: &Value) -> Result<SubscriptionRow, DomainError> {
    let v = unwrap_envelope(payload);
    let id = require_id(v, &["id", "subscription_id", "subscriber_code"], "subscription")?;

    Ok(SubscriptionRow {
        id,
        status: pick_status(v, &["status"]),
        plan: pick_str(v, &["plan.name", "plan", "plan_name"]),
        product_external_id: pick_str(v, &["product.id", "product_id"]),
        customer_external_id: pick_ref(v, &["customer.id", "subscriber.id", "customer_id"]),
        amount: pick_f64(v, &["amount", "price.value", "plan.price"]),
        currency: pick_str(v, &["currency", "price.currency_code"]),
        started_at: pick_instant(v, &["started_at", "start_date", "accession_date"]),
        next_charge_at: pick_instant(v, &["next_charge_at", "next_charge_date"]),
        canceled_at: pick_instant(v, &["canceled_at", "cancellation_date"]),
    })
}

pub fn map_enrollment(payload: &Value) -> Result<EnrollmentRow, DomainError> {
    let v = unwrap_envelope(payload);
    let id = require_id(v, &["id", "enrollment_id"], "enrollment")?;

    Ok(EnrollmentRow {
        id,
        status: pick_status(v, &["status"]),
        product_external_id: pick_str(v, &["product.id", "course.id", "product_id"]),
        customer_external_id: pick_ref(v, &["customer.id", "student.id", "customer_id"]),
        progress: pick_f64(v, &["progress", "completion_percentage", "progress.percentage"]),
        enrolled_at: pick_instant(v, &["enrolled_at", "created_at"]),
        last_access_at: pick_instant(v, &["last_access_at", "last_accessed_at"]),
    })
}
