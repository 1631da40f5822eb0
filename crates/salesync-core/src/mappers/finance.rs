use serde_json::Value;

use super::{pick_f64, pick_instant, pick_status, pick_str, require_id, unwrap_envelope};
use crate::domain::{DomainError, PayoutRow, RefundRow};

pub fn map_refund(payload: &Value) -> Result<RefundRow, DomainError> {
    let v = unwrap_envelope(payload);
    let id = require_id(v, &["id", "refund_id"], "refund")?;

    Ok(RefundRow {
        id,
        sale_id: pick_str(v, &["sale_id", "sale.id", "order_id", "transaction"]),
        amount: pick_f64(v, &["amount", "value"]),
        currency: pick_str(v, &["currency"]),
        status: pick_status(v, &["status"]),
        reason: pick_str(v, &["reason", "refund_reason"]),
        refunded_at: pick_instant(v, &["refunded_at", "created_at", "date"]),
    })
}

pub fn map_payout(payload: &Value) -> Result<PayoutRow, DomainError> {
    let v = unwrap_envelope(payload);
    let id = require_id(v, &["id", "payout_id", "withdrawal_id"], "payout")?;

    Ok(PayoutRow {
        id,
        amount: pick_f64(v, &["amount", "value", "net_amount"]),
        currency: pick_str(v, &["currency"]),
        status: pick_status(v, &["status"]),
        scheduled_at: pick_instant(v, &["scheduled_at", "scheduled_date", "created_at"]),
        paid_at: pick_instant(v, &["paid_at", "transferred_at"]),
    })
}
