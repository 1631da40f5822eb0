//! Store table descriptors
//!
//! Every relational table the ingestion core writes to, with its known
//! column list. Store adapters only ever build SQL from these names, so a
//! row carrying an unexpected key cannot inject an identifier.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::errors::DomainError;

/// Tables in the relational store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Products,
    Customers,
    Sales,
    Subscriptions,
    Enrollments,
    Coupons,
    Refunds,
    Payouts,
    EntityVersions,
    SaleEvents,
}

impl Table {
    /// Every table, in migration order
    pub const ALL: [Table; 10] = [
        Table::Products,
        Table::Customers,
        Table::Sales,
        Table::Subscriptions,
        Table::Enrollments,
        Table::Coupons,
        Table::Refunds,
        Table::Payouts,
        Table::EntityVersions,
        Table::SaleEvents,
    ];

    /// Returns the SQL table name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Customers => "customers",
            Table::Sales => "sales",
            Table::Subscriptions => "subscriptions",
            Table::Enrollments => "enrollments",
            Table::Coupons => "coupons",
            Table::Refunds => "refunds",
            Table::Payouts => "payouts",
            Table::EntityVersions => "entity_versions",
            Table::SaleEvents => "sale_events",
        }
    }

    /// Columns a row for this table may carry
    #[must_use]
    pub const fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Products => &[
                "id",
                "external_id",
                "name",
                "status",
                "format",
                "price",
                "currency",
                "created_at",
                "updated_at",
            ],
            Table::Customers => &[
                "id",
                "external_id",
                "name",
                "email",
                "phone",
                "document",
                "country",
                "created_at",
            ],
            Table::Sales => &[
                "id",
                "status",
                "product_external_id",
                "customer_id",
                "customer_external_id",
                "amount",
                "currency",
                "payment_method",
                "installments",
                "coupon_code",
                "created_at",
                "paid_at",
                "updated_at",
            ],
            Table::Subscriptions => &[
                "id",
                "status",
                "plan",
                "product_external_id",
                "customer_external_id",
                "amount",
                "currency",
                "started_at",
                "next_charge_at",
                "canceled_at",
            ],
            Table::Enrollments => &[
                "id",
                "status",
                "product_external_id",
                "customer_external_id",
                "progress",
                "enrolled_at",
                "last_access_at",
            ],
            Table::Coupons => &[
                "id",
                "code",
                "product_external_id",
                "discount",
                "active",
                "starts_at",
                "expires_at",
            ],
            Table::Refunds => &[
                "id",
                "sale_id",
                "amount",
                "currency",
                "status",
                "reason",
                "refunded_at",
            ],
            Table::Payouts => &[
                "id",
                "amount",
                "currency",
                "status",
                "scheduled_at",
                "paid_at",
            ],
            Table::EntityVersions => &["entity_type", "entity_id", "version", "data", "changed_at"],
            Table::SaleEvents => &["sale_id", "type", "at", "meta"],
        }
    }

    /// Whether `column` is part of this table's schema
    #[must_use]
    pub fn has_column(self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    /// Tables whose internal id must stay stable across upserts of the
    /// same upstream entity
    #[must_use]
    pub const fn preserves_identity(self) -> bool {
        matches!(self, Table::Products | Table::Customers)
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::UnknownTable(s.to_string()))
    }
}
