//! Resource registry
//!
//! One [`ResourceConfig`] per upstream list resource: where to fetch it,
//! whether it accepts a date range, and how to map its items. Writing is
//! uniform: customers derived from items are upserted before the items
//! themselves, so sales never reference a customer that is not stored yet.

use std::collections::{BTreeSet, HashMap};

use salesync_core::domain::{to_row, DomainError, ResourceName, RowData, Table};
use salesync_core::mappers;
use serde_json::Value;
use tracing::{debug, warn};

use crate::writer::BatchedWriter;
use crate::WriteError;

/// One mapped upstream item
#[derive(Debug, Clone, PartialEq)]
pub struct MappedItem {
    pub row: RowData,
    /// Customer embedded in the item, written ahead of `row`
    pub customer: Option<RowData>,
}

impl MappedItem {
    fn plain(row: RowData) -> Self {
        Self {
            row,
            customer: None,
        }
    }
}

/// A mapped page, ready to be written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedPage {
    pub rows: Vec<RowData>,
    pub customers: Vec<RowData>,
    /// Items that could not be mapped
    pub dropped: usize,
}

impl MappedPage {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.customers.is_empty()
    }
}

pub type Mapper = fn(&Value) -> Result<MappedItem, DomainError>;

/// Static description of one list resource
#[derive(Clone, Copy)]
pub struct ResourceConfig {
    pub name: ResourceName,
    pub path: &'static str,
    pub table: Table,
    /// Whether the endpoint accepts `start_date`/`end_date`
    pub supports_range: bool,
    pub mapper: Mapper,
}

impl std::fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("table", &self.table)
            .field("supports_range", &self.supports_range)
            .finish_non_exhaustive()
    }
}

impl ResourceConfig {
    /// Number of intervals this resource is walked over per cycle
    pub fn interval_count(&self, intervals: usize) -> usize {
        if self.supports_range {
            intervals.max(1)
        } else {
            1
        }
    }

    /// Maps every item of a page; unmappable items are logged and dropped
    pub fn map_items(&self, items: &[Value]) -> MappedPage {
        let mut page = MappedPage::default();
        for item in items {
            match (self.mapper)(item) {
                Ok(mapped) => {
                    page.rows.push(mapped.row);
                    page.customers.extend(mapped.customer);
                }
                Err(e) => {
                    warn!(resource = %self.name, error = %e, "Dropping unmappable item");
                    page.dropped += 1;
                }
            }
        }
        page
    }

    /// Writes a mapped page and returns the rows affected in [`Self::table`]
    pub async fn write(
        &self,
        writer: &BatchedWriter,
        page: MappedPage,
    ) -> Result<u64, WriteError> {
        let MappedPage {
            mut rows,
            customers,
            ..
        } = page;

        let mut identities = if customers.is_empty() {
            HashMap::new()
        } else {
            let report = writer.upsert(Table::Customers, customers, "id").await?;
            debug!(resource = %self.name, customers = report.affected, "Derived customers written");
            report.identities
        };

        if self.table.has_column("customer_id") {
            let missing: Vec<String> = rows
                .iter()
                .filter_map(customer_reference)
                .filter(|external| !identities.contains_key(external))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            identities.extend(writer.lookup_identities(Table::Customers, &missing).await?);
            link_customers(&mut rows, &identities);
        }

        let report = writer.upsert(self.table, rows, "id").await?;
        Ok(report.affected)
    }
}

/// External customer id a row refers to
fn customer_reference(row: &RowData) -> Option<String> {
    row.get("customer_external_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Fills `customer_id` from resolved identities; unknown customers stay unset
pub fn link_customers(rows: &mut [RowData], identities: &HashMap<String, String>) {
    for row in rows {
        if let Some(internal) = customer_reference(row).and_then(|ext| identities.get(&ext)) {
            row.insert("customer_id".to_string(), Value::String(internal.clone()));
        }
    }
}

// ============================================================================
// Mappers
// ============================================================================

fn sale(item: &Value) -> Result<MappedItem, DomainError> {
    let row = to_row(&mappers::map_sale(item)?);
    let customer = mappers::customer_from_sale(item).map(|c| to_row(&c));
    Ok(MappedItem { row, customer })
}

fn product(item: &Value) -> Result<MappedItem, DomainError> {
    mappers::map_product(item).map(|r| MappedItem::plain(to_row(&r)))
}

fn customer(item: &Value) -> Result<MappedItem, DomainError> {
    mappers::map_customer(item).map(|r| MappedItem::plain(to_row(&r)))
}

fn subscription(item: &Value) -> Result<MappedItem, DomainError> {
    mappers::map_subscription(item).map(|r| MappedItem::plain(to_row(&r)))
}

fn enrollment(item: &Value) -> Result<MappedItem, DomainError> {
    mappers::map_enrollment(item).map(|r| MappedItem::plain(to_row(&r)))
}

fn coupon(item: &Value) -> Result<MappedItem, DomainError> {
    mappers::map_coupon(item).map(|r| MappedItem::plain(to_row(&r)))
}

fn refund(item: &Value) -> Result<MappedItem, DomainError> {
    mappers::map_refund(item).map(|r| MappedItem::plain(to_row(&r)))
}

fn payout(item: &Value) -> Result<MappedItem, DomainError> {
    mappers::map_payout(item).map(|r| MappedItem::plain(to_row(&r)))
}

const REGISTRY: [ResourceConfig; 8] = [
    ResourceConfig {
        name: ResourceName::Products,
        path: "/products",
        table: Table::Products,
        supports_range: false,
        mapper: product,
    },
    ResourceConfig {
        name: ResourceName::Customers,
        path: "/customers",
        table: Table::Customers,
        supports_range: true,
        mapper: customer,
    },
    ResourceConfig {
        name: ResourceName::Sales,
        path: "/sales",
        table: Table::Sales,
        supports_range: true,
        mapper: sale,
    },
    ResourceConfig {
        name: ResourceName::Subscriptions,
        path: "/subscriptions",
        table: Table::Subscriptions,
        supports_range: true,
        mapper: subscription,
    },
    ResourceConfig {
        name: ResourceName::Enrollments,
        path: "/enrollments",
        table: Table::Enrollments,
        supports_range: true,
        mapper: enrollment,
    },
    ResourceConfig {
        name: ResourceName::Coupons,
        path: "/coupons",
        table: Table::Coupons,
        supports_range: true,
        mapper: coupon,
    },
    ResourceConfig {
        name: ResourceName::Refunds,
        path: "/refunds",
        table: Table::Refunds,
        supports_range: true,
        mapper: refund,
    },
    ResourceConfig {
        name: ResourceName::Payouts,
        path: "/payouts",
        table: Table::Payouts,
        supports_range: true,
        mapper: payout,
    },
];

/// Every resource, in sync order
pub fn registry() -> &'static [ResourceConfig] {
    &REGISTRY
}

pub fn lookup(name: ResourceName) -> Option<&'static ResourceConfig> {
    REGISTRY.iter().find(|config| config.name == name)
}
