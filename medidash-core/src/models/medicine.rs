use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Record;
use crate::table::{CellValue, Column, Tabular};

/// Stock below this many units is flagged on the inventory view.
pub const DEFAULT_LOW_STOCK: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    pub stock: i64,
    pub expiry_date: NaiveDate,
    #[serde(default)]
    pub supplier: Option<String>,
}

impl Medicine {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, expiry_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            unit: unit.into(),
            stock: 0,
            expiry_date,
            supplier: None,
        }
    }

    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock = stock;
        self
    }

    pub fn with_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    /// Expired on the expiry date itself.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date <= today
    }

    pub fn is_low_stock(&self, threshold: i64) -> bool {
        self.stock < threshold
    }
}

impl Record for Medicine {
    const TABLE: &'static str = "medicines";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Tabular for Medicine {
    fn columns() -> Vec<Column<Self>> {
        vec![
            Column::new("name", "Medicine", |m: &Medicine| m.name.as_str().into()),
            Column::new("stock", "Stock", |m: &Medicine| m.stock.into()).render_with(|v| {
                match v {
                    CellValue::Integer(n) if *n < DEFAULT_LOW_STOCK => format!("{} (low)", n),
                    other => other.to_string(),
                }
            }),
            Column::new("unit", "Unit", |m: &Medicine| m.unit.as_str().into()).unsortable(),
            Column::new("expiry", "Expires", |m: &Medicine| m.expiry_date.into()),
            Column::new("supplier", "Supplier", |m: &Medicine| m.supplier.clone().into()),
        ]
    }
}
