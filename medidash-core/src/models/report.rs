use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Record;
use crate::table::{Column, Tabular};

/// A generated hospital report (occupancy, dispatch, inventory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl Record for Report {
    const TABLE: &'static str = "reports";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Tabular for Report {
    fn columns() -> Vec<Column<Self>> {
        vec![
            Column::new("title", "Title", |r: &Report| r.title.as_str().into()),
            Column::new("category", "Category", |r: &Report| r.category.as_str().into()),
            Column::new("generated", "Generated", |r: &Report| r.generated_at.into())
                .unsearchable(),
            Column::new("author", "Author", |r: &Report| r.author.clone().into()),
            Column::new("summary", "Summary", |r: &Report| r.summary.clone().into())
                .unsortable(),
        ]
    }
}
