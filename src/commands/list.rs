use clap::Args;
use medidash_core::models::{Ambulance, Appointment, Bed, Emergency, Medicine, Record, Report};
use medidash_core::table::{Page, SortDirection, TableQuery, TableView, Tabular};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Entity, OutputFormat};
use crate::sync::RestClient;

#[derive(Args)]
pub struct ListCommand {
    /// Table to list
    #[arg(value_enum)]
    pub entity: Entity,

    /// Only rows containing this text (case-insensitive)
    #[arg(long, short)]
    pub search: Option<String>,

    /// Column key to sort by
    #[arg(long)]
    pub sort: Option<String>,

    /// Sort descending
    #[arg(long, requires = "sort")]
    pub desc: bool,

    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Rows per page
    #[arg(long, default_value_t = 20)]
    pub per_page: usize,

    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct JsonPage<'a, R> {
    table: &'static str,
    page: usize,
    per_page: usize,
    total_rows: usize,
    total_pages: usize,
    rows: &'a [&'a R],
}

impl ListCommand {
    pub async fn run(&self, rest: &RestClient) -> Result<(), Box<dyn std::error::Error>> {
        match self.entity {
            Entity::Emergencies => self.list::<Emergency>(rest).await,
            Entity::Ambulances => self.list::<Ambulance>(rest).await,
            Entity::Beds => self.list::<Bed>(rest).await,
            Entity::Appointments => self.list::<Appointment>(rest).await,
            Entity::Medicines => self.list::<Medicine>(rest).await,
            Entity::Reports => self.list::<Report>(rest).await,
        }
    }

    fn query(&self) -> TableQuery {
        let mut query = TableQuery::default().page(self.page, self.per_page);
        if let Some(search) = &self.search {
            query = query.search(search.clone());
        }
        if let Some(column) = &self.sort {
            let direction = if self.desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            query = query.sort_by(column.clone(), direction);
        }
        query
    }

    async fn list<R>(&self, rest: &RestClient) -> Result<(), Box<dyn std::error::Error>>
    where
        R: Record + Tabular + DeserializeOwned + Serialize,
    {
        let rows: Vec<R> = rest.fetch_rows(R::TABLE).await?;
        let view = TableView::<R>::for_rows();
        let page = view.apply(&rows, &self.query())?;

        match self.format {
            OutputFormat::Json => {
                let json = JsonPage {
                    table: R::TABLE,
                    page: page.page,
                    per_page: page.per_page,
                    total_rows: page.total_rows,
                    total_pages: page.total_pages,
                    rows: &page.rows,
                };
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            OutputFormat::Text => print!("{}", render_page(&view, &page)),
        }
        Ok(())
    }
}

fn render_page<R>(view: &TableView<R>, page: &Page<'_, R>) -> String {
    if page.total_rows == 0 {
        return "No rows found.\n".to_string();
    }
    format!(
        "{}\nPage {}/{} ({} rows)\n",
        view.render_text(page),
        page.page,
        page.total_pages,
        page.total_rows
    )
}
