//! Typed column descriptors with client-side search, sort and pagination.
//!
//! Each column pairs an accessor (`row -> CellValue`) with a renderer
//! (`CellValue -> String`), so views never look fields up by string path.

use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// A single cell, typed so sorting compares values rather than text.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    fn rank(&self) -> u8 {
        match self {
            CellValue::Bool(_) => 0,
            CellValue::Integer(_) | CellValue::Decimal(_) => 1,
            CellValue::Date(_) | CellValue::Timestamp(_) => 2,
            CellValue::Text(_) => 3,
            CellValue::Empty => 4,
        }
    }

    /// Total order used for sorting. Empty cells sort last.
    pub fn compare(&self, other: &Self) -> Ordering {
        use CellValue::*;
        match (self, other) {
            (Text(a), Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Integer(a), Decimal(b)) => (*a as f64).total_cmp(b),
            (Decimal(a), Integer(b)) => a.total_cmp(&(*b as f64)),
            (Decimal(a), Decimal(b)) => a.total_cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            (Date(a), Timestamp(b)) => a.cmp(&b.date_naive()),
            (Timestamp(a), Date(b)) => a.date_naive().cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Case-insensitive substring match; `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        match self {
            CellValue::Empty => false,
            other => other.to_string().to_lowercase().contains(needle),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Integer(n) => write!(f, "{}", n),
            CellValue::Decimal(n) => write!(f, "{:.2}", n),
            CellValue::Bool(true) => f.write_str("yes"),
            CellValue::Bool(false) => f.write_str("no"),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M")),
        }
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Integer(value.into())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Decimal(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl From<DateTime<Utc>> for CellValue {
    fn from(value: DateTime<Utc>) -> Self {
        CellValue::Timestamp(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

type Accessor<R> = Box<dyn Fn(&R) -> CellValue + Send + Sync>;
type Renderer = Box<dyn Fn(&CellValue) -> String + Send + Sync>;

pub struct Column<R> {
    key: &'static str,
    header: &'static str,
    accessor: Accessor<R>,
    render: Renderer,
    sortable: bool,
    searchable: bool,
}

impl<R> Column<R> {
    pub fn new<F>(key: &'static str, header: &'static str, accessor: F) -> Self
    where
        F: Fn(&R) -> CellValue + Send + Sync + 'static,
    {
        Self {
            key,
            header,
            accessor: Box::new(accessor),
            render: Box::new(|value| value.to_string()),
            sortable: true,
            searchable: true,
        }
    }

    pub fn render_with<F>(mut self, render: F) -> Self
    where
        F: Fn(&CellValue) -> String + Send + Sync + 'static,
    {
        self.render = Box::new(render);
        self
    }

    pub fn unsortable(mut self) -> Self {
        self.sortable = false;
        self
    }

    pub fn unsearchable(mut self) -> Self {
        self.searchable = false;
        self
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn header(&self) -> &'static str {
        self.header
    }

    pub fn value(&self, row: &R) -> CellValue {
        (self.accessor)(row)
    }

    pub fn render(&self, row: &R) -> String {
        (self.render)(&self.value(row))
    }
}

impl<R> fmt::Debug for Column<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("key", &self.key)
            .field("sortable", &self.sortable)
            .field("searchable", &self.searchable)
            .finish()
    }
}

/// Rows that know how to present themselves as a table.
pub trait Tabular: Sized {
    fn columns() -> Vec<Column<Self>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub search: Option<String>,
    pub sort: Option<(String, SortDirection)>,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            search: None,
            sort: None,
            page: 1,
            per_page: 20,
        }
    }
}

impl TableQuery {
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn sort_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort = Some((column.into(), direction));
        self
    }

    pub fn page(mut self, page: usize, per_page: usize) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("column '{0}' cannot be sorted")]
    NotSortable(String),
}

#[derive(Debug)]
pub struct Page<'a, R> {
    pub rows: Vec<&'a R>,
    /// Page actually shown, after clamping.
    pub page: usize,
    pub per_page: usize,
    /// Rows matching the search, across all pages.
    pub total_rows: usize,
    pub total_pages: usize,
}

pub struct TableView<R> {
    columns: Vec<Column<R>>,
}

impl<R: Tabular> TableView<R> {
    pub fn for_rows() -> Self {
        Self::new(R::columns())
    }
}

impl<R> TableView<R> {
    pub fn new(columns: Vec<Column<R>>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column<R>] {
        &self.columns
    }

    pub fn column(&self, key: &str) -> Option<&Column<R>> {
        self.columns.iter().find(|c| c.key.eq_ignore_ascii_case(key))
    }

    /// Filters, sorts and slices `rows`.
    pub fn apply<'a>(&self, rows: &'a [R], query: &TableQuery) -> Result<Page<'a, R>, TableError> {
        let sort_column = match &query.sort {
            Some((key, direction)) => {
                let column = self
                    .column(key)
                    .ok_or_else(|| TableError::UnknownColumn(key.clone()))?;
                if !column.sortable {
                    return Err(TableError::NotSortable(key.clone()));
                }
                Some((column, *direction))
            }
            None => None,
        };

        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matched: Vec<&R> = rows
            .iter()
            .filter(|row| match &needle {
                Some(needle) => self
                    .columns
                    .iter()
                    .filter(|c| c.searchable)
                    .any(|c| c.value(row).matches(needle)),
                None => true,
            })
            .collect();

        if let Some((column, direction)) = sort_column {
            // Stable sort; empties stay last in both directions.
            matched.sort_by(|a, b| {
                let (a, b) = (column.value(a), column.value(b));
                match (a.is_empty(), b.is_empty()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => match direction {
                        SortDirection::Ascending => a.compare(&b),
                        SortDirection::Descending => b.compare(&a),
                    },
                }
            });
        }

        let per_page = query.per_page.max(1);
        let total_rows = matched.len();
        let total_pages = total_rows.div_ceil(per_page).max(1);
        let page = query.page.clamp(1, total_pages);
        let rows = matched
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        Ok(Page {
            rows,
            page,
            per_page,
            total_rows,
            total_pages,
        })
    }

    pub fn headers(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.header).collect()
    }

    pub fn render_row(&self, row: &R) -> Vec<String> {
        self.columns.iter().map(|c| c.render(row)).collect()
    }

    /// Lays the page out as aligned plain-text columns.
    pub fn render_text(&self, page: &Page<'_, R>) -> String {
        let headers = self.headers();
        let body: Vec<Vec<String>> = page.rows.iter().map(|row| self.render_row(row)).collect();

        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for cells in &body {
            for (width, cell) in widths.iter_mut().zip(cells) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let line = |cells: Vec<String>| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = String::new();
        out.push_str(&line(headers.iter().map(|h| h.to_string()).collect()));
        out.push('\n');
        out.push_str(&line(widths.iter().map(|w| "-".repeat(*w)).collect()));
        out.push('\n');
        for cells in body {
            out.push_str(&line(cells));
            out.push('\n');
        }
        out
    }
}
