//! Customer table loading, cleaning and persistence using Polars

use anyhow::Context;
use chrono::{DateTime, Local};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Identifier column of the input and output tables
pub const ID_COLUMN: &str = "CltID";

/// Label column appended to the output table
pub const CLUSTER_COLUMN: &str = "Cluster";

/// Behavioural features, in the column order used by every stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    DaysSinceLastVisit,
    CustomerTenureDays,
    BasketDiversity,
    AvgSpendPerVisit,
    AvgDaysBetweenVisits,
    TotalSpend,
    Last3MonthsGrowthRatio,
    Last6MonthsGrowthRatio,
    Last3MonthsVisitsGrowthRatio,
}

impl Feature {
    pub const COUNT: usize = 9;

    pub const ALL: [Feature; Feature::COUNT] = [
        Feature::DaysSinceLastVisit,
        Feature::CustomerTenureDays,
        Feature::BasketDiversity,
        Feature::AvgSpendPerVisit,
        Feature::AvgDaysBetweenVisits,
        Feature::TotalSpend,
        Feature::Last3MonthsGrowthRatio,
        Feature::Last6MonthsGrowthRatio,
        Feature::Last3MonthsVisitsGrowthRatio,
    ];

    /// Column header in the customer table
    pub fn column(&self) -> &'static str {
        match self {
            Feature::DaysSinceLastVisit => "DaysSinceLastVisit",
            Feature::CustomerTenureDays => "CustomerTenureDays",
            Feature::BasketDiversity => "BasketDiversity",
            Feature::AvgSpendPerVisit => "AvgSpendPerVisit",
            Feature::AvgDaysBetweenVisits => "AvgDaysBetweenVisits",
            Feature::TotalSpend => "TtlSpend",
            Feature::Last3MonthsGrowthRatio => "Last3MonthsGrowthRatio",
            Feature::Last6MonthsGrowthRatio => "Last6MonthsGrowthRatio",
            Feature::Last3MonthsVisitsGrowthRatio => "Last3MonthsVisitsGrowthRatio",
        }
    }

    /// Human-readable name for reports
    pub fn label(&self) -> &'static str {
        match self {
            Feature::DaysSinceLastVisit => "Days Since Last Visit",
            Feature::CustomerTenureDays => "Customer Tenure",
            Feature::BasketDiversity => "Basket Diversity",
            Feature::AvgSpendPerVisit => "Average Spend Per Visit",
            Feature::AvgDaysBetweenVisits => "Average Days Between Visits",
            Feature::TotalSpend => "Total Spend",
            Feature::Last3MonthsGrowthRatio => "Last Three Months Growth Rate",
            Feature::Last6MonthsGrowthRatio => "Last Six Months Growth Rate",
            Feature::Last3MonthsVisitsGrowthRatio => "Last Three Months Visit Growth Rate",
        }
    }

    /// Format a value of this feature with its unit
    pub fn format_value(&self, value: f64) -> String {
        match self {
            Feature::DaysSinceLastVisit | Feature::CustomerTenureDays => {
                format!("{:.1} days", value)
            }
            Feature::AvgSpendPerVisit | Feature::TotalSpend => format!("${:.2}", value),
            _ => format!("{:.2}", value),
        }
    }

    pub fn columns() -> Vec<&'static str> {
        Feature::ALL.iter().map(Feature::column).collect()
    }
}

/// One raw input row before cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    pub customer_id: Option<String>,
    /// One value per [`Feature::ALL`] entry; `None` when missing or non-numeric
    pub features: Vec<Option<f64>>,
}

/// Customers that survived cleaning, with their raw (unscaled) features
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerTable {
    /// Customer identifiers, one per row of `features`
    pub customer_ids: Vec<String>,
    /// Raw feature matrix (n_customers, n_features)
    pub features: Array2<f64>,
}

impl CustomerTable {
    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }
}

/// Row counts at each cleaning stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterReport {
    pub total_rows: usize,
    pub after_id_filter: usize,
    pub final_rows: usize,
}

impl FilterReport {
    pub fn removed_blank_id(&self) -> usize {
        self.total_rows - self.after_id_filter
    }

    pub fn removed_missing_features(&self) -> usize {
        self.after_id_filter - self.final_rows
    }
}

/// Drop rows with a blank identifier, then rows with any missing feature.
///
/// Nothing is imputed. Non-finite values count as missing.
pub fn clean_records(records: Vec<CustomerRecord>) -> (CustomerTable, FilterReport) {
    let total_rows = records.len();

    let with_id: Vec<(String, Vec<Option<f64>>)> = records
        .into_iter()
        .filter_map(|record| match record.customer_id {
            Some(id) if !id.trim().is_empty() => Some((id, record.features)),
            _ => None,
        })
        .collect();
    let after_id_filter = with_id.len();

    let n_features = Feature::COUNT;
    let mut customer_ids = Vec::with_capacity(after_id_filter);
    let mut values = Vec::with_capacity(after_id_filter * n_features);

    for (id, features) in with_id {
        if features.len() != n_features {
            continue;
        }
        let complete: Option<Vec<f64>> = features
            .iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        if let Some(row) = complete {
            customer_ids.push(id);
            values.extend(row);
        }
    }

    let final_rows = customer_ids.len();
    let features = Array2::from_shape_vec((final_rows, n_features), values)
        .unwrap_or_else(|_| Array2::zeros((0, n_features)));

    (
        CustomerTable {
            customer_ids,
            features,
        },
        FilterReport {
            total_rows,
            after_id_filter,
            final_rows,
        },
    )
}

/// Read the raw records of a customer CSV.
///
/// Every column is read as text, so a dirty cell anywhere in the file never
/// fails the parse; feature cells that do not parse as numbers become `None`.
pub fn read_records(file_path: &Path) -> crate::Result<Vec<CustomerRecord>> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))
        .with_context(|| format!("Failed to open customer table: {:?}", file_path))?
        .finish()
        .with_context(|| format!("Failed to parse customer table: {:?}", file_path))?;

    debug!(rows = df.height(), columns = df.width(), "read customer table");

    let ids = df
        .column(ID_COLUMN)
        .with_context(|| format!("Missing identifier column '{}'", ID_COLUMN))?
        .cast(&DataType::String)?;
    let ids: Vec<Option<String>> = ids.str()?.into_iter().map(|v| v.map(str::to_owned)).collect();

    let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(Feature::COUNT);
    for name in Feature::columns() {
        let series = df
            .column(name)
            .with_context(|| format!("Missing feature column '{}'", name))?
            .cast(&DataType::Float64)?;
        columns.push(series.f64()?.into_iter().collect());
    }

    let records = ids
        .into_iter()
        .enumerate()
        .map(|(row, customer_id)| CustomerRecord {
            customer_id,
            features: columns.iter().map(|column| column[row]).collect(),
        })
        .collect();

    Ok(records)
}

/// Load a customer CSV and apply both cleaning stages
pub fn load_customer_table(file_path: &Path) -> crate::Result<(CustomerTable, FilterReport)> {
    let records = read_records(file_path)?;
    let (table, report) = clean_records(records);

    info!(
        rows = report.after_id_filter,
        removed = report.removed_blank_id(),
        "rows after removing blank {}", ID_COLUMN
    );
    info!(
        rows = report.final_rows,
        removed = report.removed_missing_features(),
        "rows after removing missing feature values"
    );

    Ok((table, report))
}

/// Write identifier, raw features and cluster label per customer, in input order
pub fn write_segments(
    table: &CustomerTable,
    labels: &Array1<usize>,
    output_path: &Path,
) -> crate::Result<()> {
    if labels.len() != table.len() {
        anyhow::bail!(
            "Cannot write {} labels for {} customers",
            labels.len(),
            table.len()
        );
    }

    let mut columns = Vec::with_capacity(Feature::COUNT + 2);
    columns.push(Series::new(ID_COLUMN, table.customer_ids.clone()));
    for (j, feature) in Feature::ALL.iter().enumerate() {
        columns.push(Series::new(feature.column(), table.features.column(j).to_vec()));
    }
    let cluster: Vec<u32> = labels.iter().map(|&l| l as u32).collect();
    columns.push(Series::new(CLUSTER_COLUMN, cluster));

    let mut df = DataFrame::new(columns)?;
    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create file: {:?}", output_path))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .with_context(|| format!("Failed to write segments: {:?}", output_path))?;

    Ok(())
}

/// `Customer Data Segments_<YYYYMMDD_HHMMSS>.csv` next to the input file
pub fn timestamped_output_path(input: &Path, now: DateTime<Local>) -> PathBuf {
    let file_name = format!("Customer Data Segments_{}.csv", now.format("%Y%m%d_%H%M%S"));
    match input.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}
