//! Dataset diagnostics: the developer report and the data-quality dashboard.

use crate::error::Result;
use crate::session::{Message, MessageContent, Role};
use crate::table::Table;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

const SAMPLE_VALUES: usize = 5;
const OUTLIER_Z: f64 = 3.0;
const EXPORT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeveloperReport {
    pub dataset_info: DatasetInfo,
    pub column_analysis: Vec<ColumnAnalysis>,
    pub quality_metrics: QualityMetrics,
    pub chat_analysis: ChatAnalysis,
    pub sql_queries: Vec<QueryRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub rows: usize,
    pub columns: usize,
    pub memory_usage_mb: f64,
    pub null_values_total: usize,
    pub duplicate_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAnalysis {
    pub column_name: String,
    pub data_type: String,
    pub null_count: usize,
    pub null_percentage: f64,
    pub unique_count: usize,
    pub unique_percentage: f64,
    pub sample_values: Vec<String>,
    #[serde(flatten)]
    pub numeric: Option<NumericSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub missing_values: MissingValues,
    pub duplicates: Duplicates,
    pub outliers: Vec<ColumnOutliers>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingValues {
    pub total_missing: usize,
    pub percentage_missing: f64,
    pub columns_with_missing: usize,
    pub missing_by_column: Vec<ColumnCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnCount {
    pub column: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Duplicates {
    pub duplicate_rows: usize,
    pub duplicate_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOutliers {
    pub column: String,
    pub outlier_count: usize,
    pub outlier_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatAnalysis {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub queries_with_sql: usize,
    pub failed_queries: usize,
    pub successful_queries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRecord {
    pub question: String,
    pub sql_query: String,
    pub success: bool,
    pub result_type: &'static str,
}

/// Flat row written to the column-analysis CSV.
#[derive(Serialize)]
struct ColumnCsvRow<'a> {
    column_name: &'a str,
    data_type: &'a str,
    null_count: usize,
    null_percentage: f64,
    unique_count: usize,
    unique_percentage: f64,
    sample_values: String,
    min: Option<f64>,
    max: Option<f64>,
    mean: Option<f64>,
    std: Option<f64>,
}

impl DeveloperReport {
    pub fn generate(table: &Table, messages: &[Message]) -> Self {
        let rows = table.row_count();
        let duplicate_rows = table.duplicate_rows();

        let dataset_info = DatasetInfo {
            rows,
            columns: table.column_count(),
            memory_usage_mb: table.approx_memory_bytes() as f64 / (1024.0 * 1024.0),
            null_values_total: table.total_nulls(),
            duplicate_rows,
        };

        let column_analysis = table
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| {
                let null_count = table.null_count(idx);
                let unique_count = table.unique_count(idx);
                let numeric = column.data_type.is_numeric().then(|| {
                    let values = table.numeric_values(idx);
                    NumericSummary {
                        min: values.iter().copied().reduce(f64::min),
                        max: values.iter().copied().reduce(f64::max),
                        mean: mean(&values),
                        std: std_dev(&values, 1),
                    }
                });
                ColumnAnalysis {
                    column_name: column.name.clone(),
                    data_type: column.data_type.to_string(),
                    null_count,
                    null_percentage: percentage(null_count, rows),
                    unique_count,
                    unique_percentage: percentage(unique_count, rows),
                    sample_values: table
                        .column_values(idx)
                        .filter(|v| !v.is_null())
                        .take(SAMPLE_VALUES)
                        .map(|v| v.to_string())
                        .collect(),
                    numeric,
                }
            })
            .collect();

        let missing_by_column: Vec<ColumnCount> = table
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| ColumnCount {
                column: column.name.clone(),
                count: table.null_count(idx),
            })
            .collect();
        let total_missing = table.total_nulls();

        let outliers = numeric_columns(table)
            .filter_map(|(idx, name)| {
                let values = table.numeric_values(idx);
                if values.is_empty() {
                    return None;
                }
                let count = outlier_count(&values, 1);
                Some(ColumnOutliers {
                    column: name.to_string(),
                    outlier_count: count,
                    outlier_percentage: percentage(count, rows),
                })
            })
            .collect();

        let quality_metrics = QualityMetrics {
            missing_values: MissingValues {
                total_missing,
                percentage_missing: percentage(total_missing, rows * table.column_count()),
                columns_with_missing: missing_by_column.iter().filter(|c| c.count > 0).count(),
                missing_by_column,
            },
            duplicates: Duplicates {
                duplicate_rows,
                duplicate_percentage: percentage(duplicate_rows, rows),
            },
            outliers,
        };

        Self {
            dataset_info,
            column_analysis,
            quality_metrics,
            chat_analysis: ChatAnalysis::from_messages(messages),
            sql_queries: query_records(messages),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as `developer_report_<timestamp>.json` under `dir`.
    pub fn export_json<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = export_path(dir.as_ref(), "developer_report", "json")?;
        std::fs::write(&path, self.to_json()?)?;
        tracing::info!(path = %path.display(), "exported developer report");
        Ok(path)
    }

    /// Write the per-column analysis as `column_analysis_<timestamp>.csv`.
    pub fn export_column_csv<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = export_path(dir.as_ref(), "column_analysis", "csv")?;
        let mut writer = csv::Writer::from_path(&path)?;
        for column in &self.column_analysis {
            let numeric = column.numeric.as_ref();
            writer.serialize(ColumnCsvRow {
                column_name: &column.column_name,
                data_type: &column.data_type,
                null_count: column.null_count,
                null_percentage: column.null_percentage,
                unique_count: column.unique_count,
                unique_percentage: column.unique_percentage,
                sample_values: column.sample_values.join("; "),
                min: numeric.and_then(|n| n.min),
                max: numeric.and_then(|n| n.max),
                mean: numeric.and_then(|n| n.mean),
                std: numeric.and_then(|n| n.std),
            })?;
        }
        writer.flush()?;
        tracing::info!(path = %path.display(), "exported column analysis");
        Ok(path)
    }
}

impl ChatAnalysis {
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut analysis = Self {
            total_messages: messages.len(),
            ..Self::default()
        };
        for message in messages {
            match message.role {
                Role::User => analysis.user_messages += 1,
                Role::Assistant => analysis.assistant_messages += 1,
            }
            if message.sql_query.is_some() {
                analysis.queries_with_sql += 1;
                if !message.error {
                    analysis.successful_queries += 1;
                }
            }
            if message.error {
                analysis.failed_queries += 1;
            }
        }
        analysis
    }
}

fn query_records(messages: &[Message]) -> Vec<QueryRecord> {
    messages
        .iter()
        .enumerate()
        .filter_map(|(idx, message)| {
            let sql = message.sql_query.as_ref()?;
            let question = messages[..idx]
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            Some(QueryRecord {
                question,
                sql_query: sql.clone(),
                success: !message.error,
                result_type: match &message.content {
                    MessageContent::Result(r) if r.is_table() => "table",
                    _ => "text",
                },
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityGrade {
    Good,
    Fair,
    Poor,
}

impl QualityGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityGrade::Good
        } else if score >= 70.0 {
            QualityGrade::Fair
        } else {
            QualityGrade::Poor
        }
    }
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QualityGrade::Good => "Good",
            QualityGrade::Fair => "Fair",
            QualityGrade::Poor => "Poor",
        })
    }
}

/// Summary scores for a dataset. Percentages are unrounded; the score is
/// rounded to one decimal.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityDashboard {
    pub missing: Vec<ColumnCount>,
    pub total_missing: usize,
    pub percent_missing: f64,
    pub duplicates: usize,
    pub percent_duplicates: f64,
    pub outliers: Vec<ColumnCount>,
    pub total_outliers: usize,
    pub percent_outliers: f64,
    pub score: f64,
    pub grade: QualityGrade,
}

impl QualityDashboard {
    pub fn compute(table: &Table) -> Self {
        let rows = table.row_count();

        let missing: Vec<ColumnCount> = table
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| ColumnCount {
                column: column.name.clone(),
                count: table.null_count(idx),
            })
            .collect();
        let total_missing: usize = missing.iter().map(|c| c.count).sum();
        let percent_missing = ratio(total_missing, rows * table.column_count()) * 100.0;

        let duplicates = table.duplicate_rows();
        let percent_duplicates = ratio(duplicates, rows) * 100.0;

        let outliers: Vec<ColumnCount> = numeric_columns(table)
            .map(|(idx, name)| ColumnCount {
                column: name.to_string(),
                count: outlier_count(&table.numeric_values(idx), 0),
            })
            .collect();
        let total_outliers: usize = outliers.iter().map(|c| c.count).sum();
        let percent_outliers = if outliers.is_empty() {
            0.0
        } else {
            ratio(total_outliers, rows * outliers.len()) * 100.0
        };

        let raw = 100.0 - (percent_missing * 0.5 + percent_duplicates * 0.3 + percent_outliers * 0.2);
        let score = round_to(raw, 1).clamp(0.0, 100.0);

        Self {
            missing,
            total_missing,
            percent_missing,
            duplicates,
            percent_duplicates,
            outliers,
            total_outliers,
            percent_outliers,
            score,
            grade: QualityGrade::from_score(score),
        }
    }
}

impl fmt::Display for QualityDashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data Quality Score: {} / 100 ({})", self.score, self.grade)?;
        writeln!(f)?;
        writeln!(f, "Missing Values:     {} ({:.2}%)", self.total_missing, self.percent_missing)?;
        writeln!(f, "Duplicate Rows:     {} ({:.2}%)", self.duplicates, self.percent_duplicates)?;
        write!(f, "Outliers (numeric): {} ({:.2}%)", self.total_outliers, self.percent_outliers)?;

        let missing: Vec<&ColumnCount> = self.missing.iter().filter(|c| c.count > 0).collect();
        if !missing.is_empty() {
            write!(f, "\n\nMissing Values by Column:")?;
            for c in missing {
                write!(f, "\n  {}: {}", c.column, c.count)?;
            }
        }

        let outliers: Vec<&ColumnCount> = self.outliers.iter().filter(|c| c.count > 0).collect();
        if !outliers.is_empty() {
            write!(f, "\n\nOutliers by Numeric Column:")?;
            for c in outliers {
                write!(f, "\n  {}: {}", c.column, c.count)?;
            }
        }
        Ok(())
    }
}

fn numeric_columns(table: &Table) -> impl Iterator<Item = (usize, &str)> + '_ {
    table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, c)| c.data_type.is_numeric())
        .map(|(idx, c)| (idx, c.name.as_str()))
}

fn export_path(dir: &Path, stem: &str, extension: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stamp = chrono::Local::now().format(EXPORT_TIMESTAMP_FORMAT);
    Ok(dir.join(format!("{}_{}.{}", stem, stamp, extension)))
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// `part / whole` as a percentage rounded to 2 decimals.
fn percentage(part: usize, whole: usize) -> f64 {
    round_to(ratio(part, whole) * 100.0, 2)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Standard deviation with `ddof` delta degrees of freedom.
fn std_dev(values: &[f64], ddof: usize) -> Option<f64> {
    if values.len() <= ddof {
        return None;
    }
    let mean = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((sum_sq / (values.len() - ddof) as f64).sqrt())
}

/// Values more than three standard deviations from the mean. A zero or
/// undefined deviation yields no outliers.
fn outlier_count(values: &[f64], ddof: usize) -> usize {
    let (Some(mean), Some(std)) = (mean(values), std_dev(values, ddof)) else {
        return 0;
    };
    if std == 0.0 {
        return 0;
    }
    values
        .iter()
        .filter(|v| ((*v - mean) / std).abs() > OUTLIER_Z)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Rendering;
    use tempfile::TempDir;

    fn table() -> Table {
        Table::from_reader("A,B\n1,x\n2,\n3,x\n3,x\n".as_bytes()).unwrap()
    }

    fn spiky() -> Table {
        // Twenty equal values and one far-off value.
        let mut csv = String::from("v\n");
        for _ in 0..20 {
            csv.push_str("10\n");
        }
        csv.push_str("1000\n");
        Table::from_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_dataset_and_column_analysis() {
        let report = DeveloperReport::generate(&table(), &[]);
        assert_eq!(report.dataset_info.rows, 4);
        assert_eq!(report.dataset_info.null_values_total, 1);
        assert_eq!(report.dataset_info.duplicate_rows, 1);

        let a = &report.column_analysis[0];
        assert_eq!(a.data_type, "integer");
        assert_eq!(a.unique_count, 3);
        assert_eq!(a.unique_percentage, 75.0);
        let stats = a.numeric.as_ref().unwrap();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(3.0));
        assert_eq!(stats.mean, Some(2.25));
        // sample std of [1, 2, 3, 3]
        assert!((stats.std.unwrap() - 0.957_427_107_756_338_1).abs() < 1e-12);

        let b = &report.column_analysis[1];
        assert_eq!(b.null_percentage, 25.0);
        assert_eq!(b.sample_values, vec!["x", "x", "x"]);
        assert!(b.numeric.is_none());
    }

    #[test]
    fn test_quality_metrics() {
        let report = DeveloperReport::generate(&table(), &[]);
        let missing = &report.quality_metrics.missing_values;
        assert_eq!(missing.total_missing, 1);
        assert_eq!(missing.percentage_missing, 12.5);
        assert_eq!(missing.columns_with_missing, 1);
        assert_eq!(report.quality_metrics.duplicates.duplicate_percentage, 25.0);
        assert_eq!(report.quality_metrics.outliers.len(), 1);
        assert_eq!(report.quality_metrics.outliers[0].outlier_count, 0);
    }

    #[test]
    fn test_chat_analysis_and_queries() {
        let mut ok = Message::assistant(MessageContent::Result(Rendering::text("Result: 4")));
        ok.sql_query = Some("SELECT COUNT(*) FROM df".to_string());
        let mut failed = Message::assistant(MessageContent::Text("Query Execution Failed".to_string()));
        failed.sql_query = Some("SELECT nope FROM df".to_string());
        failed.error = true;

        let messages = vec![
            Message::user("How many rows?"),
            ok,
            Message::user("Broken question"),
            failed,
        ];
        let report = DeveloperReport::generate(&table(), &messages);

        assert_eq!(
            report.chat_analysis,
            ChatAnalysis {
                total_messages: 4,
                user_messages: 2,
                assistant_messages: 2,
                queries_with_sql: 2,
                failed_queries: 1,
                successful_queries: 1,
            }
        );
        assert_eq!(report.sql_queries[0].question, "How many rows?");
        assert_eq!(report.sql_queries[1].question, "Broken question");
        assert!(!report.sql_queries[1].success);
        assert_eq!(report.sql_queries[0].result_type, "text");
    }

    #[test]
    fn test_dashboard_scores() {
        let dashboard = QualityDashboard::compute(&table());
        assert_eq!(dashboard.total_missing, 1);
        assert_eq!(dashboard.percent_missing, 12.5);
        assert_eq!(dashboard.percent_duplicates, 25.0);
        assert_eq!(dashboard.percent_outliers, 0.0);
        // 100 - (6.25 + 7.5)
        assert_eq!(dashboard.score, 86.3);
        assert_eq!(dashboard.grade, QualityGrade::Fair);
    }

    #[test]
    fn test_outliers_use_population_std() {
        let dashboard = QualityDashboard::compute(&spiky());
        assert_eq!(dashboard.total_outliers, 1);
        assert_eq!(dashboard.outliers[0].count, 1);
    }

    #[test]
    fn test_empty_table_has_no_division_by_zero() {
        let empty = Table::from_reader("A,B\n".as_bytes()).unwrap();
        let dashboard = QualityDashboard::compute(&empty);
        assert_eq!(dashboard.score, 100.0);
        assert_eq!(dashboard.grade, QualityGrade::Good);

        let report = DeveloperReport::generate(&empty, &[]);
        assert_eq!(report.quality_metrics.missing_values.percentage_missing, 0.0);
    }

    #[test]
    fn test_grades() {
        assert_eq!(QualityGrade::from_score(90.0), QualityGrade::Good);
        assert_eq!(QualityGrade::from_score(89.9), QualityGrade::Fair);
        assert_eq!(QualityGrade::from_score(70.0), QualityGrade::Fair);
        assert_eq!(QualityGrade::from_score(12.0), QualityGrade::Poor);
    }

    #[test]
    fn test_exports() {
        let dir = TempDir::new().unwrap();
        let report = DeveloperReport::generate(&table(), &[]);

        let json_path = report.export_json(dir.path()).unwrap();
        let name = json_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("developer_report_") && name.ends_with(".json"));
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(parsed["dataset_info"]["rows"], 4);
        assert_eq!(parsed["column_analysis"][0]["min"], 1.0);

        let csv_path = report.export_column_csv(dir.path()).unwrap();
        let text = std::fs::read_to_string(csv_path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("column_name,data_type,null_count"));
        assert_eq!(lines.count(), 2);
    }
}
