use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The engine rejected the SQL text. `column` names the dataset header
    /// with whitespace that the failing token belongs to, if any.
    Syntax { column: Option<String> },
    MissingColumn,
    AmbiguousColumn,
    Other,
}

/// A classified execution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
}

impl QueryError {
    /// Sort an engine error message into a kind. `spaced_headers` are the
    /// dataset columns whose names contain whitespace.
    pub fn classify(message: impl Into<String>, spaced_headers: &[String]) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        let kind = if lower.contains("syntax error") {
            let column = near_token(&message).and_then(|token| {
                spaced_headers
                    .iter()
                    .find(|header| header.split_whitespace().any(|w| w.eq_ignore_ascii_case(token)))
                    .cloned()
            });
            QueryErrorKind::Syntax { column }
        } else if lower.contains("no such column") {
            QueryErrorKind::MissingColumn
        } else if lower.contains("ambiguous column name") {
            QueryErrorKind::AmbiguousColumn
        } else {
            QueryErrorKind::Other
        };

        Self { kind, message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::Other,
            message: message.into(),
        }
    }

    /// Short advisory shown next to the failure.
    pub fn hint(&self) -> String {
        match &self.kind {
            QueryErrorKind::Syntax { column: Some(column) } => format!(
                "Column names with spaces need to be quoted. Try using `[{0}]` or `\"{0}\"` in your question.",
                column
            ),
            QueryErrorKind::Syntax { column: None } => "There's a syntax error in the SQL. This might be due to column names with spaces or special characters.".to_string(),
            QueryErrorKind::MissingColumn => "The column name might not exist or might have spaces. Check the schema for exact column names.".to_string(),
            QueryErrorKind::AmbiguousColumn => "Multiple columns have similar names. Be more specific about which column you want.".to_string(),
            QueryErrorKind::Other => self.message.clone(),
        }
    }
}

/// Token quoted in SQLite's `near "X": syntax error` messages.
fn near_token(message: &str) -> Option<&str> {
    let start = message.find("near \"")? + "near \"".len();
    let rest = &message[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}
