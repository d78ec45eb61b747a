use datachat_core::bridge::{CompletionClient, CompletionRequest, PromptTemplate};
use datachat_core::format::{format_result, ResultShape};
use datachat_core::report::{DeveloperReport, QualityDashboard};
use datachat_core::session::{AskOutcome, Role};
use datachat_core::sql::types::Value;
use datachat_core::{AppState, Dataset, Executor, FavoritesStore, QueryGenerator, Rendering, Table};
use std::cell::RefCell;
use std::rc::Rc;
use tempfile::TempDir;

const THREE_BY_TWO: &str = "A,B\n1,x\n2,\n3,y\n";

/// Records every request and replies with a fixed completion.
struct RecordingClient {
    reply: String,
    requests: Rc<RefCell<Vec<CompletionRequest>>>,
}

impl CompletionClient for RecordingClient {
    fn complete(&self, request: &CompletionRequest) -> datachat_core::Result<Option<String>> {
        self.requests.borrow_mut().push(request.clone());
        Ok(Some(self.reply.clone()))
    }
}

fn generator(reply: &str) -> (QueryGenerator, Rc<RefCell<Vec<CompletionRequest>>>) {
    let requests = Rc::new(RefCell::new(Vec::new()));
    let client = RecordingClient {
        reply: reply.to_string(),
        requests: Rc::clone(&requests),
    };
    (
        QueryGenerator::new(Box::new(client), PromptTemplate::default()),
        requests,
    )
}

fn sample_table() -> Table {
    Table::from_reader(THREE_BY_TWO.as_bytes()).unwrap()
}

#[test]
fn test_null_count_end_to_end() {
    let executor = Executor::new(&sample_table()).unwrap();
    let result = executor
        .execute("SELECT COUNT(*) AS b_nulls FROM df WHERE B IS NULL")
        .unwrap();

    assert_eq!(ResultShape::classify(&result), ResultShape::Scalar);
    assert_eq!(format_result(&result).to_string(), "B: 1 null values");
}

#[test]
fn test_per_column_null_counts() {
    let executor = Executor::new(&sample_table()).unwrap();
    let result = executor
        .execute(
            "SELECT SUM(A IS NULL) AS a_nulls, SUM(B IS NULL) AS b_nulls FROM df",
        )
        .unwrap();

    let rendering = format_result(&result);
    assert_eq!(
        rendering.to_string(),
        "Null Count Results:\n\n• A: 0 null values\n• B: 1 null values"
    );
}

#[test]
fn test_dashboard_matches_direct_computation() {
    let table = sample_table();
    let dashboard = QualityDashboard::compute(&table);

    let cells = table.row_count() * table.column_count();
    let nulls: usize = table
        .rows()
        .iter()
        .flatten()
        .filter(|v| **v == Value::Null)
        .count();

    assert_eq!(dashboard.total_missing, nulls);
    assert!((dashboard.percent_missing - nulls as f64 / cells as f64 * 100.0).abs() < 1e-9);
    assert_eq!(dashboard.duplicates, 0);
    assert_eq!(dashboard.percent_duplicates, 0.0);
    assert_eq!(dashboard.total_outliers, 0);

    let expected_score = 100.0 - (nulls as f64 / cells as f64 * 100.0) * 0.5;
    assert!((dashboard.score - (expected_score * 10.0).round() / 10.0).abs() < 1e-9);
}

#[test]
fn test_ask_pipeline_with_stub_generator() {
    let dir = TempDir::new().unwrap();
    let mut state = AppState::new(FavoritesStore::load(dir.path().join("favorites.json")));
    state
        .load_dataset(Dataset::new("three_by_two.csv", sample_table()))
        .unwrap();

    let (generator, requests) =
        generator("```sql\nSELECT COUNT(*) AS b_nulls FROM df WHERE B IS NULL\n```");
    let outcome = state.ask("How many nulls are in B?", &generator);
    assert_eq!(outcome, AskOutcome::Answered(Rendering::text("B: 1 null values")));

    let requests = requests.borrow();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains("Table name: 'df'"));
    assert!(requests[0].prompt.contains("- B: text, 1 null values, 2 unique values"));
    assert!(requests[0].prompt.contains("User Question: How many nulls are in B?"));

    assert_eq!(state.messages[1].role, Role::Assistant);
    assert!(state.save_last_favorite().unwrap());

    let report = DeveloperReport::generate(state.table().unwrap(), &state.messages);
    assert_eq!(report.chat_analysis.successful_queries, 1);
    assert_eq!(report.sql_queries[0].question, "How many nulls are in B?");
}

#[test]
fn test_favorites_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("favorites.json");

    let mut store = FavoritesStore::load(&path);
    assert!(store.add("Total?", "SELECT SUM(A) FROM df", "Result: 6").unwrap());
    assert!(!store.add("Total?", "SELECT SUM(A) FROM df", "Result: 6").unwrap());
    assert!(store.add("Rows?", "SELECT * FROM df", "Table with 3 rows").unwrap());
    assert_eq!(store.list().last().unwrap().id, 2);

    let reloaded = FavoritesStore::load(&path);
    assert_eq!(reloaded.list(), store.list());
}

#[test]
fn test_generated_writes_cannot_modify_data() {
    let dir = TempDir::new().unwrap();
    let mut state = AppState::new(FavoritesStore::load(dir.path().join("favorites.json")));
    state
        .load_dataset(Dataset::new("three_by_two.csv", sample_table()))
        .unwrap();

    let (generator, _) = generator("DROP TABLE df");
    let outcome = state.ask("Delete everything", &generator);
    assert!(matches!(outcome, AskOutcome::ExecutionFailed { .. }));
    assert!(state.messages.last().unwrap().error);

    let outcome = state.run_sql("SELECT COUNT(*) FROM df");
    assert_eq!(outcome, AskOutcome::Answered(Rendering::text("Result: 3")));
}
