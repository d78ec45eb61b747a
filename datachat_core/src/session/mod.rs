//! Conversation state: the loaded dataset, the transcript and favorites.
//!
//! Every interaction goes through [`AppState`], which the caller owns and
//! passes around explicitly.

use crate::bridge::{query_suggestions, QueryGenerator};
use crate::error::{DataChatError, Result};
use crate::executor::{Executor, QueryError};
use crate::favorites::FavoritesStore;
use crate::format::{format_result, Rendering};
use crate::schema::schema_info;
use crate::table::{Dataset, Table};
use serde::Serialize;
use std::fmt;
use std::fmt::Write;

pub const GENERATION_FAILED_REPLY: &str =
    "Sorry, I couldn't understand your question. Please try rephrasing it.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Result(Rendering),
}

impl MessageContent {
    pub fn is_table(&self) -> bool {
        matches!(self, MessageContent::Result(r) if r.is_table())
    }

    /// Short description stored with a favorite.
    pub fn summary(&self) -> String {
        match self {
            MessageContent::Result(rendering) => rendering.summary(),
            MessageContent::Text(text) => Rendering::text(text.as_str()).summary(),
        }
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageContent::Text(text) => f.write_str(text),
            MessageContent::Result(rendering) => rendering.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    pub sql_query: Option<String>,
    pub error: bool,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
            sql_query: None,
            error: false,
        }
    }

    pub fn assistant(content: MessageContent) -> Self {
        Self {
            role: Role::Assistant,
            content,
            sql_query: None,
            error: false,
        }
    }

    fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql_query = Some(sql.into());
        self
    }

    fn failed(mut self) -> Self {
        self.error = true;
        self
    }
}

/// A dataset together with the engine it is queried through.
pub struct LoadedDataset {
    pub dataset: Dataset,
    executor: Executor,
}

impl LoadedDataset {
    pub fn new(dataset: Dataset) -> Result<Self> {
        let executor = Executor::new(&dataset.table)?;
        Ok(Self { dataset, executor })
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    Answered(Rendering),
    ExecutionFailed { sql: String, error: QueryError },
    GenerationFailed,
    NoDataset,
}

pub struct AppState {
    pub dataset: Option<LoadedDataset>,
    pub messages: Vec<Message>,
    pub favorites: FavoritesStore,
    pub pending_edit: Option<String>,
}

impl AppState {
    pub fn new(favorites: FavoritesStore) -> Self {
        Self {
            dataset: None,
            messages: Vec::new(),
            favorites,
            pending_edit: None,
        }
    }

    /// Replace the current dataset. The transcript is kept.
    pub fn load_dataset(&mut self, dataset: Dataset) -> Result<()> {
        let loaded = LoadedDataset::new(dataset)?;
        tracing::info!(
            name = %loaded.dataset.name,
            rows = loaded.dataset.table.row_count(),
            "dataset loaded"
        );
        self.dataset = Some(loaded);
        Ok(())
    }

    pub fn table(&self) -> Option<&Table> {
        self.dataset.as_ref().map(|d| &d.dataset.table)
    }

    pub fn dataset_name(&self) -> Option<&str> {
        self.dataset.as_ref().map(|d| d.dataset.name.as_str())
    }

    /// Translate a question to SQL, run it and record both sides.
    pub fn ask(&mut self, question: &str, generator: &QueryGenerator) -> AskOutcome {
        let Some(loaded) = &self.dataset else {
            return AskOutcome::NoDataset;
        };
        let question = question.trim();
        self.messages.push(Message::user(question));

        let schema = schema_info(&loaded.dataset.table);
        let Some(sql) = generator.generate(question, &schema) else {
            self.messages.push(Message::assistant(MessageContent::Text(
                GENERATION_FAILED_REPLY.to_string(),
            )));
            return AskOutcome::GenerationFailed;
        };

        self.execute_and_record(sql)
    }

    /// Run hand-written SQL without the generator.
    pub fn run_sql(&mut self, sql: &str) -> AskOutcome {
        if self.dataset.is_none() {
            return AskOutcome::NoDataset;
        }
        let sql = sql.trim();
        self.messages.push(Message::user(sql));
        self.execute_and_record(sql.to_string())
    }

    fn execute_and_record(&mut self, sql: String) -> AskOutcome {
        let Some(loaded) = &self.dataset else {
            return AskOutcome::NoDataset;
        };

        match loaded.executor().execute(&sql) {
            Ok(result) => {
                let rendering = format_result(&result);
                self.messages.push(
                    Message::assistant(MessageContent::Result(rendering.clone())).with_sql(&sql),
                );
                AskOutcome::Answered(rendering)
            }
            Err(error) => {
                let text = failure_message(&sql, &error);
                self.messages.push(
                    Message::assistant(MessageContent::Text(text))
                        .with_sql(&sql)
                        .failed(),
                );
                AskOutcome::ExecutionFailed { sql, error }
            }
        }
    }

    pub fn last_user_question(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| match &m.content {
                MessageContent::Text(text) => text.as_str(),
                MessageContent::Result(_) => "",
            })
    }

    /// Drop the last exchange and ask its question again. `None` when there
    /// is no question to retry.
    pub fn retry(&mut self, generator: &QueryGenerator) -> Option<AskOutcome> {
        if let Some(idx) = self.messages.iter().rposition(|m| m.role == Role::Assistant) {
            self.messages.remove(idx);
        }
        let idx = self.messages.iter().rposition(|m| m.role == Role::User)?;
        let question = self.messages.remove(idx).content.to_string();
        Some(self.ask(&question, generator))
    }

    /// Stage the last question for editing and return it.
    pub fn begin_edit(&mut self) -> Option<&str> {
        self.pending_edit = self.last_user_question().map(str::to_string);
        self.pending_edit.as_deref()
    }

    pub fn cancel_edit(&mut self) {
        self.pending_edit = None;
    }

    /// Send the edited question. Blank edits are ignored.
    pub fn submit_edit(&mut self, edited: &str, generator: &QueryGenerator) -> Option<AskOutcome> {
        if edited.trim().is_empty() {
            return None;
        }
        self.pending_edit = None;
        Some(self.ask(edited, generator))
    }

    /// Save the assistant message at `message_index` as a favorite, using
    /// the nearest earlier user message as its question. `Ok(false)` means
    /// the pair was already saved.
    pub fn save_favorite(&mut self, message_index: usize) -> Result<bool> {
        let message = self
            .messages
            .get(message_index)
            .filter(|m| m.role == Role::Assistant)
            .ok_or(DataChatError::NoQueryAt(message_index))?;
        let sql = message
            .sql_query
            .as_deref()
            .ok_or(DataChatError::NoQueryAt(message_index))?;

        let question = self.messages[..message_index]
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.to_string())
            .ok_or(DataChatError::NoQueryAt(message_index))?;

        let summary = message.content.summary();
        self.favorites.add(&question, sql, &summary)
    }

    /// Save the most recent assistant message that carries SQL.
    pub fn save_last_favorite(&mut self) -> Result<bool> {
        let idx = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant && m.sql_query.is_some())
            .ok_or(DataChatError::NoQueryAt(self.messages.len()))?;
        self.save_favorite(idx)
    }

    /// Ask a saved favorite's question again.
    pub fn run_favorite(&mut self, id: u64, generator: &QueryGenerator) -> Result<AskOutcome> {
        let question = self
            .favorites
            .get(id)
            .map(|f| f.question.clone())
            .ok_or(DataChatError::FavoriteNotFound(id))?;
        Ok(self.ask(&question, generator))
    }

    pub fn remove_favorite(&mut self, id: u64) -> Result<()> {
        if self.favorites.remove(id)? {
            Ok(())
        } else {
            Err(DataChatError::FavoriteNotFound(id))
        }
    }

    pub fn clear_chat(&mut self) {
        self.messages.clear();
        self.pending_edit = None;
    }
}

/// Assistant reply for a query that failed to execute.
pub fn failure_message(sql: &str, error: &QueryError) -> String {
    let mut text = String::from("Query Execution Failed\n\n");
    text.push_str("The generated SQL query couldn't be executed. This might be due to:\n");
    text.push_str("• Column names with spaces or special characters\n");
    text.push_str("• Invalid SQL syntax\n");
    text.push_str("• Data type mismatches\n\n");
    let _ = writeln!(text, "Hint: {}\n", error.hint());
    let _ = writeln!(text, "Generated SQL:\n{}\n", sql);

    text.push_str("Suggestions:\n");
    for suggestion in query_suggestions(&error.kind) {
        let _ = writeln!(text, "• {}", suggestion);
    }

    text.push_str("\nWhat would you like to do?\n");
    text.push_str("1. RETRY - Try generating a new SQL query\n");
    text.push_str("2. EDIT - Rephrase your question\n");
    text.push_str("3. SCHEMA - See available columns and data types");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CompletionClient, CompletionRequest, PromptTemplate};
    use crate::executor::QueryErrorKind;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Replies with canned completions in order, then fails.
    struct ScriptedClient {
        replies: RefCell<Vec<String>>,
    }

    impl CompletionClient for ScriptedClient {
        fn complete(&self, _request: &CompletionRequest) -> Result<Option<String>> {
            let mut replies = self.replies.borrow_mut();
            if replies.is_empty() {
                return Err(DataChatError::Completion("no more replies".to_string()));
            }
            Ok(Some(replies.remove(0)))
        }
    }

    fn generator(replies: &[&str]) -> QueryGenerator {
        let client = ScriptedClient {
            replies: RefCell::new(replies.iter().map(|r| r.to_string()).collect()),
        };
        QueryGenerator::new(Box::new(client), PromptTemplate::default())
    }

    fn state(dir: &TempDir) -> AppState {
        let mut state = AppState::new(FavoritesStore::load(dir.path().join("favorites.json")));
        let table = Table::from_reader("A,B\n1,x\n2,\n3,y\n".as_bytes()).unwrap();
        state.load_dataset(Dataset::new("test.csv", table)).unwrap();
        state
    }

    #[test]
    fn test_ask_without_dataset() {
        let dir = TempDir::new().unwrap();
        let mut state = AppState::new(FavoritesStore::load(dir.path().join("f.json")));
        assert_eq!(state.ask("anything", &generator(&[])), AskOutcome::NoDataset);
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_ask_records_answer() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir);
        let outcome = state.ask(
            "How many nulls in B?",
            &generator(&["```sql\nSELECT COUNT(*) AS b_nulls FROM df WHERE B IS NULL\n```"]),
        );

        assert_eq!(outcome, AskOutcome::Answered(Rendering::text("B: 1 null values")));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::User);
        let reply = &state.messages[1];
        assert_eq!(
            reply.sql_query.as_deref(),
            Some("SELECT COUNT(*) AS b_nulls FROM df WHERE B IS NULL")
        );
        assert!(!reply.error);
    }

    #[test]
    fn test_execution_failure_message() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir);
        let outcome = state.ask("bad", &generator(&["SELECT missing FROM df"]));

        match outcome {
            AskOutcome::ExecutionFailed { sql, error } => {
                assert_eq!(sql, "SELECT missing FROM df");
                assert_eq!(error.kind, QueryErrorKind::MissingColumn);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let reply = state.messages.last().unwrap();
        assert!(reply.error);
        let text = reply.content.to_string();
        assert!(text.contains("Generated SQL:\nSELECT missing FROM df"));
        assert!(text.contains("Check the exact spelling of column names"));
        assert!(text.contains("1. RETRY"));
    }

    #[test]
    fn test_generation_failure() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir);
        assert_eq!(state.ask("?", &generator(&[])), AskOutcome::GenerationFailed);
        let reply = state.messages.last().unwrap();
        assert_eq!(reply.content.to_string(), GENERATION_FAILED_REPLY);
        assert!(reply.sql_query.is_none());
    }

    #[test]
    fn test_retry_replaces_last_exchange() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir);
        let gen = generator(&["SELECT nope FROM df", "SELECT COUNT(*) FROM df"]);

        state.ask("How many rows?", &gen);
        let outcome = state.retry(&gen).unwrap();

        assert_eq!(outcome, AskOutcome::Answered(Rendering::text("Result: 3")));
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].content.to_string(), "How many rows?");
    }

    #[test]
    fn test_edit_flow() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir);
        let gen = generator(&["SELECT nope FROM df", "SELECT MAX(A) FROM df"]);

        state.ask("max of a", &gen);
        assert_eq!(state.begin_edit(), Some("max of a"));
        assert!(state.submit_edit("   ", &gen).is_none());

        let outcome = state.submit_edit("What is the maximum of A?", &gen).unwrap();
        assert_eq!(outcome, AskOutcome::Answered(Rendering::text("Result: 3")));
        assert!(state.pending_edit.is_none());
    }

    #[test]
    fn test_save_favorite_uses_preceding_question() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir);
        let gen = generator(&["SELECT COUNT(*) FROM df", "SELECT * FROM df"]);

        state.ask("first question", &gen);
        state.ask("second question", &gen);

        assert!(state.save_favorite(3).unwrap());
        let saved = &state.favorites.list()[0];
        assert_eq!(saved.question, "second question");
        assert_eq!(saved.sql_query, "SELECT * FROM df");
        assert_eq!(saved.result_summary, "Table with 3 rows");

        assert!(!state.save_favorite(3).unwrap());
        assert!(matches!(state.save_favorite(0), Err(DataChatError::NoQueryAt(0))));
    }

    #[test]
    fn test_run_and_remove_favorite() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir);
        let gen = generator(&["SELECT COUNT(*) FROM df", "SELECT COUNT(*) FROM df"]);

        state.ask("How many rows?", &gen);
        assert!(state.save_last_favorite().unwrap());

        let outcome = state.run_favorite(1, &gen).unwrap();
        assert_eq!(outcome, AskOutcome::Answered(Rendering::text("Result: 3")));
        assert!(matches!(state.run_favorite(9, &gen), Err(DataChatError::FavoriteNotFound(9))));

        state.remove_favorite(1).unwrap();
        assert!(state.favorites.is_empty());
    }

    #[test]
    fn test_run_sql_and_clear() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir);
        let outcome = state.run_sql("SELECT A, B FROM df WHERE A >= 2");
        assert!(matches!(outcome, AskOutcome::Answered(Rendering::Table { .. })));
        assert!(state.messages[1].content.is_table());

        state.clear_chat();
        assert!(state.messages.is_empty());
    }
}
