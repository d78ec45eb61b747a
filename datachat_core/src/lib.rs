/// Module translating natural-language questions into SQL.
pub mod bridge;

/// Module reading runtime configuration.
pub mod config;

/// Module defining the crate-wide error type.
pub mod error;

/// Module responsible for executing queries.
pub mod executor;

/// Module persisting saved questions and queries.
pub mod favorites;

/// Module turning query results into user-facing text.
pub mod format;

/// Module producing dataset diagnostics and exports.
pub mod report;

/// Module summarizing a table for prompts and help.
pub mod schema;

/// Module holding conversation state.
pub mod session;

/// Module for SQL parsing and related utilities.
pub mod sql;

/// Module loading CSV data into tables.
pub mod table;

/// Re-exports for the query generator and its completion backends.
pub use bridge::{CompletionClient, OpenAiClient, PromptTemplate, QueryGenerator};

/// Re-export of the runtime configuration.
pub use config::Config;

/// Re-export of the crate error and result types.
pub use error::{DataChatError, Result};

/// Re-export of the core Executor responsible for running queries.
pub use executor::Executor;

/// Re-export of the favorites store.
pub use favorites::FavoritesStore;

/// Re-export of the result formatter.
pub use format::{format_result, Rendering};

/// Re-exports for diagnostics.
pub use report::{DeveloperReport, QualityDashboard};

/// Re-exports for the conversation state.
pub use session::{AppState, AskOutcome};

/// Re-export of the SQL Parser.
pub use sql::parser::Parser;

/// Re-exports for loaded data.
pub use table::{Dataset, Table};
