use clap::Parser as ClapParser;
use datachat_core::report::{DeveloperReport, QualityDashboard};
use datachat_core::schema::{column_help, schema_info};
use datachat_core::session::{AskOutcome, Role};
use datachat_core::{AppState, Config, Dataset, FavoritesStore, QueryGenerator, Table};
use std::io::{self, Write};
use std::path::PathBuf;

const EXAMPLE_QUESTIONS: &[&str] = &[
    "How many rows are in the dataset?",
    "What are the column names?",
    "How many null values are in each column?",
    "What is the total transaction value?",
    "Show me the top 5 transactions by value",
    "What is the average transaction value?",
    "How many transactions are there per fiscal year?",
    "What are the unique business transaction types?",
    "Show me transactions with values greater than 1000000",
    "What is the distribution of debit vs credit transactions?",
];

#[derive(ClapParser, Debug)]
#[command(name = "datachat")]
#[command(author, version, about = "Ask questions about a CSV dataset in plain English", long_about = None)]
struct Args {
    /// CSV file to load at startup
    #[arg(long)]
    data: Option<PathBuf>,

    /// Load the bundled sample dataset at startup
    #[arg(long, conflicts_with = "data")]
    sample: bool,

    /// Path of the bundled sample dataset
    #[arg(long, env = "DATACHAT_SAMPLE")]
    sample_path: Option<PathBuf>,

    /// Favorites file
    #[arg(long, env = "DATACHAT_FAVORITES")]
    favorites: Option<PathBuf>,

    /// Prompt template file
    #[arg(long, env = "DATACHAT_PROMPT")]
    prompt: Option<PathBuf>,

    /// Chat-completion model
    #[arg(long, env = "DATACHAT_MODEL")]
    model: Option<String>,
}

/// A REPL line. Command words only count as commands when their arguments
/// fit; anything else is asked as a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command<'a> {
    Exit,
    Load(&'a str),
    Sample,
    Schema,
    Help,
    Examples,
    Example(usize),
    Ask(&'a str),
    Sql(&'a str),
    Retry,
    Edit,
    History,
    Clear,
    Fav(&'a str),
    Quality,
    Report(&'a str),
}

const FAV_SUBCOMMANDS: &[&str] = &["", "LIST", "SAVE", "RUN", "RM", "EXPORT"];

fn parse_command(input: &str) -> Command<'_> {
    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };
    let word = word.to_uppercase();
    let sub = rest
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase();

    match (word.as_str(), rest) {
        ("EXIT" | "QUIT", "") => Command::Exit,
        ("SAMPLE", "") => Command::Sample,
        ("SCHEMA", "") => Command::Schema,
        ("HELP", "") => Command::Help,
        ("EXAMPLES" | "EXAMPLE", "") => Command::Examples,
        ("RETRY", "") => Command::Retry,
        ("EDIT", "") => Command::Edit,
        ("HISTORY", "") => Command::History,
        ("CLEAR", "") => Command::Clear,
        ("QUALITY", "") => Command::Quality,
        ("LOAD", _) => Command::Load(rest),
        ("ASK", _) => Command::Ask(rest),
        ("SQL", _) => Command::Sql(rest),
        ("EXAMPLE", _) => match rest.parse::<usize>() {
            Ok(n) => Command::Example(n),
            Err(_) => Command::Ask(input),
        },
        ("FAV", _) if FAV_SUBCOMMANDS.contains(&sub.as_str()) => Command::Fav(rest),
        ("REPORT", _) if sub.is_empty() || sub == "EXPORT" => Command::Report(rest),
        _ => Command::Ask(input),
    }
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.sample_path {
            config.sample_path = path.clone();
        }
        if let Some(path) = &self.favorites {
            config.favorites_path = path.clone();
        }
        if let Some(path) = &self.prompt {
            config.prompt_path = path.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    args.apply(&mut config);

    println!("DataChat v{} - Ask questions about your data in plain English", env!("CARGO_PKG_VERSION"));
    println!("Initializing...\n");

    let generator = if config.api_key.is_some() {
        match QueryGenerator::from_config(&config) {
            Ok(generator) => {
                println!("SQL generation enabled (model: {})", config.model);
                Some(generator)
            }
            Err(e) => {
                tracing::warn!("query generator unavailable: {}", e);
                println!("Warning: SQL generation not available: {}", e);
                None
            }
        }
    } else {
        println!("Warning: OPENAI_API_KEY is not set. Only SQL commands are available.");
        None
    };

    let mut state = AppState::new(FavoritesStore::load(&config.favorites_path));
    if !state.favorites.is_empty() {
        println!("Loaded {} favorites from {}", state.favorites.len(), config.favorites_path.display());
    }

    if args.sample {
        load(&mut state, Dataset::sample(&config.sample_path));
    } else if let Some(path) = &args.data {
        load(&mut state, Dataset::from_csv_path(path));
    }

    println!();
    print_commands();

    loop {
        print!("datachat> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            println!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match parse_command(input) {
            Command::Exit => {
                println!("Goodbye!");
                break;
            }
            Command::Load("") => eprintln!("Usage: LOAD <path>"),
            Command::Load(path) => load(&mut state, Dataset::from_csv_path(path)),
            Command::Sample => load(&mut state, Dataset::sample(&config.sample_path)),
            Command::Schema => match state.table() {
                Some(table) => println!("{}", schema_info(table)),
                None => print_no_dataset(),
            },
            Command::Help => print_help(&state),
            Command::Examples => {
                for (i, question) in EXAMPLE_QUESTIONS.iter().enumerate() {
                    println!("  {:>2}. {}", i + 1, question);
                }
            }
            Command::Example(n) => match n.checked_sub(1) {
                Some(idx) if idx < EXAMPLE_QUESTIONS.len() => {
                    let question = EXAMPLE_QUESTIONS[idx];
                    println!("Asking: {}", question);
                    ask(&mut state, generator.as_ref(), question);
                }
                _ => eprintln!("Usage: EXAMPLE <1-{}>", EXAMPLE_QUESTIONS.len()),
            },
            Command::Ask(question) => ask(&mut state, generator.as_ref(), question),
            Command::Sql("") => eprintln!("Usage: SQL <query>"),
            Command::Sql(sql) => {
                let outcome = state.run_sql(sql);
                report_outcome(&state, outcome);
            }
            Command::Retry => match generator.as_ref() {
                Some(generator) => match state.retry(generator) {
                    Some(outcome) => report_outcome(&state, outcome),
                    None => eprintln!("Nothing to retry"),
                },
                None => print_no_generator(),
            },
            Command::Edit => edit(&mut state, generator.as_ref())?,
            Command::History => {
                for (idx, message) in state.messages.iter().enumerate() {
                    let role = match message.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    let first_line = message.content.to_string();
                    let first_line = first_line.lines().next().unwrap_or_default();
                    let marker = if message.sql_query.is_some() { " [sql]" } else { "" };
                    println!("  {:>3} {}{}: {}", idx, role, marker, first_line);
                }
            }
            Command::Clear => {
                state.clear_chat();
                println!("Chat cleared");
            }
            Command::Fav(args) => favorites(&mut state, generator.as_ref(), args),
            Command::Quality => match state.table() {
                Some(table) => println!("{}", QualityDashboard::compute(table)),
                None => print_no_dataset(),
            },
            Command::Report(args) => report(&state, args),
        }
        println!();
    }

    Ok(())
}

fn print_commands() {
    println!("Ready. Commands:");
    println!("  - LOAD <path> / SAMPLE: Load a CSV file or the sample dataset");
    println!("  - ASK <question>: Ask about the data (any other line is asked too)");
    println!("  - SQL <query>: Run a SELECT query against table 'df'");
    println!("  - RETRY / EDIT: Regenerate or rephrase the last question");
    println!("  - SCHEMA / HELP / EXAMPLES / EXAMPLE <n>: Explore the dataset");
    println!("  - FAV LIST | SAVE [n] | RUN <id> | RM <id>: Manage favorites");
    println!("  - FAV EXPORT <path>: Write favorites as promptfoo test cases");
    println!("  - QUALITY / REPORT / REPORT EXPORT <dir>: Data diagnostics");
    println!("  - HISTORY / CLEAR: Show message indices or clear the chat");
    println!("  - EXIT: Type 'exit' or 'quit' to exit\n");
}

fn load(state: &mut AppState, dataset: datachat_core::Result<Dataset>) {
    match dataset.and_then(|dataset| state.load_dataset(dataset)) {
        Ok(()) => {
            if let (Some(name), Some(table)) = (state.dataset_name(), state.table()) {
                tracing::info!(dataset = name, rows = table.row_count(), "dataset ready");
                println!("{}", load_summary(name, table));
                println!("{}", table.render_text(5));
            }
        }
        Err(e) => {
            tracing::error!("dataset load failed: {}", e);
            eprintln!("Error loading data: {}", e);
        }
    }
}

fn load_summary(name: &str, table: &Table) -> String {
    format!(
        "Loaded '{}' ({} rows, {} columns, {:.1} KB, {} null values)",
        name,
        table.row_count(),
        table.column_count(),
        table.approx_memory_bytes() as f64 / 1024.0,
        table.total_nulls()
    )
}

fn ask(state: &mut AppState, generator: Option<&QueryGenerator>, question: &str) {
    if question.is_empty() {
        eprintln!("Usage: ASK <question>");
        return;
    }
    let Some(generator) = generator else {
        print_no_generator();
        return;
    };
    let outcome = state.ask(question, generator);
    report_outcome(state, outcome);
}

fn report_outcome(state: &AppState, outcome: AskOutcome) {
    match outcome {
        AskOutcome::NoDataset => print_no_dataset(),
        AskOutcome::GenerationFailed => {
            eprintln!("Failed to generate SQL query. Please try rephrasing your question.");
            print_last_reply(state);
        }
        AskOutcome::Answered(_) | AskOutcome::ExecutionFailed { .. } => {
            if let Some(sql) = shown_sql(state, &outcome) {
                println!("SQL: {}\n", sql);
            }
            print_last_reply(state);
        }
    }
}

/// SQL to echo above a reply. Failure replies already quote it.
fn shown_sql<'a>(state: &'a AppState, outcome: &AskOutcome) -> Option<&'a str> {
    match outcome {
        AskOutcome::Answered(_) => state.messages.last().and_then(|m| m.sql_query.as_deref()),
        _ => None,
    }
}

fn print_last_reply(state: &AppState) {
    if let Some(message) = state.messages.last().filter(|m| m.role == Role::Assistant) {
        println!("{}", message.content);
    }
}

fn edit(state: &mut AppState, generator: Option<&QueryGenerator>) -> anyhow::Result<()> {
    let Some(generator) = generator else {
        print_no_generator();
        return Ok(());
    };
    let Some(question) = state.begin_edit() else {
        eprintln!("No question to edit");
        return Ok(());
    };
    println!("Edit your question (empty line cancels):");
    println!("  was: {}", question);
    print!("edit> ");
    io::stdout().flush()?;

    let mut edited = String::new();
    io::stdin().read_line(&mut edited)?;
    match state.submit_edit(&edited, generator) {
        Some(outcome) => report_outcome(state, outcome),
        None => {
            state.cancel_edit();
            println!("Edit cancelled");
        }
    }
    Ok(())
}

fn favorites(state: &mut AppState, generator: Option<&QueryGenerator>, args: &str) {
    let (sub, arg) = match args.split_once(char::is_whitespace) {
        Some((sub, arg)) => (sub.to_uppercase(), arg.trim()),
        None => (args.to_uppercase(), ""),
    };

    match sub.as_str() {
        "" | "LIST" => {
            if state.favorites.is_empty() {
                println!("No favorites saved yet");
            }
            for favorite in state.favorites.list() {
                println!("#{} {} ({})", favorite.id, favorite.question, favorite.timestamp);
                println!("    SQL: {}", favorite.sql_query);
                println!("    Result: {}", favorite.result_summary);
            }
        }
        "SAVE" => {
            let saved = if arg.is_empty() {
                state.save_last_favorite()
            } else {
                match arg.parse::<usize>() {
                    Ok(n) => state.save_favorite(n),
                    Err(_) => {
                        eprintln!("Usage: FAV SAVE [message index]");
                        return;
                    }
                }
            };
            match saved {
                Ok(true) => println!("Query saved to favorites!"),
                Ok(false) => println!("This query is already in your favorites!"),
                Err(e) => {
                    tracing::warn!("favorite not saved: {}", e);
                    eprintln!("Could not save favorite: {}", e);
                }
            }
        }
        "RUN" => {
            let Some(generator) = generator else {
                print_no_generator();
                return;
            };
            match arg.parse::<u64>() {
                Ok(id) => match state.run_favorite(id, generator) {
                    Ok(outcome) => report_outcome(state, outcome),
                    Err(e) => eprintln!("{}", e),
                },
                Err(_) => eprintln!("Usage: FAV RUN <id>"),
            }
        }
        "RM" => match arg.parse::<u64>() {
            Ok(id) => match state.remove_favorite(id) {
                Ok(()) => println!("Removed favorite #{}", id),
                Err(e) => eprintln!("{}", e),
            },
            Err(_) => eprintln!("Usage: FAV RM <id>"),
        },
        "EXPORT" => {
            if arg.is_empty() {
                eprintln!("Usage: FAV EXPORT <path>");
                return;
            }
            match state.favorites.export_eval_cases(arg) {
                Ok(count) => println!("Wrote {} test cases to {}", count, arg),
                Err(e) => {
                    tracing::error!(path = arg, "favorites export failed: {}", e);
                    eprintln!("Export error: {}", e);
                }
            }
        }
        _ => eprintln!("Usage: FAV LIST | SAVE [n] | RUN <id> | RM <id> | EXPORT <path>"),
    }
}

fn report(state: &AppState, args: &str) {
    let Some(table) = state.table() else {
        print_no_dataset();
        return;
    };
    let report = DeveloperReport::generate(table, &state.messages);

    let (sub, dir) = match args.split_once(char::is_whitespace) {
        Some((sub, dir)) => (sub.to_uppercase(), dir.trim()),
        None => (args.to_uppercase(), ""),
    };

    match sub.as_str() {
        "" => match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Could not render report: {}", e),
        },
        "EXPORT" => {
            let dir = if dir.is_empty() { "." } else { dir };
            match report.export_json(dir) {
                Ok(path) => println!("Report written to {}", path.display()),
                Err(e) => {
                    tracing::error!(dir, "report export failed: {}", e);
                    eprintln!("Export error: {}", e);
                }
            }
            match report.export_column_csv(dir) {
                Ok(path) => println!("Column analysis written to {}", path.display()),
                Err(e) => {
                    tracing::error!(dir, "column analysis export failed: {}", e);
                    eprintln!("Export error: {}", e);
                }
            }
        }
        _ => eprintln!("Usage: REPORT [EXPORT <dir>]"),
    }
}

fn print_help(state: &AppState) {
    println!("Tips for better questions:");
    println!();
    println!("Good examples:");
    println!("  - \"Show me transactions with values above 1000000\"");
    println!("  - \"What is the total amount in the Transaction Value column?\"");
    println!("  - \"How many records have null values in the Currency column?\"");
    println!("  - \"List the top 10 transactions by value\"");
    println!();
    println!("Avoid:");
    println!("  - Column names with spaces (use quotes or brackets)");
    println!("  - Vague descriptions");
    println!("  - Complex multi-step questions");

    if let Some(table) = state.table() {
        println!();
        println!("Column names in this dataset:");
        for line in column_help(table) {
            println!("  - {}", line);
        }
    }

    println!();
    println!("Example questions (run with EXAMPLE <n>):");
    for (i, question) in EXAMPLE_QUESTIONS.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, question);
    }
}

fn print_no_dataset() {
    eprintln!("No dataset loaded. Use LOAD <path> or SAMPLE first.");
}

fn print_no_generator() {
    eprintln!("SQL generation is not available. Set OPENAI_API_KEY, or use SQL <query>.");
}
