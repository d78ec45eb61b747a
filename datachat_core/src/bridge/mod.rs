//! Natural-language to SQL translation through a chat-completion service.

use crate::config::Config;
use crate::error::{DataChatError, Result};
use crate::executor::QueryErrorKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const SYSTEM_INSTRUCTION: &str =
    "You are an expert SQL analyst. Generate only SQL queries, no explanations.";

const SCHEMA_PLACEHOLDER: &str = "{schema_info}";
const QUESTION_PLACEHOLDER: &str = "{user_question}";

const DEFAULT_TEMPLATE: &str = "
You are an expert SQL analyst.

Given the following database schema and a user question, generate a SQL query to answer the question.

{schema_info}

User Question: {user_question}

Instructions:
1. Generate ONLY the SQL query, nothing else
2. Use the table name 'df'
3. Make sure the query is valid and will execute successfully
4. For aggregation questions, use appropriate functions like COUNT(), SUM(), AVG(), etc.
5. For data quality questions, check for nulls, duplicates, outliers, etc.
6. Keep the query simple and focused on answering the question

SQL Query:
";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A text-generation backend.
pub trait CompletionClient {
    /// Returns the completion text, or `None` when the service answered
    /// with no content.
    fn complete(&self, request: &CompletionRequest) -> Result<Option<String>>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| DataChatError::Config("OPENAI_API_KEY is not set".to_string()))?;
        Self::new(config.base_url.clone(), api_key, config.request_timeout)
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<Option<String>> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(DataChatError::Completion(format!("{}: {}", status, detail.trim())));
        }

        let reply: ChatResponse = response.json()?;
        Ok(reply.choices.into_iter().next().and_then(|c| c.message.content))
    }
}

/// Prompt text with `{schema_info}` and `{user_question}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    text: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Read the template from `path`, falling back to the built-in prompt.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::info!(path = %path.display(), "loaded prompt template");
                Self::new(text)
            }
            Err(e) => {
                tracing::warn!(
                    "System prompt file {} not readable ({}). Using default prompt.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn render(&self, schema_info: &str, question: &str) -> String {
        self.text
            .replace(SCHEMA_PLACEHOLDER, schema_info)
            .replace(QUESTION_PLACEHOLDER, question)
    }
}

pub struct QueryGenerator {
    client: Box<dyn CompletionClient>,
    template: PromptTemplate,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl QueryGenerator {
    pub fn new(client: Box<dyn CompletionClient>, template: PromptTemplate) -> Self {
        Self {
            client,
            template,
            model: crate::config::DEFAULT_MODEL.to_string(),
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
            temperature: crate::config::DEFAULT_TEMPERATURE,
        }
    }

    /// Build a generator backed by [`OpenAiClient`] from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = OpenAiClient::from_config(config)?;
        Ok(Self::new(Box::new(client), PromptTemplate::load(&config.prompt_path))
            .with_model(config.model.clone())
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn request(&self, question: &str, schema_info: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            system: SYSTEM_INSTRUCTION.to_string(),
            prompt: self.template.render(schema_info, question),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Translate a question into SQL. Any service failure is logged and
    /// yields `None`; there is no retry.
    pub fn generate(&self, question: &str, schema_info: &str) -> Option<String> {
        let request = self.request(question, schema_info);
        match self.client.complete(&request) {
            Ok(Some(text)) => {
                let sql = strip_code_fences(&text);
                if sql.is_empty() {
                    tracing::warn!("completion service returned an empty query");
                    None
                } else {
                    tracing::debug!(sql = %sql, "generated SQL");
                    Some(sql)
                }
            }
            Ok(None) => {
                tracing::warn!("completion service returned no content");
                None
            }
            Err(e) => {
                tracing::warn!("Error generating SQL query: {}", e);
                None
            }
        }
    }
}

/// Remove surrounding Markdown code-fence markers from a completion.
pub fn strip_code_fences(text: &str) -> String {
    let mut sql = text.trim();
    if let Some(rest) = sql.strip_prefix("```sql").or_else(|| sql.strip_prefix("```")) {
        sql = rest;
    }
    if let Some(rest) = sql.strip_suffix("```") {
        sql = rest;
    }
    sql.trim().to_string()
}

/// Ways to rephrase a question after a failed query.
pub fn query_suggestions(kind: &QueryErrorKind) -> Vec<&'static str> {
    match kind {
        QueryErrorKind::Syntax { column: Some(_) } => vec![
            "Try: 'Show me transactions with values above 1000000'",
            "Try: 'What is the total Transaction Value?'",
            "Try: 'List the top 10 transactions by value'",
        ],
        QueryErrorKind::Syntax { column: None } => vec![
            "Try rephrasing your question to be more specific about column names",
            "Use simpler language and avoid complex conditions",
            "Mention the exact column name you want to analyze",
        ],
        QueryErrorKind::MissingColumn => vec![
            "Check the exact spelling of column names",
            "Use the SCHEMA command to see available columns",
            "Try using a different column name",
        ],
        QueryErrorKind::AmbiguousColumn | QueryErrorKind::Other => vec![
            "Try breaking down your question into simpler parts",
            "Use the example questions as a starting point",
            "Check the schema to understand the available data",
        ],
    }
}
