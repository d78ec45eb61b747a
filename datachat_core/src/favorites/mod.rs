//! Saved question/query pairs, persisted as a JSON array.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: u64,
    pub question: String,
    pub sql_query: String,
    pub result_summary: String,
    pub timestamp: String,
}

#[derive(Debug)]
pub struct FavoritesStore {
    path: PathBuf,
    favorites: Vec<Favorite>,
}

impl FavoritesStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let favorites = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Vec<Favorite>>(&text) {
                Ok(favorites) => {
                    tracing::info!(path = %path.display(), count = favorites.len(), "loaded favorites");
                    favorites
                }
                Err(e) => {
                    tracing::warn!("Could not parse favorites file {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("Could not read favorites file {}: {}", path.display(), e);
                Vec::new()
            }
        };

        Self { path, favorites }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn list(&self) -> &[Favorite] {
        &self.favorites
    }

    pub fn len(&self) -> usize {
        self.favorites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.favorites.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Favorite> {
        self.favorites.iter().find(|f| f.id == id)
    }

    pub fn contains(&self, question: &str, sql_query: &str) -> bool {
        self.favorites
            .iter()
            .any(|f| f.question == question && f.sql_query == sql_query)
    }

    /// Append a favorite and save. Returns `false` without writing when the
    /// (question, sql) pair is already stored.
    pub fn add(&mut self, question: &str, sql_query: &str, result_summary: &str) -> Result<bool> {
        if self.contains(question, sql_query) {
            return Ok(false);
        }

        // Ids follow the list length, so they can repeat after a removal.
        let favorite = Favorite {
            id: self.favorites.len() as u64 + 1,
            question: question.to_string(),
            sql_query: sql_query.to_string(),
            result_summary: result_summary.to_string(),
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        };
        tracing::debug!(id = favorite.id, "adding favorite");
        self.favorites.push(favorite);
        if let Err(e) = self.save() {
            self.favorites.pop();
            return Err(e);
        }
        Ok(true)
    }

    /// Remove every favorite with `id`. Returns whether anything was removed.
    pub fn remove(&mut self, id: u64) -> Result<bool> {
        let before = self.favorites.len();
        self.favorites.retain(|f| f.id != id);
        if self.favorites.len() == before {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Write the whole list through a temp file renamed over the target.
    pub fn save(&self) -> Result<()> {
        let parent = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let json = serde_json::to_string_pretty(&self.favorites)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::info!(path = %self.path.display(), count = self.favorites.len(), "saved favorites");
        Ok(())
    }
}

/// One promptfoo test case: the question as a variable, the saved summary
/// as an expected substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCase {
    pub vars: EvalVars,
    #[serde(rename = "assert")]
    pub asserts: Vec<EvalAssert>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalVars {
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalAssert {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl FavoritesStore {
    /// Favorites with a non-blank question and summary, as eval cases.
    pub fn eval_cases(&self) -> Vec<EvalCase> {
        self.favorites
            .iter()
            .filter_map(|f| {
                let question = f.question.trim();
                let summary = f.result_summary.trim();
                if question.is_empty() || summary.is_empty() {
                    return None;
                }
                Some(EvalCase {
                    vars: EvalVars {
                        question: question.to_string(),
                    },
                    asserts: vec![EvalAssert {
                        kind: "contains".to_string(),
                        value: summary.to_string(),
                    }],
                })
            })
            .collect()
    }

    /// Write [`Self::eval_cases`] as a promptfoo YAML test list. Returns the
    /// number of cases written.
    pub fn export_eval_cases<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let cases = self.eval_cases();
        let yaml = serde_yaml::to_string(&cases)?;
        std::fs::write(path, yaml)?;

        tracing::info!(path = %path.display(), count = cases.len(), "exported eval cases");
        Ok(cases.len())
    }
}
