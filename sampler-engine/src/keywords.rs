use crate::normalize::Normalizer;
use sampler_core::CoreError;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// A library entry and its normalized tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub phrase: String,
    pub tokens: Vec<String>,
}

impl Keyword {
    pub fn new(phrase: &str, normalizer: &Normalizer) -> Self {
        let phrase = phrase.trim().to_lowercase();
        let tokens = normalizer.normalize(&phrase);
        Self { phrase, tokens }
    }
}

/// User-supplied keywords compared against the sampled tables.
#[derive(Debug, Clone, Default)]
pub struct KeywordLibrary {
    keywords: Vec<Keyword>,
}

impl KeywordLibrary {
    /// Loads a `.csv` file (the first column whose header mentions "keyword",
    /// else the first column) or a plain list with one keyword per line.
    /// Blank lines and `#` comments are skipped in plain lists.
    pub fn load(path: &Path, normalizer: &Normalizer) -> Result<Self, CoreError> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

        let entries = if is_csv {
            read_csv_column(path)?
        } else {
            let content = fs::read_to_string(path).map_err(|e| {
                CoreError::invalid_input(format!(
                    "cannot read keyword library {}: {}",
                    path.display(),
                    e
                ))
            })?;
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect()
        };

        let library = Self::from_entries(entries, normalizer);
        debug!(path = %path.display(), keywords = library.len(), "Loaded keyword library");
        Ok(library)
    }

    /// Builds a library from raw phrases, dropping blanks and case-insensitive repeats.
    pub fn from_entries<I, S>(entries: I, normalizer: &Normalizer) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let keywords = entries
            .into_iter()
            .map(|entry| Keyword::new(entry.as_ref(), normalizer))
            .filter(|keyword| !keyword.phrase.is_empty())
            .filter(|keyword| seen.insert(keyword.phrase.clone()))
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

fn read_csv_column(path: &Path) -> Result<Vec<String>, CoreError> {
    let unreadable = |e: csv::Error| {
        CoreError::invalid_input(format!(
            "cannot read keyword library {}: {}",
            path.display(),
            e
        ))
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(unreadable)?;

    let headers = reader.headers().map_err(unreadable)?.clone();
    let column = headers
        .iter()
        .position(|h| h.to_lowercase().contains("keyword"))
        .unwrap_or(0);

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(unreadable)?;
        if let Some(value) = record.get(column) {
            if !value.is_empty() {
                entries.push(value.to_string());
            }
        }
    }
    Ok(entries)
}
