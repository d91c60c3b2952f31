use crate::counter::NgramCounter;
use crate::keywords::{Keyword, KeywordLibrary};
use sampler_core::{Community, CoreError};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const UNIGRAM_REPORT: &str = "top20_unigrams_by_sub.csv";
pub const BIGRAM_REPORT: &str = "top20_bigrams_by_sub.csv";
pub const OVERLAP_REPORT: &str = "overlap_report.csv";
pub const DEFAULT_TOP_N: usize = 20;

const UNIGRAM_HEADER: [&str; 3] = ["subreddit", "word", "count"];
const BIGRAM_HEADER: [&str; 3] = ["subreddit", "phrase", "count"];
const OVERLAP_HEADER: [&str; 3] = ["subreddit", "keyword", "count"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnigramRow {
    pub subreddit: String,
    pub word: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BigramRow {
    pub subreddit: String,
    pub phrase: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlapRow {
    pub subreddit: String,
    pub keyword: String,
    pub count: u64,
}

/// Ranked rows ready to be written as CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub unigrams: Vec<UnigramRow>,
    pub bigrams: Vec<BigramRow>,
    /// Present only when a keyword library was supplied
    pub overlap: Option<Vec<OverlapRow>>,
}

impl Report {
    pub fn unigram_csv(&self) -> Result<Vec<u8>, CoreError> {
        to_csv(&UNIGRAM_HEADER, &self.unigrams)
    }

    pub fn bigram_csv(&self) -> Result<Vec<u8>, CoreError> {
        to_csv(&BIGRAM_HEADER, &self.bigrams)
    }

    pub fn overlap_csv(&self) -> Result<Option<Vec<u8>>, CoreError> {
        self.overlap
            .as_ref()
            .map(|rows| to_csv(&OVERLAP_HEADER, rows))
            .transpose()
    }

    /// Writes every CSV into `dir`, creating it if needed, and returns the
    /// paths written.
    pub fn write_to_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
        fs::create_dir_all(dir)?;

        let mut outputs = vec![
            (dir.join(UNIGRAM_REPORT), self.unigram_csv()?),
            (dir.join(BIGRAM_REPORT), self.bigram_csv()?),
        ];
        if let Some(overlap) = self.overlap_csv()? {
            outputs.push((dir.join(OVERLAP_REPORT), overlap));
        }

        let mut written = Vec::with_capacity(outputs.len());
        for (path, bytes) in outputs {
            fs::write(&path, bytes)?;
            debug!(path = %path.display(), "Wrote report");
            written.push(path);
        }
        Ok(written)
    }
}

fn to_csv<R: Serialize>(header: &[&str], rows: &[R]) -> Result<Vec<u8>, CoreError> {
    // Header is written by hand so an empty table still yields a header line
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| CoreError::Io(e.into_error()))
}

/// Builds ranked tables and the keyword overlap from a finished counter.
pub struct ReportBuilder<'a> {
    communities: &'a [Community],
    top_n: usize,
    library: Option<&'a KeywordLibrary>,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(communities: &'a [Community]) -> Self {
        Self {
            communities,
            top_n: DEFAULT_TOP_N,
            library: None,
        }
    }

    pub fn top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn keyword_library(mut self, library: Option<&'a KeywordLibrary>) -> Self {
        self.library = library;
        self
    }

    pub fn build(&self, counter: &NgramCounter) -> Report {
        let mut unigrams = Vec::new();
        let mut bigrams = Vec::new();

        for community in self.communities {
            let name = community.as_str();
            unigrams.extend(counter.top_unigrams(name, self.top_n).into_iter().map(
                |(word, count)| UnigramRow {
                    subreddit: name.to_string(),
                    word,
                    count,
                },
            ));
            bigrams.extend(counter.top_bigrams(name, self.top_n).into_iter().map(
                |((first, second), count)| BigramRow {
                    subreddit: name.to_string(),
                    phrase: format!("{first} {second}"),
                    count,
                },
            ));
        }

        let overlap = self.library.map(|library| self.overlap(counter, library));

        Report {
            unigrams,
            bigrams,
            overlap,
        }
    }

    fn overlap(&self, counter: &NgramCounter, library: &KeywordLibrary) -> Vec<OverlapRow> {
        let known: HashSet<String> = library
            .keywords()
            .iter()
            .flat_map(|k| [k.phrase.clone(), k.tokens.join(" ")])
            .collect();

        let mut rows = Vec::new();
        for community in self.communities {
            let name = community.as_str();
            for keyword in library.keywords() {
                rows.push(OverlapRow {
                    subreddit: name.to_string(),
                    keyword: keyword.phrase.clone(),
                    count: keyword_count(counter, name, keyword),
                });
            }

            let emergent_unigrams = counter.top_unigrams(name, self.top_n).into_iter();
            let emergent_bigrams = counter
                .top_bigrams(name, self.top_n)
                .into_iter()
                .map(|((first, second), count)| (format!("{first} {second}"), count));

            rows.extend(
                emergent_unigrams
                    .chain(emergent_bigrams)
                    .filter(|(term, _)| !known.contains(term))
                    .map(|(term, count)| OverlapRow {
                        subreddit: name.to_string(),
                        keyword: term,
                        count,
                    }),
            );
        }
        rows
    }
}

/// Occurrences of a keyword in one community. Phrases longer than two tokens
/// count as their rarest adjacent pair.
pub fn keyword_count(counter: &NgramCounter, community: &str, keyword: &Keyword) -> u64 {
    match keyword.tokens.as_slice() {
        [] => 0,
        [word] => counter.unigram_count(community, word),
        [first, second] => counter.bigram_count(community, first, second),
        tokens => tokens
            .windows(2)
            .map(|pair| counter.bigram_count(community, &pair[0], &pair[1]))
            .min()
            .unwrap_or(0),
    }
}
