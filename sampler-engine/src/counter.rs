use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

pub type Bigram = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    count: u64,
    first_seen: u64,
}

/// Occurrence counts with first-observed order kept for tie-breaking.
#[derive(Debug, Clone)]
pub struct FrequencyTable<K> {
    entries: HashMap<K, Entry>,
    next_order: u64,
    total: u64,
}

impl<K> Default for FrequencyTable<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_order: 0,
            total: 0,
        }
    }
}

impl<K: Eq + Hash + Clone> FrequencyTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, key: K) {
        let next_order = self.next_order;
        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            count: 0,
            first_seen: next_order,
        });
        if entry.count == 0 {
            self.next_order += 1;
        }
        entry.count += 1;
        self.total += 1;
    }

    pub fn count<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).map_or(0, |entry| entry.count)
    }

    /// Distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// At most `n` entries, highest count first, ties in first-observed order.
    pub fn top_n(&self, n: usize) -> Vec<(K, u64)> {
        let mut ranked: Vec<(&K, &Entry)> = self.entries.iter().collect();
        ranked.sort_unstable_by(|(_, a), (_, b)| {
            b.count.cmp(&a.count).then(a.first_seen.cmp(&b.first_seen))
        });
        ranked
            .into_iter()
            .take(n)
            .map(|(key, entry)| (key.clone(), entry.count))
            .collect()
    }
}

/// Unigram and bigram tables per community.
#[derive(Debug, Clone, Default)]
pub struct NgramCounter {
    unigrams: HashMap<String, FrequencyTable<String>>,
    bigrams: HashMap<String, FrequencyTable<Bigram>>,
}

impl NgramCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every token and every adjacent token pair under `community`.
    pub fn observe(&mut self, tokens: &[String], community: &str) {
        if tokens.is_empty() {
            return;
        }

        let unigrams = self.unigrams.entry(community.to_string()).or_default();
        for token in tokens {
            unigrams.increment(token.clone());
        }

        let bigrams = self.bigrams.entry(community.to_string()).or_default();
        for pair in tokens.windows(2) {
            bigrams.increment((pair[0].clone(), pair[1].clone()));
        }
    }

    pub fn unigrams(&self, community: &str) -> Option<&FrequencyTable<String>> {
        self.unigrams.get(community)
    }

    pub fn bigrams(&self, community: &str) -> Option<&FrequencyTable<Bigram>> {
        self.bigrams.get(community)
    }

    pub fn top_unigrams(&self, community: &str, n: usize) -> Vec<(String, u64)> {
        self.unigrams(community)
            .map(|table| table.top_n(n))
            .unwrap_or_default()
    }

    pub fn top_bigrams(&self, community: &str, n: usize) -> Vec<(Bigram, u64)> {
        self.bigrams(community)
            .map(|table| table.top_n(n))
            .unwrap_or_default()
    }

    pub fn unigram_count(&self, community: &str, word: &str) -> u64 {
        self.unigrams(community).map_or(0, |table| table.count(word))
    }

    pub fn bigram_count(&self, community: &str, first: &str, second: &str) -> u64 {
        self.bigrams(community).map_or(0, |table| {
            table.count(&(first.to_string(), second.to_string()))
        })
    }

    pub fn unigram_total(&self, community: &str) -> u64 {
        self.unigrams(community).map_or(0, FrequencyTable::total)
    }

    pub fn bigram_total(&self, community: &str) -> u64 {
        self.bigrams(community).map_or(0, FrequencyTable::total)
    }
}
