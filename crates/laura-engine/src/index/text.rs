//! Text index: an inverted index over one or more string fields, with
//! TF-IDF-style scoring at query time.

use std::collections::HashMap;
use std::sync::Mutex;

use bson::{Bson, Document};

use crate::value::extract;

const STOP_WORDS: &[&str] = &[
    "a", "the", "is", "of", "for", "in", "and", "or", "to", "with", "on", "at", "by", "an",
];

const SUFFIXES: &[&str] = &["s", "er", "ed", "ing"];
const MIN_RESIDUAL_LEN: usize = 3;

/// Case-fold, split on non-alphanumeric runs, drop stop words, stem.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .filter(|s| !STOP_WORDS.contains(s))
        .map(stem)
        .collect()
}

fn stem(word: &str) -> String {
    for suffix in SUFFIXES {
        if let Some(stripped) = word.strip_suffix(suffix) {
            if stripped.len() >= MIN_RESIDUAL_LEN {
                return stripped.to_string();
            }
        }
    }
    word.to_string()
}

fn token_frequencies(tokens: &[String]) -> HashMap<String, u32> {
    let mut freqs = HashMap::new();
    for t in tokens {
        *freqs.entry(t.clone()).or_insert(0) += 1;
    }
    freqs
}

struct TextState {
    // token -> doc id -> term frequency
    postings: HashMap<String, HashMap<String, u32>>,
    // doc id -> token -> term frequency, kept to remove cleanly
    doc_tokens: HashMap<String, HashMap<String, u32>>,
    insertion_order: Vec<String>,
}

pub struct TextIndex {
    fields: Vec<String>,
    state: Mutex<TextState>,
}

impl TextIndex {
    pub fn new(fields: Vec<String>) -> Self {
        TextIndex {
            fields,
            state: Mutex::new(TextState {
                postings: HashMap::new(),
                doc_tokens: HashMap::new(),
                insertion_order: Vec::new(),
            }),
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Tokenizes every indexed field of `doc`, summing term frequencies
    /// across fields, and inserts the merged token set under `id`.
    pub fn insert(&self, id: &str, doc: &Document) {
        let merged = self.extract_frequencies(doc);
        if merged.is_empty() {
            return;
        }
        let mut guard = self.state.lock().unwrap();
        for (token, tf) in &merged {
            guard
                .postings
                .entry(token.clone())
                .or_default()
                .insert(id.to_string(), *tf);
        }
        guard.doc_tokens.insert(id.to_string(), merged);
        guard.insertion_order.push(id.to_string());
    }

    pub fn remove(&self, id: &str) {
        let mut guard = self.state.lock().unwrap();
        if let Some(tokens) = guard.doc_tokens.remove(id) {
            for token in tokens.keys() {
                let mut drop_token = false;
                if let Some(ids) = guard.postings.get_mut(token) {
                    ids.remove(id);
                    drop_token = ids.is_empty();
                }
                if drop_token {
                    guard.postings.remove(token);
                }
            }
            guard.insertion_order.retain(|existing| existing != id);
        }
    }

    /// Re-indexes `id`: removes its prior entries, then re-inserts from
    /// `doc`'s current field values (used when an update changes an
    /// indexed field).
    pub fn reindex(&self, id: &str, doc: &Document) {
        self.remove(id);
        self.insert(id, doc);
    }

    fn extract_frequencies(&self, doc: &Document) -> HashMap<String, u32> {
        let mut merged = HashMap::new();
        for field in &self.fields {
            let Some(value) = extract(doc, field) else {
                continue;
            };
            let Bson::String(text) = value else {
                continue;
            };
            let tokens = tokenize(text);
            for (token, tf) in token_frequencies(&tokens) {
                *merged.entry(token).or_insert(0) += tf;
            }
        }
        merged
    }

    /// Scores and ranks documents matching `query`, descending by score
    /// with ties broken by insertion order. Empty token set matches
    /// nothing.
    pub fn search(&self, query: &str) -> Vec<(String, f64)> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        let guard = self.state.lock().unwrap();
        let n = guard.doc_tokens.len() as f64;

        let mut scores: HashMap<String, f64> = HashMap::new();
        for token in &tokens {
            let Some(ids) = guard.postings.get(token) else {
                continue;
            };
            let df = ids.len() as f64;
            let idf = ((n + 1.0) / (df + 1.0)).ln();
            for (doc_id, tf) in ids {
                *scores.entry(doc_id.clone()).or_insert(0.0) += *tf as f64 * idf;
            }
        }

        let order_index: HashMap<&String, usize> = guard
            .insertion_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();

        let mut results: Vec<(String, f64)> = scores.into_iter().collect();
        results.sort_by(|(id_a, score_a), (id_b, score_b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    order_index
                        .get(id_a)
                        .unwrap_or(&usize::MAX)
                        .cmp(order_index.get(id_b).unwrap_or(&usize::MAX))
                })
        });
        results
    }

    pub fn count(&self) -> u64 {
        self.state.lock().unwrap().doc_tokens.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn tokenize_lowercases_splits_and_drops_stop_words() {
        let tokens = tokenize("The Quick Brown Fox, and the lazy dog!");
        assert_eq!(
            tokens,
            vec!["quick", "brown", "fox", "lazy", "dog"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn stemmer_removes_common_suffixes() {
        assert_eq!(tokenize("running")[0], "runn");
        assert_eq!(tokenize("jumped")[0], "jump");
        assert_eq!(tokenize("faster")[0], "fast");
        assert_eq!(tokenize("cats")[0], "cat");
    }

    #[test]
    fn stemmer_respects_minimum_residual_length() {
        // "is" is a stop word; use a short word ending in a suffix instead.
        assert_eq!(tokenize("ads")[0], "ads"); // residual "ad" has len 2, below minimum
    }

    #[test]
    fn search_ranks_by_term_frequency_and_idf() {
        let idx = TextIndex::new(vec!["title".into(), "body".into()]);
        idx.insert(
            "1",
            &doc! { "title": "rust programming guide", "body": "rust is great" },
        );
        idx.insert("2", &doc! { "title": "cooking guide", "body": "pasta recipes" });
        let results = idx.search("rust guide");
        assert!(!results.is_empty());
        assert_eq!(results[0].0, "1");
    }

    #[test]
    fn empty_token_query_matches_nothing() {
        let idx = TextIndex::new(vec!["title".into()]);
        idx.insert("1", &doc! { "title": "rust programming" });
        assert!(idx.search("the and of").is_empty());
    }

    #[test]
    fn remove_drops_document_from_postings() {
        let idx = TextIndex::new(vec!["title".into()]);
        idx.insert("1", &doc! { "title": "rust programming" });
        idx.remove("1");
        assert_eq!(idx.count(), 0);
        assert!(idx.search("rust").is_empty());
    }

    #[test]
    fn multi_field_term_frequency_sums_across_fields() {
        let idx = TextIndex::new(vec!["title".into(), "body".into()]);
        idx.insert("1", &doc! { "title": "rust rust", "body": "rust" });
        idx.insert("2", &doc! { "title": "rust", "body": "other" });
        let results = idx.search("rust");
        let doc1_score = results.iter().find(|(id, _)| id == "1").unwrap().1;
        let doc2_score = results.iter().find(|(id, _)| id == "2").unwrap().1;
        assert!(doc1_score > doc2_score);
    }
}
