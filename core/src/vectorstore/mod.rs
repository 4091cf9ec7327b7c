//! In-memory nearest-neighbour search over dense vectors.
//!
//! Records are appended once and never mutated. Searching ranks every record
//! whose dimension matches the query by cosine similarity; records of another
//! dimension (for example produced by a different embedding model) are
//! skipped instead of failing the search.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::{PoisonError, RwLock};

pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredText {
    pub text: String,
    pub score: f64,
}

#[derive(Debug, Default)]
pub struct VectorStore {
    records: RwLock<Vec<VectorRecord>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Empty vectors, vectors with NaN or infinite
    /// components, and empty text are rejected.
    pub fn add(&self, vector: &[f32], text: &str, metadata: Metadata) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::Validation("vector must not be empty".into()));
        }
        if let Some(position) = vector.iter().position(|x| !x.is_finite()) {
            return Err(Error::Validation(format!(
                "vector component {position} is not finite"
            )));
        }
        if text.is_empty() {
            return Err(Error::Validation("text must not be empty".into()));
        }

        let record = VectorRecord {
            vector: vector.to_vec(),
            text: text.to_string(),
            metadata,
        };
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<String>> {
        Ok(self
            .search_scored(query, k)?
            .into_iter()
            .map(|hit| hit.text)
            .collect())
    }

    /// Same as [`VectorStore::search`] but keeps the similarity of each hit.
    /// Ties keep insertion order.
    pub fn search_scored(&self, query: &[f32], k: usize) -> Result<Vec<ScoredText>> {
        if query.is_empty() {
            return Err(Error::Validation("query vector must not be empty".into()));
        }
        if k == 0 {
            return Err(Error::Validation("k must be positive".into()));
        }

        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        let mut scored: Vec<ScoredText> = records
            .iter()
            .filter(|record| record.vector.len() == query.len())
            .map(|record| ScoredText {
                text: record.text.clone(),
                score: cosine_similarity(query, &record.vector),
            })
            .collect();
        drop(records);

        // `sort_by` is stable, so equal scores stay in insertion order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn documents(&self) -> Vec<String> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|record| record.text.clone())
            .collect()
    }
}

/// Cosine similarity of two equal-length vectors, accumulated in f64.
///
/// Returns 0.0 when the lengths differ, either vector has zero norm, or the
/// inputs produce a non-finite value.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() { similarity } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(store: &VectorStore, vector: &[f32], text: &str) {
        store.add(vector, text, Metadata::new()).unwrap();
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = [0.3, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn add_rejects_empty_input() {
        let store = VectorStore::new();
        assert!(matches!(store.add(&[], "x", Metadata::new()), Err(Error::Validation(_))));
        assert!(matches!(store.add(&[1.0], "", Metadata::new()), Err(Error::Validation(_))));
        assert!(matches!(
            store.add(&[1.0, f32::NAN], "x", Metadata::new()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.add(&[f32::INFINITY], "x", Metadata::new()),
            Err(Error::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn add_stores_a_copy() {
        let store = VectorStore::new();
        let mut vector = vec![1.0, 0.0];
        store.add(&vector, "a", Metadata::new()).unwrap();
        vector[0] = -1.0;

        let hits = store.search_scored(&[1.0, 0.0], 1).unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn search_validates_arguments() {
        let store = VectorStore::new();
        assert!(matches!(store.search(&[], 3), Err(Error::Validation(_))));
        assert!(matches!(store.search(&[1.0], 0), Err(Error::Validation(_))));
    }

    #[test]
    fn search_on_empty_store_returns_nothing() {
        let store = VectorStore::new();
        assert!(store.search(&[1.0, 2.0], 5).unwrap().is_empty());
    }

    #[test]
    fn search_ranks_descending_and_caps_at_k() {
        let store = VectorStore::new();
        add(&store, &[0.0, 1.0], "orthogonal");
        add(&store, &[1.0, 0.0], "same");
        add(&store, &[1.0, 1.0], "diagonal");

        let hits = store.search_scored(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "same");
        assert_eq!(hits[1].text, "diagonal");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn search_skips_mismatched_dimensions() {
        let store = VectorStore::new();
        add(&store, &[1.0, 0.0, 0.0], "three");
        add(&store, &[1.0, 0.0], "two");
        add(&store, &[0.5, 0.5], "two-b");

        let hits = store.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits, vec!["two".to_string(), "two-b".to_string()]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let store = VectorStore::new();
        add(&store, &[2.0, 0.0], "first");
        add(&store, &[1.0, 0.0], "second");
        add(&store, &[3.0, 0.0], "third");

        let hits = store.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits, vec!["first", "second", "third"]);
    }

    #[test]
    fn concurrent_writers_and_readers() {
        const WRITERS: usize = 4;
        const PER_WRITER: usize = 250;

        let store = VectorStore::new();
        add(&store, &[1.0, 0.0], "seed");

        std::thread::scope(|scope| {
            for writer in 0..WRITERS {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..PER_WRITER {
                        let text = format!("w{writer}-{i}");
                        store.add(&[1.0, i as f32], &text, Metadata::new()).unwrap();
                    }
                });
            }
            for _ in 0..WRITERS {
                let store = &store;
                scope.spawn(move || {
                    for _ in 0..PER_WRITER {
                        let hits = store.search_scored(&[1.0, 0.0], 5).unwrap();
                        assert!(!hits.is_empty() && hits.len() <= 5);
                        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
                    }
                });
            }
        });

        assert_eq!(store.len(), 1 + WRITERS * PER_WRITER);
        let documents = store.documents();
        for writer in 0..WRITERS {
            let prefix = format!("w{writer}-");
            let own: Vec<&String> = documents.iter().filter(|d| d.starts_with(&prefix)).collect();
            let expected: Vec<String> = (0..PER_WRITER).map(|i| format!("{prefix}{i}")).collect();
            assert_eq!(own, expected.iter().collect::<Vec<_>>());
        }
    }

    #[test]
    fn clear_drops_every_record() {
        let store = VectorStore::new();
        add(&store, &[1.0], "a");
        add(&store, &[1.0], "b");
        assert_eq!(store.documents(), vec!["a", "b"]);

        store.clear();
        assert_eq!(store.len(), 0);
    }
}
