use crate::error::{AggregateError, Error, Result};
use crate::traits::Embedder;
use crate::vectorstore::{Metadata, VectorStore};
use futures_util::StreamExt;
use futures_util::stream;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_INGEST_CONCURRENCY: usize = 5;

/// Embeds text through an [`Embedder`] and keeps the vectors in a shared
/// [`VectorStore`].
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
    concurrency: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<VectorStore>) -> Self {
        Self {
            embedder,
            store,
            concurrency: DEFAULT_INGEST_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_document_with_metadata(text, Metadata::new()).await
    }

    /// Embeds `text` and stores it. Nothing is stored when the embedding call
    /// fails, and a rejected insert is reported as [`Error::Store`].
    pub async fn embed_document_with_metadata(
        &self,
        text: &str,
        metadata: Metadata,
    ) -> Result<Vec<f32>> {
        let vector = self.embed(text).await?;
        self.store
            .add(&vector, text, metadata)
            .map_err(|e| Error::Store(e.to_string()))?;
        debug!(dimension = vector.len(), "Document embedded");
        Ok(vector)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// Returns the `limit` chunks most similar to `query`. Fails fast with
    /// [`Error::EmptyStore`] without calling the embedder when there is
    /// nothing to search.
    pub async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        if self.store.is_empty() {
            return Err(Error::EmptyStore);
        }
        let vector = self.embed_query(query).await?;
        let chunks = self.store.search(&vector, limit)?;
        debug!(chunks = chunks.len(), "Retrieved chunks");
        Ok(chunks)
    }

    /// Ingests every document with at most `concurrency` embeddings in flight.
    ///
    /// All documents are attempted. Successful ones stay stored even when
    /// others fail; the failures come back together as [`Error::Aggregate`].
    pub async fn add_documents(&self, documents: &[String]) -> Result<usize> {
        if documents.is_empty() {
            return Err(Error::Validation("no documents to add".into()));
        }

        info!(
            documents = documents.len(),
            concurrency = self.concurrency,
            "Adding documents to knowledge base"
        );

        let outcomes: Vec<(usize, Result<Vec<f32>>)> = stream::iter(documents.iter().enumerate())
            .map(|(index, document)| async move {
                let mut metadata = Metadata::new();
                metadata.insert("index".into(), Value::from(index));
                (index, self.embed_document_with_metadata(document, metadata).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut failures = AggregateError::new();
        let mut stored = 0;
        for (index, outcome) in outcomes {
            match outcome {
                Ok(_) => stored += 1,
                Err(e) => {
                    warn!(index, error = %e, "Document ingestion failed");
                    failures.push(index, e);
                }
            }
        }

        failures.into_result()?;
        info!(stored, "Knowledge base updated");
        Ok(stored)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(Error::Validation("text must not be empty".into()));
        }
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| Error::Embedding(format!("{e:#}")))?;
        if vector.is_empty() {
            return Err(Error::Embedding(format!(
                "{} returned an empty vector",
                self.embedder.name()
            )));
        }
        Ok(vector)
    }
}
