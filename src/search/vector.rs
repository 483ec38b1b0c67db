//! Dense scoring: batched cosine similarity against a normalized embedding matrix.
//!
//! Document vectors are normalized once when the matrix is built. A query is
//! normalized once per call, then scored against every row with a single
//! parallel matrix-vector product.

use rayon::prelude::*;
use tracing::warn;

use crate::error::{Result, RetrievalError};

/// Row-major matrix of L2-normalized document embeddings.
///
/// Documents without a usable embedding (empty, or a dimension different from
/// the corpus dimension) have no row and are skipped by dense scoring.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingMatrix {
    dimension: usize,
    data: Vec<f32>,
    /// Document position -> matrix row.
    rows: Vec<Option<usize>>,
}

impl EmbeddingMatrix {
    /// Build the matrix from per-document embeddings, in document order.
    ///
    /// The corpus dimension is the length of the first non-empty embedding.
    /// Returns the matrix plus the positions of documents that were skipped,
    /// each with the reason.
    pub fn build<'a, I>(embeddings: I) -> (Self, Vec<(usize, RetrievalError)>)
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let embeddings: Vec<&[f32]> = embeddings.into_iter().collect();
        let dimension = embeddings
            .iter()
            .find(|e| !e.is_empty())
            .map(|e| e.len())
            .unwrap_or(0);

        let mut data = Vec::with_capacity(embeddings.len() * dimension);
        let mut rows = Vec::with_capacity(embeddings.len());
        let mut skipped = Vec::new();
        let mut next_row = 0;

        for (position, embedding) in embeddings.iter().enumerate() {
            if embedding.is_empty() {
                skipped.push((
                    position,
                    RetrievalError::EmbeddingUnavailable("document has no embedding".to_string()),
                ));
                rows.push(None);
            } else if embedding.len() != dimension {
                skipped.push((
                    position,
                    RetrievalError::InvalidDimension {
                        expected: dimension,
                        actual: embedding.len(),
                    },
                ));
                rows.push(None);
            } else {
                data.extend(normalize(embedding));
                rows.push(Some(next_row));
                next_row += 1;
            }
        }

        (
            Self {
                dimension,
                data,
                rows,
            },
            skipped,
        )
    }

    /// Embedding dimension shared by every row, zero if there are no rows.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of documents the matrix was built from (with or without a row).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of documents that have a usable embedding.
    pub fn row_count(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    /// Whether the document at `position` can be scored densely.
    pub fn has_row(&self, position: usize) -> bool {
        matches!(self.rows.get(position), Some(Some(_)))
    }

    fn row(&self, row: usize) -> &[f32] {
        let start = row * self.dimension;
        &self.data[start..start + self.dimension]
    }
}

/// Return `v / |v|`, or a zero vector when `|v|` is zero.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let magnitude = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 && magnitude.is_finite() {
        v.iter().map(|x| x / magnitude).collect()
    } else {
        vec![0.0; v.len()]
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Batched cosine-similarity scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DenseScorer;

impl DenseScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score every document in the matrix against `query`, in document order.
    ///
    /// Documents without a row yield `None`. A zero-magnitude query or row
    /// yields exactly 0.0. A query whose length differs from the corpus
    /// dimension is rejected with [`RetrievalError::InvalidDimension`].
    pub fn score_all(&self, query: &[f32], matrix: &EmbeddingMatrix) -> Result<Vec<Option<f32>>> {
        if matrix.row_count() == 0 {
            return Ok(vec![None; matrix.len()]);
        }
        check_dimension(query, matrix)?;

        let query = normalize(query);
        let row_scores: Vec<f32> = matrix
            .data
            .par_chunks_exact(matrix.dimension)
            .map(|row| clamp_similarity(dot(&query, row)))
            .collect();

        Ok(matrix
            .rows
            .iter()
            .map(|row| row.map(|r| row_scores[r]))
            .collect())
    }

    /// Score only the documents at `positions`, in the given order.
    ///
    /// Used for reranking a small candidate set without scoring the whole
    /// corpus. Positions out of range or without a row yield `None`.
    pub fn score_positions(
        &self,
        query: &[f32],
        matrix: &EmbeddingMatrix,
        positions: &[usize],
    ) -> Result<Vec<Option<f32>>> {
        if matrix.row_count() == 0 {
            return Ok(vec![None; positions.len()]);
        }
        check_dimension(query, matrix)?;

        let query = normalize(query);
        Ok(positions
            .par_iter()
            .map(|&position| {
                matrix
                    .rows
                    .get(position)
                    .copied()
                    .flatten()
                    .map(|row| clamp_similarity(dot(&query, matrix.row(row))))
            })
            .collect())
    }
}

fn check_dimension(query: &[f32], matrix: &EmbeddingMatrix) -> Result<()> {
    if query.len() != matrix.dimension {
        warn!(
            expected = matrix.dimension,
            actual = query.len(),
            "Query embedding dimension does not match corpus"
        );
        return Err(RetrievalError::InvalidDimension {
            expected: matrix.dimension,
            actual: query.len(),
        });
    }
    Ok(())
}

fn clamp_similarity(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RetrievalError::InvalidDimension {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(clamp_similarity(dot(&normalize(a), &normalize(b))))
}
