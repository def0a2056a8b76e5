use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::{GenAiError, TextGenerator};

/// Offline generator producing template descriptions and hashed bag-of-words
/// embeddings. Output depends only on the input text.
#[derive(Debug, Clone)]
pub struct LocalGenerator {
    dimensions: usize,
}

impl LocalGenerator {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for LocalGenerator {
    fn default() -> Self {
        Self::new(1536)
    }
}

#[async_trait]
impl TextGenerator for LocalGenerator {
    fn name(&self) -> &'static str {
        "local"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn describe_book(
        &self,
        title: &str,
        author: &str,
        genre: &str,
    ) -> Result<String, GenAiError> {
        Ok(format!(
            "{} by {} is a {} book waiting on the shelf.",
            title.trim(),
            author.trim(),
            genre.trim()
        ))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, GenAiError> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        Ok(vector)
    }
}
