//! Entity extraction seam.
//!
//! The coordinator never extracts entities itself. Callers run an extractor
//! over the content and pass the result in the store or update request.

use async_trait::async_trait;

use crate::error::Result;
use crate::memory::Entity;

/// Turns memory content into typed entities.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract(&self, content: &str) -> Result<Vec<Entity>>;
}

#[async_trait]
impl<F> EntityExtractor for F
where
    F: Fn(&str) -> Vec<Entity> + Send + Sync,
{
    async fn extract(&self, content: &str) -> Result<Vec<Entity>> {
        Ok(self(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closure_extractor() {
        let extractor = |content: &str| {
            content
                .split_whitespace()
                .filter(|w| w.starts_with('#'))
                .map(|w| Entity::new("topic", w.trim_start_matches('#')))
                .collect::<Vec<_>>()
        };

        let entities = extractor.extract("notes on #rust and #sqlite").await.unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[1].normalized, "sqlite");
    }
}
