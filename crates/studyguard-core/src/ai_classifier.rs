use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use studyguard_ai::{AiService, ContentAnalysis, PageContext};
use tokio::sync::RwLock;

/// External content-understanding call, treated as an opaque function
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    /// Describe what the page shows
    async fn analyze(&self, page: &PageContext) -> Result<ContentAnalysis>;

    /// Educational page to send the student to instead of this one
    async fn suggest_alternative(&self, _page: &PageContext) -> Result<Option<String>> {
        Ok(None)
    }
}

const DEFAULT_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(v) => v,
    None => unreachable!(),
};

/// Content analyzer backed by the AI service, with an LRU cache per page snapshot
pub struct AiClassifier {
    ai_service: Arc<AiService>,
    cache: RwLock<LruCache<PageContext, ContentAnalysis>>,
}

impl AiClassifier {
    #[must_use]
    pub fn new(ai_service: Arc<AiService>, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(DEFAULT_CACHE_SIZE);
        Self {
            ai_service,
            cache: RwLock::new(LruCache::new(cache_size)),
        }
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }
}

#[async_trait]
impl ContentAnalyzer for AiClassifier {
    async fn analyze(&self, page: &PageContext) -> Result<ContentAnalysis> {
        {
            let mut cache = self.cache.write().await;
            if let Some(cached) = cache.get(page) {
                return Ok(cached.clone());
            }
        }

        let analysis = self.ai_service.analyze_content(page).await?;

        self.cache.write().await.put(page.clone(), analysis.clone());
        Ok(analysis)
    }

    async fn suggest_alternative(&self, page: &PageContext) -> Result<Option<String>> {
        self.ai_service.suggest_alternative(page).await
    }
}
