use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use super::{ActorDefinition, Coercion, InputRule};
use crate::kernel::BaseActorRegistry;

const GOOGLE_MAPS_RULES: &[InputRule] = &[
    InputRule::new("searchTerms", "search_terms", Coercion::StringList),
    InputRule::new("maxResults", "max_results", Coercion::Integer),
    InputRule::new("extractReviews", "extract_reviews", Coercion::Boolean),
    InputRule::new("extractImages", "extract_images", Coercion::Boolean),
];

const AMAZON_RULES: &[InputRule] = &[
    InputRule::new("searchKeywords", "search_keywords", Coercion::StringList),
    InputRule::new("maxResults", "max_results", Coercion::Integer),
    InputRule::new("extractReviews", "extract_reviews", Coercion::Boolean),
    InputRule::new("minRating", "min_rating", Coercion::Float),
    InputRule::new("maxPrice", "max_price", Coercion::Float),
];

const SOCIAL_RULES: &[InputRule] = &[
    InputRule::new("maxResults", "max_results", Coercion::Integer),
    InputRule::new("usernames", "usernames", Coercion::StringList),
];

const WEBSITE_RULES: &[InputRule] = &[
    InputRule::new("startUrls", "start_urls", Coercion::StringList),
    InputRule::new("maxPages", "max_pages", Coercion::Integer),
];

/// Read-only actor registry held in memory.
///
/// [`ActorCatalog::builtin`] lists every scraper the worker routes to.
#[derive(Debug, Clone, Default)]
pub struct ActorCatalog {
    actors: HashMap<String, ActorDefinition>,
}

impl ActorCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        [
            ActorDefinition::public("google-maps", "Google Maps Scraper", GOOGLE_MAPS_RULES)
                .with_enrichment(),
            ActorDefinition::public("amazon", "Amazon Product Scraper", AMAZON_RULES),
            ActorDefinition::public("instagram", "Instagram Scraper", SOCIAL_RULES),
            ActorDefinition::public("twitter", "Twitter Scraper", SOCIAL_RULES),
            ActorDefinition::public("facebook", "Facebook Scraper", SOCIAL_RULES),
            ActorDefinition::public("linkedin", "LinkedIn Scraper", SOCIAL_RULES),
            ActorDefinition::public("tiktok", "TikTok Scraper", SOCIAL_RULES),
            ActorDefinition::public("website", "Website Content Crawler", WEBSITE_RULES),
        ]
        .into_iter()
        .fold(Self::empty(), Self::with_actor)
    }

    pub fn with_actor(mut self, actor: ActorDefinition) -> Self {
        self.actors.insert(actor.id.clone(), actor);
        self
    }

    pub fn get(&self, actor_id: &str) -> Option<&ActorDefinition> {
        self.actors.get(actor_id)
    }
}

#[async_trait]
impl BaseActorRegistry for ActorCatalog {
    async fn find_actor(&self, actor_id: &str) -> Result<Option<ActorDefinition>> {
        Ok(self.get(actor_id).cloned())
    }
}
