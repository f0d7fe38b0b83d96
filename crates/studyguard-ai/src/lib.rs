pub mod ai_provider;
pub mod ai_service;
pub mod providers;

pub use ai_provider::{create_provider, AiProviderTrait};
pub use ai_service::{
    parse_content_analysis, parse_suggested_url, AiService, ContentAnalysis, ContentType, PageContext,
};
