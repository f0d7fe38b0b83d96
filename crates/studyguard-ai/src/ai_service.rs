use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use studyguard_storage::models::AiConfig;

use crate::ai_provider::{create_provider, AiProviderTrait};

/// Maximum number of characters of page text sent to the provider
const MAX_TEXT_CHARS: usize = 2000;
/// Suggested redirect targets must be shorter than this
const MAX_SUGGESTION_CHARS: usize = 200;

/// Page content handed to the content analysis call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageContext {
    pub url: String,
    pub title: Option<String>,
    pub text: Option<String>,
}

impl PageContext {
    #[must_use]
    pub fn to_prompt_text(&self) -> String {
        let mut text = format!("URL: {}\n", self.url);
        if let Some(title) = &self.title {
            text.push_str(&format!("Page title: {title}\n"));
        }
        if let Some(body) = &self.text {
            let excerpt: String = body.chars().take(MAX_TEXT_CHARS).collect();
            text.push_str(&format!("Visible text:\n{excerpt}\n"));
        }
        text
    }
}

/// Kind of content the provider saw on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Educational,
    Entertainment,
    Social,
    Gaming,
    Shopping,
    News,
    Inappropriate,
    #[serde(other)]
    Other,
}

/// Validated result of the content analysis call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysis {
    pub content_type: ContentType,
    /// 0 to 10
    pub educational_value: u8,
    /// 0 to 10
    pub distraction_level: u8,
    pub description: String,
}

/// Payload as the model returns it; every field may be missing or out of range
#[derive(Debug, Default, Deserialize)]
struct RawContentAnalysis {
    content_type: Option<String>,
    educational_value: Option<f64>,
    distraction_level: Option<f64>,
    description: Option<String>,
}

impl From<RawContentAnalysis> for ContentAnalysis {
    fn from(raw: RawContentAnalysis) -> Self {
        let content_type = raw
            .content_type
            .map(|t| t.trim().to_lowercase().replace([' ', '-'], "_"))
            .and_then(|t| serde_json::from_value(serde_json::Value::String(t)).ok())
            .unwrap_or(ContentType::Other);

        Self {
            content_type,
            educational_value: score_0_to_10(raw.educational_value),
            distraction_level: score_0_to_10(raw.distraction_level),
            description: raw.description.unwrap_or_default(),
        }
    }
}

/// Missing scores default to the midpoint
fn score_0_to_10(value: Option<f64>) -> u8 {
    let value = value.filter(|v| v.is_finite()).unwrap_or(5.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let score = value.round().clamp(0.0, 10.0) as u8;
    score
}

/// Parse the provider's answer, tolerating surrounding prose and code fences
///
/// # Errors
///
/// Returns an error if no JSON object can be found in the response
pub fn parse_content_analysis(response: &str) -> Result<ContentAnalysis> {
    let start = response.find('{');
    let end = response.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => anyhow::bail!("No JSON object in content analysis response: {response}"),
    };

    let raw: RawContentAnalysis = serde_json::from_str(json)
        .with_context(|| format!("Failed to parse content analysis JSON: {json}"))?;
    Ok(raw.into())
}

/// Accept a suggested redirect only when it is a single short http(s) URL
#[must_use]
pub fn parse_suggested_url(response: &str) -> Option<String> {
    let url = response
        .trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'' || c == '<' || c == '>');
    let valid = (url.starts_with("http://") || url.starts_with("https://"))
        && url.len() < MAX_SUGGESTION_CHARS
        && !url.chars().any(char::is_whitespace);
    valid.then(|| url.to_string())
}

/// Content understanding service backed by the configured provider
pub struct AiService {
    provider: Box<dyn AiProviderTrait>,
    config: AiConfig,
}

impl AiService {
    /// Create a new AI service from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be created
    pub fn new(config: AiConfig) -> Result<Self> {
        let provider = create_provider(&config)?;
        Ok(Self { provider, config })
    }

    /// Build a service around an existing provider
    #[must_use]
    pub fn with_provider(provider: Box<dyn AiProviderTrait>, config: AiConfig) -> Self {
        Self { provider, config }
    }

    /// Check if AI service is enabled and reachable
    pub async fn is_available(&self) -> bool {
        self.config.enabled && self.provider.is_available().await
    }

    /// Get the model name in use
    #[must_use]
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Ask the provider what kind of content the page shows
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails or the answer cannot be parsed
    pub async fn analyze_content(&self, page: &PageContext) -> Result<ContentAnalysis> {
        let prompt = Self::build_analysis_prompt(page);
        let response = self.provider.generate(&prompt).await?;
        let analysis = parse_content_analysis(&response)?;
        log::debug!(
            "Content analysis for {}: {:?} (edu {}, distraction {})",
            page.url,
            analysis.content_type,
            analysis.educational_value,
            analysis.distraction_level
        );
        Ok(analysis)
    }

    /// One educational site suited to what the student is looking at, if the
    /// provider answers with a usable URL
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails
    pub async fn suggest_alternative(&self, page: &PageContext) -> Result<Option<String>> {
        let prompt = format!(
            "A student should be redirected away from the page below.\n\n\
             {}\n\
             Suggest ONE educational website URL that would be appropriate for a student. \
             Consider their apparent interests but redirect to educational content for \
             younger children, such as IXL or Khan Academy.\n\
             Respond with only the URL, nothing else.\n\
             Example: https://www.khanacademy.org/math",
            page.to_prompt_text()
        );
        let response = self.provider.generate(&prompt).await?;
        let suggestion = parse_suggested_url(&response);
        if suggestion.is_none() {
            log::debug!("Ignoring unusable redirect suggestion: {}", response.trim());
        }
        Ok(suggestion)
    }

    /// Short encouraging progress note for the student from session facts
    ///
    /// # Errors
    ///
    /// Returns an error if the provider call fails
    pub async fn write_progress_note(&self, facts: &str) -> Result<String> {
        let prompt = format!(
            "Write a brief, encouraging progress report for a student based on their recent \
             computer activity.\n\n{facts}\n\n\
             Write 2-3 sentences that acknowledge their effort, highlight positive patterns, \
             and give a gentle suggestion if needed. Keep it age-appropriate."
        );
        let response = self.provider.generate(&prompt).await?;
        Ok(response.trim().to_string())
    }

    fn build_analysis_prompt(page: &PageContext) -> String {
        format!(
            "Classify the web page a student is currently looking at.\n\
             \n\
             {}\n\
             Return a JSON object with this exact format:\n\
             {{\n  \"content_type\": \"educational|entertainment|social|gaming|shopping|news|inappropriate|other\",\n  \
             \"educational_value\": 0,\n  \"distraction_level\": 0,\n  \"description\": \"...\"\n}}\n\
             educational_value and distraction_level are integers from 0 to 10.\n\
             Use \"inappropriate\" for adult, gambling, drug or violent content.",
            page.to_prompt_text()
        )
    }
}
