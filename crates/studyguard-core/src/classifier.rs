
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use studyguard_ai::{ContentAnalysis, ContentType, PageContext};
use studyguard_storage::{Category, Observation};

use crate::ai_classifier::ContentAnalyzer;
use crate::error::GuardError;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Keyword and domain lists driving the rule stage
///
/// Educational and distracting entries match whole host labels, not substrings:
/// `youtube.com` covers `youtube.com` and `m.youtube.com`, while `notyoutube.com`
/// does not match. Inappropriate entries match anywhere in the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteLists {
    /// Matched against the URL host
    pub educational: Vec<String>,
    /// Matched against the URL host
    pub distracting: Vec<String>,
    /// Domains and keywords matched anywhere in the URL
    pub inappropriate: Vec<String>,
    /// Phrases matched against the page title and extracted text
    pub inappropriate_content: Vec<String>,
}

impl Default for SiteLists {
    fn default() -> Self {
        Self {
            educational: strings(&[
                "ixl.com",
                "khanacademy.org",
                "duolingo.com",
                "codecademy.com",
                "brilliant.org",
                "coursera.org",
                "edx.org",
                "udemy.com",
                "wikipedia.org",
                "wolframalpha.com",
                "desmos.com",
                "geogebra.org",
                "scratch.mit.edu",
                "typing.com",
                "mathway.com",
                "symbolab.com",
            ]),
            distracting: strings(&[
                "youtube.com",
                "facebook.com",
                "instagram.com",
                "tiktok.com",
                "twitter.com",
                "x.com",
                "reddit.com",
                "netflix.com",
                "hulu.com",
                "twitch.tv",
                "discord.com",
                "snapchat.com",
                "pinterest.com",
            ]),
            inappropriate: strings(&[
                "4chan.org",
                "xvideos.com",
                "redtube.com",
                "xhamster.com",
                "chaturbate.com",
                "cam4.com",
                "myfreecams.com",
                "livejasmin.com",
                "stripchat.com",
                "bet365.com",
                "draftkings.com",
                "fanduel.com",
                "porn",
                "xxx",
                "nude",
                "naked",
                "hookup",
                "tinder",
                "grindr",
                "bumble",
                "onlyfans",
                "gambling",
                "casino",
                "betting",
                "poker",
                "lottery",
                "cocaine",
                "heroin",
                "marijuana",
            ]),
            inappropriate_content: strings(&["porn", "xxx", "adult content", "nude", "dating app"]),
        }
    }
}

impl SiteLists {
    #[must_use]
    pub fn list(&self, category: Category) -> Option<&Vec<String>> {
        match category {
            Category::Educational => Some(&self.educational),
            Category::Distracting => Some(&self.distracting),
            Category::Inappropriate => Some(&self.inappropriate),
            Category::Neutral => None,
        }
    }

    fn list_mut(&mut self, category: Category) -> Option<&mut Vec<String>> {
        match category {
            Category::Educational => Some(&mut self.educational),
            Category::Distracting => Some(&mut self.distracting),
            Category::Inappropriate => Some(&mut self.inappropriate),
            Category::Neutral => None,
        }
    }

    /// # Errors
    ///
    /// Returns `GuardError::InvalidConfiguration` if any entry is blank
    pub fn validate(&self) -> Result<(), GuardError> {
        let all = self
            .educational
            .iter()
            .chain(&self.distracting)
            .chain(&self.inappropriate)
            .chain(&self.inappropriate_content);
        for entry in all {
            if entry.trim().is_empty() {
                return Err(GuardError::InvalidConfiguration(String::from(
                    "site lists must not contain blank entries",
                )));
            }
        }
        Ok(())
    }
}

/// Lower-cased host of a URL without a leading `www.`; tolerates scheme-less input
#[must_use]
pub fn host_of(raw: &str) -> String {
    let trimmed = raw.trim();
    let parsed = url::Url::parse(trimmed)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| url::Url::parse(&format!("https://{trimmed}")).ok());

    let host = parsed
        .as_ref()
        .and_then(|u| u.host_str())
        .map_or_else(|| trimmed.to_lowercase(), str::to_lowercase);

    if let Some(stripped) = host.strip_prefix("www.") {
        return stripped.to_string();
    }
    host
}

/// Which part of the observation a rule matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Url,
    Host,
    Title,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub category: Category,
    pub confidence: f32,
    pub matched: String,
    pub field: MatchField,
}

/// Where the classification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Matched a keyword or domain list
    Rule,
    /// Decided by the content analysis call
    Content,
    /// Nothing matched
    Default,
}

/// Category attached to one observation, with the signals behind it
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: Category,
    pub confidence: f32,
    pub source: ClassificationSource,
    pub reason: String,
    pub analysis: Option<ContentAnalysis>,
    /// Content analysis was wanted but unavailable
    pub degraded: bool,
}

impl Classification {
    fn from_rule(rule: &RuleMatch) -> Self {
        let field = match rule.field {
            MatchField::Url => "URL",
            MatchField::Host => "host",
            MatchField::Title => "page title",
            MatchField::Text => "page text",
        };
        Self {
            category: rule.category,
            confidence: rule.confidence,
            source: ClassificationSource::Rule,
            reason: format!("{} keyword '{}' in {field}", rule.category, rule.matched),
            analysis: None,
            degraded: false,
        }
    }

    fn neutral(reason: impl Into<String>) -> Self {
        Self {
            category: Category::Neutral,
            confidence: 0.0,
            source: ClassificationSource::Default,
            reason: reason.into(),
            analysis: None,
            degraded: false,
        }
    }

    /// 0-10 educational value reported by content analysis
    #[must_use]
    pub fn educational_value(&self) -> Option<u8> {
        self.analysis.as_ref().map(|a| a.educational_value)
    }

    /// 0-10 distraction level reported by content analysis
    #[must_use]
    pub fn distraction_level(&self) -> Option<u8> {
        self.analysis.as_ref().map(|a| a.distraction_level)
    }
}

fn keyword_regex(keywords: &[String]) -> Result<Option<Regex>, GuardError> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| GuardError::InvalidConfiguration(format!("keyword list: {e}")))
}

/// Deterministic rule stage; no I/O
#[derive(Debug, Clone)]
pub struct SiteRules {
    lists: SiteLists,
    inappropriate_url: Option<Regex>,
    inappropriate_text: Option<Regex>,
}

impl SiteRules {
    /// # Errors
    ///
    /// Returns `GuardError::InvalidConfiguration` if the lists cannot be compiled
    pub fn new(lists: SiteLists) -> Result<Self, GuardError> {
        lists.validate()?;
        Ok(Self {
            inappropriate_url: keyword_regex(&lists.inappropriate)?,
            inappropriate_text: keyword_regex(&lists.inappropriate_content)?,
            lists,
        })
    }

    #[must_use]
    pub fn lists(&self) -> &SiteLists {
        &self.lists
    }

    /// Inappropriate matches win over any domain match
    #[must_use]
    pub fn match_observation(&self, observation: &Observation) -> Option<RuleMatch> {
        if let Some(rule) = self.match_inappropriate(observation) {
            return Some(rule);
        }

        let host = host_of(&observation.url);
        for (category, list) in [
            (Category::Educational, &self.lists.educational),
            (Category::Distracting, &self.lists.distracting),
        ] {
            if let Some(domain) = list.iter().find(|d| domain_matches(&host, d)) {
                return Some(RuleMatch {
                    category,
                    confidence: 0.9,
                    matched: domain.clone(),
                    field: MatchField::Host,
                });
            }
        }
        None
    }

    fn match_inappropriate(&self, observation: &Observation) -> Option<RuleMatch> {
        let hit = |regex: &Option<Regex>, haystack: &str| {
            regex
                .as_ref()
                .and_then(|re| re.find(haystack))
                .map(|m| m.as_str().to_lowercase())
        };

        if let Some(matched) = hit(&self.inappropriate_url, &observation.url) {
            return Some(RuleMatch {
                category: Category::Inappropriate,
                confidence: 0.95,
                matched,
                field: MatchField::Url,
            });
        }

        for (field, text) in [
            (MatchField::Title, observation.title.as_deref()),
            (MatchField::Text, observation.extracted_text.as_deref()),
        ] {
            if let Some(matched) = text.and_then(|t| hit(&self.inappropriate_text, t)) {
                return Some(RuleMatch {
                    category: Category::Inappropriate,
                    confidence: 0.85,
                    matched,
                    field,
                });
            }
        }
        None
    }
}

/// `youtube.com` matches `youtube.com` and `m.youtube.com` but not `notyoutube.com`
fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim().to_lowercase();
    let domain = domain.strip_prefix("www.").unwrap_or(domain.as_str());
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Map the content analysis result onto a category
#[must_use]
pub fn category_for_content(analysis: &ContentAnalysis) -> Category {
    match analysis.content_type {
        ContentType::Inappropriate => Category::Inappropriate,
        ContentType::Educational => Category::Educational,
        ContentType::Entertainment
        | ContentType::Social
        | ContentType::Gaming
        | ContentType::Shopping => Category::Distracting,
        ContentType::News | ContentType::Other => {
            if analysis.educational_value >= 7 {
                Category::Educational
            } else if analysis.distraction_level >= 7 {
                Category::Distracting
            } else {
                Category::Neutral
            }
        }
    }
}

/// Site classifier: rule stage first, content analysis as fallback and enrichment
/// Priority: inappropriate keywords > content analysis saying inappropriate > domain rules > content type > neutral
pub struct SiteClassifier {
    rules: SiteRules,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    analyzer_timeout: Duration,
}

impl SiteClassifier {
    /// # Errors
    ///
    /// Returns `GuardError::InvalidConfiguration` if the lists cannot be compiled
    pub fn new(lists: SiteLists) -> Result<Self, GuardError> {
        Ok(Self {
            rules: SiteRules::new(lists)?,
            analyzer: None,
            analyzer_timeout: Duration::from_secs(5),
        })
    }

    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn ContentAnalyzer>, timeout: Duration) -> Self {
        self.analyzer = Some(analyzer);
        self.analyzer_timeout = timeout;
        self
    }

    #[must_use]
    pub fn rules(&self) -> &SiteRules {
        &self.rules
    }

    #[must_use]
    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Replace every list at runtime
    ///
    /// # Errors
    ///
    /// Returns `GuardError::InvalidConfiguration` if the new lists cannot be compiled;
    /// the previous lists stay active in that case
    pub fn update_lists(&mut self, lists: SiteLists) -> Result<(), GuardError> {
        self.rules = SiteRules::new(lists)?;
        log::info!(
            "Reloaded site lists: {} educational, {} distracting, {} inappropriate",
            self.rules.lists.educational.len(),
            self.rules.lists.distracting.len(),
            self.rules.lists.inappropriate.len()
        );
        Ok(())
    }

    /// Add one keyword or domain to a category's list
    ///
    /// # Errors
    ///
    /// Returns `GuardError::InvalidConfiguration` for the neutral category or a blank keyword
    pub fn add_keyword(&mut self, category: Category, keyword: &str) -> Result<(), GuardError> {
        let keyword = keyword.trim().to_lowercase();
        let mut lists = self.rules.lists.clone();
        let list = lists.list_mut(category).ok_or_else(|| {
            GuardError::InvalidConfiguration(String::from("neutral has no keyword list"))
        })?;
        if !list.contains(&keyword) {
            list.push(keyword);
        }
        self.update_lists(lists)
    }

    /// Rule stage only; pure and reproducible without network access
    #[must_use]
    pub fn classify_rules(&self, observation: &Observation) -> Classification {
        self.rules.match_observation(observation).map_or_else(
            || Classification::neutral("no rule matched"),
            |rule| Classification::from_rule(&rule),
        )
    }

    /// Full classification; never fails and never waits longer than the analyzer timeout
    pub async fn classify(&self, observation: &Observation) -> Classification {
        let rule = self.rules.match_observation(observation);

        if let Some(rule) = rule.as_ref().filter(|r| r.category == Category::Inappropriate) {
            log::debug!("{} flagged by keyword '{}'", observation.url, rule.matched);
            return Classification::from_rule(rule);
        }

        let Some(analyzer) = &self.analyzer else {
            return self.classify_rules(observation);
        };

        match self.analyze(analyzer.as_ref(), observation).await {
            Ok(analysis) => Self::merge(rule.as_ref(), analysis),
            Err(e) => {
                log::warn!("{e}; using rule-based category for {}", observation.url);
                let mut classification = self.classify_rules(observation);
                classification.degraded = true;
                classification
            }
        }
    }

    async fn analyze(
        &self,
        analyzer: &dyn ContentAnalyzer,
        observation: &Observation,
    ) -> Result<ContentAnalysis, GuardError> {
        let page = Self::page_context(observation);
        match tokio::time::timeout(self.analyzer_timeout, analyzer.analyze(&page)).await {
            Ok(Ok(analysis)) => Ok(analysis),
            Ok(Err(e)) => Err(GuardError::ClassificationUnavailable(e.to_string())),
            Err(_) => Err(GuardError::ClassificationUnavailable(format!(
                "timed out after {}ms",
                self.analyzer_timeout.as_millis()
            ))),
        }
    }

    /// Analyzer-suggested redirect for an intervention; `None` when there is no
    /// analyzer or it fails, times out, or answers with something unusable
    pub async fn suggest_alternative(&self, observation: &Observation) -> Option<String> {
        let analyzer = self.analyzer.as_ref()?;
        let page = Self::page_context(observation);
        match tokio::time::timeout(self.analyzer_timeout, analyzer.suggest_alternative(&page)).await
        {
            Ok(Ok(suggestion)) => suggestion,
            Ok(Err(e)) => {
                log::warn!("No redirect suggestion for {}: {e}", observation.url);
                None
            }
            Err(_) => {
                log::warn!(
                    "Redirect suggestion for {} timed out after {}ms",
                    observation.url,
                    self.analyzer_timeout.as_millis()
                );
                None
            }
        }
    }

    fn page_context(observation: &Observation) -> PageContext {
        PageContext {
            url: observation.url.clone(),
            title: observation.title.clone(),
            text: observation.extracted_text.clone(),
        }
    }

    fn merge(rule: Option<&RuleMatch>, analysis: ContentAnalysis) -> Classification {
        let content_category = category_for_content(&analysis);

        if content_category == Category::Inappropriate {
            return Classification {
                category: Category::Inappropriate,
                confidence: 0.8,
                source: ClassificationSource::Content,
                reason: format!("content analysis: {}", analysis.description),
                analysis: Some(analysis),
                degraded: false,
            };
        }

        match rule {
            Some(rule) => Classification {
                analysis: Some(analysis),
                ..Classification::from_rule(rule)
            },
            None => Classification {
                category: content_category,
                confidence: 0.7,
                source: ClassificationSource::Content,
                reason: format!(
                    "content analysis ({:?}): {}",
                    analysis.content_type, analysis.description
                ),
                analysis: Some(analysis),
                degraded: false,
            },
        }
    }
}
