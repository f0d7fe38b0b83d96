//! One-off classification of a URL
use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use studyguard_core::host_of;
use studyguard_storage::Observation;

use super::helpers::{build_classifier, load_config};

pub async fn handle_classify(
    url: &str,
    title: Option<String>,
    text: Option<String>,
    use_ai: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    config.ai.enabled = config.ai.enabled && use_ai;
    let classifier = build_classifier(&config)?;

    let mut observation = Observation::new(url, Utc::now());
    observation.title = title;
    observation.extracted_text = text;

    let classification = if use_ai {
        classifier.classify(&observation).await
    } else {
        classifier.classify_rules(&observation)
    };

    println!("URL:        {url}");
    println!("Host:       {}", host_of(url));
    println!("Category:   {}", classification.category);
    println!("Confidence: {:.2}", classification.confidence);
    println!("Source:     {:?}", classification.source);
    println!("Reason:     {}", classification.reason);
    if let Some(analysis) = &classification.analysis {
        println!(
            "Analysis:   {:?}, educational {}/10, distraction {}/10",
            analysis.content_type, analysis.educational_value, analysis.distraction_level
        );
        if !analysis.description.is_empty() {
            println!("            {}", analysis.description);
        }
    }
    if classification.degraded {
        println!("(content analysis unavailable, rule result only)");
    }
    Ok(())
}
