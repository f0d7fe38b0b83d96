use super::*;
use crate::classifier::ClassificationSource;
use chrono::TimeZone;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 15, 0, 0).unwrap() + Duration::seconds(secs)
}

fn entry(url: &str, category: Category, secs: i64) -> ClassifiedObservation {
    ClassifiedObservation::new(
        Arc::new(Observation::new(url, at(secs))),
        Classification {
            category,
            confidence: 0.9,
            source: ClassificationSource::Rule,
            reason: String::from("test"),
            analysis: None,
            degraded: false,
        },
    )
}

#[test]
fn test_empty_window_neutral_defaults() {
    let aggregator = PatternAggregator::default();
    let snapshot = aggregator.aggregate(&[], at(0));
    assert!((snapshot.focus_score - 5.0).abs() < f64::EPSILON);
    assert!(snapshot.educational_ratio.abs() < f64::EPSILON);
    assert_eq!(snapshot.trend, Trend::Stable);
    assert_eq!(snapshot.pattern, BrowsingPattern::NoData);

    assert!(matches!(
        aggregator.summarize(&[]),
        Err(GuardError::EmptyWindow)
    ));
}

#[test]
fn test_entries_outside_window_are_ignored() {
    let aggregator = PatternAggregator::new(Duration::seconds(600), 0.5);
    let history = vec![
        entry("https://youtube.com/watch", Category::Distracting, 0),
        entry("https://ixl.com/math", Category::Educational, 700),
    ];
    let snapshot = aggregator.aggregate(&history, at(900));
    assert_eq!(snapshot.total_entries, 1);
    assert!((snapshot.educational_ratio - 1.0).abs() < f64::EPSILON);

    // Nothing in the window at all
    let snapshot = aggregator.aggregate(&history, at(5000));
    assert_eq!(snapshot, PatternSnapshot::empty());
}

#[test]
fn test_fully_educational_single_site_scores_ten() {
    let aggregator = PatternAggregator::default();
    let history: Vec<_> = (0..5)
        .map(|i| entry("https://www.khanacademy.org/math", Category::Educational, i * 60))
        .collect();
    let snapshot = aggregator.aggregate(&history, at(300));
    assert!((snapshot.focus_score - 10.0).abs() < 1e-9);
    assert_eq!(snapshot.site_switch_count, 0);
    assert_eq!(snapshot.unique_site_count, 1);
    assert_eq!(snapshot.pattern, BrowsingPattern::FocusedStudy);
}

#[test]
fn test_switches_and_unique_sites() {
    let aggregator = PatternAggregator::default();
    let history = vec![
        entry("https://ixl.com/a", Category::Educational, 0),
        entry("https://www.ixl.com/b", Category::Educational, 15),
        entry("https://youtube.com/x", Category::Distracting, 30),
        entry("https://ixl.com/c", Category::Educational, 45),
    ];
    let snapshot = aggregator.summarize(&history).unwrap();
    assert_eq!(snapshot.site_switch_count, 2);
    assert_eq!(snapshot.unique_site_count, 2);
    assert!((snapshot.educational_ratio - 0.75).abs() < f64::EPSILON);
    assert!((snapshot.distraction_ratio - 0.25).abs() < f64::EPSILON);
}

#[test]
fn test_focus_monotonic_in_switches() {
    for ratio in [0.0, 0.3, 0.5, 1.0] {
        let mut previous = f64::MAX;
        for switches in 0..10 {
            let score = focus_score(switches, 10, ratio);
            assert!((0.0..=10.0).contains(&score));
            assert!(score <= previous, "score rose at {switches} switches");
            previous = score;
        }
    }
}

#[test]
fn test_pattern_labels() {
    let aggregator = PatternAggregator::default();

    let distracted: Vec<_> = (0..5)
        .map(|i| entry("https://youtube.com/watch", Category::Distracting, i * 10))
        .collect();
    assert_eq!(
        aggregator.summarize(&distracted).unwrap().pattern,
        BrowsingPattern::HeavyDistraction
    );

    let scattered = vec![
        entry("https://a.com", Category::Neutral, 0),
        entry("https://b.com", Category::Neutral, 10),
        entry("https://c.com", Category::Neutral, 20),
        entry("https://d.com", Category::Neutral, 30),
    ];
    assert_eq!(
        aggregator.summarize(&scattered).unwrap().pattern,
        BrowsingPattern::ScatteredBrowsing
    );

    let mixed = vec![
        entry("https://ixl.com", Category::Educational, 0),
        entry("https://ixl.com", Category::Educational, 10),
        entry("https://news.com", Category::Neutral, 20),
        entry("https://news.com", Category::Neutral, 30),
    ];
    assert_eq!(
        aggregator.summarize(&mixed).unwrap().pattern,
        BrowsingPattern::MixedActivity
    );
}

#[test]
fn test_trend_declining_then_improving() {
    let aggregator = PatternAggregator::default();

    let declining = vec![
        entry("https://ixl.com", Category::Educational, 0),
        entry("https://ixl.com", Category::Educational, 10),
        entry("https://youtube.com", Category::Distracting, 20),
        entry("https://reddit.com", Category::Distracting, 30),
    ];
    assert_eq!(
        aggregator.summarize(&declining).unwrap().trend,
        Trend::Declining
    );

    let improving: Vec<_> = declining
        .iter()
        .rev()
        .enumerate()
        .map(|(i, e)| {
            let mut e = e.clone();
            e.observation = Arc::new(Observation::new(e.observation.url.clone(), at(i as i64 * 10)));
            e
        })
        .collect();
    assert_eq!(
        aggregator.summarize(&improving).unwrap().trend,
        Trend::Improving
    );
}

#[test]
fn test_trend_stable_below_epsilon() {
    let aggregator = PatternAggregator::new(Duration::seconds(600), 0.5);
    let steady: Vec<_> = (0..6)
        .map(|i| entry("https://ixl.com", Category::Educational, i * 10))
        .collect();
    assert_eq!(aggregator.summarize(&steady).unwrap().trend, Trend::Stable);

    let single = vec![entry("https://ixl.com", Category::Educational, 0)];
    assert_eq!(aggregator.summarize(&single).unwrap().trend, Trend::Stable);
}
