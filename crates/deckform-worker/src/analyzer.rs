use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Words per minute assumed when estimating presentation time for a slide.
const READING_WPM: u32 = 150;

/// Per-slide analysis result, stored as JSON on the slide row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideAnalysis {
    pub word_count: u32,
    pub reading_seconds: u32,
    pub keywords: Vec<String>,
}

/// Analysis seam for extracted slides. The pool treats the implementation as
/// opaque; swapping in a model-backed analyzer changes nothing upstream.
#[async_trait]
pub trait SlideAnalyzer: Send + Sync {
    async fn analyze(&self, heading: &str, body: &str) -> anyhow::Result<SlideAnalysis>;
}

/// Frequency-based keyword extraction over the slide text. Cheap and fully
/// local; accuracy is whatever word frequency gives you.
#[derive(Debug, Default, Clone)]
pub struct KeywordAnalyzer {
    max_keywords: usize,
}

impl KeywordAnalyzer {
    pub fn new() -> Self {
        Self { max_keywords: 5 }
    }
}

const STOPWORDS: &[&str] = &[
    "about", "after", "because", "before", "being", "between", "could", "every", "their", "there",
    "these", "thing", "things", "through", "under", "where", "which", "while", "would",
];

#[async_trait]
impl SlideAnalyzer for KeywordAnalyzer {
    async fn analyze(&self, heading: &str, body: &str) -> anyhow::Result<SlideAnalysis> {
        let word_count = body.split_whitespace().count() as u32;
        let reading_seconds = (word_count * 60).div_ceil(READING_WPM).max(1);

        let mut freq: HashMap<String, u32> = HashMap::new();
        for word in heading.split_whitespace().chain(body.split_whitespace()) {
            let token: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if token.len() < 5 || STOPWORDS.contains(&token.as_str()) {
                continue;
            }
            *freq.entry(token).or_insert(0) += 1;
        }

        let mut ranked: Vec<(String, u32)> = freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let keywords = ranked
            .into_iter()
            .take(self.max_keywords)
            .map(|(word, _)| word)
            .collect();

        Ok(SlideAnalysis {
            word_count,
            reading_seconds,
            keywords,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_words_and_estimates_reading_time() {
        let analyzer = KeywordAnalyzer::new();
        let body = "revenue revenue revenue growth growth margin";
        let analysis = analyzer.analyze("Quarterly numbers", body).await.unwrap();
        assert_eq!(analysis.word_count, 6);
        // 6 words at 150 wpm rounds up to 3 seconds
        assert_eq!(analysis.reading_seconds, 3);
    }

    #[tokio::test]
    async fn keywords_ranked_by_frequency_then_alphabetically() {
        let analyzer = KeywordAnalyzer::new();
        let body = "revenue revenue growth margin margin churn";
        let analysis = analyzer.analyze("", body).await.unwrap();
        assert_eq!(analysis.keywords, vec!["margin", "revenue", "churn", "growth"]);
    }

    #[tokio::test]
    async fn short_words_and_stopwords_excluded() {
        let analyzer = KeywordAnalyzer::new();
        let analysis = analyzer
            .analyze("About this", "every team would ship it fast")
            .await
            .unwrap();
        assert!(analysis.keywords.is_empty());
    }

    #[tokio::test]
    async fn empty_slide_still_reports_a_second() {
        let analyzer = KeywordAnalyzer::new();
        let analysis = analyzer.analyze("", "").await.unwrap();
        assert_eq!(analysis.word_count, 0);
        assert_eq!(analysis.reading_seconds, 1);
    }
}
