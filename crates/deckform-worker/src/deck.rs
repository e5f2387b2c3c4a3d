use anyhow::anyhow;
use serde::Deserialize;

use deckform_core::WorkerError;

/// Wire shape of an uploaded deck: a JSON manifest with a slide list.
#[derive(Debug, Deserialize)]
struct DeckManifest {
    #[serde(default)]
    title: Option<String>,
    slides: Vec<ManifestSlide>,
}

#[derive(Debug, Deserialize)]
struct ManifestSlide {
    #[serde(default)]
    heading: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    notes: Option<String>,
}

/// One slide extracted from an uploaded deck, position implied by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideContent {
    pub heading: String,
    pub body: String,
    pub notes: Option<String>,
}

/// Decompose uploaded deck bytes into ordered slides.
///
/// Every rejection here is a fatal [`WorkerError`]: the bytes are already
/// durable and will not change, so retrying cannot help.
pub fn decompose(data: &[u8], max_slides: usize) -> anyhow::Result<Vec<SlideContent>> {
    let manifest: DeckManifest = serde_json::from_slice(data)
        .map_err(|e| WorkerError::fatal(anyhow!("deck manifest is not valid JSON: {}", e)))?;

    if manifest.slides.is_empty() {
        return Err(WorkerError::fatal(anyhow!("deck contains no slides")).into());
    }
    if manifest.slides.len() > max_slides {
        return Err(WorkerError::fatal(anyhow!(
            "deck has {} slides, limit is {}",
            manifest.slides.len(),
            max_slides
        ))
        .into());
    }

    let deck_title = manifest.title.as_deref().unwrap_or("Untitled deck");

    Ok(manifest
        .slides
        .into_iter()
        .enumerate()
        .map(|(i, slide)| {
            let heading = slide
                .heading
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| format!("{} - slide {}", deck_title, i + 1));
            SlideContent {
                heading,
                body: slide.body.trim().to_string(),
                notes: slide
                    .notes
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty()),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckform_core::worker_error::is_transient;

    #[test]
    fn decomposes_manifest_in_slide_order() {
        let data = br#"{
            "title": "Q3 Review",
            "slides": [
                {"heading": "Agenda", "body": "What we will cover"},
                {"heading": "Numbers", "body": "Revenue up", "notes": "pause here"}
            ]
        }"#;
        let slides = decompose(data, 10).unwrap();
        assert_eq!(slides.len(), 2);
        assert_eq!(slides[0].heading, "Agenda");
        assert_eq!(slides[0].notes, None);
        assert_eq!(slides[1].notes.as_deref(), Some("pause here"));
    }

    #[test]
    fn missing_heading_falls_back_to_deck_title() {
        let data = br#"{"title": "Kickoff", "slides": [{"body": "hello"}]}"#;
        let slides = decompose(data, 10).unwrap();
        assert_eq!(slides[0].heading, "Kickoff - slide 1");

        let data = br#"{"slides": [{"heading": "  ", "body": "hello"}]}"#;
        let slides = decompose(data, 10).unwrap();
        assert_eq!(slides[0].heading, "Untitled deck - slide 1");
    }

    #[test]
    fn invalid_json_is_fatal() {
        let err = decompose(b"not json at all", 10).unwrap_err();
        assert!(!is_transient(&err));
    }

    #[test]
    fn empty_deck_is_fatal() {
        let err = decompose(br#"{"slides": []}"#, 10).unwrap_err();
        assert!(!is_transient(&err));
        assert!(err.to_string().contains("no slides"));
    }

    #[test]
    fn oversized_deck_is_fatal() {
        let data = br#"{"slides": [{"body": "a"}, {"body": "b"}, {"body": "c"}]}"#;
        let err = decompose(data, 2).unwrap_err();
        assert!(!is_transient(&err));
        assert!(err.to_string().contains("limit is 2"));
    }
}
