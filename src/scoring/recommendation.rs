//! Human-readable recommendation for a completed run.

use serde::Serialize;

use super::{RankedEngine, ScoringConfig};
use crate::models::EngineKind;

/// Statement of the best (and possibly runner-up) engine for a run.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub winner: EngineKind,
    /// Runner-up whose composite score fell within the closeness
    /// threshold of the winner's.
    pub runner_up: Option<EngineKind>,
    /// Winner's raw confidence fell below the configured threshold.
    pub low_confidence: bool,
    pub summary: String,
}

impl Recommendation {
    /// Build from a non-empty ranking. Returns `None` for an empty one.
    pub fn build(ranking: &[RankedEngine], config: &ScoringConfig) -> Option<Self> {
        let best = ranking.first()?;

        let runner_up = ranking.get(1).and_then(|second| {
            if best.composite - second.composite < config.closeness_threshold {
                Some(second.engine)
            } else {
                None
            }
        });
        let low_confidence = best.confidence < config.low_confidence_threshold;

        let mut summary = format!(
            "Recommendation: {} performed best with {:.1}% confidence, {:.2}s processing time, and ${:.4} estimated cost.",
            best.engine,
            best.confidence * 100.0,
            best.processing_time_ms as f64 / 1000.0,
            best.cost,
        );
        if let Some(second) = runner_up {
            summary.push_str(&format!(
                " {} scored within {:.2} of the winner and is an acceptable alternative.",
                second, config.closeness_threshold,
            ));
        }
        if low_confidence {
            summary.push_str(&format!(
                " Caveat: top confidence {:.1}% is below the {:.1}% threshold; results may need manual review.",
                best.confidence * 100.0,
                config.low_confidence_threshold * 100.0,
            ));
        }

        Some(Self {
            winner: best.engine,
            runner_up,
            low_confidence,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(engine: EngineKind, composite: f64, confidence: f64) -> RankedEngine {
        RankedEngine {
            engine,
            composite,
            confidence,
            processing_time_ms: 600,
            cost: 0.01,
            text_length: 1000,
        }
    }

    #[test]
    fn test_empty_ranking_yields_none() {
        assert!(Recommendation::build(&[], &ScoringConfig::default()).is_none());
    }

    #[test]
    fn test_clear_winner() {
        let ranking = vec![
            ranked(EngineKind::Tesseract, 0.9, 0.92),
            ranked(EngineKind::EasyOcr, 0.5, 0.85),
        ];
        let rec = Recommendation::build(&ranking, &ScoringConfig::default()).unwrap();
        assert_eq!(rec.winner, EngineKind::Tesseract);
        assert!(rec.runner_up.is_none());
        assert!(!rec.low_confidence);
        assert!(rec.summary.contains("tesseract"));
        assert!(!rec.summary.contains("acceptable alternative"));
    }

    // Scenario C: two engines within the closeness threshold.
    #[test]
    fn test_close_scores_name_both() {
        let ranking = vec![
            ranked(EngineKind::Tesseract, 0.82, 0.92),
            ranked(EngineKind::PaddleOcr, 0.80, 0.90),
        ];
        let rec = Recommendation::build(&ranking, &ScoringConfig::default()).unwrap();
        assert_eq!(rec.winner, EngineKind::Tesseract);
        assert_eq!(rec.runner_up, Some(EngineKind::PaddleOcr));
        assert!(rec.summary.contains("paddleocr"));
        assert!(rec.summary.contains("acceptable alternative"));
    }

    #[test]
    fn test_low_confidence_caveat() {
        let ranking = vec![ranked(EngineKind::EasyOcr, 1.0, 0.45)];
        let rec = Recommendation::build(&ranking, &ScoringConfig::default()).unwrap();
        assert!(rec.low_confidence);
        assert!(rec.summary.contains("Caveat"));
        assert!(rec.summary.contains("manual review"));
    }
}
