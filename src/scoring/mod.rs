//! Composite scoring and engine recommendation.
//!
//! Operates only on successful outcomes of the current run. Each signal
//! is min-max normalized relative to the other successful engines in the
//! same run, so scores from different runs are never comparable and a
//! re-submission must replace (not merge with) earlier results.

mod recommendation;

pub use recommendation::Recommendation;

use serde::{Deserialize, Serialize};

use crate::models::EngineKind;

/// Weights for the four composite-score signals. Must sum to roughly
/// 1.0 for scores to stay in [0, 1], but this is not enforced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    /// Confidence, higher better.
    pub confidence: f64,
    /// Inverse latency, lower processing time better.
    pub latency: f64,
    /// Inverse cost, lower estimated cost better.
    pub cost: f64,
    /// Text-quality proxy: normalized extracted-text length.
    pub text_length: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            latency: 0.3,
            cost: 0.2,
            text_length: 0.1,
        }
    }
}

/// Scoring configuration: weights plus recommendation thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    /// Composite-score gap below which rank 1 and rank 2 are both
    /// recommended as acceptable.
    pub closeness_threshold: f64,
    /// Raw confidence below which the recommendation carries a caveat.
    pub low_confidence_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            closeness_threshold: 0.05,
            low_confidence_threshold: 0.6,
        }
    }
}

/// One successful engine outcome, reduced to the scored signals.
#[derive(Debug, Clone)]
pub struct EngineSample {
    pub engine: EngineKind,
    pub confidence: f64,
    pub processing_time_ms: u64,
    /// Estimated cost; `None` defaults to the run's median at ranking time.
    pub cost: Option<f64>,
    pub text_length: usize,
}

/// A ranked engine with its composite score and raw signals.
#[derive(Debug, Clone, Serialize)]
pub struct RankedEngine {
    pub engine: EngineKind,
    pub composite: f64,
    pub confidence: f64,
    pub processing_time_ms: u64,
    /// Cost used for ranking (declared, or the run median fallback).
    pub cost: f64,
    pub text_length: usize,
}

/// Final ranking and recommendation for a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub ranking: Vec<RankedEngine>,
    pub recommendation: Recommendation,
}

/// Incremental per-run scorer.
///
/// Fed one terminal outcome at a time; a "best so far" ranking is
/// queryable at any point and `finalize` produces the recommendation
/// once every engine is terminal.
pub struct Scorer {
    config: ScoringConfig,
    /// Registry registration order, the last-resort tie-break.
    registration_order: Vec<EngineKind>,
    successes: Vec<EngineSample>,
    failures: Vec<(EngineKind, String)>,
}

impl Scorer {
    pub fn new(config: ScoringConfig, registration_order: Vec<EngineKind>) -> Self {
        Self {
            config,
            registration_order,
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, sample: EngineSample) {
        self.successes.push(sample);
    }

    pub fn record_failure(&mut self, engine: EngineKind, reason: String) {
        self.failures.push((engine, reason));
    }

    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    /// Rank the successful engines recorded so far. Failed engines never
    /// appear here.
    pub fn rank(&self) -> Vec<RankedEngine> {
        if self.successes.is_empty() {
            return Vec::new();
        }

        let costs = self.resolved_costs();

        let confidences: Vec<f64> = self.successes.iter().map(|s| s.confidence).collect();
        let latencies: Vec<f64> = self
            .successes
            .iter()
            .map(|s| s.processing_time_ms as f64)
            .collect();
        let lengths: Vec<f64> = self
            .successes
            .iter()
            .map(|s| s.text_length as f64)
            .collect();

        let w = self.config.weights;
        let mut ranked: Vec<RankedEngine> = self
            .successes
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let composite = w.confidence * normalize(confidences[i], &confidences, true)
                    + w.latency * normalize(latencies[i], &latencies, false)
                    + w.cost * normalize(costs[i], &costs, false)
                    + w.text_length * normalize(lengths[i], &lengths, true);
                RankedEngine {
                    engine: s.engine,
                    composite,
                    confidence: s.confidence,
                    processing_time_ms: s.processing_time_ms,
                    cost: costs[i],
                    text_length: s.text_length,
                }
            })
            .collect();

        let order = &self.registration_order;
        ranked.sort_by(|a, b| {
            b.composite
                .total_cmp(&a.composite)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.processing_time_ms.cmp(&b.processing_time_ms))
                .then_with(|| order_index(order, a.engine).cmp(&order_index(order, b.engine)))
        });
        ranked
    }

    /// Best successful engine so far, if any.
    pub fn best_so_far(&self) -> Option<RankedEngine> {
        self.rank().into_iter().next()
    }

    /// Produce the final ranking and recommendation. `None` when no
    /// engine succeeded.
    pub fn finalize(&self) -> Option<ScoreReport> {
        let ranking = self.rank();
        let recommendation = Recommendation::build(&ranking, &self.config)?;
        Some(ScoreReport {
            ranking,
            recommendation,
        })
    }

    /// Aggregate summary of every failed engine's reason.
    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|(engine, reason)| format!("{}: {}", engine, reason))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Costs with `None` entries defaulted to the run's median declared cost.
    fn resolved_costs(&self) -> Vec<f64> {
        let mut declared: Vec<f64> = self.successes.iter().filter_map(|s| s.cost).collect();
        let median = if declared.is_empty() {
            0.0
        } else {
            declared.sort_by(f64::total_cmp);
            let mid = declared.len() / 2;
            if declared.len() % 2 == 0 {
                (declared[mid - 1] + declared[mid]) / 2.0
            } else {
                declared[mid]
            }
        };
        self.successes
            .iter()
            .map(|s| s.cost.unwrap_or(median))
            .collect()
    }
}

/// Min-max normalize `value` within `values`, into [0, 1].
///
/// `higher_better` flips the scale so the best value always maps to 1.0.
/// A degenerate range (single sample, or all equal) normalizes to 1.0.
fn normalize(value: f64, values: &[f64], higher_better: bool) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return 1.0;
    }
    if higher_better {
        (value - min) / (max - min)
    } else {
        (max - value) / (max - min)
    }
}

fn order_index(order: &[EngineKind], engine: EngineKind) -> usize {
    order.iter().position(|&k| k == engine).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(
        engine: EngineKind,
        confidence: f64,
        ms: u64,
        cost: Option<f64>,
        len: usize,
    ) -> EngineSample {
        EngineSample {
            engine,
            confidence,
            processing_time_ms: ms,
            cost,
            text_length: len,
        }
    }

    fn default_order() -> Vec<EngineKind> {
        vec![
            EngineKind::Tesseract,
            EngineKind::EasyOcr,
            EngineKind::PaddleOcr,
        ]
    }

    #[test]
    fn test_failed_engines_never_ranked() {
        let mut scorer = Scorer::new(ScoringConfig::default(), default_order());
        scorer.record_success(sample(EngineKind::Tesseract, 0.9, 500, None, 1000));
        scorer.record_failure(EngineKind::EasyOcr, "low resolution".to_string());

        let ranking = scorer.rank();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].engine, EngineKind::Tesseract);
    }

    #[test]
    fn test_single_success_normalizes_to_one() {
        let mut scorer = Scorer::new(ScoringConfig::default(), default_order());
        scorer.record_success(sample(EngineKind::PaddleOcr, 0.7, 2000, Some(0.01), 500));

        let ranking = scorer.rank();
        assert!((ranking[0].composite - 1.0).abs() < 1e-9);
    }

    // Scenario A from the benchmark requirements: two successes, one
    // failure, cost missing for one engine.
    #[test]
    fn test_scenario_two_successes_one_failure() {
        let mut scorer = Scorer::new(ScoringConfig::default(), default_order());
        scorer.record_success(sample(EngineKind::Tesseract, 0.92, 600, Some(0.07), 2400));
        scorer.record_success(sample(EngineKind::EasyOcr, 0.85, 900, None, 2100));
        scorer.record_failure(EngineKind::PaddleOcr, "low resolution".to_string());

        let report = scorer.finalize().expect("one success is enough");
        let ranking = &report.ranking;
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking[0].engine, EngineKind::Tesseract);
        assert_eq!(ranking[1].engine, EngineKind::EasyOcr);
        // The missing cost defaulted to the run median (= the only cost).
        assert!((ranking[1].cost - 0.07).abs() < 1e-9);
        assert!(report.recommendation.summary.contains("tesseract"));
    }

    #[test]
    fn test_no_success_no_report() {
        let mut scorer = Scorer::new(ScoringConfig::default(), default_order());
        scorer.record_failure(EngineKind::Tesseract, "binary missing".to_string());
        scorer.record_failure(EngineKind::EasyOcr, "timeout".to_string());

        assert!(scorer.finalize().is_none());
        assert!(scorer.best_so_far().is_none());
        let summary = scorer.failure_summary();
        assert!(summary.contains("tesseract: binary missing"));
        assert!(summary.contains("easyocr: timeout"));
    }

    #[test]
    fn test_ties_break_by_confidence_then_latency_then_order() {
        let config = ScoringConfig {
            // Zero weights force composite ties so the tie-break chain decides.
            weights: ScoreWeights {
                confidence: 0.0,
                latency: 0.0,
                cost: 0.0,
                text_length: 0.0,
            },
            ..Default::default()
        };

        let mut scorer = Scorer::new(config, default_order());
        scorer.record_success(sample(EngineKind::EasyOcr, 0.8, 500, None, 100));
        scorer.record_success(sample(EngineKind::Tesseract, 0.9, 900, None, 100));
        let ranking = scorer.rank();
        // Higher raw confidence wins the tie.
        assert_eq!(ranking[0].engine, EngineKind::Tesseract);

        let mut scorer = Scorer::new(config, default_order());
        scorer.record_success(sample(EngineKind::EasyOcr, 0.8, 500, None, 100));
        scorer.record_success(sample(EngineKind::Tesseract, 0.8, 900, None, 100));
        let ranking = scorer.rank();
        // Equal confidence: lower latency wins.
        assert_eq!(ranking[0].engine, EngineKind::EasyOcr);

        let mut scorer = Scorer::new(config, default_order());
        scorer.record_success(sample(EngineKind::PaddleOcr, 0.8, 500, None, 100));
        scorer.record_success(sample(EngineKind::Tesseract, 0.8, 500, None, 100));
        let ranking = scorer.rank();
        // Fully tied: registration order decides, deterministically.
        assert_eq!(ranking[0].engine, EngineKind::Tesseract);
    }

    #[test]
    fn test_best_so_far_tracks_incremental_state() {
        let mut scorer = Scorer::new(ScoringConfig::default(), default_order());
        assert!(scorer.best_so_far().is_none());

        scorer.record_success(sample(EngineKind::EasyOcr, 0.7, 900, None, 800));
        assert_eq!(scorer.best_so_far().unwrap().engine, EngineKind::EasyOcr);

        scorer.record_success(sample(EngineKind::Tesseract, 0.95, 400, None, 1200));
        assert_eq!(scorer.best_so_far().unwrap().engine, EngineKind::Tesseract);
    }

    #[test]
    fn test_median_cost_even_count() {
        let mut scorer = Scorer::new(ScoringConfig::default(), default_order());
        scorer.record_success(sample(EngineKind::Tesseract, 0.9, 500, Some(0.02), 100));
        scorer.record_success(sample(EngineKind::EasyOcr, 0.9, 500, Some(0.06), 100));
        scorer.record_success(sample(EngineKind::PaddleOcr, 0.9, 500, None, 100));

        let ranking = scorer.rank();
        let paddle = ranking
            .iter()
            .find(|r| r.engine == EngineKind::PaddleOcr)
            .unwrap();
        assert!((paddle.cost - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_extremes() {
        let values = [100.0, 300.0, 500.0];
        assert_eq!(normalize(100.0, &values, true), 0.0);
        assert_eq!(normalize(500.0, &values, true), 1.0);
        assert_eq!(normalize(100.0, &values, false), 1.0);
        assert_eq!(normalize(500.0, &values, false), 0.0);
        assert_eq!(normalize(300.0, &values, true), 0.5);
    }
}
