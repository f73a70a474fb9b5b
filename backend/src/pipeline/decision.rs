use shared::PredictionResult;

use super::PipelineError;
use crate::config::DecisionConfig;

/// Raw network outputs for `[No Tumor, Tumor]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScores(pub [f32; 2]);

/// Softmax of [`ClassScores`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities([f32; 2]);

impl ClassProbabilities {
    pub fn from_scores(scores: &ClassScores) -> Self {
        let max = scores.0.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exp = scores.0.map(|s| (s - max).exp());
        let total: f32 = exp.iter().sum();
        Self(exp.map(|e| e / total))
    }

    pub fn values(&self) -> [f32; 2] {
        self.0
    }

    pub fn sum(&self) -> f32 {
        self.0.iter().sum()
    }

    /// Index of the most probable class; ties go to the lower index.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &p) in self.0.iter().enumerate().skip(1) {
            if p > self.0[best] {
                best = i;
            }
        }
        best
    }
}

pub fn round_confidence(confidence: f32) -> f32 {
    (confidence * 1000.0).round() / 1000.0
}

/// Turns scores into a labelled result, refusing to label unconfident ones.
///
/// The top probability of a two-class softmax is never below 0.5, so the
/// floor is applied as "must exceed the threshold". A confidence exactly
/// equal to the configured threshold is rejected too, for any threshold
/// (0.7 rejects a confidence of exactly 0.7).
pub fn decide(scores: &ClassScores, config: &DecisionConfig) -> Result<PredictionResult, PipelineError> {
    let probabilities = ClassProbabilities::from_scores(scores);
    log::debug!(
        "Class probabilities: {:?} (scores {:?})",
        probabilities.values(),
        scores.0
    );
    let pred = probabilities.argmax();
    let confidence = probabilities.values()[pred];

    // also catches NaN from non-finite scores
    if !(confidence > config.confidence_threshold) {
        return Err(PipelineError::LowConfidence {
            confidence,
            threshold: config.confidence_threshold,
        });
    }

    let has_tumor = pred == 1;
    Ok(PredictionResult {
        has_tumor,
        tumor_type: if has_tumor {
            config.labels.get(pred).cloned()
        } else {
            None
        },
        confidence: round_confidence(confidence),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn confident_tumor_is_labelled() {
        let result = decide(&ClassScores([0.0, 3.0]), &DecisionConfig::default()).unwrap();
        assert!(result.has_tumor);
        assert_eq!(result.tumor_type.as_deref(), Some("Tumor"));
        // 1 / (1 + e^-3)
        assert_eq!(result.confidence, 0.953);
    }

    #[test]
    fn confident_no_tumor_has_no_type() {
        let result = decide(&ClassScores([2.0, -1.0]), &DecisionConfig::default()).unwrap();
        assert!(!result.has_tumor);
        assert_eq!(result.tumor_type, None);
        assert_eq!(result.confidence, 0.953);
    }

    #[test]
    fn tie_resolves_to_no_tumor() {
        let probabilities = ClassProbabilities::from_scores(&ClassScores([1.25, 1.25]));
        assert_eq!(probabilities.values(), [0.5, 0.5]);
        assert_eq!(probabilities.argmax(), 0);

        let config = DecisionConfig {
            confidence_threshold: 0.0,
            ..DecisionConfig::default()
        };
        let result = decide(&ClassScores([1.25, 1.25]), &config).unwrap();
        assert!(!result.has_tumor);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn even_split_is_low_confidence() {
        let err = decide(&ClassScores([0.0, 0.0]), &DecisionConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::LowConfidence { confidence, .. } if confidence == 0.5));
    }

    #[test]
    fn threshold_is_configurable() {
        let config = DecisionConfig {
            confidence_threshold: 0.9,
            ..DecisionConfig::default()
        };
        // ~0.73
        let err = decide(&ClassScores([0.0, 1.0]), &config).unwrap_err();
        assert!(matches!(err, PipelineError::LowConfidence { .. }));
    }

    #[test]
    fn confidence_equal_to_threshold_is_rejected() {
        let scores = ClassScores([0.0, 1.0]);
        let confidence = ClassProbabilities::from_scores(&scores).values()[1];

        let config = DecisionConfig {
            confidence_threshold: confidence,
            ..DecisionConfig::default()
        };
        let err = decide(&scores, &config).unwrap_err();
        assert!(matches!(err, PipelineError::LowConfidence { confidence: c, .. } if c == confidence));

        let config = DecisionConfig {
            confidence_threshold: confidence - 1e-4,
            ..DecisionConfig::default()
        };
        assert!(decide(&scores, &config).unwrap().has_tumor);
    }

    #[test]
    fn non_finite_scores_are_low_confidence() {
        let err = decide(&ClassScores([f32::NAN, 1.0]), &DecisionConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::LowConfidence { .. }));
    }

    #[test]
    fn softmax_is_stable_for_large_scores() {
        let probabilities = ClassProbabilities::from_scores(&ClassScores([1000.0, 990.0]));
        assert!(probabilities.values().iter().all(|p| p.is_finite()));
        assert_eq!(probabilities.argmax(), 0);
    }

    proptest! {
        #[test]
        fn probabilities_are_a_distribution(a in -50f32..50.0, b in -50f32..50.0) {
            let probabilities = ClassProbabilities::from_scores(&ClassScores([a, b]));
            prop_assert!((probabilities.sum() - 1.0).abs() <= 1e-5);
            for p in probabilities.values() {
                prop_assert!((0.0..=1.0).contains(&p));
            }
        }

        #[test]
        fn decision_matches_argmax(a in -20f32..20.0, b in -20f32..20.0) {
            prop_assume!((a - b).abs() > 1e-3);
            let config = DecisionConfig { confidence_threshold: 0.0, ..DecisionConfig::default() };
            let result = decide(&ClassScores([a, b]), &config).unwrap();
            prop_assert_eq!(result.has_tumor, b > a);
            prop_assert_eq!(result.tumor_type.is_some(), result.has_tumor);
            prop_assert!(result.confidence >= 0.5 && result.confidence <= 1.0);
        }
    }
}
