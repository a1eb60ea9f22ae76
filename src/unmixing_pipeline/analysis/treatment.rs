//! Treatment-category estimate from the S-coefficient.
//!
//! Each category's likelihood is a Gaussian kernel density estimate over the
//! S-coefficients of a reference cohort (Scott's bandwidth). Priors are
//! uniform, or a softmax over per-category logits when a clinical score is
//! supplied. Posteriors are reported as percentages rounded to one decimal,
//! with the rounding remainder added to the first category.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};

const OBSERVATION_COHORT: [f64; 19] = [
    3.21393269, 26.57572901, 1.97897979, 5.48259599, 2.99981, 3.31745544, 13.27689141, 1.71745906,
    17.48231325, 1.87580825, 12.64986065, 7.87167763, 1.71366846, 13.61160749, 2.31452927,
    22.6661329, 44.90186825, 36.8487924, 14.78203206,
];

const LOCAL_CONSERVATIVE_COHORT: [f64; 49] = [
    7.3522544, 3.02525876, 17.97379823, 20.92351022, 24.72729263, 24.00776019, 10.33037404,
    3.52843382, 19.7609681, 26.77218002, 1.65112093, 11.55317624, 3.30694099, 3.82502304,
    4.20041205, 5.71131541, 25.49669084, 11.99578407, 2.88923068, 16.32942033, 10.51932178,
    18.42635627, 1.66447679, 6.29955688, 14.67185596, 32.53059061, 12.19990989, 32.70948272,
    18.51845014, 20.23320976, 31.62748937, 1.37786158, 1.73443908, 26.28364305, 20.46232858,
    15.06569079, 9.55950523, 4.08012488, 23.07724569, 11.36823735, 2.98220644, 3.18974336,
    1.98305401, 1.67706588, 31.09508714, 1.7800393, 3.4768971, 19.89810703, 5.30606471,
];

const OPERATION_COHORT: [f64; 12] = [
    12.40563717, 17.50582966, 34.99986717, 3.59924032, 2.20970812, 11.19131621, 10.14635472,
    2.28083667, 6.46990814, 2.9558964, 8.57629769, 1.37140096,
];

/// Clinical severity scale a score was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScoreScale {
    Has,
    Hss,
    Hasi,
}

impl ScoreScale {
    /// `(intercept, coefficient)` of the logit for each category, in
    /// observation, local-conservative, operation order.
    fn logit_parameters(self) -> [(f64, f64); 3] {
        match self {
            ScoreScale::Has => [(0.6181, -0.2169), (0.8007, -0.0024), (-1.4188, 0.2192)],
            ScoreScale::Hss => [(0.3437, -0.1875), (0.7777, 0.0010), (-1.1214, 0.1865)],
            ScoreScale::Hasi => [(0.8867, -0.1543), (1.0033, -0.0280), (-1.8900, 0.1822)],
        }
    }
}

impl fmt::Display for ScoreScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreScale::Has => write!(f, "HAS"),
            ScoreScale::Hss => write!(f, "HSS"),
            ScoreScale::Hasi => write!(f, "HASI"),
        }
    }
}

impl FromStr for ScoreScale {
    type Err = UnmixingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HAS" => Ok(ScoreScale::Has),
            "HSS" => Ok(ScoreScale::Hss),
            "HASI" => Ok(ScoreScale::Hasi),
            _ => Err(UnmixingError::ConfigError(format!(
                "unknown score scale '{}', expected HAS, HSS or HASI",
                s
            ))),
        }
    }
}

/// A clinical score on one of the supported scales.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClinicalScore {
    pub scale: ScoreScale,
    pub value: f64,
}

impl FromStr for ClinicalScore {
    type Err = UnmixingError;

    /// Parses `SCALE=VALUE`, e.g. `HAS=3`.
    fn from_str(s: &str) -> Result<Self> {
        let (scale, value) = s.split_once('=').ok_or_else(|| {
            UnmixingError::ConfigError(format!("expected SCALE=VALUE, got '{}'", s))
        })?;
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|e| UnmixingError::ConfigError(format!("invalid score '{}': {}", value, e)))?;
        if !value.is_finite() {
            return Err(UnmixingError::ConfigError(format!("score must be finite, got {}", value)));
        }
        Ok(ClinicalScore {
            scale: scale.parse()?,
            value,
        })
    }
}

/// Percentages per treatment category. They sum to 100 up to float error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreatmentEstimate {
    pub observation: f64,
    pub local_conservative: f64,
    pub operation: f64,
    /// Score used for the priors; `None` means uniform priors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ClinicalScore>,
    /// False when no category had a non-zero likelihood and the priors were
    /// reported unchanged
    pub likelihood_applied: bool,
}

impl TreatmentEstimate {
    pub fn percentages(&self) -> [f64; 3] {
        [self.observation, self.local_conservative, self.operation]
    }
}

/// One-dimensional Gaussian KDE with Scott's rule bandwidth.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    samples: Vec<f64>,
    variance: f64,
}

impl GaussianKde {
    /// Needs at least two samples with non-zero spread.
    pub fn new(samples: &[f64]) -> Result<Self> {
        let n = samples.len();
        if n < 2 {
            return Err(UnmixingError::InputError(format!(
                "kernel density needs at least 2 samples, got {}",
                n
            )));
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let sample_variance =
            samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        if sample_variance <= 0.0 || !sample_variance.is_finite() {
            return Err(UnmixingError::InputError(
                "kernel density samples have no spread".to_string(),
            ));
        }
        let scott = (n as f64).powf(-0.2);
        Ok(Self {
            samples: samples.to_vec(),
            variance: sample_variance * scott * scott,
        })
    }

    pub fn bandwidth(&self) -> f64 {
        self.variance.sqrt()
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let norm = (2.0 * PI * self.variance).sqrt() * self.samples.len() as f64;
        self.samples
            .iter()
            .map(|s| (-(x - s).powi(2) / (2.0 * self.variance)).exp())
            .sum::<f64>()
            / norm
    }
}

fn softmax(logits: [f64; 3]) -> [f64; 3] {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp = logits.map(|l| (l - max).exp());
    let total: f64 = exp.iter().sum();
    exp.map(|e| e / total)
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn to_percentages(probabilities: [f64; 3]) -> [f64; 3] {
    let mut percentages = probabilities.map(|p| round_tenth(p * 100.0));
    let remainder = round_tenth(100.0 - percentages.iter().sum::<f64>());
    percentages[0] += remainder;
    percentages
}

/// Estimates treatment-category percentages for `s_coefficient`, using the
/// clinical score for the priors when one is given.
pub fn estimate_treatment(s_coefficient: f64, score: Option<&ClinicalScore>) -> Result<TreatmentEstimate> {
    let priors = match score {
        Some(score) => softmax(
            score
                .scale
                .logit_parameters()
                .map(|(intercept, coefficient)| intercept + coefficient * score.value),
        ),
        None => [1.0 / 3.0; 3],
    };

    let likelihoods = [
        GaussianKde::new(&OBSERVATION_COHORT)?.evaluate(s_coefficient),
        GaussianKde::new(&LOCAL_CONSERVATIVE_COHORT)?.evaluate(s_coefficient),
        GaussianKde::new(&OPERATION_COHORT)?.evaluate(s_coefficient),
    ];
    let joint = [
        priors[0] * likelihoods[0],
        priors[1] * likelihoods[1],
        priors[2] * likelihoods[2],
    ];
    let evidence: f64 = joint.iter().sum();
    let likelihood_applied = evidence > 0.0 && evidence.is_finite();
    let posteriors = if likelihood_applied {
        joint.map(|j| j / evidence)
    } else {
        priors
    };

    let [observation, local_conservative, operation] = to_percentages(posteriors);
    Ok(TreatmentEstimate {
        observation,
        local_conservative,
        operation,
        score: score.copied(),
        likelihood_applied,
    })
}
