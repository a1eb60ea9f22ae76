//! Total hemoglobin aggregation.
//!
//! THb is built from the oxy- and deoxyhemoglobin maps when they exist and
//! falls back, in a fixed order, to whichever single map is available.

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, warn};

use crate::unmixing_pipeline::common::error::{Result, UnmixingError};
use crate::unmixing_pipeline::spectral::ConcentrationMaps;

/// Accepted spellings of oxyhemoglobin, compared case-insensitively. `hb02`
/// (digit zero) shows up in hand-entered calibration data.
pub const OXY_SYMBOLS: [&str; 2] = ["hbo2", "hb02"];

/// Deoxyhemoglobin symbol, compared case-insensitively.
pub const DEOXY_SYMBOL: &str = "hb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThbPolicy {
    /// `|HbO2| + |Hb|`
    OxyPlusDeoxy,
    /// `|HbO2|`, deoxyhemoglobin missing
    OxyOnly,
    /// `|Hb|`, oxyhemoglobin missing
    DeoxyOnly,
    /// `|c0|`, neither hemoglobin present. Degraded.
    FirstChromophore,
}

impl ThbPolicy {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, ThbPolicy::OxyPlusDeoxy)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThbOutcome {
    /// THb per pixel, `[y, x]`, finite everywhere
    pub map: Array2<f64>,
    pub policy: ThbPolicy,
    /// Human-readable note for fallback policies, `None` for the primary one
    pub diagnostic: Option<String>,
    /// Non-finite values replaced by 0.0
    pub sanitized_pixels: usize,
}

fn find_oxy(symbols: &[String]) -> Option<usize> {
    symbols
        .iter()
        .position(|s| OXY_SYMBOLS.iter().any(|o| s.eq_ignore_ascii_case(o)))
}

fn find_deoxy(symbols: &[String]) -> Option<usize> {
    symbols.iter().position(|s| s.eq_ignore_ascii_case(DEOXY_SYMBOL))
}

/// Applies the THb selection ladder to `maps`.
pub fn aggregate_thb(maps: &ConcentrationMaps) -> Result<ThbOutcome> {
    let symbols = maps.symbols();
    if symbols.is_empty() {
        return Err(UnmixingError::ConfigError(
            "no chromophores to compute THb from".to_string(),
        ));
    }

    let (mut map, policy, diagnostic) = match (find_oxy(symbols), find_deoxy(symbols)) {
        (Some(oxy), Some(deoxy)) => (
            maps.abs_map(oxy) + maps.abs_map(deoxy),
            ThbPolicy::OxyPlusDeoxy,
            None,
        ),
        (Some(oxy), None) => (
            maps.abs_map(oxy),
            ThbPolicy::OxyOnly,
            Some("Hb chromophore not found, THb = |HbO2|".to_string()),
        ),
        (None, Some(deoxy)) => (
            maps.abs_map(deoxy),
            ThbPolicy::DeoxyOnly,
            Some("HbO2 chromophore not found, THb = |Hb|".to_string()),
        ),
        (None, None) => (
            maps.abs_map(0),
            ThbPolicy::FirstChromophore,
            Some(format!(
                "Hb and HbO2 not found, THb falls back to first chromophore {}",
                symbols[0]
            )),
        ),
    };

    let mut sanitized_pixels = 0;
    map.mapv_inplace(|v| {
        if v.is_finite() {
            v
        } else {
            sanitized_pixels += 1;
            0.0
        }
    });

    match &diagnostic {
        Some(message) => warn!(?policy, "{}", message),
        None => debug!(?policy, "THb computed"),
    }
    if sanitized_pixels > 0 {
        warn!(sanitized_pixels, "Non-finite THb values replaced with 0");
    }

    Ok(ThbOutcome {
        map,
        policy,
        diagnostic,
        sanitized_pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn maps(symbols: &[&str], values: &[f64]) -> ConcentrationMaps {
        let data = Array3::from_shape_fn((symbols.len(), 2, 2), |(k, _, _)| values[k]);
        ConcentrationMaps::new(symbols.iter().map(|s| s.to_string()).collect(), data).unwrap()
    }

    #[test]
    fn test_oxy_plus_deoxy_any_case() {
        for (oxy, deoxy) in [("HbO2", "Hb"), ("hbo2", "HB"), ("HB02", "hb")] {
            let outcome = aggregate_thb(&maps(&["Melanin", deoxy, oxy], &[9.0, -2.5, 1.5])).unwrap();
            assert_eq!(outcome.policy, ThbPolicy::OxyPlusDeoxy);
            assert!(outcome.diagnostic.is_none());
            assert!(outcome.map.iter().all(|&v| v == 4.0));
        }
    }

    #[test]
    fn test_oxy_only() {
        let outcome = aggregate_thb(&maps(&["Melanin", "HbO2"], &[9.0, -3.0])).unwrap();
        assert_eq!(outcome.policy, ThbPolicy::OxyOnly);
        assert!(outcome.map.iter().all(|&v| v == 3.0));
        assert!(outcome.diagnostic.unwrap().contains("|HbO2|"));
    }

    #[test]
    fn test_deoxy_only() {
        let outcome = aggregate_thb(&maps(&["Hb", "Melanin"], &[-1.25, 9.0])).unwrap();
        assert_eq!(outcome.policy, ThbPolicy::DeoxyOnly);
        assert!(outcome.map.iter().all(|&v| v == 1.25));
        assert!(outcome.diagnostic.unwrap().contains("|Hb|"));
    }

    #[test]
    fn test_first_chromophore_fallback() {
        let outcome = aggregate_thb(&maps(&["Melanin", "Bilirubin"], &[-0.75, 5.0])).unwrap();
        assert_eq!(outcome.policy, ThbPolicy::FirstChromophore);
        assert!(outcome.policy.is_fallback());
        assert!(outcome.map.iter().all(|&v| v == 0.75));
        assert!(outcome.diagnostic.unwrap().contains("Melanin"));
    }

    #[test]
    fn test_hb_prefix_is_not_deoxy() {
        let outcome = aggregate_thb(&maps(&["HbCO", "Hbx"], &[1.0, 2.0])).unwrap();
        assert_eq!(outcome.policy, ThbPolicy::FirstChromophore);
    }

    #[test]
    fn test_non_finite_values_are_zeroed() {
        let mut data = Array3::from_elem((1, 2, 2), 1.0);
        data[[0, 0, 1]] = f64::NAN;
        data[[0, 1, 0]] = f64::INFINITY;
        let maps = ConcentrationMaps::new(vec!["HbO2".to_string()], data).unwrap();

        let outcome = aggregate_thb(&maps).unwrap();
        assert_eq!(outcome.sanitized_pixels, 2);
        assert_eq!(outcome.map[[0, 1]], 0.0);
        assert_eq!(outcome.map[[1, 0]], 0.0);
        assert_eq!(outcome.map[[1, 1]], 1.0);
    }

    #[test]
    fn test_no_chromophores_is_config_error() {
        let maps = ConcentrationMaps::new(Vec::new(), Array3::zeros((0, 2, 2))).unwrap();
        assert!(matches!(aggregate_thb(&maps), Err(UnmixingError::ConfigError(_))));
    }
}
