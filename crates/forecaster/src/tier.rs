//! Tier Selection

use crate::engine::ForecastConfig;
use measurement::Tier;

/// Data sufficiency facts a tier decision is made from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierInputs {
    /// Measurements in the recent window
    pub recent_points: usize,
    /// A trained model exists for the city and parameter
    pub model_available: bool,
    /// Measurements in the model lookback window
    pub model_history_points: usize,
    /// Points the model needs to predict
    pub model_min_points: usize,
}

/// Pick the forecasting tier; trend beats model beats fallback
pub fn select_tier(inputs: &TierInputs, config: &ForecastConfig) -> Tier {
    if inputs.recent_points >= config.trend_threshold {
        Tier::Trend
    } else if inputs.model_available && inputs.model_history_points >= inputs.model_min_points {
        Tier::Model
    } else {
        Tier::Fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn inputs(recent: usize, model: bool, history: usize) -> TierInputs {
        TierInputs {
            recent_points: recent,
            model_available: model,
            model_history_points: history,
            model_min_points: 24,
        }
    }

    #[test]
    fn test_precedence() {
        let config = ForecastConfig::default();
        assert_eq!(select_tier(&inputs(15, false, 15), &config), Tier::Trend);
        assert_eq!(select_tier(&inputs(12, true, 100), &config), Tier::Trend);
        assert_eq!(select_tier(&inputs(11, true, 30), &config), Tier::Model);
        assert_eq!(select_tier(&inputs(11, true, 23), &config), Tier::Fallback);
        assert_eq!(select_tier(&inputs(11, false, 100), &config), Tier::Fallback);
        assert_eq!(select_tier(&inputs(0, false, 0), &config), Tier::Fallback);
    }

    proptest! {
        #[test]
        fn prop_enough_recent_data_always_trends(
            recent in 12usize..500,
            model in any::<bool>(),
            history in 0usize..500,
        ) {
            let config = ForecastConfig::default();
            prop_assert_eq!(select_tier(&inputs(recent, model, history), &config), Tier::Trend);
        }
    }
}
