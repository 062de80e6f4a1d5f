//! Token usage and cost accounting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token counts reported by one completion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl RoundUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// Running totals across the completion rounds of one request.
#[derive(Debug, Clone, Default)]
pub struct UsageAccumulator {
    rounds: u32,
    input_tokens: u64,
    output_tokens: u64,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, usage: RoundUsage) {
        self.rounds += 1;
        self.input_tokens = self.input_tokens.saturating_add(usage.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(usage.output_tokens);
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Price of one model family in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRates {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

impl ModelRates {
    pub const fn new(input_per_mtok: f64, output_per_mtok: f64) -> Self {
        Self {
            input_per_mtok,
            output_per_mtok,
        }
    }
}

const FALLBACK_FAMILY: &str = "sonnet";

/// Per-family rate table. Model ids are matched by family substring
/// (`claude-3-5-haiku-latest` is priced as `haiku`); unknown models fall
/// back to sonnet pricing.
#[derive(Debug, Clone)]
pub struct RateTable {
    families: HashMap<String, ModelRates>,
}

impl Default for RateTable {
    fn default() -> Self {
        let mut families = HashMap::new();
        families.insert("opus".to_string(), ModelRates::new(15.0, 75.0));
        families.insert("sonnet".to_string(), ModelRates::new(3.0, 15.0));
        families.insert("haiku".to_string(), ModelRates::new(0.8, 4.0));
        Self { families }
    }
}

impl RateTable {
    /// Built-in table with `overrides` merged on top.
    pub fn with_overrides(overrides: &HashMap<String, ModelRates>) -> Self {
        let mut table = Self::default();
        for (family, rates) in overrides {
            table.families.insert(family.to_lowercase(), *rates);
        }
        table
    }

    /// Family name for a model id.
    pub fn family_of(&self, model_id: &str) -> &str {
        let model = model_id.to_lowercase();
        // Longest family name wins.
        let mut names: Vec<&String> = self.families.keys().collect();
        names.sort_by_key(|name| std::cmp::Reverse(name.len()));
        names
            .into_iter()
            .find(|name| model.contains(name.as_str()))
            .map(String::as_str)
            .unwrap_or(FALLBACK_FAMILY)
    }

    pub fn rates_for(&self, model_id: &str) -> ModelRates {
        self.families
            .get(self.family_of(model_id))
            .copied()
            .unwrap_or(ModelRates::new(3.0, 15.0))
    }

    /// Cost in USD: `input * rate_in + output * rate_out`.
    pub fn cost(&self, model_id: &str, usage: &UsageAccumulator) -> f64 {
        let rates = self.rates_for(model_id);
        (usage.input_tokens() as f64 * rates.input_per_mtok
            + usage.output_tokens() as f64 * rates.output_per_mtok)
            / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_exact_sum() {
        let mut usage = UsageAccumulator::new();
        usage.record(RoundUsage::new(120, 30));
        usage.record(RoundUsage::new(400, 0));
        usage.record(RoundUsage::new(80, 55));

        assert_eq!(usage.rounds(), 3);
        assert_eq!(usage.input_tokens(), 600);
        assert_eq!(usage.output_tokens(), 85);
        assert_eq!(usage.total_tokens(), 685);
    }

    #[test]
    fn test_family_lookup() {
        let table = RateTable::default();
        assert_eq!(table.family_of("claude-opus-4-20250514"), "opus");
        assert_eq!(table.family_of("claude-3-5-haiku-latest"), "haiku");
        assert_eq!(table.family_of("Claude-Sonnet-4"), "sonnet");
        assert_eq!(table.family_of("some-new-model"), "sonnet");
    }

    #[test]
    fn test_cost_independent_of_round_split() {
        let table = RateTable::default();

        let mut one = UsageAccumulator::new();
        one.record(RoundUsage::new(1_000_000, 1_000_000));

        let mut many = UsageAccumulator::new();
        for _ in 0..4 {
            many.record(RoundUsage::new(250_000, 250_000));
        }

        let expected = 3.0 + 15.0;
        assert!((table.cost("claude-sonnet-4", &one) - expected).abs() < 1e-9);
        assert!((table.cost("claude-sonnet-4", &many) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_overrides_merge() {
        let mut overrides = HashMap::new();
        overrides.insert("Haiku".to_string(), ModelRates::new(1.0, 5.0));
        overrides.insert("mistral".to_string(), ModelRates::new(0.5, 0.5));
        let table = RateTable::with_overrides(&overrides);

        assert_eq!(table.rates_for("claude-haiku"), ModelRates::new(1.0, 5.0));
        assert_eq!(table.rates_for("mistral-large"), ModelRates::new(0.5, 0.5));
        assert_eq!(table.rates_for("claude-opus-4"), ModelRates::new(15.0, 75.0));

        let mut usage = UsageAccumulator::new();
        usage.record(RoundUsage::new(2_000, 1_000));
        let cost = table.cost("claude-haiku", &usage);
        assert!((cost - (2_000.0 * 1.0 + 1_000.0 * 5.0) / 1e6).abs() < 1e-12);
    }
}
