use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::invoice::AppliedQualityRule;
use crate::domain::rate_card::{QualityRule, RuleOperator};
use crate::domain::values::round_rate;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityEvaluation {
    pub total_adjustment_per_ton: Decimal,
    pub applied_rules: Vec<AppliedQualityRule>,
}

/// Sums the per-ton adjustments of every rule whose condition holds for the
/// measured metrics. Rules with a blank metric, an unknown operator or a
/// metric that was not measured are skipped.
pub fn evaluate_quality_adjustments(
    rules: &[QualityRule],
    metrics: &BTreeMap<String, Decimal>,
) -> QualityEvaluation {
    let mut total = Decimal::ZERO;
    let mut applied_rules = Vec::new();

    for rule in rules {
        let metric = rule.metric.trim();
        if metric.is_empty() {
            continue;
        }
        let Some(operator) = RuleOperator::parse(&rule.operator) else {
            continue;
        };
        let Some(observed) = metrics.get(metric).copied() else {
            continue;
        };

        if operator.holds(observed, rule.value) {
            total += rule.adjustment_per_ton;
            applied_rules.push(AppliedQualityRule {
                metric: metric.to_string(),
                operator,
                threshold_value: rule.value,
                intake_metric_value: observed,
                adjustment_per_ton: rule.adjustment_per_ton,
            });
        }
    }

    QualityEvaluation { total_adjustment_per_ton: round_rate(total), applied_rules }
}
