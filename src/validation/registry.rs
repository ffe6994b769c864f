use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use gatekeeper_common::Score;

use super::{ValidationContext, ValidationResult, Validator};

/// Default per-validator timeout.
pub const DEFAULT_VALIDATOR_TIMEOUT_MS: u64 = 5_000;

/// Registry of validators, run concurrently against one evidence snapshot.
///
/// ## Usage
///
/// ```no_run
/// use gatekeeper::validation::{ValidatorRegistry, aggregate};
/// use gatekeeper_common::Score;
/// use std::time::Duration;
///
/// # async fn example(ctx: gatekeeper::validation::ValidationContext) {
/// let registry = ValidatorRegistry::with_builtins()
///     .with_timeout(Duration::from_secs(2))
///     .with_weight("handoff_content_quality", 0.5);
///
/// let results = registry.run_all(ctx).await;
/// let score = aggregate(&results, Score::new(85).unwrap());
/// # }
/// ```
#[derive(Clone)]
pub struct ValidatorRegistry {
    validators: Vec<Arc<dyn Validator>>,
    timeout: Duration,
    weights: HashMap<String, f64>,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
            timeout: Duration::from_millis(DEFAULT_VALIDATOR_TIMEOUT_MS),
            weights: HashMap::new(),
        }
    }
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in gate set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for validator in super::builtin::all() {
            registry.register(validator);
        }
        registry
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the weight of a validator by name.
    pub fn with_weight(mut self, name: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(name.into(), weight);
        self
    }

    pub fn with_weights(mut self, weights: HashMap<String, f64>) -> Self {
        self.weights.extend(weights);
        self
    }

    pub fn register(&mut self, validator: Arc<dyn Validator>) {
        self.validators.push(validator);
    }

    pub fn names(&self) -> Vec<&str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    fn weight_of(&self, validator: &dyn Validator) -> f64 {
        self.weights
            .get(validator.name())
            .copied()
            .unwrap_or_else(|| validator.weight())
    }

    /// Run every validator that applies to the context's handoff type.
    ///
    /// Each validator runs in its own task. An error or panic becomes a
    /// zero-score failure with "validator execution failed"; exceeding the
    /// timeout becomes "validator timed out". Results keep registration order.
    pub async fn run_all(&self, ctx: ValidationContext) -> Vec<ValidationResult> {
        let ctx = Arc::new(ctx);
        let handoff_type = ctx.handoff_type;

        let tasks: Vec<_> = self
            .validators
            .iter()
            .filter(|v| v.applies_to(handoff_type))
            .map(|validator| {
                let validator = Arc::clone(validator);
                let ctx = Arc::clone(&ctx);
                let name = validator.name().to_string();
                let critical = validator.critical();
                let weight = self.weight_of(validator.as_ref());
                let timeout = self.timeout;
                let handle = tokio::spawn(async move {
                    tokio::time::timeout(timeout, validator.validate(&ctx)).await
                });
                async move {
                    let result = match handle.await {
                        Ok(Ok(Ok(outcome))) => {
                            ValidationResult::from_outcome(&name, outcome, critical, weight)
                        }
                        Ok(Ok(Err(e))) => {
                            tracing::warn!(validator = %name, error = %e, "validator returned an error");
                            ValidationResult::errored(&name, "validator execution failed", critical, weight)
                        }
                        Ok(Err(_elapsed)) => {
                            tracing::warn!(validator = %name, ?timeout, "validator timed out");
                            ValidationResult::errored(&name, "validator timed out", critical, weight)
                        }
                        Err(join_err) => {
                            tracing::warn!(validator = %name, error = %join_err, "validator task panicked");
                            ValidationResult::errored(&name, "validator execution failed", critical, weight)
                        }
                    };
                    tracing::debug!(
                        validator = %result.name,
                        score = result.score.value(),
                        passed = result.passed,
                        "validator finished"
                    );
                    result
                }
            })
            .collect();

        join_all(tasks).await
    }
}

/// Fold per-validator results into one score.
///
/// Weighted mean of the individual scores, rounded. A failed critical
/// validator caps the aggregate at `threshold - 1`. No results scores zero.
pub fn aggregate(results: &[ValidationResult], threshold: Score) -> Score {
    if results.is_empty() {
        return Score::MIN;
    }

    let total_weight: f64 = results.iter().map(|r| r.weight.max(0.0)).sum();
    let mean = if total_weight > 0.0 {
        results
            .iter()
            .map(|r| r.score.value() as f64 * r.weight.max(0.0))
            .sum::<f64>()
            / total_weight
    } else {
        results.iter().map(|r| r.score.value() as f64).sum::<f64>() / results.len() as f64
    };
    let score = Score::from_f64(mean);

    if results.iter().any(ValidationResult::is_critical_failure) {
        score.min(threshold.below())
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{ValidatorOutcome, tests_support::context_for};
    use async_trait::async_trait;
    use gatekeeper_common::HandoffType;

    struct Fixed {
        name: &'static str,
        score: i64,
        critical: bool,
    }

    #[async_trait]
    impl Validator for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn critical(&self) -> bool {
            self.critical
        }
        async fn validate(&self, _ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
            let score = Score::new(self.score)?;
            if self.score >= 50 {
                Ok(ValidatorOutcome {
                    score,
                    ..ValidatorOutcome::pass()
                })
            } else {
                Ok(ValidatorOutcome::fail(score, "too low"))
            }
        }
    }

    struct Failing;

    #[async_trait]
    impl Validator for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        async fn validate(&self, _ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
            anyhow::bail!("database unavailable")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Validator for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        async fn validate(&self, _ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
            panic!("boom")
        }
    }

    struct Slow;

    #[async_trait]
    impl Validator for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        async fn validate(&self, _ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ValidatorOutcome::pass())
        }
    }

    struct OnlyFinal;

    #[async_trait]
    impl Validator for OnlyFinal {
        fn name(&self) -> &str {
            "only_final"
        }
        fn applies_to(&self, handoff_type: HandoffType) -> bool {
            handoff_type == HandoffType::FinalApproval
        }
        async fn validate(&self, _ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
            Ok(ValidatorOutcome::pass())
        }
    }

    fn score(v: i64) -> Score {
        Score::new(v).unwrap()
    }

    fn result(name: &str, s: i64, passed: bool, critical: bool, weight: f64) -> ValidationResult {
        ValidationResult {
            name: name.to_string(),
            score: score(s),
            passed,
            issues: vec![],
            warnings: vec![],
            critical,
            weight,
        }
    }

    #[test]
    fn test_aggregate_weighted_mean() {
        let results = vec![result("a", 100, true, false, 3.0), result("b", 60, true, false, 1.0)];
        assert_eq!(aggregate(&results, score(85)).value(), 90);
    }

    #[test]
    fn test_aggregate_caps_on_critical_failure() {
        let results = vec![
            result("a", 100, true, false, 1.0),
            result("b", 100, true, false, 1.0),
            result("c", 95, false, true, 1.0),
        ];
        assert_eq!(aggregate(&results, score(85)).value(), 84);
    }

    #[test]
    fn test_aggregate_empty_is_zero() {
        assert_eq!(aggregate(&[], score(85)), Score::MIN);
    }

    #[test]
    fn test_aggregate_zero_weights_fall_back_to_plain_mean() {
        let results = vec![result("a", 80, true, false, 0.0), result("b", 90, true, false, 0.0)];
        assert_eq!(aggregate(&results, score(85)).value(), 85);
    }

    #[tokio::test]
    async fn test_errors_and_panics_are_isolated() {
        let mut registry = ValidatorRegistry::new();
        registry.register(Arc::new(Fixed {
            name: "fixed",
            score: 90,
            critical: false,
        }));
        registry.register(Arc::new(Failing));
        registry.register(Arc::new(Panicking));

        let results = registry.run_all(context_for(HandoffType::InitiationToPlanning)).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].score.value(), 90);
        assert_eq!(results[1].issues, vec!["validator execution failed"]);
        assert_eq!(results[1].score, Score::MIN);
        assert_eq!(results[2].issues, vec!["validator execution failed"]);
        assert!(!results[2].passed);
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let mut registry = ValidatorRegistry::new().with_timeout(Duration::from_millis(20));
        registry.register(Arc::new(Slow));
        let results = registry.run_all(context_for(HandoffType::InitiationToPlanning)).await;
        assert_eq!(results[0].issues, vec!["validator timed out"]);
    }

    #[tokio::test]
    async fn test_applies_to_filters_validators() {
        let mut registry = ValidatorRegistry::new();
        registry.register(Arc::new(OnlyFinal));
        let results = registry.run_all(context_for(HandoffType::InitiationToPlanning)).await;
        assert!(results.is_empty());
        let results = registry.run_all(context_for(HandoffType::FinalApproval)).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_weight_override_is_applied() {
        let mut registry = ValidatorRegistry::new().with_weight("fixed", 2.5);
        registry.register(Arc::new(Fixed {
            name: "fixed",
            score: 70,
            critical: true,
        }));
        let results = registry.run_all(context_for(HandoffType::InitiationToPlanning)).await;
        assert_eq!(results[0].weight, 2.5);
        assert!(results[0].critical);
    }
}
