//! Pitch writer: one generation call with a degraded retry policy.
//!
//! When the provider reports insufficient credits the writer halves the
//! output budget (never below `min_tokens`) and tries again, up to
//! `max_attempts` calls in total. Every other provider error fails fast.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{GenError, LlmError};
use crate::llm::{CompletionRequest, LlmProvider};

use super::prompt::{PitchRequest, PitchText, build_messages, parse_pitch};

/// Configuration for pitch generation.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Output budget for the first attempt.
    pub max_tokens: u32,
    /// Floor for degraded budgets.
    pub min_tokens: u32,
    /// Total attempts allowed under credit exhaustion.
    pub max_attempts: u32,
    pub temperature: f32,
    /// Pause between degraded attempts.
    pub retry_delay: Duration,
    /// What the sender brings, pasted into every prompt.
    pub value_add: String,
    pub sender_name: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 600,
            min_tokens: 150,
            max_attempts: 3,
            temperature: 0.7,
            retry_delay: Duration::from_secs(2),
            value_add: DEFAULT_VALUE_ADD.to_string(),
            sender_name: String::new(),
        }
    }
}

pub const DEFAULT_VALUE_ADD: &str = "I bring strong skills in AI/ML, data science, and full-stack \
     development with a passion for building impactful products.";

/// A successful generation plus how it was obtained.
#[derive(Debug, Clone)]
pub struct GeneratedPitch {
    pub pitch: PitchText,
    /// Calls made, including the successful one.
    pub attempts: u32,
    /// Token budget of each call, in order.
    pub budgets: Vec<u32>,
}

/// Halve the budget, clamped to `floor`. Never grows.
pub fn degraded_budget(current: u32, floor: u32) -> u32 {
    (current / 2).max(floor).min(current)
}

/// Generates pitch text for one lead.
pub struct PitchWriter {
    llm: Arc<dyn LlmProvider>,
    config: WriterConfig,
}

impl PitchWriter {
    pub fn new(llm: Arc<dyn LlmProvider>, config: WriterConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Generate a pitch, retrying with smaller budgets on credit exhaustion.
    pub async fn generate(
        &self,
        request: &PitchRequest,
        max_attempts: u32,
    ) -> Result<GeneratedPitch, GenError> {
        let max_attempts = max_attempts.max(1);
        let messages = build_messages(request, &self.config.value_add, &self.config.sender_name);
        let mut budget = self.config.max_tokens;
        let mut budgets = Vec::with_capacity(max_attempts as usize);

        for attempt in 1..=max_attempts {
            if attempt > 1 && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            budgets.push(budget);
            info!(
                attempt,
                max_attempts,
                max_tokens = budget,
                model = self.llm.model_name(),
                "Requesting pitch"
            );

            let completion = CompletionRequest::new(messages.clone())
                .with_temperature(self.config.temperature)
                .with_max_tokens(budget);

            match self.llm.complete(completion).await {
                Ok(response) => {
                    let pitch = parse_pitch(&response.content, &request.fallback_subject());
                    if pitch.body.is_empty() {
                        return Err(GenError::Unrecoverable(LlmError::InvalidResponse {
                            provider: self.llm.model_name().to_string(),
                            reason: "generated pitch has an empty body".to_string(),
                        }));
                    }
                    info!(
                        attempt,
                        output_tokens = response.output_tokens,
                        subject = %pitch.subject,
                        "Pitch generated"
                    );
                    return Ok(GeneratedPitch {
                        pitch,
                        attempts: attempt,
                        budgets,
                    });
                }
                Err(e) if e.is_resource_exhausted() => {
                    warn!(attempt, max_tokens = budget, error = %e, "Provider out of credits");
                    if attempt < max_attempts {
                        budget = degraded_budget(budget, self.config.min_tokens);
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Pitch generation failed");
                    return Err(GenError::Unrecoverable(e));
                }
            }
        }

        Err(GenError::BudgetExhausted {
            attempts: max_attempts,
            last_max_tokens: budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm::{CompletionResponse, FinishReason};

    /// Replays scripted outcomes and records each request's budget.
    struct ScriptedLlm {
        script: Mutex<Vec<Result<String, LlmError>>>,
        budgets: Mutex<Vec<Option<u32>>>,
    }

    impl ScriptedLlm {
        fn new(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().rev().collect()),
                budgets: Mutex::new(Vec::new()),
            })
        }

        fn budgets(&self) -> Vec<Option<u32>> {
            self.budgets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.budgets.lock().unwrap().push(request.max_tokens);
            let next = self.script.lock().unwrap().pop().unwrap_or_else(|| Err(exhausted()));
            next.map(|content| CompletionResponse {
                content,
                input_tokens: 10,
                output_tokens: 20,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    fn exhausted() -> LlmError {
        LlmError::InsufficientCredits {
            provider: "scripted".into(),
            reason: "no credits".into(),
        }
    }

    fn config() -> WriterConfig {
        WriterConfig {
            retry_delay: Duration::ZERO,
            sender_name: "Sam".into(),
            ..WriterConfig::default()
        }
    }

    fn request() -> PitchRequest {
        PitchRequest {
            company: "Acme".into(),
            role: "Engineer".into(),
            context: "ctx".into(),
            affinity_note: String::new(),
        }
    }

    #[test]
    fn degraded_budget_halves_and_clamps() {
        assert_eq!(degraded_budget(600, 150), 300);
        assert_eq!(degraded_budget(300, 150), 150);
        assert_eq!(degraded_budget(150, 150), 150);
        // Floor above current never raises the budget.
        assert_eq!(degraded_budget(100, 150), 100);
    }

    #[tokio::test]
    async fn first_attempt_success() {
        let llm = ScriptedLlm::new(vec![Ok("Subject: Hi\n\nBody".into())]);
        let writer = PitchWriter::new(llm.clone(), config());
        let out = writer.generate(&request(), 3).await.unwrap();
        assert_eq!(out.attempts, 1);
        assert_eq!(out.pitch.subject, "Hi");
        assert_eq!(out.budgets, vec![600]);
        assert_eq!(llm.budgets(), vec![Some(600)]);
    }

    #[tokio::test]
    async fn always_exhausted_makes_exactly_max_attempts() {
        let llm = ScriptedLlm::new(vec![]);
        let writer = PitchWriter::new(llm.clone(), config());
        let err = writer.generate(&request(), 3).await.unwrap_err();
        match err {
            GenError::BudgetExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected {other:?}"),
        }
        let budgets: Vec<u32> = llm.budgets().into_iter().map(|b| b.unwrap()).collect();
        assert_eq!(budgets.len(), 3);
        assert!(budgets.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(budgets, vec![600, 300, 150]);
    }

    #[tokio::test]
    async fn unrecoverable_error_makes_one_call() {
        let llm = ScriptedLlm::new(vec![Err(LlmError::AuthFailed {
            provider: "scripted".into(),
        })]);
        let writer = PitchWriter::new(llm.clone(), config());
        let err = writer.generate(&request(), 3).await.unwrap_err();
        assert!(matches!(err, GenError::Unrecoverable(LlmError::AuthFailed { .. })));
        assert_eq!(llm.budgets().len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_is_not_retried() {
        let llm = ScriptedLlm::new(vec![Err(LlmError::RateLimited {
            provider: "scripted".into(),
            retry_after: None,
        })]);
        let writer = PitchWriter::new(llm.clone(), config());
        assert!(writer.generate(&request(), 3).await.is_err());
        assert_eq!(llm.budgets().len(), 1);
    }

    #[tokio::test]
    async fn recovers_on_third_attempt_with_reduced_budget() {
        let llm = ScriptedLlm::new(vec![
            Err(exhausted()),
            Err(exhausted()),
            Ok("Subject: Third time\n\nLucky".into()),
        ]);
        let writer = PitchWriter::new(llm.clone(), config());
        let out = writer.generate(&request(), 3).await.unwrap();
        assert_eq!(out.attempts, 3);
        assert_eq!(out.budgets, vec![600, 300, 150]);
        assert_eq!(out.pitch.body, "Lucky");
    }

    #[tokio::test]
    async fn empty_body_is_unrecoverable() {
        let llm = ScriptedLlm::new(vec![Ok("Subject: Only a subject".into())]);
        let writer = PitchWriter::new(llm, config());
        let err = writer.generate(&request(), 3).await.unwrap_err();
        assert!(matches!(err, GenError::Unrecoverable(LlmError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let llm = ScriptedLlm::new(vec![Ok("Subject: s\nb".into())]);
        let writer = PitchWriter::new(llm.clone(), config());
        assert!(writer.generate(&request(), 0).await.is_ok());
        assert_eq!(llm.budgets().len(), 1);
    }
}
