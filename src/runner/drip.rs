//! Drip run controller.
//!
//! One invocation processes at most one lead:
//! select → generate → deliver → commit → sync.
//! Nothing is written to the store before delivery succeeds, and a sync
//! failure never undoes or fails a committed send.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::channels::{DeliveryChannel, EmailChannel};
use crate::config::AppConfig;
use crate::error::{self, GenError, StoreError};
use crate::llm::create_provider;
use crate::pitch::{PitchRequest, PitchWriter, SenderIdentity, compose};
use crate::store::{CommitOutcome, LeadStore, RunLock};
use crate::sync::{GithubSync, StoreSync};

use super::outcome::{AbortReason, LeadSummary, RunFailure, RunOutcome, SyncReport};
use super::state::RunPhase;

/// Drives a single drip run against stub-able collaborators.
pub struct DripRunner {
    writer: PitchWriter,
    channel: Arc<dyn DeliveryChannel>,
    sync: Arc<dyn StoreSync>,
    sender: SenderIdentity,
    /// Sends allowed per UTC day; 0 disables the cap.
    daily_limit: usize,
}

impl DripRunner {
    pub fn new(
        writer: PitchWriter,
        channel: Arc<dyn DeliveryChannel>,
        sync: Arc<dyn StoreSync>,
        sender: SenderIdentity,
    ) -> Self {
        Self {
            writer,
            channel,
            sync,
            sender,
            daily_limit: 0,
        }
    }

    /// Wire the production collaborators: the configured LLM backend, SMTP
    /// and GitHub sync.
    pub fn from_config(config: &AppConfig) -> error::Result<Self> {
        let llm = create_provider(&config.llm)?;
        let sync = GithubSync::new(config.sync.clone())?;
        Ok(Self::new(
            PitchWriter::new(llm, config.writer.clone()),
            Arc::new(EmailChannel::new(config.email.clone())),
            Arc::new(sync),
            config.sender.clone(),
        )
        .with_daily_limit(config.store.daily_limit))
    }

    pub fn daily_limit(&self) -> usize {
        self.daily_limit
    }

    pub fn with_daily_limit(mut self, limit: usize) -> Self {
        self.daily_limit = limit;
        self
    }

    /// Lock the store at `store_path`, load it, and run once.
    pub async fn run(&self, store_path: &Path) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("drip_run", run_id = %run_id);

        async {
            let mut outcome = RunOutcome::new(run_id);
            advance(&mut outcome, RunPhase::Selecting, None);

            let _lock = match RunLock::acquire(store_path) {
                Ok(lock) => lock,
                Err(e) => return fail_before_send(outcome, RunFailure::Store(e)),
            };

            let mut store = match LeadStore::open(store_path).await {
                Ok(store) => store,
                Err(e) => return fail_before_send(outcome, RunFailure::Store(e)),
            };

            self.process(&mut store, outcome).await
        }
        .instrument(span)
        .await
    }

    /// Run once against an already-loaded store. The caller is responsible
    /// for excluding concurrent runs.
    pub async fn run_with_store(&self, store: &mut LeadStore) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("drip_run", run_id = %run_id);

        async {
            let mut outcome = RunOutcome::new(run_id);
            advance(&mut outcome, RunPhase::Selecting, None);
            self.process(store, outcome).await
        }
        .instrument(span)
        .await
    }

    async fn process(&self, store: &mut LeadStore, mut outcome: RunOutcome) -> RunOutcome {
        // Selecting
        if self.daily_limit > 0 {
            let sent_today = store.sent_on(Utc::now().date_naive());
            if sent_today >= self.daily_limit {
                info!(sent_today, limit = self.daily_limit, "Daily send cap reached");
                outcome.abort_reason = Some(AbortReason::DailyCapReached {
                    sent_today,
                    limit: self.daily_limit,
                });
                advance(&mut outcome, RunPhase::Aborted, Some("daily cap reached"));
                return outcome;
            }
        }

        let Some(handle) = store.select_next() else {
            info!("No unsent leads remaining");
            outcome.abort_reason = Some(AbortReason::NothingEligible);
            advance(&mut outcome, RunPhase::Aborted, Some("nothing eligible"));
            return outcome;
        };
        // select_next only hands out handles it just found.
        let Some(lead) = store.get(handle).cloned() else {
            return fail_before_send(
                outcome,
                RunFailure::Store(StoreError::UnknownRecord {
                    index: handle.index(),
                }),
            );
        };
        outcome.lead = Some(LeadSummary::new(handle.index(), &lead));
        info!(
            row = handle.index(),
            company = %lead.company,
            role = %lead.role,
            remaining = store.remaining(),
            "Selected lead"
        );

        // Generating
        advance(&mut outcome, RunPhase::Generating, None);
        let request = PitchRequest::for_lead(&lead);
        let max_attempts = self.writer.config().max_attempts;
        let generated = match self.writer.generate(&request, max_attempts).await {
            Ok(generated) => generated,
            Err(e) => {
                if let GenError::BudgetExhausted { attempts, .. } = &e {
                    outcome.generation_attempts = *attempts;
                }
                warn!(company = %lead.company, error = %e, "Generation failed; lead stays unsent");
                return fail_before_send(outcome, RunFailure::Generation(e));
            }
        };
        outcome.generation_attempts = generated.attempts;
        outcome.token_budgets = generated.budgets.clone();
        outcome.subject = Some(generated.pitch.subject.clone());

        // Delivering
        advance(&mut outcome, RunPhase::Delivering, None);
        let body = compose(&generated.pitch, &self.sender);
        if let Err(e) = self
            .channel
            .send(lead.email.trim(), &generated.pitch.subject, body.as_str())
            .await
        {
            warn!(
                channel = self.channel.name(),
                recipient = %lead.email,
                error = %e,
                "Delivery failed; lead stays unsent"
            );
            return fail_before_send(outcome, RunFailure::Delivery(e));
        }
        outcome.delivered = true;
        info!(channel = self.channel.name(), recipient = %lead.email, "Pitch delivered");

        // Committing
        advance(&mut outcome, RunPhase::Committing, None);
        match store.commit(handle, Utc::now()).await {
            Ok(CommitOutcome::Committed) => {}
            Ok(CommitOutcome::AlreadySent) => {
                warn!(row = handle.index(), "Lead was already marked sent");
            }
            Err(e) => {
                error!(
                    escalated = true,
                    row = handle.index(),
                    company = %lead.company,
                    recipient = %lead.email,
                    error = %e,
                    "Message sent but the store was not updated; next run may send a duplicate"
                );
                advance(&mut outcome, RunPhase::Failed, Some("commit failed after send"));
                outcome.failure = Some(RunFailure::Commit(e));
                return outcome;
            }
        }
        outcome.committed = true;

        // Syncing
        advance(&mut outcome, RunPhase::Syncing, None);
        outcome.sync = match store.snapshot() {
            Ok(snapshot) => match self.sync.publish(&snapshot).await {
                Ok(()) => SyncReport::Published,
                Err(e) => {
                    warn!(sync = self.sync.name(), error = %e, "Store sync failed (non-fatal)");
                    SyncReport::Failed(e.to_string())
                }
            },
            Err(e) => {
                warn!(error = %e, "Could not snapshot store for sync (non-fatal)");
                SyncReport::Failed(e.to_string())
            }
        };

        advance(&mut outcome, RunPhase::Done, None);
        info!(
            company = %lead.company,
            attempts = outcome.generation_attempts,
            synced = matches!(outcome.sync, SyncReport::Published),
            "Drip run complete"
        );
        outcome
    }
}

fn advance(outcome: &mut RunOutcome, next: RunPhase, reason: Option<&str>) {
    if let Err(e) = outcome
        .tracker
        .transition_to(next, reason.map(str::to_string))
    {
        // Controller bug; the outcome still reports the phase it reached.
        error!(error = %e, "Invalid run phase transition");
    }
}

fn fail_before_send(mut outcome: RunOutcome, failure: RunFailure) -> RunOutcome {
    advance(&mut outcome, RunPhase::Failed, Some(&failure.to_string()));
    outcome.failure = Some(failure);
    outcome
}
