//! Triage processor: runs batches of messages through the full cycle.
//!
//! Per message:
//! 1. Dedup check (skip if already processed)
//! 2. Thread lock, dedup re-check, memory read
//! 3. Decision
//! 4. Execution + acknowledgment
//! 5. Mark processed
//! 6. Re-summarize the thread and overwrite its memory
//!
//! A message is marked processed only after its action completed. Any
//! failure before that leaves it unmarked so the next batch retries it.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::actions::Decision;
use crate::config::TriageConfig;
use crate::error::{MailError, PipelineError};
use crate::llm::LlmProvider;
use crate::mail::MailSource;
use crate::pipeline::decision::DecisionEngine;
use crate::pipeline::executor::ActionExecutor;
use crate::pipeline::locks::ThreadLocks;
use crate::pipeline::summarizer::ThreadSummarizer;
use crate::pipeline::types::{Message, MessageOutcome, OutcomeStatus, ResultTag, Stage};
use crate::store::Database;

/// Attach the failing stage to an error.
trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, (Stage, PipelineError)>;
}

impl<T, E: Into<PipelineError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, (Stage, PipelineError)> {
        self.map_err(|e| (stage, e.into()))
    }
}

/// How many unread ids one listing call asks for.
const UNREAD_PAGE_SIZE: usize = 100;

pub struct TriageProcessor {
    store: Arc<dyn Database>,
    mail: Arc<dyn MailSource>,
    decision: DecisionEngine,
    executor: ActionExecutor,
    summarizer: ThreadSummarizer,
    locks: ThreadLocks,
    max_concurrent_threads: usize,
}

impl TriageProcessor {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        mail: Arc<dyn MailSource>,
        store: Arc<dyn Database>,
        config: &TriageConfig,
    ) -> Self {
        Self {
            decision: DecisionEngine::new(llm.clone()),
            executor: ActionExecutor::new(
                llm.clone(),
                mail.clone(),
                store.clone(),
                config.auto_send,
            ),
            summarizer: ThreadSummarizer::new(llm, config.summary_max_sentences),
            locks: ThreadLocks::new(),
            max_concurrent_threads: config.max_concurrent_threads.max(1),
            store,
            mail,
        }
    }

    /// Fetch up to `limit` unread messages that were never processed and
    /// process them.
    pub async fn run_once(&self, limit: usize) -> Result<Vec<MessageOutcome>, MailError> {
        let messages = self.fetch_fresh(limit).await?;
        Ok(self.process_batch(messages).await)
    }

    /// Page through the unread listing until `limit` unprocessed messages are
    /// loaded or the listing ends.
    ///
    /// `no_action` messages stay unread, so already-processed ids are dropped
    /// before they count against `limit`.
    async fn fetch_fresh(&self, limit: usize) -> Result<Vec<Message>, MailError> {
        let mut fresh = Vec::new();
        let mut page_token: Option<String> = None;
        let mut seen = 0usize;

        'pages: loop {
            let page = self
                .mail
                .list_unread(UNREAD_PAGE_SIZE, page_token.as_deref())
                .await?;
            seen += page.ids.len();
            for id in &page.ids {
                if fresh.len() >= limit {
                    break 'pages;
                }
                match self.store.has_processed(id).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    // let the cycle report it as a dedup failure
                    Err(e) => warn!(message_id = %id, error = %e, "Dedup lookup failed while listing"),
                }
                match self.mail.fetch_message(id).await {
                    Ok(message) => fresh.push(message),
                    Err(e) => warn!(message_id = %id, error = %e, "Skipping message that failed to load"),
                }
            }
            match page.next_page {
                Some(next) if fresh.len() < limit => page_token = Some(next),
                _ => break,
            }
        }

        debug!(listed = seen, fresh = fresh.len(), "Unread batch assembled");
        Ok(fresh)
    }

    /// Process a batch. Returns one outcome per input message, in input order.
    ///
    /// Messages sharing a thread run one after another in arrival order.
    /// Distinct threads run concurrently up to `max_concurrent_threads`.
    pub async fn process_batch(&self, messages: Vec<Message>) -> Vec<MessageOutcome> {
        let total = messages.len();
        if total == 0 {
            return Vec::new();
        }

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<(usize, Message)>> = HashMap::new();
        for (index, message) in messages.into_iter().enumerate() {
            let group = groups.entry(message.thread_id.clone()).or_insert_with(|| {
                order.push(message.thread_id.clone());
                Vec::new()
            });
            group.push((index, message));
        }
        let groups: Vec<Vec<(usize, Message)>> = order
            .iter()
            .filter_map(|thread_id| groups.remove(thread_id))
            .collect();

        let mut indexed: Vec<(usize, MessageOutcome)> = futures::stream::iter(groups)
            .map(|group| async move {
                let mut outcomes = Vec::with_capacity(group.len());
                for (index, message) in group {
                    outcomes.push((index, self.process_message(&message).await));
                }
                outcomes
            })
            .buffer_unordered(self.max_concurrent_threads)
            .flat_map(futures::stream::iter)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        self.locks.prune().await;

        let outcomes: Vec<MessageOutcome> = indexed.into_iter().map(|(_, o)| o).collect();
        let skipped = outcomes.iter().filter(|o| o.is_skipped()).count();
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Failed { .. }))
            .count();
        info!(
            total,
            completed = total - skipped - failed,
            skipped,
            failed,
            "Batch processed"
        );
        outcomes
    }

    /// Run one message through the cycle. Never fails; faults become a
    /// `Failed` outcome.
    pub async fn process_message(&self, message: &Message) -> MessageOutcome {
        let status = match self.run_cycle(message).await {
            Ok(status) => status,
            Err((stage, error)) => {
                warn!(
                    message_id = %message.id,
                    thread_id = %message.thread_id,
                    stage = ?stage,
                    error = %error,
                    "Message processing failed"
                );
                OutcomeStatus::Failed {
                    stage,
                    error: error.to_string(),
                }
            }
        };
        MessageOutcome::new(message, status)
    }

    async fn run_cycle(&self, message: &Message) -> Result<OutcomeStatus, (Stage, PipelineError)> {
        if self.already_processed(message).await? {
            return Ok(OutcomeStatus::Skipped);
        }

        let _guard = self.locks.acquire(&message.thread_id).await;
        // another cycle may have finished this message while we waited
        if self.already_processed(message).await? {
            return Ok(OutcomeStatus::Skipped);
        }

        info!(
            message_id = %message.id,
            thread_id = %message.thread_id,
            from = %message.from,
            subject = %message.subject,
            "New message"
        );

        let prior = self
            .store
            .get_thread_memory(&message.thread_id)
            .await
            .at(Stage::Decision)?;
        let decision = self
            .decision
            .decide(message, prior.as_ref())
            .await
            .at(Stage::Decision)?;
        info!(message_id = %message.id, action = decision.name(), "Action chosen");

        let (tag, output) = match decision {
            Decision::Act(action) => {
                let report = self
                    .executor
                    .execute(&action, message)
                    .await
                    .at(Stage::Execution)?;
                (report.tag, Some(report.output))
            }
            Decision::NoAction => (ResultTag::NoAction, None),
        };

        self.store
            .mark_processed(&message.id, tag)
            .await
            .at(Stage::Commit)?;

        if tag.is_action() {
            self.refresh_memory(message, tag).await?;
        } else {
            info!(message_id = %message.id, "No action needed");
        }

        Ok(OutcomeStatus::Completed { tag, output })
    }

    async fn already_processed(&self, message: &Message) -> Result<bool, (Stage, PipelineError)> {
        let record = self
            .store
            .get_processed(&message.id)
            .await
            .at(Stage::Dedup)?;
        match record {
            Some(record) => {
                info!(message_id = %message.id, result = %record.result, "Already processed, skipping");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-summarize the whole thread and overwrite its memory.
    async fn refresh_memory(
        &self,
        message: &Message,
        tag: ResultTag,
    ) -> Result<(), (Stage, PipelineError)> {
        let mut thread = self
            .mail
            .fetch_thread(&message.thread_id)
            .await
            .at(Stage::Memory)?;
        if thread.is_empty() {
            debug!(thread_id = %message.thread_id, "Thread fetch returned nothing, using the message alone");
            thread.push(message.clone());
        }

        let summary = self
            .summarizer
            .resummarize(&thread)
            .await
            .map_err(|e| (Stage::Memory, PipelineError::Summary(e)))?;

        self.store
            .update_thread_memory(&message.thread_id, &summary, tag.label())
            .await
            .at(Stage::Memory)?;
        info!(
            thread_id = %message.thread_id,
            action = tag.label(),
            summary = %summary,
            "Memory updated"
        );
        Ok(())
    }
}
