//! Action executor: runs the chosen action's side effects, then
//! acknowledges the source message.

use std::sync::Arc;

use tracing::{debug, info};

use crate::actions::{Action, handlers};
use crate::error::{LlmError, PipelineError};
use crate::llm::LlmProvider;
use crate::mail::MailSource;
use crate::pipeline::types::{Message, ResultTag};
use crate::store::Database;

/// What a successful handler run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub tag: ResultTag,
    /// Draft text, summary, or a description of the stored record.
    pub output: String,
    /// Provider id of a transmitted reply.
    pub receipt: Option<String>,
}

pub struct ActionExecutor {
    llm: Arc<dyn LlmProvider>,
    mail: Arc<dyn MailSource>,
    store: Arc<dyn Database>,
    auto_send: bool,
}

impl ActionExecutor {
    /// `auto_send` decides whether generated replies are transmitted or
    /// only drafted.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        mail: Arc<dyn MailSource>,
        store: Arc<dyn Database>,
        auto_send: bool,
    ) -> Self {
        Self {
            llm,
            mail,
            store,
            auto_send,
        }
    }

    /// Run the handler, then mark `message` read.
    ///
    /// Errors propagate untouched by retries. If the handler succeeded but
    /// the acknowledgment failed, the side effect has already happened.
    pub async fn execute(
        &self,
        action: &Action,
        message: &Message,
    ) -> Result<ExecutionReport, PipelineError> {
        let report = self.run_handler(action, message).await?;
        self.mail.acknowledge_read(&message.id).await?;
        debug!(message_id = %message.id, action = action.name(), "Message acknowledged");
        Ok(report)
    }

    async fn run_handler(
        &self,
        action: &Action,
        message: &Message,
    ) -> Result<ExecutionReport, PipelineError> {
        let tag = action.kind().result_tag();
        let llm_failed = |e: LlmError| PipelineError::Execution {
            action: action.name().to_string(),
            reason: e.to_string(),
        };

        match action {
            Action::GenerateReply { email_text, sender } => {
                let reply = handlers::generate_reply(self.llm.as_ref(), email_text, sender)
                    .await
                    .map_err(llm_failed)?;
                debug!(message_id = %message.id, draft = %reply, "Draft reply");

                let receipt = if self.auto_send {
                    let receipt = self
                        .mail
                        .transmit(&message.from, &message.reply_subject(), &reply)
                        .await?;
                    info!(message_id = %message.id, to = %message.from, receipt = %receipt, "Reply sent");
                    Some(receipt)
                } else {
                    None
                };

                Ok(ExecutionReport {
                    tag,
                    output: reply,
                    receipt,
                })
            }
            Action::ScheduleMeeting {
                datetime,
                topic,
                attendees,
            } => {
                let meeting = handlers::meeting_record(datetime, topic, attendees, &message.id);
                self.store.insert_meeting(&meeting).await?;
                Ok(ExecutionReport {
                    tag,
                    output: handlers::describe_meeting(&meeting),
                    receipt: None,
                })
            }
            Action::SummarizeEmail { email_text } => {
                let summary = handlers::summarize_email(self.llm.as_ref(), email_text)
                    .await
                    .map_err(llm_failed)?;
                Ok(ExecutionReport {
                    tag,
                    output: summary,
                    receipt: None,
                })
            }
            Action::AddToTodo { task, due_date } => {
                let todo = handlers::todo_record(task, due_date, &message.id);
                self.store.insert_todo(&todo).await?;
                Ok(ExecutionReport {
                    tag,
                    output: handlers::describe_todo(&todo),
                    receipt: None,
                })
            }
        }
    }
}
