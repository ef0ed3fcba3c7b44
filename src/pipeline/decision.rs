//! Decision engine: one message plus thread memory in, one action out.
//!
//! The model is offered the registry as function definitions and may call
//! at most one. Whatever comes back is validated into a [`Decision`] here;
//! nothing downstream sees raw model output.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::actions::{Action, Decision, tool_definitions};
use crate::error::PipelineError;
use crate::llm::{ChatMessage, LlmProvider, ToolCompletionRequest};
use crate::pipeline::types::Message;
use crate::store::ThreadMemory;

/// Low temperature: the choice should track the email, not vary run to run.
const DECISION_TEMPERATURE: f32 = 0.1;

const BASE_SYSTEM_PROMPT: &str = "You are an autonomous email assistant. Based on the user's email you should decide which function to call. Only respond with a function call in JSON. If the email needs none of the functions, do not call any.";

/// Picks the action for a message.
pub struct DecisionEngine {
    llm: Arc<dyn LlmProvider>,
}

impl DecisionEngine {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Ask the model for a decision and validate it.
    ///
    /// A transport failure is `PipelineError::Decision`; an unknown action
    /// or unusable arguments is `PipelineError::MalformedDecision`. Never
    /// retries.
    pub async fn decide(
        &self,
        message: &Message,
        prior: Option<&ThreadMemory>,
    ) -> Result<Decision, PipelineError> {
        let request = ToolCompletionRequest::new(
            vec![
                ChatMessage::system(system_prompt(prior)),
                ChatMessage::user(user_prompt(message)),
            ],
            tool_definitions(),
        )
        .with_temperature(DECISION_TEMPERATURE);

        let response = self.llm.complete_with_tools(request).await?;

        let mut calls = response.tool_calls.into_iter();
        let Some(call) = calls.next() else {
            debug!(message_id = %message.id, "Model chose no action");
            return Ok(Decision::NoAction);
        };

        let ignored: Vec<String> = calls.map(|c| c.name).collect();
        if !ignored.is_empty() {
            warn!(
                message_id = %message.id,
                action = %call.name,
                ignored = ?ignored,
                "Model returned several function calls, using the first"
            );
        }

        let action = Action::resolve(&call.name, &call.arguments, message)?;
        Ok(Decision::Act(action))
    }
}

/// System prompt, with prior thread state appended when there is any.
pub fn system_prompt(prior: Option<&ThreadMemory>) -> String {
    match prior.filter(|m| !m.summary.trim().is_empty()) {
        Some(memory) => format!(
            "{BASE_SYSTEM_PROMPT} Here is the previous conversation summary: {}. \
             Last action taken was: {}. \
             Only act if the new email requires a new action.",
            memory.summary.trim(),
            memory.last_action
        ),
        None => BASE_SYSTEM_PROMPT.to_string(),
    }
}

pub fn user_prompt(message: &Message) -> String {
    format!(
        "Email from: {}\nSubject: {}\nBody: {}",
        message.from, message.subject, message.body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::error::LlmError;
    use crate::llm::{
        CompletionRequest, CompletionResponse, FinishReason, ToolCall, ToolCompletionResponse,
    };

    /// Returns a fixed set of tool calls and keeps the request it saw.
    struct MockDecisionLlm {
        calls: Vec<(String, String)>,
        fail: bool,
        seen: Mutex<Option<ToolCompletionRequest>>,
    }

    impl MockDecisionLlm {
        fn calling(calls: &[(&str, &str)]) -> Self {
            Self {
                calls: calls
                    .iter()
                    .map(|(n, a)| (n.to_string(), a.to_string()))
                    .collect(),
                fail: false,
                seen: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                calls: Vec::new(),
                fail: true,
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockDecisionLlm {
        fn model_name(&self) -> &str {
            "mock-decision"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            unimplemented!("decision uses tool completion only")
        }

        async fn complete_with_tools(
            &self,
            request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            *self.seen.lock().unwrap() = Some(request);
            if self.fail {
                return Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "connection reset".into(),
                });
            }
            Ok(ToolCompletionResponse {
                content: None,
                tool_calls: self
                    .calls
                    .iter()
                    .enumerate()
                    .map(|(i, (name, args))| ToolCall {
                        id: format!("call_{i}"),
                        name: name.clone(),
                        arguments: args.clone(),
                    })
                    .collect(),
                input_tokens: 10,
                output_tokens: 5,
                finish_reason: FinishReason::ToolUse,
            })
        }
    }

    fn message() -> Message {
        Message {
            id: "m1".into(),
            thread_id: "t1".into(),
            from: "a@x.com".into(),
            subject: "Q".into(),
            body: "Can we meet Tuesday 3pm to discuss Q?".into(),
        }
    }

    fn memory(summary: &str) -> ThreadMemory {
        ThreadMemory {
            thread_id: "t1".into(),
            summary: summary.into(),
            last_action: "reply_sent".into(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn no_tool_call_is_no_action() {
        let engine = DecisionEngine::new(Arc::new(MockDecisionLlm::calling(&[])));
        let decision = engine.decide(&message(), None).await.unwrap();
        assert_eq!(decision, Decision::NoAction);
        assert_eq!(decision.name(), "no_action");
    }

    #[tokio::test]
    async fn schedule_meeting_is_resolved() {
        let engine = DecisionEngine::new(Arc::new(MockDecisionLlm::calling(&[(
            "schedule_meeting",
            r#"{"datetime": "Tuesday 3pm", "topic": "Q", "attendees": ""}"#,
        )])));
        let decision = engine.decide(&message(), None).await.unwrap();
        assert_eq!(
            decision,
            Decision::Act(Action::ScheduleMeeting {
                datetime: "Tuesday 3pm".into(),
                topic: "Q".into(),
                attendees: String::new(),
            })
        );
    }

    #[tokio::test]
    async fn omitted_reply_params_are_filled_from_message() {
        let engine =
            DecisionEngine::new(Arc::new(MockDecisionLlm::calling(&[("generate_reply", "{}")])));
        let Decision::Act(action) = engine.decide(&message(), None).await.unwrap() else {
            panic!("expected an action");
        };
        assert_eq!(action.parameters()["sender"], "a@x.com");
        assert_eq!(
            action.parameters()["email_text"],
            "Can we meet Tuesday 3pm to discuss Q?"
        );
    }

    #[tokio::test]
    async fn first_of_several_calls_wins() {
        let engine = DecisionEngine::new(Arc::new(MockDecisionLlm::calling(&[
            ("add_to_todo", r#"{"task": "prep Q"}"#),
            ("generate_reply", "{}"),
        ])));
        let decision = engine.decide(&message(), None).await.unwrap();
        assert_eq!(decision.name(), "add_to_todo");
    }

    #[tokio::test]
    async fn unknown_action_is_malformed() {
        let engine =
            DecisionEngine::new(Arc::new(MockDecisionLlm::calling(&[("delete_everything", "{}")])));
        let err = engine.decide(&message(), None).await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDecision { .. }));
    }

    #[tokio::test]
    async fn transport_failure_is_decision_error() {
        let engine = DecisionEngine::new(Arc::new(MockDecisionLlm::failing()));
        let err = engine.decide(&message(), None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Decision(LlmError::RequestFailed { .. })));
    }

    #[tokio::test]
    async fn request_offers_every_registered_action() {
        let llm = Arc::new(MockDecisionLlm::calling(&[]));
        let engine = DecisionEngine::new(llm.clone());
        engine.decide(&message(), Some(&memory("Alice asked about Q."))).await.unwrap();

        let request = llm.seen.lock().unwrap().take().unwrap();
        let names: Vec<_> = request.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            ["generate_reply", "schedule_meeting", "summarize_email", "add_to_todo"]
        );
        assert!(request.messages[0].content.contains("Alice asked about Q."));
        assert!(request.messages[1].content.contains("Subject: Q"));
    }

    #[test]
    fn system_prompt_includes_prior_memory() {
        let prompt = system_prompt(Some(&memory("Alice asked about Q.")));
        assert!(prompt.starts_with(BASE_SYSTEM_PROMPT));
        assert!(prompt.contains("previous conversation summary: Alice asked about Q."));
        assert!(prompt.contains("Last action taken was: reply_sent"));
        assert!(prompt.contains("Only act if the new email requires a new action."));
    }

    #[test]
    fn system_prompt_ignores_absent_or_empty_memory() {
        assert_eq!(system_prompt(None), BASE_SYSTEM_PROMPT);
        assert_eq!(system_prompt(Some(&memory("  "))), BASE_SYSTEM_PROMPT);
    }

    #[test]
    fn user_prompt_lists_sender_subject_body() {
        assert_eq!(
            user_prompt(&message()),
            "Email from: a@x.com\nSubject: Q\nBody: Can we meet Tuesday 3pm to discuss Q?"
        );
    }
}
