//! The closed set of actions the decision step may pick.
//!
//! Each entry carries a name, a description, and a flat string parameter
//! schema. The model sees these as function definitions; its answer is
//! validated back into an [`Action`] here, so an unknown name or a bad
//! argument document is a typed error instead of a silent fallthrough.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::PipelineError;
use crate::llm::ToolDefinition;
use crate::pipeline::types::{Message, ResultTag};

/// Where a parameter's default comes from when the model leaves it unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDefault {
    /// The triggering message's body.
    MessageBody,
    /// The triggering message's sender.
    MessageSender,
    /// A free-form fact not present in the message.
    Empty,
}

impl ParamDefault {
    fn resolve(self, message: &Message) -> String {
        match self {
            Self::MessageBody => message.body.clone(),
            Self::MessageSender => message.from.clone(),
            Self::Empty => String::new(),
        }
    }
}

/// One declared parameter of an action.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub default: ParamDefault,
}

/// Names of the registered actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    GenerateReply,
    ScheduleMeeting,
    SummarizeEmail,
    AddToTodo,
}

impl ActionKind {
    /// Every registered action, in the order offered to the model.
    pub const ALL: [ActionKind; 4] = [
        ActionKind::GenerateReply,
        ActionKind::ScheduleMeeting,
        ActionKind::SummarizeEmail,
        ActionKind::AddToTodo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GenerateReply => "generate_reply",
            Self::ScheduleMeeting => "schedule_meeting",
            Self::SummarizeEmail => "summarize_email",
            Self::AddToTodo => "add_to_todo",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GenerateReply => "Generate a reply email",
            Self::ScheduleMeeting => "Schedule a meeting or reminder",
            Self::SummarizeEmail => "Summarize the given email",
            Self::AddToTodo => "Add a task to a to-do list",
        }
    }

    /// Declared parameters. All of them are required at dispatch time.
    pub fn params(&self) -> &'static [ParamSpec] {
        match self {
            Self::GenerateReply => &[
                ParamSpec {
                    name: "email_text",
                    description: "Text of the email being answered",
                    default: ParamDefault::MessageBody,
                },
                ParamSpec {
                    name: "sender",
                    description: "Who sent the email",
                    default: ParamDefault::MessageSender,
                },
            ],
            Self::ScheduleMeeting => &[
                ParamSpec {
                    name: "datetime",
                    description: "When the meeting happens, as stated in the email",
                    default: ParamDefault::Empty,
                },
                ParamSpec {
                    name: "topic",
                    description: "What the meeting is about",
                    default: ParamDefault::Empty,
                },
                ParamSpec {
                    name: "attendees",
                    description: "Comma-separated attendees",
                    default: ParamDefault::Empty,
                },
            ],
            Self::SummarizeEmail => &[ParamSpec {
                name: "email_text",
                description: "Text of the email to summarize",
                default: ParamDefault::MessageBody,
            }],
            Self::AddToTodo => &[
                ParamSpec {
                    name: "task",
                    description: "The task to remember",
                    default: ParamDefault::Empty,
                },
                ParamSpec {
                    name: "due_date",
                    description: "When the task is due, if stated",
                    default: ParamDefault::Empty,
                },
            ],
        }
    }

    /// Result tag reported when this action completes.
    pub fn result_tag(&self) -> ResultTag {
        match self {
            Self::GenerateReply => ResultTag::ReplySent,
            Self::ScheduleMeeting => ResultTag::ScheduledMeeting,
            Self::SummarizeEmail => ResultTag::Summarized,
            Self::AddToTodo => ResultTag::TodoAdded,
        }
    }

    /// Function definition offered to the model.
    pub fn definition(&self) -> ToolDefinition {
        let properties: serde_json::Map<String, Value> = self
            .params()
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    serde_json::json!({"type": "string", "description": p.description}),
                )
            })
            .collect();
        let required: Vec<&str> = self.params().iter().map(|p| p.name).collect();

        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

/// All function definitions, in registry order.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    ActionKind::ALL.iter().map(ActionKind::definition).collect()
}

// ── Resolved actions ────────────────────────────────────────────────

/// A chosen action with every parameter resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Action {
    GenerateReply {
        email_text: String,
        sender: String,
    },
    ScheduleMeeting {
        datetime: String,
        topic: String,
        attendees: String,
    },
    SummarizeEmail {
        email_text: String,
    },
    AddToTodo {
        task: String,
        due_date: String,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::GenerateReply { .. } => ActionKind::GenerateReply,
            Self::ScheduleMeeting { .. } => ActionKind::ScheduleMeeting,
            Self::SummarizeEmail { .. } => ActionKind::SummarizeEmail,
            Self::AddToTodo { .. } => ActionKind::AddToTodo,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Name → value view of the parameters.
    pub fn parameters(&self) -> BTreeMap<&'static str, &str> {
        match self {
            Self::GenerateReply { email_text, sender } => {
                BTreeMap::from([("email_text", email_text.as_str()), ("sender", sender.as_str())])
            }
            Self::ScheduleMeeting {
                datetime,
                topic,
                attendees,
            } => BTreeMap::from([
                ("datetime", datetime.as_str()),
                ("topic", topic.as_str()),
                ("attendees", attendees.as_str()),
            ]),
            Self::SummarizeEmail { email_text } => {
                BTreeMap::from([("email_text", email_text.as_str())])
            }
            Self::AddToTodo { task, due_date } => {
                BTreeMap::from([("task", task.as_str()), ("due_date", due_date.as_str())])
            }
        }
    }

    /// Validate a model's function call into a fully populated action.
    ///
    /// `arguments` is the raw JSON the model produced. Missing or null
    /// parameters are filled from the message or left empty, per the
    /// parameter's [`ParamDefault`].
    pub fn resolve(name: &str, arguments: &str, message: &Message) -> Result<Self, PipelineError> {
        let kind = ActionKind::from_name(name).ok_or_else(|| PipelineError::MalformedDecision {
            action: name.to_string(),
            reason: "not a registered action".into(),
        })?;

        let args = parse_arguments(kind, arguments)?;
        let mut values: BTreeMap<&'static str, String> = kind
            .params()
            .iter()
            .map(|p| {
                let value = args
                    .get(p.name)
                    .cloned()
                    .unwrap_or_else(|| p.default.resolve(message));
                (p.name, value)
            })
            .collect();

        let mut take = |key: &str| values.remove(key).unwrap_or_default();
        Ok(match kind {
            ActionKind::GenerateReply => Self::GenerateReply {
                email_text: take("email_text"),
                sender: take("sender"),
            },
            ActionKind::ScheduleMeeting => Self::ScheduleMeeting {
                datetime: take("datetime"),
                topic: take("topic"),
                attendees: take("attendees"),
            },
            ActionKind::SummarizeEmail => Self::SummarizeEmail {
                email_text: take("email_text"),
            },
            ActionKind::AddToTodo => Self::AddToTodo {
                task: take("task"),
                due_date: take("due_date"),
            },
        })
    }
}

/// Parse the argument document into string values.
///
/// Blank input counts as `{}`. Nulls are dropped so they get defaulted.
/// Scalars are rendered as their JSON text, arrays of scalars joined with
/// ", ". Anything else is malformed.
fn parse_arguments(kind: ActionKind, raw: &str) -> Result<BTreeMap<String, String>, PipelineError> {
    let malformed = |reason: String| PipelineError::MalformedDecision {
        action: kind.name().to_string(),
        reason,
    };

    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let value: Value =
        serde_json::from_str(raw).map_err(|e| malformed(format!("arguments are not JSON: {e}")))?;
    let Value::Object(object) = value else {
        return Err(malformed("arguments must be a JSON object".into()));
    };

    let mut out = BTreeMap::new();
    for (key, value) in object {
        let rendered = match value {
            Value::Null => continue,
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_text(item).ok_or_else(|| malformed(format!("'{key}' has a nested value"))))
                .collect::<Result<Vec<_>, _>>()?
                .join(", "),
            other => scalar_text(&other)
                .ok_or_else(|| malformed(format!("'{key}' must be a string")))?,
        };
        out.insert(key, rendered);
    }
    Ok(out)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message {
            id: "m1".into(),
            thread_id: "t1".into(),
            from: "a@x.com".into(),
            subject: "Q".into(),
            body: "Can we meet Tuesday 3pm to discuss Q?".into(),
        }
    }

    #[test]
    fn registry_names_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ActionKind::from_name("delete_inbox"), None);
    }

    #[test]
    fn definitions_require_every_param() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), 4);
        let meeting = defs.iter().find(|d| d.name == "schedule_meeting").unwrap();
        let required = meeting.parameters["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        assert_eq!(meeting.parameters["properties"]["topic"]["type"], "string");
    }

    #[test]
    fn result_tags_per_kind() {
        assert_eq!(ActionKind::GenerateReply.result_tag(), ResultTag::ReplySent);
        assert_eq!(ActionKind::ScheduleMeeting.result_tag(), ResultTag::ScheduledMeeting);
        assert_eq!(ActionKind::SummarizeEmail.result_tag(), ResultTag::Summarized);
        assert_eq!(ActionKind::AddToTodo.result_tag(), ResultTag::TodoAdded);
    }

    #[test]
    fn reply_defaults_come_from_message() {
        let action = Action::resolve("generate_reply", "{}", &message()).unwrap();
        assert_eq!(
            action,
            Action::GenerateReply {
                email_text: "Can we meet Tuesday 3pm to discuss Q?".into(),
                sender: "a@x.com".into(),
            }
        );
    }

    #[test]
    fn summarize_defaults_to_body() {
        let action = Action::resolve("summarize_email", "", &message()).unwrap();
        assert_eq!(
            action,
            Action::SummarizeEmail {
                email_text: "Can we meet Tuesday 3pm to discuss Q?".into()
            }
        );
    }

    #[test]
    fn free_form_defaults_are_empty() {
        let action =
            Action::resolve("schedule_meeting", r#"{"datetime": "Tuesday 3pm"}"#, &message())
                .unwrap();
        assert_eq!(
            action,
            Action::ScheduleMeeting {
                datetime: "Tuesday 3pm".into(),
                topic: String::new(),
                attendees: String::new(),
            }
        );

        let todo = Action::resolve("add_to_todo", r#"{"due_date": null}"#, &message()).unwrap();
        assert_eq!(
            todo,
            Action::AddToTodo {
                task: String::new(),
                due_date: String::new(),
            }
        );
    }

    #[test]
    fn provided_values_win_over_defaults() {
        let action = Action::resolve(
            "generate_reply",
            r#"{"email_text": "short", "sender": "b@y.com"}"#,
            &message(),
        )
        .unwrap();
        assert_eq!(action.parameters()["sender"], "b@y.com");
        assert_eq!(action.parameters()["email_text"], "short");
    }

    #[test]
    fn arrays_and_scalars_are_rendered() {
        let action = Action::resolve(
            "schedule_meeting",
            r#"{"datetime": 1700000000, "topic": "Q", "attendees": ["a@x.com", "b@y.com"]}"#,
            &message(),
        )
        .unwrap();
        let params = action.parameters();
        assert_eq!(params["datetime"], "1700000000");
        assert_eq!(params["attendees"], "a@x.com, b@y.com");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let action =
            Action::resolve("add_to_todo", r#"{"task": "file report", "urgency": "high"}"#, &message())
                .unwrap();
        assert_eq!(action.parameters().len(), 2);
        assert_eq!(action.parameters()["task"], "file report");
    }

    #[test]
    fn unknown_action_is_malformed() {
        let err = Action::resolve("forward_email", "{}", &message()).unwrap_err();
        assert!(
            matches!(err, PipelineError::MalformedDecision { ref action, .. } if action == "forward_email")
        );
    }

    #[test]
    fn unparsable_arguments_are_malformed() {
        for raw in ["{not json", "[1, 2]", r#"{"task": {"nested": true}}"#, r#"{"task": [[1]]}"#] {
            let err = Action::resolve("add_to_todo", raw, &message()).unwrap_err();
            assert!(matches!(err, PipelineError::MalformedDecision { .. }), "{raw}");
        }
    }

    #[test]
    fn every_param_is_present_for_every_kind() {
        for kind in ActionKind::ALL {
            let action = Action::resolve(kind.name(), "{}", &message()).unwrap();
            let params = action.parameters();
            for spec in kind.params() {
                assert!(params.contains_key(spec.name), "{} missing {}", kind.name(), spec.name);
            }
            assert_eq!(action.kind(), kind);
        }
    }

    #[test]
    fn action_serializes_with_name_tag() {
        let action = Action::AddToTodo {
            task: "t".into(),
            due_date: "d".into(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["name"], "add_to_todo");
        assert_eq!(json["task"], "t");
    }
}
