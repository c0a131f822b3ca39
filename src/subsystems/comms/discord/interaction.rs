//! Interaction payloads: the subset of Discord's wire format the bot reads
//! and writes.

use serde::Deserialize;
use serde_json::{Value, json};

pub const PING: u8 = 1;
pub const APPLICATION_COMMAND: u8 = 2;

const PONG: u8 = 1;
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;
const DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE: u8 = 5;

const EPHEMERAL: u64 = 1 << 6;

const OPTION_STRING: u8 = 3;
const OPTION_INTEGER: u8 = 4;

#[derive(Debug, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub data: Option<CommandData>,
    /// Present for guild invocations.
    #[serde(default)]
    pub member: Option<Member>,
    /// Present for DM invocations.
    #[serde(default)]
    pub user: Option<User>,
}

impl Interaction {
    pub fn user_id(&self) -> Option<&str> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
            .map(|u| u.id.as_str())
    }

    pub fn command_name(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.name.as_str())
    }

    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(Value::as_str)
    }

    pub fn option_i64(&self, name: &str) -> Option<i64> {
        self.option(name).and_then(Value::as_i64)
    }

    fn option(&self, name: &str) -> Option<&Value> {
        self.data
            .as_ref()?
            .options
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.value)
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: String,
}

// ── Responses ─────────────────────────────────────────────────────────────────

pub fn pong() -> Value {
    json!({ "type": PONG })
}

pub fn deferred() -> Value {
    json!({ "type": DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE })
}

/// Deferred acknowledgement whose eventual reply only the invoker sees.
pub fn deferred_ephemeral() -> Value {
    json!({ "type": DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE, "data": { "flags": EPHEMERAL } })
}

/// Reply visible only to the invoking user.
pub fn ephemeral(content: &str) -> Value {
    json!({
        "type": CHANNEL_MESSAGE_WITH_SOURCE,
        "data": { "content": content, "flags": EPHEMERAL },
    })
}

// ── Command definitions ───────────────────────────────────────────────────────

fn string_option(name: &str, description: &str, required: bool) -> Value {
    json!({ "type": OPTION_STRING, "name": name, "description": description, "required": required })
}

/// Global slash commands, registered in one bulk overwrite at startup.
pub fn command_definitions() -> Value {
    json!([
        {
            "name": "ask",
            "description": "Ask about GitHub activity",
            "options": [string_option("question", "What do you want to know?", true)],
        },
        {
            "name": "history",
            "description": "Show your recent questions",
            "options": [{
                "type": OPTION_INTEGER,
                "name": "limit",
                "description": "How many exchanges to show",
                "required": false,
                "min_value": 1,
                "max_value": 20,
            }],
        },
        {
            "name": "specify",
            "description": "Create a feature specification",
            "options": [string_option("description", "Feature description", true)],
        },
        {
            "name": "plan",
            "description": "Create contracts and an implementation plan for a feature",
            "options": [string_option("feature", "Feature name", true)],
        },
        {
            "name": "tasks",
            "description": "Break a feature into tasks",
            "options": [string_option("feature", "Feature name", true)],
        },
        {
            "name": "features",
            "description": "List specified features",
        },
    ])
}
