//! Posts parsed from raw stream frames

use crate::error::{Result, WatchError};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

const POST_URL_PREFIX: &str = "https://twitter.com";

/// An @-mention and the display name it expands to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub screen_name: String,
    pub display_name: String,
}

/// One post from the source stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub author_screen_name: String,
    pub text: String,
    pub mentions: Vec<Mention>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id_str: Option<String>,
    user: Option<RawUser>,
    text: Option<String>,
    full_text: Option<String>,
    extended_tweet: Option<RawExtended>,
    entities: Option<RawEntities>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id_str: Option<String>,
    screen_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawExtended {
    full_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntities {
    user_mentions: Option<Vec<Value>>,
}

impl Post {
    /// Parse one stream frame
    pub fn from_frame(frame: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| WatchError::MalformedInput(format!("unparseable frame: {e}")))?;
        Self::from_value(value)
    }

    /// Build a post from an already decoded JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawPost = serde_json::from_value(value)
            .map_err(|e| WatchError::MalformedInput(format!("unexpected post shape: {e}")))?;

        let user = raw
            .user
            .as_ref()
            .ok_or_else(|| WatchError::MalformedInput("post has no user".to_string()))?;
        let author_id = required(user.id_str.clone(), "user.id_str")?;
        let author_screen_name = required(user.screen_name.clone(), "user.screen_name")?;
        let id = required(raw.id_str.clone(), "id_str")?;
        let text = select_text(&raw)?;

        let mentions = raw
            .entities
            .and_then(|entities| entities.user_mentions)
            .ok_or_else(|| {
                WatchError::MalformedInput("post has no entities.user_mentions".to_string())
            })?
            .iter()
            .filter_map(parse_mention)
            .collect();

        Ok(Self {
            id,
            author_id,
            author_screen_name,
            text,
            mentions,
        })
    }

    /// Link to the post on the platform
    pub fn permalink(&self) -> String {
        format!(
            "{POST_URL_PREFIX}/{}/status/{}",
            self.author_screen_name, self.id
        )
    }
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    field.ok_or_else(|| WatchError::MalformedInput(format!("post has no {name}")))
}

/// Pick the longest available text: extended, then full, then short
fn select_text(raw: &RawPost) -> Result<String> {
    if let Some(extended) = &raw.extended_tweet {
        return extended.full_text.clone().ok_or_else(|| {
            WatchError::MalformedInput("extended_tweet has no full_text".to_string())
        });
    }

    raw.full_text
        .clone()
        .or_else(|| raw.text.clone())
        .ok_or_else(|| WatchError::MalformedInput("post has no text".to_string()))
}

fn parse_mention(value: &Value) -> Option<Mention> {
    let screen_name = value.get("screen_name").and_then(Value::as_str);
    let display_name = value.get("name").and_then(Value::as_str);

    match (screen_name, display_name) {
        (Some(screen_name), Some(display_name)) => Some(Mention {
            screen_name: screen_name.to_string(),
            display_name: display_name.to_string(),
        }),
        _ => {
            warn!("Malformed mention: {}", value);
            None
        }
    }
}
