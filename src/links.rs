//! Reference resolution for index requests.
//!
//! A request names its source either with a deep link
//! (`t.me/<name>/<n>`, `t.me/c/<digits>/<n>`, also `telegram.me` and
//! `telegram.dog`) or by forwarding a message whose provenance carries the
//! originating chat and message id. Both resolve to a [`ResolvedRef`].

use regex::Regex;
use std::sync::LazyLock;

use crate::error::IndexError;
use crate::models::ChatRef;

static DEEP_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:https?://)?(?:t\.me|telegram\.me|telegram\.dog)/(c/)?([a-z0-9_]+)(?:/(\d+))?/?$",
    )
    .expect("deep link pattern is valid")
});

/// Kind of the chat a forwarded message originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Channel,
    Group,
    Private,
}

/// Provenance metadata of a forwarded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOrigin {
    pub chat_id: i64,
    pub username: Option<String>,
    pub chat_kind: ChatKind,
    pub message_id: Option<i64>,
}

/// What a user handed in to start indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Link(String),
    Forwarded(ForwardOrigin),
}

/// A resolved `(source, starting position)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub source: ChatRef,
    pub position: Option<i64>,
}

/// Resolve a reference, rejecting anything that is neither a deep link nor
/// a forwarded message with provenance.
pub fn resolve(reference: &Reference) -> Result<ResolvedRef, IndexError> {
    let resolved = match reference {
        Reference::Link(text) => parse_link(text),
        Reference::Forwarded(origin) => from_forward(origin),
    };
    resolved.ok_or(IndexError::NotRecognized)
}

/// Parse a deep link. `/c/<digits>` links address private channels by their
/// internal id, which maps to the `-100` prefixed chat id.
pub fn parse_link(text: &str) -> Option<ResolvedRef> {
    let caps = DEEP_LINK.captures(text.trim())?;
    let is_private = caps.get(1).is_some();
    let identifier = caps.get(2)?.as_str();
    let position = match caps.get(3) {
        Some(m) => Some(m.as_str().parse::<i64>().ok()?),
        None => None,
    };

    let numeric = identifier.bytes().all(|b| b.is_ascii_digit());
    let source = if is_private {
        if !numeric {
            return None;
        }
        ChatRef::Id(format!("-100{}", identifier).parse().ok()?)
    } else if numeric {
        ChatRef::Id(identifier.parse().ok()?)
    } else {
        ChatRef::Username(identifier.to_string())
    };

    Some(ResolvedRef { source, position })
}

/// Run the resolve command: print the chat and position a link points to.
pub fn run_resolve(reference: &str) -> anyhow::Result<()> {
    let resolved = resolve(&Reference::Link(reference.to_string())).map_err(|_| {
        anyhow::anyhow!(
            "Invalid submission: '{}' is not a chat link. Provide a t.me link.",
            reference
        )
    })?;
    println!("chat: {}", resolved.source);
    match resolved.position {
        Some(position) => println!("position: {}", position),
        None => println!("position: latest"),
    }
    Ok(())
}

fn from_forward(origin: &ForwardOrigin) -> Option<ResolvedRef> {
    let source = match (&origin.chat_kind, &origin.username) {
        (ChatKind::Channel, Some(name)) if !name.is_empty() => {
            ChatRef::Username(name.trim_start_matches('@').to_string())
        }
        _ => ChatRef::Id(origin.chat_id),
    };
    // Forwards must carry the original message id.
    let position = origin.message_id.filter(|id| *id > 0)?;
    Some(ResolvedRef {
        source,
        position: Some(position),
    })
}
