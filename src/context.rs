//! Manual context-window helpers: token estimation and history truncation.
//!
//! These are opt-in utilities retargeted at the canonical [`crate::wire::Message`]
//! shape - nothing in the orchestration client calls them automatically. A
//! caller decides when and how to keep a session's history within budget.
//!
//! # Examples
//!
//! ```rust
//! use agentcore::{estimate_tokens, is_approaching_limit, Message};
//!
//! let messages = vec![Message::system("you are helpful"), Message::user("hello")];
//! let tokens = estimate_tokens(&messages);
//! if is_approaching_limit(&messages, 32_000, 0.9) {
//!     println!("{tokens} tokens estimated, approaching the limit");
//! }
//! ```

use crate::wire::{ContentPart, Message, Role};

/// Estimates a message list's token count via a character-based
/// approximation (1 token ≈ 4 characters). This is deliberately rough -
/// actual tokenizers vary by model family, typically within 70-85% accuracy -
/// and exists so a caller can make a cheap local judgment call without a
/// full tokenizer dependency. Always leave a 10-20% safety margin on top of
/// this estimate before enforcing a hard limit.
///
/// Counts text content, reasoning, and tool-call name/id/arguments; role and
/// per-message/per-conversation formatting overhead are folded in as fixed
/// per-item/per-list constants.
///
/// # Examples
///
/// ```rust
/// use agentcore::{estimate_tokens, Message};
///
/// let messages = vec![Message::system("you are helpful"), Message::user("hi")];
/// let tokens = estimate_tokens(&messages);
/// assert!(tokens > 0);
/// ```
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;

    for message in messages {
        total_chars += 8; // role formatting overhead

        if let Some(parts) = &message.content_parts {
            for part in parts {
                if let ContentPart::Text { text } = part {
                    total_chars += text.len();
                }
            }
        } else if let Some(text) = &message.content {
            total_chars += text.len();
        }

        if let Some(reasoning) = &message.reasoning {
            total_chars += reasoning.len();
        }

        if let Some(calls) = &message.tool_calls {
            for call in calls {
                total_chars += call.name.len() + call.id.len() + call.arguments.len();
            }
        }
    }

    total_chars += 16; // conversation-level overhead
    (total_chars + 3) / 4 // ceiling division
}

/// Truncates history to the most recent `keep` messages, optionally
/// preserving a leading system message. A simple truncation - it does not
/// attempt to keep tool-call/tool-result pairs together, so truncating
/// mid-exchange can leave a dangling tool result with no matching call.
/// Returns a new `Vec`; the input is left untouched.
///
/// Truncating mid-conversation can remove context the model needs to
/// respond correctly - prefer calling this at a natural turn boundary
/// rather than between a tool call and its result.
///
/// # Examples
///
/// ```rust
/// use agentcore::{truncate_messages, Message};
///
/// let history = vec![
///     Message::system("you are helpful"),
///     Message::user("1"), Message::user("2"), Message::user("3"),
/// ];
/// let truncated = truncate_messages(&history, 1, true);
/// assert_eq!(truncated.len(), 2); // system message + last 1
/// ```
pub fn truncate_messages(messages: &[Message], keep: usize, preserve_system: bool) -> Vec<Message> {
    if messages.is_empty() || messages.len() <= keep {
        return messages.to_vec();
    }

    let has_leading_system = preserve_system && messages[0].role == Some(Role::System);

    if has_leading_system {
        let mut result = vec![messages[0].clone()];
        if keep > 0 && messages.len() > 1 {
            let start = messages.len().saturating_sub(keep);
            result.extend_from_slice(&messages[start.max(1)..]);
        }
        result
    } else if keep > 0 {
        let start = messages.len().saturating_sub(keep);
        messages[start..].to_vec()
    } else {
        Vec::new()
    }
}

/// Convenience check combining [`estimate_tokens`] with a safety margin:
/// `true` once the estimate exceeds `limit * margin` (e.g. `margin = 0.9`
/// flags at 90% of a 32k context window).
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}
