//! Structured message protocol for agent output.
//!
//! `ChatMessage` replaces raw `println!()` calls with typed messages that can
//! be rendered by different sinks: terminal, JSON lines, or collected in
//! memory (testing). Sinks are `Send + Sync` because the inactivity monitor
//! emits from its own thread.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

// ── Message types ───────────────────────────────────────────────────────

/// A structured message emitted by the conversation core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatMessage {
    /// Answer to something the user said.
    Reply { text: String },
    /// Unsolicited prompt chosen by the engagement scheduler.
    Proactive { text: String },
    /// Idle nudge from the inactivity monitor.
    Nudge { text: String },
    /// Result of a content search.
    Search {
        provider: String,
        term: String,
        text: String,
    },
    /// A recovered failure the user should know about.
    Warning {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        help: Option<String>,
    },
}

impl ChatMessage {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply { text: text.into() }
    }

    pub fn proactive(text: impl Into<String>) -> Self {
        Self::Proactive { text: text.into() }
    }

    pub fn nudge(text: impl Into<String>) -> Self {
        Self::Nudge { text: text.into() }
    }

    /// Build a warning from any miette diagnostic, keeping its code and help.
    pub fn warning(diag: &dyn miette::Diagnostic) -> Self {
        Self::Warning {
            code: diag
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "chat::unknown".into()),
            message: diag.to_string(),
            help: diag.help().map(|h| h.to_string()),
        }
    }

    /// The dialogue text, if this message is part of the conversation.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Reply { text }
            | Self::Proactive { text }
            | Self::Nudge { text }
            | Self::Search { text, .. } => Some(text),
            Self::Warning { .. } => None,
        }
    }
}

// ── MessageSink trait ───────────────────────────────────────────────────

/// A destination for structured chat messages.
pub trait MessageSink: Send + Sync {
    /// Emit a single message.
    fn emit(&self, msg: &ChatMessage);
}

// ── StdoutSink ──────────────────────────────────────────────────────────

/// Renders messages as plain console lines.
pub struct StdoutSink;

impl MessageSink for StdoutSink {
    fn emit(&self, msg: &ChatMessage) {
        match msg {
            ChatMessage::Reply { text }
            | ChatMessage::Proactive { text }
            | ChatMessage::Nudge { text } => println!("Chatbot: {text}"),
            ChatMessage::Search { provider, text, .. } => {
                println!("Chatbot: {text}");
                println!("         (fonte: {provider})");
            }
            ChatMessage::Warning {
                code,
                message,
                help,
            } => {
                eprintln!("[warning:{code}] {message}");
                if let Some(h) = help {
                    eprintln!("  help: {h}");
                }
            }
        }
    }
}

// ── JsonSink ────────────────────────────────────────────────────────────

/// Emits messages as newline-delimited JSON.
pub struct JsonSink;

impl MessageSink for JsonSink {
    fn emit(&self, msg: &ChatMessage) {
        if let Ok(json) = serde_json::to_string(msg) {
            println!("{json}");
        }
    }
}

// ── VecSink ─────────────────────────────────────────────────────────────

/// Collects messages into a `Vec<ChatMessage>` for testing.
pub struct VecSink {
    messages: Mutex<Vec<ChatMessage>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected messages.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().clone()
    }

    /// Number of collected messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count messages matching `pred`.
    pub fn count(&self, pred: impl Fn(&ChatMessage) -> bool) -> usize {
        self.lock().iter().filter(|m| pred(m)).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ChatMessage>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for VecSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSink for VecSink {
    fn emit(&self, msg: &ChatMessage) {
        self.lock().push(msg.clone());
    }
}
