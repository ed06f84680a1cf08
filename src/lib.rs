// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # chat-friend
//!
//! The decision core of a console companion: it learns which reply fits a
//! recognized phrase, learns when it is worth speaking first, remembers what
//! the user likes, and nudges an idle user.
//!
//! ## Architecture
//!
//! - **Action values** (`learn`): a dense state × action table with
//!   epsilon-greedy selection and two update conventions
//! - **Response selection** (`learn::response`): trained offline on a
//!   phrase/response catalog before the session starts
//! - **Engagement** (`learn::engagement`): learned online from how the user
//!   answers a proactive prompt
//! - **Preferences** (`preference`): JSON-backed set of liked items
//! - **Inactivity** (`monitor`): background thread sharing one timestamp with
//!   the session
//! - **Session** (`session`): the turn state machine tying it together
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_friend::config::ChatConfig;
//! use chat_friend::fetch::OfflineFetcher;
//! use chat_friend::learn::response::DEFAULT_PHRASES;
//! use chat_friend::message::StdoutSink;
//! use chat_friend::nlu::LexicalClassifier;
//! use chat_friend::preference::PreferenceStore;
//! use chat_friend::session::ConversationController;
//!
//! let config = ChatConfig::default();
//! let mut chat = ConversationController::new(
//!     &config,
//!     LexicalClassifier::new(&DEFAULT_PHRASES),
//!     OfflineFetcher,
//!     PreferenceStore::open("preferences.json"),
//!     Arc::new(StdoutSink),
//! )
//! .unwrap();
//! chat.bootstrap();
//! chat.run(std::io::stdin().lock()).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod learn;
pub mod message;
pub mod monitor;
pub mod nlu;
pub mod paths;
pub mod preference;
pub mod session;
