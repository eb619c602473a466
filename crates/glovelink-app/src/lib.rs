//! # glovelink-app - Session Engine
//!
//! Composes transports, the connection state machine and the message journal
//! into one [`DeviceSession`], and adds translation and summaries of the
//! journal on top.
//!
//! Depends on [`glovelink_core`] for domain types and [`glovelink_transport`]
//! for device links.
//!
//! ## Public API
//!
//! ### Session
//! - [`DeviceSession`] - `connect` / `send` / `disconnect` / `current_log`
//! - [`Selectors`] - Per-transport device filters
//! - [`ConnectionMachine`] - Connection state transitions
//!
//! ### Journal
//! - [`LogJournal`] - Day-partitioned, append-only message log
//! - [`JournalStore`] - Key/value persistence seam ([`FileStore`], [`MemoryStore`])
//! - [`LogView`] - Today or a specific date
//!
//! ### AI Helpers
//! - [`TranslationCache`] - Memoized [`Translator`] calls
//! - [`LogAnalyzer`] - Day summaries through a [`Summarizer`]
//! - [`GeminiClient`] - HTTP backend implementing both traits
//!
//! ### Configuration
//! - [`config::Settings`] - `config.toml` contents
//! - [`config::load_settings()`] / [`config::init_config()`]

pub mod ai;
pub mod config;
pub mod connection;
pub mod journal;
pub mod session;
pub mod summary;
pub mod translation;

pub use ai::{
    GeminiClient, LocalSummarizer, LocalTranslator, ServiceError, Summarizer, Translator,
};
pub use connection::ConnectionMachine;
pub use journal::store::LocalJournalStore;
pub use journal::{partition_key, FileStore, JournalStore, LogJournal, LogView, MemoryStore};
pub use session::{DeviceSession, Selectors, EVENT_CAPACITY};
pub use summary::LogAnalyzer;
pub use translation::{translation_marker, TranslatedEntry, TranslationCache};
