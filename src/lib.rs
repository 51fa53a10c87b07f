//! # malexport
//!
//! Incrementally mirror a MyAnimeList account into a local JSON store.
//!
//! ## Overview
//!
//! Each run re-fetches only what may have changed since the last one. List
//! endpoints are cheap and are replaced wholesale; history pages, forum
//! topics and message threads are expensive, so those scans walk the most
//! recently active items first and stop once enough consecutive items turn
//! out to be unchanged.
//!
//! ## Architecture
//!
//! - Engine primitives ([`change`], [`limiter`], [`paginator`], [`store`])
//! - Per-resource strategies ([`sync`]) over pluggable transports ([`transport`])
//! - Account orchestration ([`account`]) and recovery from backups ([`recover`])
//! - Reading stored data back ([`parse`])
//! - Settings, secrets and logging ([`config`], [`credentials`], [`localdir`], [`logger`])

/// Per-account orchestration of every update.
///
/// Owns the lazily created browser and API sessions, and runs all updates in
/// isolation for `update all` so one failing resource does not stop the rest.
pub mod account;

/// Structural comparison of a fetched record against the stored one.
pub mod change;

/// Platform-agnostic configuration and data directory management, and the
/// `config.toml` sync settings with their environment overrides.
pub mod config;

/// Loading, or interactively prompting for, account credentials and the
/// API client id.
pub mod credentials;

/// Error taxonomy shared by transports and strategies.
pub mod error;

/// Stop condition for incremental scans: N consecutive unchanged items.
pub mod limiter;

/// Anime/manga list types and resource kinds.
pub mod list_type;

/// On-disk layout of one account's data.
pub mod localdir;

/// Console logging through `env_logger` plus a rotating log file in the
/// config directory.
pub mod logger;

/// Offset pagination that stops on a short or empty page, and cursor
/// pagination that stops when there is no next cursor.
pub mod paginator;

/// Iterators over stored history, forum posts and message threads.
pub mod parse;

/// Record types persisted by the store.
pub mod records;

/// Reconstruction of deleted entries from a series of account backups.
pub mod recover;

/// Exponential backoff for transient failures and the bounded
/// re-authenticate-and-resume loop.
pub mod retry;

/// Per-id persistence in sharded or merged layout.
pub mod store;

/// Synchronization strategies for lists, history, forum, friends and messages.
pub mod sync;

/// HTTP, OAuth and WebDriver transports behind the `JsonApi` and `Browser`
/// traits.
pub mod transport;

/// Command handlers for the `malexport` binary.
pub mod handlers;
