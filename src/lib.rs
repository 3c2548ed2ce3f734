//! Web Scraper Library
//!
//! A stateful HTTP scraping helper: a session that persists (optionally
//! encrypted) cookies per domain and user, logs in through HTML forms with
//! CSRF tokens, and runs user-defined page parsers with result accumulation,
//! caching and pagination.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Configuration loading and validation
//! - [`cookies`] - Cookie jar, file naming, encryption and persistence
//! - [`session`] - HTTP session, login and CSRF extraction
//! - [`cache`] - Result-set cache seam and in-memory store
//! - [`api`] - API definitions, accumulator, pagination and dispatcher

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod cache;
pub mod config;
pub mod cookies;
pub mod session;
mod user_agent;
mod web_scraper;

// Re-export commonly used types
pub use api::{ApiDefinition, ApiHandle, Dispatcher, PageLimit, ScraperApi};
pub use cache::{CacheStore, MemoryCache, Records};
pub use config::{AuthTestConfig, ConfigError, CookieConfig, ScraperConfig};
pub use cookies::{CookieError, CookieHandler, CookieJar};
pub use session::{
    CsrfToken, CsrfTokenFilter, LoginOptions, LoginOutcome, MergeMode, Method, RequestOptions,
    ScrapeError, ScrapeResponse, Session, TokenPlacement,
};
pub use user_agent::DEFAULT_USER_AGENT;
pub use web_scraper::WebScraper;
