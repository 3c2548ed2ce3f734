//! HTTP session wrapper.
//!
//! [`Session`] owns the HTTP clients, the cookie jar and its file handler,
//! the user agent, the CSRF filter and the login state. All requests go
//! through [`Session::request`], which reads cookies for the target domain
//! before sending and persists them after.

mod client;
pub mod csrf;
mod error;
mod http;
mod options;
mod response;

pub use client::{LoginOutcome, Session};
pub use csrf::{CsrfToken, CsrfTokenFilter, TokenPlacement};
pub use error::ScrapeError;
pub use options::{LoginOptions, MergeMode, RequestOptions};
pub use reqwest::Method;
pub use response::ScrapeResponse;
