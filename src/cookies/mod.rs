//! Cookie jar storage and persistence.
//!
//! The session's cookies live in a [`SharedCookieJar`] that doubles as the
//! reqwest cookie store. A [`CookieHandler`] mirrors it to one file per
//! (domain, username), optionally encrypted with [`CookieCipher`].

mod crypto;
mod error;
mod file_name;
mod handler;
mod jar;

pub use crypto::{CookieCipher, KEY_ENV_VAR};
pub use error::CookieError;
pub use file_name::{UNAUTHENTICATED_USERNAME, cookie_file_path, format_file_name};
pub use handler::CookieHandler;
pub use jar::{CookieJar, SharedCookieJar};
