//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Stateful web scraping from the command line.
///
/// Cookies persist between runs in one file per domain and user, so a
/// `login` followed by `get` reuses the logged-in session.
#[derive(Parser, Debug)]
#[command(name = "web-scraper")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to the per-user config.json if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Username whose cookie file is used
    #[arg(short, long, global = true)]
    pub username: Option<String>,

    /// Override the cookie directory
    #[arg(long, global = true)]
    pub cookie_dir: Option<PathBuf>,

    /// Keep cookies in memory only for this run
    #[arg(long, global = true)]
    pub stateless: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a page and print its body (or the text of matching elements)
    Get {
        url: String,

        /// CSS selector; prints the text of each match instead of the body
        #[arg(short, long)]
        selector: Option<String>,
    },

    /// Submit a login form, extracting the CSRF token first
    Login {
        /// Page containing the login form
        login_url: String,

        /// Where the form is posted (defaults to the login page)
        #[arg(long)]
        post_uri: Option<String>,

        /// Form field as KEY=VALUE (repeatable)
        #[arg(short, long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,

        /// CSS selector locating the CSRF token
        #[arg(long)]
        csrf_selector: Option<String>,

        /// Attribute holding the CSRF token value
        #[arg(long)]
        csrf_attr: Option<String>,

        /// Form field name for the CSRF token
        #[arg(long)]
        csrf_field: Option<String>,

        /// Use Laravel's `_token` field
        #[arg(long, conflicts_with = "csrf_selector")]
        laravel: bool,
    },

    /// Check whether the stored session is logged in
    CheckAuth {
        /// Page to check (overrides config `auth_test.url`)
        #[arg(long)]
        url: Option<String>,

        /// Regex that appears on the page when logged in
        #[arg(long)]
        see: Option<String>,
    },

    /// Print the CSRF token found on a page
    Csrf {
        url: String,

        #[arg(short, long, default_value = r#"[name="_token"]"#)]
        selector: String,

        #[arg(short, long, default_value = "value")]
        attr: String,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty field name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
