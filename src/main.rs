//! CLI entry point for the web scraper.

use anyhow::{Context, Result, bail};
use clap::Parser;
use scraper::Selector;
use tracing::{debug, info};
use web_scraper::{
    CsrfToken, CsrfTokenFilter, LoginOptions, LoginOutcome, ScraperConfig, WebScraper,
};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = load_config(&args)?;
    let mut scraper = WebScraper::new(config).context("failed to initialize scraper")?;
    if let Some(username) = args.username.as_deref() {
        scraper
            .set_username(Some(username))
            .context("failed to load cookies for user")?;
    }

    match args.command {
        Command::Get { url, selector } => run_get(&mut scraper, &url, selector.as_deref()).await,
        Command::Login {
            login_url,
            post_uri,
            fields,
            csrf_selector,
            csrf_attr,
            csrf_field,
            laravel,
        } => {
            let filter = if laravel {
                Some(CsrfTokenFilter::laravel())
            } else {
                csrf_selector.map(|selector| {
                    let mut filter = CsrfTokenFilter::selector(selector);
                    if let Some(attr) = csrf_attr {
                        filter = filter.with_attribute(attr);
                    }
                    if let Some(field) = csrf_field {
                        filter = filter.with_field(field);
                    }
                    filter
                })
            };
            if let Some(filter) = filter {
                scraper.session_mut().set_csrf_filter(filter);
            }

            let mut options = LoginOptions::new();
            if let Some(post_uri) = post_uri {
                options = options.post_to(post_uri);
            }
            match scraper.login(&login_url, fields, options).await? {
                LoginOutcome::AlreadyLoggedIn => println!("already logged in"),
                LoginOutcome::Submitted(response) => {
                    println!("login submitted: HTTP {}", response.status().as_u16());
                }
            }
            Ok(())
        }
        Command::CheckAuth { url, see } => {
            let mut auth_test = scraper.config().auth_test.clone();
            if url.is_some() {
                auth_test.url = url;
            }
            if see.is_some() {
                auth_test.see = see;
            }
            if auth_test.url.is_none() {
                info!("No auth test URL configured; reporting logged out");
            }
            scraper.set_auth_test(auth_test);

            let logged_in = scraper.check_if_logged_in().await?;
            println!("{}", if logged_in { "logged in" } else { "logged out" });
            Ok(())
        }
        Command::Csrf {
            url,
            selector,
            attr,
        } => {
            scraper.get(&url).await?;
            let filter = CsrfTokenFilter::selector(selector).with_attribute(attr);
            match scraper.session_mut().csrf_token(Some(&filter))? {
                Some(CsrfToken::Value(value)) => println!("{value}"),
                Some(CsrfToken::Element { html, .. }) => println!("{html}"),
                None => bail!("no CSRF token found on {url}"),
            }
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> Result<ScraperConfig> {
    let mut config = match &args.config {
        Some(path) => ScraperConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ScraperConfig::load_default().context("failed to load default config")?,
    };
    if let Some(directory) = &args.cookie_dir {
        config.cookies.directory.clone_from(directory);
    }
    if args.stateless {
        config.cookies.stateless = true;
    }
    config.validate()?;
    Ok(config)
}

async fn run_get(scraper: &mut WebScraper, url: &str, selector: Option<&str>) -> Result<()> {
    let response = scraper.get(url).await?;
    let Some(selector) = selector else {
        println!("{}", response.text());
        return Ok(());
    };

    let selector = Selector::parse(selector)
        .map_err(|e| anyhow::anyhow!("invalid selector '{selector}': {e}"))?;
    let document = response.document();
    for element in document.select(&selector) {
        println!("{}", element.text().collect::<String>().trim());
    }
    Ok(())
}
