//! `flock-fetch` command line client.
//!
//! ```text
//! flock-fetch [--config FILE] [--flock URL] [--appliance NAME] [--persona ID]
//!             [-X METHOD] [-H 'Name: value']... [-d DATA] [--cache-mode MODE]
//!             [--json] <url>
//! ```
//!
//! Appliances come from the `[[appliances]]` config section and are reached
//! over plain TCP. Non-appliance URLs go through reqwest.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use http::header::{HeaderName, HeaderValue};
use http::Method;
use url::Url;

use flock_fetch::config::{load_config, FetchConfig};
use flock_fetch::observability::init_logging;
use flock_fetch::session::SessionManager;
use flock_fetch::transport::tcp::StaticDirectory;
use flock_fetch::{CacheMode, Dispatcher, FetchRequest, ReqwestFetch, ResponseDescriptor};

#[derive(Parser)]
#[command(name = "flock-fetch")]
#[command(about = "Fetch a URL, tunneling stork+app:// URLs through an appliance", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to discover the appliance through
    #[arg(long)]
    flock: Option<Url>,

    /// Appliance to use instead of the directory default
    #[arg(long)]
    appliance: Option<String>,

    /// Persona to log in as
    #[arg(long)]
    persona: Option<String>,

    /// Request method
    #[arg(short = 'X', long = "request")]
    method: Option<String>,

    /// Request header, `Name: value`
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// default, no-store, reload, no-cache or force-cache
    #[arg(long, default_value = "default")]
    cache_mode: CacheMode,

    /// Print the response as a JSON object
    #[arg(long)]
    json: bool,

    url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FetchConfig::default(),
    };

    init_logging(&config.logging);

    tracing::debug!(
        appliances = config.appliances.len(),
        directories = config.directories.default_urls.len(),
        "Configuration loaded"
    );

    let default_directories = config
        .directories
        .default_urls
        .iter()
        .map(|raw| Url::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let connector = Arc::new(StaticDirectory::new(config.appliances.clone()));
    let sessions = SessionManager::builder(connector)
        .session_config(&config.session)
        .default_directories(default_directories)
        .build();

    let dispatcher = Dispatcher::from_config(Arc::new(sessions), &config)
        .with_native(Arc::new(ReqwestFetch::new()));

    let request = build_request(&cli, &config)?;
    let response = dispatcher.fetch(request).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&to_json(&response))?);
    } else {
        print_response(&response);
    }

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn build_request(cli: &Cli, config: &FetchConfig) -> Result<FetchRequest, Box<dyn std::error::Error>> {
    let method = match (&cli.method, &cli.data) {
        (Some(method), _) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())?,
        (None, Some(_)) => Method::POST,
        (None, None) => Method::GET,
    };

    let mut request = FetchRequest::new(method, cli.url.clone())
        .cache_mode(cli.cache_mode)
        .silent(config.session.silent);

    for raw in &cli.headers {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| format!("header '{raw}' is not 'Name: value'"))?;
        request = request.header(
            HeaderName::from_bytes(name.trim().as_bytes())?,
            HeaderValue::from_str(value.trim())?,
        );
    }

    if let Some(data) = &cli.data {
        request = request.body(data.clone());
    }
    if let Some(flock) = &cli.flock {
        request = request.flock(flock.clone());
    }
    if let Some(appliance) = &cli.appliance {
        request = request.appliance(appliance.clone());
    }
    if let Some(persona) = &cli.persona {
        request = request.persona(persona.clone());
    }

    Ok(request)
}

fn print_response(response: &ResponseDescriptor) {
    println!("{} {}", response.status.as_u16(), response.status_text);
    for (name, value) in &response.headers {
        println!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }
    println!();
    println!("{}", response.text());
}

fn to_json(response: &ResponseDescriptor) -> serde_json::Value {
    let headers: Vec<serde_json::Value> = response
        .headers
        .iter()
        .map(|(name, value)| {
            serde_json::json!([name.as_str(), String::from_utf8_lossy(value.as_bytes())])
        })
        .collect();

    serde_json::json!({
        "status": response.status.as_u16(),
        "statusText": response.status_text,
        "headers": headers,
        "body": response.text(),
    })
}
