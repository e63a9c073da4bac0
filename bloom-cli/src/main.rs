//! bloom-cli — command-line client for the Bloom assessment session server
//!
//! Talks to `bloom-server` over its JSON API; handy for support staff and for
//! scripting checks against a running deployment.
//!
//! # Subcommands
//! - `status`                                   — show server health
//! - `create --name <n> --age <a> --gender <g>` — issue a session id
//! - `save <session> <col=value>...`            — partial column update
//! - `finalize <session> [--media col=url]...`  — mark a session complete
//! - `show <session>`                           — print the session row
//! - `list [--json]`                            — list sessions, newest first

use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "bloom-cli",
    version,
    about = "Bloom assessment sessions — command-line client"
)]
struct Cli {
    /// Bloom HTTP server URL (overrides BLOOM_HTTP_URL env var)
    #[arg(long, env = "BLOOM_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "BLOOM_HTTP_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show Bloom server status
    Status,

    /// Create a session for a child and print its id
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        age: i32,

        #[arg(long)]
        gender: String,
    },

    /// Write columns of a session row
    Save {
        session: String,

        /// Assignments like `test1_q1=1` or `test2_audio1=https://...`
        #[arg(required = true, value_parser = parse_assignment)]
        fields: Vec<(String, Value)>,
    },

    /// Store media URLs and mark a session complete
    Finalize {
        session: String,

        /// Media columns like `video_link=https://...`
        #[arg(long = "media", value_parser = parse_assignment)]
        media: Vec<(String, Value)>,
    },

    /// Print one session row as JSON
    Show { session: String },

    /// List sessions, newest first
    List {
        /// Print the raw JSON array
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

/// One row of GET /assessments
#[derive(Debug, Deserialize)]
pub struct AssessmentSummary {
    pub id: String,
    pub child_name: String,
    pub gender: String,
    pub age: i32,
    pub report_url: Option<String>,
    pub created_at: String,
}

// ============================================================================
// Argument helpers
// ============================================================================

/// Parses `column=value`. Integers and `null` keep their JSON type; anything
/// else is sent as a string.
pub fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected column=value, got {raw:?}"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("missing column name in {raw:?}"));
    }
    let value = if value == "null" {
        Value::Null
    } else if let Ok(n) = value.parse::<i64>() {
        Value::from(n)
    } else {
        Value::String(value.to_string())
    };
    Ok((column.to_string(), value))
}

fn to_object(fields: Vec<(String, Value)>) -> Map<String, Value> {
    fields.into_iter().collect()
}

/// One human-readable line of the session listing.
pub fn format_summary(s: &AssessmentSummary) -> String {
    let date = s.created_at.get(..19).unwrap_or(&s.created_at);
    format!(
        "{}  {:<20} {:>3}  {:<8} {}",
        s.id,
        s.child_name,
        s.age,
        s.gender,
        if s.report_url.is_some() { date.to_string() + "  report" } else { date.to_string() }
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?)
}

/// Sends a request and returns the JSON body, exiting on transport or HTTP errors.
fn call(req: reqwest::blocking::RequestBuilder, url: &str) -> Value {
    let resp = match req.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("bloom-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body: Value = resp.json().unwrap_or_default();
        let message = body["error"].as_str().unwrap_or("no details");
        eprintln!("bloom-cli: server returned {}: {}", status, message);
        std::process::exit(1);
    }

    match resp.json() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("bloom-cli: failed to parse response: {}", e);
            std::process::exit(1);
        }
    }
}

/// Show the server status by calling GET /health.
fn do_status(http: &Client, server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = http.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: Value = r.json().unwrap_or_default();
            println!("Bloom server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:        {}", body["store"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("bloom-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("bloom-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn do_create(
    http: &Client,
    server: &str,
    name: &str,
    age: i32,
    gender: &str,
) -> anyhow::Result<()> {
    let url = format!("{}/session/create", server);
    let body = serde_json::json!({ "name": name, "age": age, "gender": gender });
    let resp = call(http.post(&url).json(&body), &url);
    println!("{}", resp["sessionId"].as_str().unwrap_or_default());
    Ok(())
}

fn do_save(
    http: &Client,
    server: &str,
    session: &str,
    fields: Vec<(String, Value)>,
) -> anyhow::Result<()> {
    let url = format!("{}/session/save", server);
    let count = fields.len();
    let body = serde_json::json!({ "sessionId": session, "payload": to_object(fields) });
    call(http.post(&url).json(&body), &url);
    println!("Saved {} column(s) to {}", count, session);
    Ok(())
}

fn do_finalize(
    http: &Client,
    server: &str,
    session: &str,
    media: Vec<(String, Value)>,
) -> anyhow::Result<()> {
    let url = format!("{}/session/finalize", server);
    let body = serde_json::json!({ "sessionId": session, "media": to_object(media) });
    call(http.post(&url).json(&body), &url);
    println!("Finalized {}", session);
    Ok(())
}

fn do_show(http: &Client, server: &str, session: &str) -> anyhow::Result<()> {
    let url = format!("{}/session/{}", server, session);
    let row = call(http.get(&url), &url);
    println!("{}", serde_json::to_string_pretty(&row)?);
    Ok(())
}

fn do_list(http: &Client, server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/assessments", server);
    let body = call(http.get(&url), &url);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let rows: Vec<AssessmentSummary> = serde_json::from_value(body)?;
    if rows.is_empty() {
        eprintln!("No assessments yet");
        return Ok(());
    }
    for row in &rows {
        println!("{}", format_summary(row));
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let http = match client(cli.timeout) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("bloom-cli: cannot build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Status => do_status(&http, &server),
        Commands::Create { name, age, gender } => do_create(&http, &server, &name, age, &gender),
        Commands::Save { session, fields } => do_save(&http, &server, &session, fields),
        Commands::Finalize { session, media } => do_finalize(&http, &server, &session, media),
        Commands::Show { session } => do_show(&http, &server, &session),
        Commands::List { json } => do_list(&http, &server, json),
    };

    if let Err(e) = result {
        eprintln!("bloom-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
