use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use reqwest::Method;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pawcare_client::auth::{CredentialStore, SqliteStore};
use pawcare_client::config::{CliArgs, Config};
use pawcare_client::navigation::{LoginPrompt, Redirector};
use pawcare_client::notify::NotificationCenter;
use pawcare_client::transport::ReqwestTransport;
use pawcare_client::{ApiClient, ApiRequest, ApiResponse, MultipartPart};

/// PawCare command-line client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session
    Login {
        /// Account email
        #[arg(short, long)]
        email: Option<String>,

        /// Account password (prompted when omitted)
        #[arg(short, long, env = "PAWCARE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the stored session
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Send an authenticated request
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,

        /// API path, e.g. /pets
        path: String,

        /// JSON body
        #[arg(short, long)]
        json: Option<String>,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_val)]
        query: Vec<(String, String)>,

        /// Timeout for this call in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Upload a file as multipart form data
    Upload {
        /// API path, e.g. /pets/3/photo
        path: String,

        /// File to upload
        file: PathBuf,

        /// Form field name
        #[arg(short, long, default_value = "file")]
        field: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_args(&cli.args)?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(api = %config.api_base_url, "Configuration loaded");

    let client = build_client(&config)?;

    // Surface notifications on stderr
    let mut notifications = client.notifications().subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            eprintln!("⚠️  {}", notification.message);
        }
    });

    let result = run(&client, cli.command).await;

    // Let a scheduled login redirect fire before exiting
    if let Some(handle) = client.redirector().pending() {
        if !handle.is_cancelled() && !handle.has_fired() {
            tokio::time::sleep(handle.delay() + Duration::from_millis(50)).await;
        }
    }

    result
}

fn build_client(config: &Config) -> Result<ApiClient> {
    let store = SqliteStore::open(&config.session_file)?;
    tracing::debug!(path = %config.session_file.display(), "Session store opened");

    let transport = ReqwestTransport::new(
        &config.api_base_url,
        config.http_max_connections,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?;

    Ok(ApiClient::new(
        Arc::new(transport),
        CredentialStore::new(Arc::new(store)),
        Arc::new(NotificationCenter::new()),
        Redirector::new(Arc::new(LoginPrompt)),
        config.client_settings(),
    ))
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let email = match email {
                Some(email) => email,
                None => Input::new()
                    .with_prompt("Email")
                    .interact_text()
                    .context("Failed to read email")?,
            };
            let password = match password {
                Some(password) => password,
                None => Password::new()
                    .with_prompt("Password")
                    .interact()
                    .context("Failed to read password")?,
            };

            let user = client.login(&email, &password).await?;
            println!(
                "✅ Logged in as {} ({})",
                user.nickname.as_deref().unwrap_or(&user.email),
                user.email
            );
        }

        Command::Logout => {
            client.logout()?;
            println!("👋 Logged out");
        }

        Command::Whoami => match client.current_user()? {
            Some(user) => {
                println!("{}", serde_json::to_string_pretty(&user)?);
                println!("Session: {:?}", client.session_state()?);
            }
            None => println!("Not logged in"),
        },

        Command::Request {
            method,
            path,
            json,
            query,
            timeout,
        } => {
            let method: Method = method
                .to_uppercase()
                .parse()
                .with_context(|| format!("Invalid HTTP method: {}", method))?;

            let mut request = ApiRequest::new(method, path);
            for (key, value) in query {
                request = request.query(key, value);
            }
            if let Some(json) = json {
                let body: serde_json::Value =
                    serde_json::from_str(&json).context("--json is not valid JSON")?;
                request = request.json(&body)?;
            }
            if let Some(secs) = timeout {
                request = request.timeout(Duration::from_secs(secs));
            }

            let response = client.send(request).await?;
            print_response(&response);
        }

        Command::Upload { path, file, field } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let mime = guess_mime(&file_name);

            let request = ApiRequest::post(path).multipart(vec![MultipartPart::file(
                field, file_name, mime, data,
            )]);

            let response = client.send(request).await?;
            print_response(&response);
        }
    }

    Ok(())
}

fn print_response(response: &ApiResponse) {
    match response.json::<serde_json::Value>() {
        Ok(value) => println!(
            "{}",
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| response.text())
        ),
        Err(_) => println!("{}", response.text()),
    }
}

/// Parse a key=value pair
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{}`", s))?;
    Ok((key.to_string(), value.to_string()))
}

/// MIME type from the file extension
fn guess_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
