use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use geosiaga::util::csrf::{CsrfSource, HtmlFile};
use geosiaga::{
    ApiClient, ApiError, AuthSession, ClientConfig, ConfigError, FileStore, MemoryStore, Navigator, SessionError,
    SessionStorage, UserPatch,
};
use reqwest::Method;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("not logged in; run `geosiaga login` first")]
    NotLoggedIn,
    #[error("nothing to update; pass at least one field")]
    EmptyPatch,
}

#[derive(Parser, Debug)]
#[command(name = "geosiaga", about = "GeoSiaga API session client")]
struct Cli {
    #[arg(long, env = "GEOSIAGA_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "GEOSIAGA_SESSION_DIR")]
    session_dir: Option<PathBuf>,

    #[arg(long, env = "GEOSIAGA_PAGE_HTML", help = "HTML page carrying the csrf-token meta tag")]
    page_html: Option<PathBuf>,

    #[arg(long, default_value_t = false, help = "Keep the session in memory only")]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "GEOSIAGA_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout {
        #[arg(long, default_value_t = false, help = "Print the login page location after logging out")]
        redirect: bool,
    },
    Whoami,
    Refresh,
    UpdateProfile(UpdateProfileArgs),
    Request {
        method: String,
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
}

#[derive(Args, Debug)]
struct UpdateProfileArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    profile_photo_path: Option<String>,
}

/// Prints the redirect target instead of navigating.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect(&self, location: &str) {
        println!("redirect: {location}");
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let session = build_session(&cli)?;

    match cli.command {
        Command::Login { email, password } => {
            let user = session.login(&email, &password).await?;
            eprintln!("logged in as {} <{}>", user.name, user.email);
            print_json(&serde_json::to_value(&user)?)
        }
        Command::Logout { redirect } => {
            if redirect {
                let notification = session.client().logout(&TerminalNavigator);
                if let Err(err) = notification.await {
                    tracing::warn!(error = %err, "server logout task did not complete");
                }
            } else {
                session.logout().await;
            }
            eprintln!("logged out");
            Ok(())
        }
        Command::Whoami => {
            let user = session.user().ok_or(CliError::NotLoggedIn)?;
            print_json(&serde_json::to_value(&user)?)
        }
        Command::Refresh => {
            let user = session.refresh_user().await?;
            print_json(&serde_json::to_value(&user)?)
        }
        Command::UpdateProfile(args) => {
            let patch = UserPatch {
                name: args.name,
                email: args.email,
                role: None,
                phone: args.phone,
                profile_photo_path: args.profile_photo_path,
            };
            if patch.is_empty() {
                return Err(CliError::EmptyPatch);
            }
            let user = session.update_user(&patch).await?;
            print_json(&serde_json::to_value(&user)?)
        }
        Command::Request { method, path, data } => run_request(session.client(), &method, &path, data).await,
    }
}

fn build_session(cli: &Cli) -> Result<AuthSession, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = geosiaga::config::parse_base_url(base_url)?;
    }
    if let Some(dir) = &cli.session_dir {
        config.session_dir.clone_from(dir);
    }

    let storage = if cli.ephemeral {
        SessionStorage::new(Arc::new(MemoryStore::new()))
    } else {
        SessionStorage::new(Arc::new(FileStore::for_origin(&config.session_dir, &config.base_url)))
    };
    let csrf = cli
        .page_html
        .as_ref()
        .map(|path| Arc::new(HtmlFile::new(path)) as Arc<dyn CsrfSource>);

    let client = ApiClient::new(config, storage, csrf)?;
    Ok(AuthSession::mount(client))
}

async fn run_request(client: &ApiClient, method: &str, path: &str, data: Option<String>) -> Result<(), CliError> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(method.to_owned()))?;
    let body = data.map(|raw| serde_json::from_str::<Value>(&raw)).transpose()?;

    let response = match client.send(method, path, body).await {
        Ok(response) => response,
        Err(err) if err.is_unauthorized() => {
            eprintln!("session rejected by server; stored credentials cleared");
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    match serde_json::from_str::<Value>(&response.body) {
        Ok(value) => print_json(&value),
        Err(_) => {
            println!("{}", response.body);
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
