//! Chit Chat server binary.
//!
//! Wires the auth, registration, reset, and chat services to PostgreSQL and
//! SMTP, then serves the HTTP/WebSocket API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};

use chitchat::auth::{AuthManager, RegistrationManager, ResetManager, TokenSigner};
use chitchat::db::{Database, PgMessageRepository, PgSessionRepository, PgUserRepository};
use chitchat::mail::SmtpMailer;
use chitchat::{PresenceIndex, SessionStore};

mod api;
mod config;
mod logging;
mod metrics;

use config::ServerConfig;

const HELP: &str = "\
usage: cc_server [OPTIONS]

Messaging backend with OTP-driven registration, single-device sessions,
and a WebSocket chat endpoint.

Options:
  -h, --help            Print help information
  --bind ADDR           Server bind address (default: 127.0.0.1:3000)
  --db-url URL          PostgreSQL connection URL

Environment:
  SERVER_BIND           Bind address (overridden by --bind)
  DATABASE_URL          PostgreSQL URL (overridden by --db-url)
  JWT_SECRET            Token signing secret, at least 32 chars (required)
  PASSWORD_PEPPER       Server-side password pepper, at least 16 chars (required)
  SMTP_HOST             Outbound mail relay host
  SMTP_PORT             Outbound mail relay port (default: 465)
  SMTP_USER             Mail relay username
  SMTP_PASS             Mail relay password
  MAIL_FROM             From address for outbound mail
  METRICS_BIND          Optional Prometheus scrape address
  DEV_ROUTES            Expose development-only routes when set to 1/true
  RUST_LOG              Log filter (default: info)
";

struct Args {
    bind: Option<SocketAddr>,
    db_url: Option<String>,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        db_url: pargs.opt_value_from_str("--db-url")?,
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        eprintln!("unrecognized arguments: {remaining:?}");
        std::process::exit(1);
    }

    Ok(args)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Catching signals for exit.
    ctrlc::set_handler(|| std::process::exit(0))?;

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.db_url)?;
    config.validate()?;

    if let Ok(metrics_bind) = std::env::var("METRICS_BIND") {
        let addr: SocketAddr = metrics_bind
            .parse()
            .with_context(|| format!("invalid METRICS_BIND address: {metrics_bind}"))?;
        match metrics::init_metrics(addr) {
            Ok(()) => info!(%addr, "Prometheus metrics exporter listening"),
            Err(e) => warn!("metrics exporter disabled: {e}"),
        }
    }

    let db = Database::new(&config.database)
        .await
        .context("failed to connect to PostgreSQL")?;
    db.migrate().await.context("failed to apply migrations")?;
    info!("database ready");

    let pool = db.pool().clone();

    let users = Arc::new(PgUserRepository::new(pool.clone()));
    let sessions = SessionStore::new(Arc::new(PgSessionRepository::new(pool.clone())));
    let messages = Arc::new(PgMessageRepository::new(pool.clone()));

    let tokens = TokenSigner::new(config.security.jwt_secret.clone());
    let mailer: Arc<dyn chitchat::mail::MailDispatcher> = Arc::new(SmtpMailer::new(&config.mail)?);
    let pepper = config.security.password_pepper.clone();

    let state = api::AppState {
        auth: Arc::new(AuthManager::new(
            users.clone(),
            sessions.clone(),
            tokens.clone(),
            mailer.clone(),
            pepper.clone(),
        )),
        registration: Arc::new(RegistrationManager::new(
            users.clone(),
            mailer.clone(),
            pepper.clone(),
        )),
        reset: Arc::new(ResetManager::new(users, mailer, pepper)),
        sessions,
        tokens,
        presence: Arc::new(PresenceIndex::new()),
        messages,
        pool: Arc::new(pool),
        dev_routes: config.dev_routes,
    };

    let router = api::create_router(state);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(addr = %config.bind, "server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}
