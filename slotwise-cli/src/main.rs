//! Slotwise command-line harness
//!
//! Runs the app's data layer outside the device: reads go through the same
//! cache and gateway the screens use, and failures print the message a
//! practitioner would see.
//!
//! Usage:
//!   slotwise --config slotwise.json clients --status active
//!   slotwise session set <token> --user <practitioner-id>
//!   slotwise book --client <id> --title "Intake" --starts 2026-02-01T09:00:00Z

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use slotwise_cli::{
    AppConfig, Overrides, booking, format_appointment, format_appointment_row, format_client,
    format_client_details, settled_result,
};
use slotwise_gateway::{AuthSession, RestGateway, SchedulingQueries, SessionStore};
use slotwise_query::{QueryClient, QueryError, handle_query_error};
use slotwise_types::{AppointmentId, ClientFilters, ClientId, ClientStatus, PractitionerId};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "slotwise")]
#[command(about = "Slotwise scheduling data from the command line")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long, env = "SLOTWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Backend project URL
    #[arg(long, env = "SLOTWISE_BASE_URL")]
    base_url: Option<String>,

    /// Backend API key
    #[arg(long, env = "SLOTWISE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// File that keeps the signed-in session between runs
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List clients
    Clients {
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Match against first name, last name or email
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one client and their upcoming appointments
    Client { id: ClientId },
    /// List appointments, soonest first
    Appointments,
    /// Show one appointment
    Appointment { id: AppointmentId },
    /// Book an appointment for the signed-in practitioner
    Book {
        #[arg(long)]
        client: ClientId,
        #[arg(long)]
        title: String,
        /// Start time (RFC 3339)
        #[arg(long)]
        starts: DateTime<Utc>,
        #[arg(long, default_value_t = 60)]
        minutes: i64,
        #[arg(long)]
        location: Option<String>,
    },
    /// Manage the stored session
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Store an access token issued by the identity provider
    Set {
        token: String,
        /// Practitioner the token belongs to
        #[arg(long)]
        user: PractitionerId,
        /// Minutes until the token expires
        #[arg(long)]
        expires_in: Option<i64>,
    },
    /// Show who is signed in
    Show,
    /// Sign out
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
    Active,
    Inactive,
    Archived,
}

impl From<StatusArg> for ClientStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Active => ClientStatus::Active,
            StatusArg::Inactive => ClientStatus::Inactive,
            StatusArg::Archived => ClientStatus::Archived,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = AppConfig::load_or_default(args.config.as_deref())?.with_overrides(Overrides {
        base_url: args.base_url,
        api_key: args.api_key,
        session_file: args.session_file,
    });
    let sessions = config.session_store();

    if let Command::Session(command) = args.command {
        return run_session(&config, &sessions, command).await;
    }

    let gateway = RestGateway::new(config.gateway.clone(), sessions.clone())
        .context("cannot reach the backend with this configuration")?;
    let queries = SchedulingQueries::new(QueryClient::new(config.cache.clone()), Arc::new(gateway));

    let outcome = match args.command {
        Command::Clients { status, search } => {
            let filters = ClientFilters {
                status: status.map(ClientStatus::from),
                search,
            };
            settled_result(queries.clients(filters).settled().await).map(|clients| {
                for client in &clients {
                    println!("{}", format_client(client));
                }
                info!("{} clients", clients.len());
            })
        }
        Command::Client { id } => settled_result(queries.client(Some(id)).settled().await)
            .map(|details| {
                for line in format_client_details(&details, Utc::now()) {
                    println!("{line}");
                }
            }),
        Command::Appointments => {
            settled_result(queries.appointments().settled().await).map(|rows| {
                for row in &rows {
                    println!("{}", format_appointment_row(row));
                }
                info!("{} appointments", rows.len());
            })
        }
        Command::Appointment { id } => {
            settled_result(queries.appointment(Some(id)).settled().await)
                .map(|appointment| println!("{}", format_appointment(&appointment)))
        }
        Command::Book {
            client,
            title,
            starts,
            minutes,
            location,
        } => {
            let Some(session) = sessions.current().await? else {
                bail!("not signed in; run `slotwise session set <token> --user <id>` first");
            };
            let input = booking(client, title, starts, minutes, location)?;
            queries
                .create_appointment(session.user_id)
                .mutate(input)
                .await
                .map(|appointment| println!("{}", format_appointment(&appointment)))
        }
        Command::Session(_) => Ok(()),
    };

    Ok(match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    })
}

async fn run_session(
    config: &AppConfig,
    sessions: &SessionStore,
    command: SessionCommand,
) -> Result<ExitCode> {
    match command {
        SessionCommand::Set {
            token,
            user,
            expires_in,
        } => {
            if config.session_file.is_none() {
                bail!("--session-file is required to store a session");
            }
            sessions
                .save(&AuthSession {
                    access_token: token,
                    refresh_token: None,
                    user_id: user,
                    expires_at: expires_in.map(|m| Utc::now() + Duration::minutes(m)),
                })
                .await?;
            println!("Signed in as {user}");
        }
        SessionCommand::Show => match sessions.load().await? {
            Some(session) if session.is_expired(Utc::now()) => {
                println!("Session for {} has expired", session.user_id);
            }
            Some(session) => println!("Signed in as {}", session.user_id),
            None => println!("Not signed in"),
        },
        SessionCommand::Clear => {
            sessions.clear().await?;
            println!("Signed out");
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints what a practitioner would see; the raw error only goes to the log.
fn report(err: &QueryError) -> ExitCode {
    debug!(status = ?err.status, code = ?err.code, "Command failed: {}", err.message);
    if let Some(message) = handle_query_error(Some(err)) {
        eprintln!("{message}");
    }
    ExitCode::FAILURE
}
