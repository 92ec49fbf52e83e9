use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use register_core::constants::DEFAULT_DATABASE_PATH;
use register_core::synonyms::{StaticSynonymProvider, SynonymProvider, YamlSynonymProvider};
use register_core::{
    CallerId, CoreConfig, DateChange, EmailAddress, IdempotencyKey, PersonInclude, RecordUuid,
    RegisterError, RegisterServices, RegistrationRequest, RequestId, Trn,
};
use register_store_sqlite::{SqliteRegister, SqliteStoreConfig};

#[derive(Parser)]
#[command(name = "register")]
#[command(about = "Teacher register identity and status CLI")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "REGISTER_DB_PATH", default_value = DEFAULT_DATABASE_PATH)]
    db: PathBuf,
    /// YAML mapping of first name to synonyms (optional)
    #[arg(long, env = "REGISTER_SYNONYMS_FILE")]
    synonyms: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Submit a registration
    Submit {
        /// Calling system
        #[arg(long)]
        caller: String,
        /// Caller-assigned request id
        #[arg(long)]
        request: String,
        first_name: String,
        last_name: String,
        /// Date of birth (YYYY-MM-DD)
        date_of_birth: String,
        #[arg(long, default_value = "")]
        middle_name: String,
        /// May be repeated
        #[arg(long = "email")]
        emails: Vec<String>,
        #[arg(long)]
        national_id: Option<String>,
    },
    /// Show the recorded outcome of a registration
    Outcome {
        caller: String,
        request: String,
    },
    /// Set (or with --clear, clear) a person's status-defining date
    StatusDate {
        /// Person id (32 lowercase hex characters)
        person_id: String,
        /// Date (YYYY-MM-DD)
        #[arg(required_unless_present = "clear", conflicts_with = "clear")]
        date: Option<String>,
        #[arg(long)]
        clear: bool,
    },
    /// Look up a person by TRN
    Lookup {
        trn: String,
        /// Comma-separated: induction, qualifying_events, stated_names
        #[arg(long)]
        include: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("register_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'register --help' for commands");
        return Ok(());
    };

    let store = SqliteRegister::open(SqliteStoreConfig::new(&cli.db))
        .with_context(|| format!("opening {}", cli.db.display()))?;
    let synonyms: Arc<dyn SynonymProvider> = match cli.synonyms {
        Some(path) => Arc::new(YamlSynonymProvider::new(path)),
        None => Arc::new(StaticSynonymProvider::new(HashMap::new())),
    };
    let services = RegisterServices::new(Arc::new(CoreConfig::default()), store.ports(synonyms));

    match command {
        Commands::Submit {
            caller,
            request,
            first_name,
            last_name,
            date_of_birth,
            middle_name,
            emails,
            national_id,
        } => {
            let request = RegistrationRequest {
                key: IdempotencyKey::new(CallerId::new(caller)?, RequestId::new(request)?),
                first_name,
                middle_name,
                last_name,
                date_of_birth: parse_date(&date_of_birth)?,
                emails: emails
                    .iter()
                    .map(EmailAddress::parse)
                    .collect::<Result<_, _>>()?,
                national_id,
            };
            match services.registration.submit(request).await {
                Ok(outcome) => print_json(&outcome)?,
                Err(RegisterError::DuplicateSubmission(record)) => {
                    eprintln!("Already processed; recorded outcome:");
                    print_json(&record.outcome)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Outcome { caller, request } => {
            let key = IdempotencyKey::new(CallerId::new(caller)?, RequestId::new(request)?);
            match services.registration.outcome(&key).await? {
                Some(record) => print_json(&record)?,
                None => println!("No registration recorded for {key}"),
            }
        }
        Commands::StatusDate {
            person_id,
            date,
            clear,
        } => {
            let person_id = RecordUuid::parse(&person_id)?;
            let change = match (clear, date) {
                (true, _) | (false, None) => DateChange::Clear,
                (false, Some(raw)) => DateChange::Set(parse_date(&raw)?),
            };
            let outcome = services
                .status_dates
                .apply_status_date(person_id, change)
                .await?;
            print_json(&outcome)?;
        }
        Commands::Lookup { trn, include } => {
            let includes = match include {
                Some(raw) => PersonInclude::parse_list(&raw)?,
                None => Vec::new(),
            };
            let view = services.lookup.get(&Trn::parse(&trn)?, &includes).await?;
            print_json(&view)?;
        }
    }

    Ok(())
}

fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("expected a YYYY-MM-DD date, got '{raw}'"))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
