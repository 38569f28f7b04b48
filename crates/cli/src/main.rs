use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use vpr_forms_core::config::config_from_env_values;
use vpr_forms_core::memory::InMemoryRecordStore;
use vpr_forms_core::sample_form::{sample_entities, sample_session};
use vpr_forms_core::services::{Clock, FixedClock, StaticPreferences, SystemClock};
use vpr_forms_core::{Encounter, FormEntrySession, FormServices, Mode, Submission, SubmissionOutcome};
use vpr_types::PatientId;

#[derive(Parser)]
#[command(name = "vpr-forms")]
#[command(about = "Render and submit the VPR demo clinical form")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args)]
struct FormArgs {
    /// VIEW, ENTER or EDIT
    #[arg(long, default_value = "ENTER")]
    mode: Mode,
    /// Encounter JSON to view or edit
    #[arg(long)]
    encounter: Option<PathBuf>,
    /// Patient identifier for new encounters
    #[arg(long, default_value_t = 1)]
    patient: u32,
    /// Pin the clock (RFC 3339), for reproducible output
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the form markup
    Render {
        #[command(flatten)]
        form: FormArgs,
    },
    /// Validate a submission without applying it
    Validate {
        #[command(flatten)]
        form: FormArgs,
        /// Submitted fields as key=value
        fields: Vec<String>,
    },
    /// Submit the form and print the resulting encounter
    Submit {
        #[command(flatten)]
        form: FormArgs,
        /// Submitted fields as key=value
        fields: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Render { form }) => {
            let session = open_session(&form)?;
            println!("{}", session.render()?);
        }
        Some(Commands::Validate { form, fields }) => {
            let session = open_session(&form)?;
            let errors = session.validate(&parse_fields(&fields)?)?;
            if errors.is_empty() {
                println!("Submission is valid.");
            } else {
                for error in errors {
                    println!("{}: {}", error.field, error.message_key);
                }
            }
        }
        Some(Commands::Submit { form, fields }) => {
            let mut session = open_session(&form)?;
            match session.submit(parse_fields(&fields)?)? {
                SubmissionOutcome::Applied(encounter) => {
                    println!("{}", serde_json::to_string_pretty(&encounter)?);
                }
                SubmissionOutcome::Rejected { errors, .. } => {
                    let errors: Vec<_> = errors
                        .iter()
                        .map(|e| serde_json::json!({ "field": e.field, "message": e.message_key }))
                        .collect();
                    eprintln!("{}", serde_json::to_string_pretty(&errors)?);
                    std::process::exit(1);
                }
            }
        }
        None => {
            println!("Use 'vpr-forms --help' for commands");
        }
    }

    Ok(())
}

fn open_session(form: &FormArgs) -> anyhow::Result<FormEntrySession> {
    let config = config_from_env_values(
        std::env::var("VPR_FORMS_DATE_FORMAT").ok(),
        std::env::var("VPR_FORMS_DATETIME_FORMAT").ok(),
        std::env::var("VPR_FORMS_DEFAULT_OFFSET").ok(),
        std::env::var("VPR_FORMS_TIMEZONE_CONVERSIONS").ok(),
    )?;

    let existing = match &form.encounter {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let encounter: Encounter = serde_json::from_str(&raw)
                .with_context(|| format!("parsing encounter from {}", path.display()))?;
            Some(encounter)
        }
        None => None,
    };
    let patient = existing
        .as_ref()
        .map(|e| e.patient)
        .unwrap_or(PatientId(form.patient));

    let store = Arc::new(InMemoryRecordStore::new());
    if let Some(encounter) = &existing {
        store.save(encounter.clone());
    }
    let clock: Arc<dyn Clock> = match form.now {
        Some(now) => Arc::new(FixedClock(now)),
        None => Arc::new(SystemClock),
    };
    let services = FormServices::new(
        store,
        Arc::new(sample_entities()),
        Arc::new(StaticPreferences::new(None)),
        clock,
    );

    Ok(sample_session(form.mode, Arc::new(config), services, patient, existing)?)
}

fn parse_fields(fields: &[String]) -> anyhow::Result<Submission> {
    let mut submission = Submission::new();
    for field in fields {
        let (key, value) = field
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{field}'"))?;
        submission.add(key, value);
    }
    Ok(submission)
}
