use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use tagcare_lib::config::{self, AppConfig};
use tagcare_lib::db::SqliteStore;
use tagcare_lib::models::enums::{BloodType, Gender, Severity};
use tagcare_lib::models::{NewMedicalRecord, NewPatient, RecordFilter, RecordUpdate};
use tagcare_lib::service::chat::{available_models, chat_history};
use tagcare_lib::service::{ChatService, PatientService, RecordService, ServiceError};

#[derive(Parser)]
#[command(name = "tagcare")]
#[command(version, about = "TagCare patient records and AI consultation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an NFC tag, provisioning the patient on first scan
    Scan { tag: String },
    /// Register a patient explicitly
    Register {
        tag: String,
        name: String,
        /// Date of birth (YYYY-MM-DD)
        #[arg(long)]
        dob: Option<NaiveDate>,
        #[arg(long)]
        gender: Option<Gender>,
        /// One of A+, A-, B+, B-, AB+, AB-, O+, O-
        #[arg(long)]
        blood_type: Option<BloodType>,
        #[arg(long)]
        emergency_contact: Option<String>,
        #[arg(long, default_value = "")]
        allergies: String,
    },
    /// Show a patient
    Show { patient_id: Uuid },
    /// Actions available for a resolved patient
    Options { patient_id: Uuid },
    /// Delete a patient with all records and chat history
    Delete { patient_id: Uuid },
    /// List a patient's medical records, newest first
    Records {
        patient_id: Uuid,
        /// Case-insensitive substring of the condition
        #[arg(long)]
        condition: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
    },
    /// Add a medical record
    AddRecord {
        patient_id: Uuid,
        #[arg(long)]
        condition: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, default_value = "")]
        treatment: String,
        /// Follow-up date (YYYY-MM-DD)
        #[arg(long)]
        follow_up: Option<NaiveDate>,
        /// Path or storage key of an attached document
        #[arg(long)]
        document: Option<String>,
    },
    /// Edit fields of an existing medical record
    UpdateRecord {
        record_id: Uuid,
        #[arg(long)]
        condition: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        treatment: Option<String>,
        #[arg(long, conflicts_with = "clear_follow_up")]
        follow_up: Option<NaiveDate>,
        /// Remove the follow-up date
        #[arg(long)]
        clear_follow_up: bool,
        #[arg(long, conflicts_with = "clear_document")]
        document: Option<String>,
        /// Detach the document reference
        #[arg(long)]
        clear_document: bool,
    },
    /// Ask the assistant, optionally in the context of a patient
    Chat {
        message: String,
        #[arg(long)]
        patient: Option<Uuid>,
    },
    /// Chat history, newest first
    History {
        #[arg(long)]
        patient: Option<Uuid>,
    },
    /// Models available on the Ollama server
    Models,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tagcare_lib::init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ServiceError>() {
                Some(service_err) => {
                    let body = serde_json::to_string(&service_err.to_body())
                        .unwrap_or_else(|_| service_err.to_string());
                    eprintln!("{body}");
                }
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::debug!("{} v{} using {:?}", config::APP_NAME, config::APP_VERSION, config);

    if let Commands::Models = cli.command {
        return print_json(&available_models(&config).await?);
    }

    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("cannot open {}", config.database_path.display()))?,
    );
    let patients = PatientService::new(store.clone());
    let records = RecordService::new(store.clone());

    match cli.command {
        Commands::Scan { tag } => print_json(&patients.scan_tag(&tag)?),
        Commands::Register {
            tag,
            name,
            dob,
            gender,
            blood_type,
            emergency_contact,
            allergies,
        } => {
            let new = NewPatient {
                nfc_tag: tag,
                name,
                date_of_birth: dob,
                gender: gender.unwrap_or_default(),
                blood_type: blood_type.unwrap_or_default(),
                emergency_contact,
                allergies,
            };
            print_json(&patients.register(new)?)
        }
        Commands::Show { patient_id } => print_json(&patients.get(&patient_id)?),
        Commands::Options { patient_id } => print_json(&patients.options(&patient_id)?),
        Commands::Delete { patient_id } => {
            patients.delete(&patient_id)?;
            print_json(&serde_json::json!({ "deleted": patient_id }))
        }
        Commands::Records {
            patient_id,
            condition,
            severity,
        } => {
            let filter = RecordFilter {
                condition,
                severity,
            };
            print_json(&records.list(&patient_id, &filter)?)
        }
        Commands::AddRecord {
            patient_id,
            condition,
            description,
            severity,
            notes,
            treatment,
            follow_up,
            document,
        } => {
            let new = NewMedicalRecord {
                condition,
                description,
                severity: severity.unwrap_or_default(),
                doctor_notes: notes,
                treatment_plan: treatment,
                follow_up_date: follow_up,
                document_ref: document,
            };
            print_json(&records.create(&patient_id, new)?)
        }
        Commands::UpdateRecord {
            record_id,
            condition,
            description,
            severity,
            notes,
            treatment,
            follow_up,
            clear_follow_up,
            document,
            clear_document,
        } => {
            let update = RecordUpdate {
                condition,
                description,
                severity,
                doctor_notes: notes,
                treatment_plan: treatment,
                follow_up_date: change(follow_up, clear_follow_up),
                document_ref: change(document, clear_document),
            };
            print_json(&records.update(&record_id, update)?)
        }
        Commands::Chat { message, patient } => {
            let chat = ChatService::connect_ollama(store, &config).await?;
            print_json(&chat.handle_chat(message, patient).await?)
        }
        Commands::History { patient } => print_json(&chat_history(store, patient).await?),
        Commands::Models => Ok(()),
    }
}

/// `--clear-*` wins over "leave unchanged"; clap rejects combining it with a value.
fn change<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
