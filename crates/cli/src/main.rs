use clap::{Parser, Subcommand};
use formentry_core::config::{persist_from_env_value, resolve_form_dir};
use formentry_core::model::{EncounterId, PatientId};
use formentry_core::{
    CoreConfig, DataStore, FormEntrySession, FormRepository, FormSubmission, Mode,
    PatientProgramQuery, PatientRepository, ProgramRepository, SessionOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "formentry")]
#[command(about = "Program enrollment form entry CLI")]
struct Cli {
    /// Dataset YAML file to load
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,
    /// Directory holding form templates (defaults to the nearest forms/ directory)
    #[arg(long, global = true)]
    form_dir: Option<PathBuf>,
    /// Write changes back to the dataset file
    #[arg(long, global = true)]
    persist: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all patients
    ListPatients,
    /// Show a patient's program enrollments
    Enrollments {
        /// Patient id
        patient: u32,
        /// Include voided enrollments
        #[arg(long)]
        include_voided: bool,
    },
    /// List available forms
    Forms,
    /// Render a form and list its widget labels
    Render {
        /// Form name
        form: String,
        /// Patient id
        patient: u32,
        /// Open an existing encounter read-only instead of a new one
        #[arg(long)]
        encounter: Option<u32>,
    },
    /// Fill in and submit a form
    Submit {
        /// Form name
        form: String,
        /// Patient id
        patient: u32,
        /// Widget value as "Label=value"; repeat for each widget
        #[arg(long = "field", value_name = "LABEL=VALUE")]
        fields: Vec<String>,
        /// Edit an existing encounter instead of entering a new one
        #[arg(long)]
        encounter: Option<u32>,
    },
    /// Print the dataset as YAML
    Dump,
}

fn open_session(
    store: &DataStore,
    forms: &FormRepository,
    form: &str,
    patient: u32,
    encounter: Option<(u32, Mode)>,
) -> Result<FormEntrySession, Box<dyn std::error::Error>> {
    let template = forms.load(form)?;
    let options = SessionOptions::new().with_form_name(form);
    let session = match encounter {
        Some((id, mode)) => {
            let session = FormEntrySession::for_encounter(
                store.clone(),
                EncounterId(id),
                mode,
                &template,
                options,
            )?;
            if session.patient() != PatientId(patient) {
                return Err(format!("encounter {id} does not belong to patient {patient}").into());
            }
            session
        }
        None => FormEntrySession::new(store.clone(), PatientId(patient), &template, options)?,
    };
    Ok(session)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let persist = cli.persist || persist_from_env_value(std::env::var("FORMENTRY_PERSIST").ok())?;
    let form_dir = resolve_form_dir(cli.form_dir)?;
    let cfg = Arc::new(CoreConfig::new(form_dir, cli.dataset, persist)?);
    let store = DataStore::open(&cfg)?;
    let forms = FormRepository::new(cfg.clone());

    match cli.command {
        Some(Commands::ListPatients) => {
            let patients = PatientRepository::new(store).list_patients();
            if patients.is_empty() {
                println!("No patients found.");
            } else {
                for patient in patients {
                    println!("ID: {}, Name: {}, UUID: {}", patient.id, patient, patient.uuid);
                }
            }
        }
        Some(Commands::Enrollments {
            patient,
            include_voided,
        }) => {
            let programs = ProgramRepository::new(store);
            let query = PatientProgramQuery {
                include_voided,
                ..PatientProgramQuery::default()
            };
            let enrollments = programs.patient_programs(PatientId(patient), &query);
            if enrollments.is_empty() {
                println!("No enrollments found.");
            }
            for pp in enrollments {
                let program = programs
                    .get_program(pp.program)
                    .map(|p| p.name.to_string())
                    .unwrap_or_else(|| pp.program.to_string());
                let completed = pp
                    .date_completed
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "ID: {}, Program: {}, Enrolled: {}, Completed: {}{}",
                    pp.id,
                    program,
                    pp.date_enrolled,
                    completed,
                    if pp.voided { " (voided)" } else { "" }
                );
                for state in pp.current_states() {
                    println!(
                        "    workflow {}: state {} since {}",
                        state.workflow, state.state, state.start_date
                    );
                }
            }
        }
        Some(Commands::Forms) => {
            for name in forms.list()? {
                println!("{name}");
            }
        }
        Some(Commands::Render {
            form,
            patient,
            encounter,
        }) => {
            let session = open_session(
                &store,
                &forms,
                &form,
                patient,
                encounter.map(|id| (id, Mode::View)),
            )?;
            println!("{}", session.html_to_display());
            for (label, field) in session.widget_fields() {
                eprintln!("{field}\t{label}");
            }
        }
        Some(Commands::Submit {
            form,
            patient,
            fields,
            encounter,
        }) => {
            let session = open_session(
                &store,
                &forms,
                &form,
                patient,
                encounter.map(|id| (id, Mode::Edit)),
            )?;
            let mut submission = FormSubmission::new();
            for entry in &fields {
                let (label, value) = entry
                    .split_once('=')
                    .ok_or_else(|| format!("expected LABEL=VALUE, got '{entry}'"))?;
                let field = session
                    .widget_field(label)
                    .ok_or_else(|| format!("form '{form}' has no widget labelled '{label}'"))?;
                submission.add_parameter(field, value);
            }

            let results = session.submit(&submission)?;
            if results.has_errors() {
                for error in results.errors() {
                    eprintln!("{}: {}", error.field, error.message);
                }
                return Err("submission rejected".into());
            }
            match results.encounter_id() {
                Some(id) if results.encounter_created() => println!("Created encounter {id}"),
                Some(id) => println!("Updated encounter {id}"),
                None => println!("Submitted without an encounter"),
            }
            for id in results.enrolled() {
                println!("Created enrollment {id}");
            }
        }
        Some(Commands::Dump) => {
            print!("{}", store.render()?);
        }
        None => {
            println!("No command given. Use --help for usage.");
        }
    }

    Ok(())
}
