use api_shared::auth::REQUIRED_PERMISSIONS;
use clap::{Parser, Subcommand};
use hmis_core::rbac::{unreachable_permissions, Permission};
use hmis_core::repositories::appointments::AppointmentService;
use hmis_core::repositories::patients::PatientService;
use hmis_core::repositories::wounds::WoundService;
use hmis_core::export::ExportService;
use hmis_core::{seed, CoreConfig, EventBus, Store};

#[derive(Parser)]
#[command(name = "hmis")]
#[command(about = "Hospital management system CLI")]
struct Cli {
    /// Path to the SQLite database (defaults to HMIS_DB_PATH or hmis.sqlite3)
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed reference data and demo staff accounts
    Seed,
    /// Check that every guarded route's permission is reachable
    ValidateRbac,
    /// Print patient, wound and appointment statistics
    Stats,
    /// Dump the patient register as CSV to stdout
    ExportPatients,
    /// Dump wound cases with billing as CSV to stdout
    ExportWounds,
    /// List registered patients
    List,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let cfg = CoreConfig::from_env_values(
        cli.db.or_else(|| std::env::var("HMIS_DB_PATH").ok()),
        std::env::var("HMIS_FACILITY_NAME").ok(),
    )?;
    let store = Store::open(cfg.db_path())?;

    match cli.command {
        Commands::Seed => {
            let report = seed::run(&store)?;
            println!(
                "Seeded {} departments, {} wound types, {} lab tests, {} drugs, {} services.",
                report.departments,
                report.wound_types,
                report.lab_tests,
                report.drugs,
                report.services,
            );
            if report.accounts.is_empty() {
                println!("No new accounts (already seeded).");
            } else {
                println!("Created accounts (passwords shown once, store them now):");
                for account in &report.accounts {
                    println!(
                        "  {:20} {:10} role={:13} password={}",
                        account.username, account.employee_id, account.role, account.password
                    );
                }
            }
        }
        Commands::ValidateRbac => {
            let required: Vec<Permission> =
                REQUIRED_PERMISSIONS.iter().map(|(_, p)| *p).collect();
            let orphans = unreachable_permissions(&required);
            if orphans.is_empty() {
                println!(
                    "OK: all {} guarded routes reachable.",
                    REQUIRED_PERMISSIONS.len()
                );
            } else {
                eprintln!("Unreachable permissions: {orphans:?}");
                std::process::exit(1);
            }
        }
        Commands::Stats => {
            let bus = EventBus::new();
            let patients = PatientService::new(store.clone()).stats()?;
            let wounds = WoundService::new(store.clone(), bus.clone()).stats()?;
            let appointments = AppointmentService::new(store, bus).stats()?;
            println!(
                "Patients:     {} total, {} active ({} M / {} F), {} registered this month",
                patients.total, patients.active, patients.male, patients.female,
                patients.registered_this_month
            );
            println!(
                "Wound cases:  {} total, {} active, {} healing, {} resolved, {} assessed in the last 30 days",
                wounds.total, wounds.active, wounds.healing, wounds.resolved, wounds.recent
            );
            println!(
                "Appointments: {} total, {} today, {} upcoming, {} completed",
                appointments.total, appointments.today, appointments.upcoming, appointments.completed
            );
        }
        Commands::ExportPatients => {
            let wounds = WoundService::new(store.clone(), EventBus::new());
            print!("{}", ExportService::new(store, wounds).patients_csv()?);
        }
        Commands::ExportWounds => {
            let wounds = WoundService::new(store.clone(), EventBus::new());
            print!("{}", ExportService::new(store, wounds).wound_cases_csv()?);
        }
        Commands::List => {
            let patients = PatientService::new(store).list(false)?;
            if patients.is_empty() {
                println!("No patients found.");
            } else {
                for patient in patients {
                    println!(
                        "{:10} {:30} {:3} {}",
                        patient.medical_record_number,
                        patient.full_name(),
                        patient.age(),
                        patient.registration_date
                    );
                }
            }
        }
    }

    Ok(())
}
