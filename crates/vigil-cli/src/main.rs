//! `vigil` command-line front end.
//!
//! Reads `vigil.toml` (or the path given with `--config`), opens the SQLite
//! store it names, and runs one command against the ledger. Results are
//! printed to stdout as JSON; logs go to stderr.
//!
//! ```text
//! vigil patient add P1 James Smith --gender male --age 54
//! vigil test add 718-7 Hemoglobin --units g/dL --after 1,0,0
//! vigil record "James Smith" Hemoglobin 8.2 --at "05.08.2024 09:00"
//! vigil value P1 718-7 "05.08.2024 09:00" --pov "05.08.2024 09:12"
//! vigil states "05.08.2024 10:00"
//! vigil intervals Treatment --patient P1
//! ```

mod config;
mod output;
mod parse;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use vigil_core::{
  Ledger,
  directory::{Gender, Patient, TestDefinition},
  observation::{NewObservation, PatientId, TestCode, Value},
  query::{ValidTarget, parse_instant},
  snapshot::StateDimension,
  window::ValidityWindow,
};
use vigil_rules::RuleTable;
use vigil_store_sqlite::SqliteStore;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "vigil", author, version, about = "Bitemporal clinical observation store")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "vigil.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Manage the patient directory.
  #[command(subcommand)]
  Patient(PatientCommand),

  /// Manage tests and their validity windows.
  #[command(subcommand)]
  Test(TestCommand),

  /// Record a new measurement.
  Record {
    patient: String,
    test:    String,
    #[arg(value_parser = parse::value)]
    value:   Value,
    /// When the measurement was taken.
    #[arg(long, value_parser = parse_instant)]
    at:       DateTime<Utc>,
    /// When it was entered; defaults to now.
    #[arg(long, value_parser = parse_instant)]
    recorded: Option<DateTime<Utc>>,
  },

  /// The value visible at a point of view.
  Value {
    patient: String,
    test:    String,
    /// An instant, or a date meaning the whole day.
    target:  ValidTarget,
    /// Defaults to the end of the target's day.
    #[arg(long, value_parser = parse_instant)]
    pov:     Option<DateTime<Utc>>,
  },

  /// Every recorded version in a valid-time range, retractions included.
  History {
    patient: String,
    test:    String,
    #[arg(long)]
    from:    Option<ValidTarget>,
    #[arg(long)]
    to:      ValidTarget,
  },

  /// Record a corrected value for an existing measurement.
  Update {
    patient: String,
    test:    String,
    #[arg(value_parser = parse_instant)]
    valid:   DateTime<Utc>,
    #[arg(value_parser = parse::value)]
    value:   Value,
    /// Transaction time of the correction; defaults to now.
    #[arg(long, value_parser = parse_instant)]
    at:      Option<DateTime<Utc>>,
  },

  /// Retract the currently visible version of a measurement.
  Delete {
    patient: String,
    test:    String,
    #[arg(value_parser = parse_instant)]
    valid:   DateTime<Utc>,
  },

  /// The readings that feed classification at an instant.
  Snapshot {
    patient: String,
    #[arg(value_parser = parse_instant)]
    at:      DateTime<Utc>,
    /// Ignore readings recorded after the instant.
    #[arg(long)]
    use_pov: bool,
  },

  /// Derived states at an instant, for one patient or everyone.
  States {
    #[arg(value_parser = parse_instant)]
    at:      DateTime<Utc>,
    #[arg(long)]
    patient: Option<String>,
    /// Overrides `use_pov_for_states` from the configuration.
    #[arg(long)]
    use_pov: Option<bool>,
  },

  /// The intervals during which each value of a dimension held.
  Intervals {
    dimension: String,
    #[arg(long)]
    patient:   Option<String>,
  },

  /// Validity windows of a patient's live measurements.
  Coverage {
    patient: String,
    #[arg(long)]
    merged:  bool,
  },
}

#[derive(Subcommand)]
enum PatientCommand {
  Add {
    id:     String,
    first:  String,
    last:   String,
    #[arg(long)]
    gender: Option<Gender>,
    #[arg(long)]
    age:    Option<u32>,
  },
  List,
}

#[derive(Subcommand)]
enum TestCommand {
  Add {
    code:   String,
    name:   String,
    #[arg(long)]
    units:  Option<String>,
    /// How long before the measurement it already holds, as `days,hours,minutes`.
    #[arg(long, value_parser = parse::duration, default_value = "0,0,0")]
    before: TimeDelta,
    /// How long after the measurement it still holds.
    #[arg(long, value_parser = parse::duration, default_value = "0,0,0")]
    after:  TimeDelta,
  },
  /// Replace a test's validity window.
  Window {
    test:   String,
    #[arg(long, value_parser = parse::duration)]
    before: TimeDelta,
    #[arg(long, value_parser = parse::duration)]
    after:  TimeDelta,
  },
  List,
}

fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = CliConfig::load(&cli.config)?;

  // Open SQLite store.
  let store = Arc::new(
    SqliteStore::open(&cfg.store_path)
      .with_context(|| format!("failed to open store at {}", cfg.store_path.display()))?,
  );
  let state = store.load().context("failed to load store")?;
  info!(path = %cfg.store_path.display(), "store ready");

  let ledger = Ledger::new(state, Arc::new(RuleTable)).with_persistence(store);

  let out = run(&ledger, &cfg, cli.command)?;
  println!("{}", serde_json::to_string_pretty(&out)?);
  Ok(())
}

fn run(ledger: &Ledger, cfg: &CliConfig, command: Command) -> anyhow::Result<serde_json::Value> {
  let out = match command {
    Command::Patient(PatientCommand::Add { id, first, last, gender, age }) => {
      let patient = Patient {
        patient_id: PatientId::new(id),
        first_name: first,
        last_name: last,
        gender,
        age,
      };
      ledger.add_patient(patient.clone())?;
      json!(patient)
    }
    Command::Patient(PatientCommand::List) => json!(ledger.patients()?),

    Command::Test(TestCommand::Add { code, name, units, before, after }) => {
      let test = TestDefinition { code: TestCode::new(code), name, units };
      let window = ValidityWindow::new(before, after)?;
      ledger.add_test(test.clone(), window)?;
      json!({ "test": test, "window": window })
    }
    Command::Test(TestCommand::Window { test, before, after }) => {
      let window = ValidityWindow::new(before, after)?;
      ledger.set_window(&test, window)?;
      json!(window)
    }
    Command::Test(TestCommand::List) => output::tests(&ledger.tests()?),

    Command::Record { patient, test, value, at, recorded } => {
      let mut input = NewObservation::new(patient, test, value, at);
      input.transaction_time = recorded;
      json!(ledger.record(input)?)
    }
    Command::Value { patient, test, target, pov } => {
      json!(ledger.value_at(&patient, &test, target, pov)?)
    }
    Command::History { patient, test, from, to } => {
      json!(ledger.history(&patient, &test, from, to)?)
    }
    Command::Update { patient, test, valid, value, at } => {
      let at = at.unwrap_or_else(Utc::now);
      json!(ledger.update(&patient, &test, valid, value, at)?)
    }
    Command::Delete { patient, test, valid } => json!(ledger.delete(&patient, &test, valid)?),

    Command::Snapshot { patient, at, use_pov } => json!(ledger.snapshot(&patient, at, use_pov)?),
    Command::States { at, patient, use_pov } => {
      let use_pov = use_pov.unwrap_or(cfg.use_pov_for_states);
      match patient {
        Some(p) => output::states(&ledger.patient_states_at(&p, at, use_pov)?),
        None => ledger
          .states_at(at, use_pov)?
          .iter()
          .map(|(id, states)| (id.to_string(), output::states(states)))
          .collect::<serde_json::Map<_, _>>()
          .into(),
      }
    }
    Command::Intervals { dimension, patient } => {
      let dimension = StateDimension::new(dimension);
      match patient {
        Some(p) => json!(ledger.state_intervals(&p, &dimension)?),
        None => json!(ledger.state_intervals_all(&dimension)?),
      }
    }
    Command::Coverage { patient, merged } => json!(ledger.coverage(&patient, merged)?),
  };
  Ok(out)
}
