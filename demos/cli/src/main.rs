use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use cardio_core::{
    event_tiers, tier_for_history, to_percent, CardioConfig, ClinicalRecord, HistoryFilter,
    HistoryStore, JsonlHistoryStore, SubjectIdentity, TierGranularity,
};
use cardio_model::{load_artifact_file, ScoringPipeline, ScoringService};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

#[derive(Parser, Debug)]
#[command(
    name = "cardio-cli",
    about = "Score cardiovascular risk and summarize patient histories."
)]
struct Args {
    /// JSON file overriding the aggregation settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score one clinical record and append it to the history log.
    Score {
        #[arg(long, env = "CARDIO_ARTIFACT")]
        artifact: PathBuf,
        /// Expected SHA-256 digest of the artifact.
        #[arg(long)]
        digest: Option<String>,
        /// JSON file with the clinical fields.
        #[arg(short, long)]
        record: PathBuf,
        #[arg(long)]
        subject_id: Option<String>,
        #[arg(long, requires = "subject_id")]
        subject_name: Option<String>,
        /// JSON Lines history log.
        #[arg(long, default_value = "cardio-history.jsonl")]
        history: PathBuf,
    },
    /// Show one patient's score history.
    History {
        #[arg(long)]
        subject_id: String,
        #[arg(long, default_value = "cardio-history.jsonl")]
        history: PathBuf,
    },
    /// Population summary for the doctor dashboard.
    Summary {
        #[arg(long, default_value = "cardio-history.jsonl")]
        history: PathBuf,
        /// Restrict to these subjects.
        #[arg(long = "subject")]
        subjects: Vec<String>,
        #[arg(long, value_enum)]
        granularity: Option<Granularity>,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print artifact identity and selected features.
    Inspect {
        #[arg(long, env = "CARDIO_ARTIFACT")]
        artifact: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Granularity {
    Average,
    Latest,
}

impl From<Granularity> for TierGranularity {
    fn from(value: Granularity) -> Self {
        match value {
            Granularity::Average => TierGranularity::LifetimeAverage,
            Granularity::Latest => TierGranularity::LatestEvent,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Score {
            artifact,
            digest,
            record,
            subject_id,
            subject_name,
            history,
        } => {
            let store = JsonlHistoryStore::open(&history)?;
            let service = ScoringService::new(store, config.clone());
            service
                .load_and_publish(&artifact, digest.as_deref())
                .with_context(|| format!("Cannot serve artifact {:?}", artifact))?;

            let data = std::fs::read_to_string(&record)
                .with_context(|| format!("Cannot read record {:?}", record))?;
            let record = ClinicalRecord::from_json_str(&data)?;
            let subject = subject_id.map(|id| {
                let identity = SubjectIdentity::new(id);
                match subject_name {
                    Some(name) => identity.with_name(name),
                    None => identity,
                }
            });

            let event = match service.score(record, subject) {
                Ok(event) => event,
                Err(err) if err.is_client_error() => bail!("Invalid record: {err}"),
                Err(err) => return Err(err.into()),
            };
            println!(
                "Risk score: {}%\nRisk level: {}\nModel: {} ({})",
                to_percent(event.risk_score, config.percent_decimals),
                event.tier(),
                event.model_version,
                &event.artifact_digest[..12]
            );
        }
        Command::History {
            subject_id,
            history,
        } => {
            let store = JsonlHistoryStore::open_read_only(&history);
            let patient = store.history(&subject_id)?;
            if patient.is_empty() {
                println!("No assessments recorded for {subject_id}.");
                return Ok(());
            }

            for (point, tier) in patient
                .trend(config.percent_decimals)
                .iter()
                .zip(event_tiers(&patient))
            {
                println!("{}  {:>5}%  {}", point.scored_at, point.risk_percent, tier);
            }
            println!(
                "Average risk: {}%\nStatus: {}",
                to_percent(patient.mean_risk(), config.percent_decimals),
                tier_for_history(&patient, config.granularity).status_label()
            );
        }
        Command::Summary {
            history,
            subjects,
            granularity,
            json,
        } => {
            let mut config = config;
            if let Some(granularity) = granularity {
                config.granularity = granularity.into();
            }
            let filter = if subjects.is_empty() {
                HistoryFilter::all()
            } else {
                HistoryFilter::for_subjects(subjects)
            };

            let store = JsonlHistoryStore::open_read_only(&history);
            let summary = cardio_core::summarize(&store.all_histories(&filter)?, &config);

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            let stats = &summary.stats;
            println!(
                "Patients: {}\nHigh risk: {}\nMedium risk: {}\nLow risk: {}\nAverage risk: {}%",
                stats.total_patients,
                stats.high_risk,
                stats.medium_risk,
                stats.low_risk,
                stats.avg_risk_percent
            );
            for patient in &summary.patients {
                println!(
                    "{:<16} {:<20} {:>5}%  {:<11} tests: {}",
                    patient.id,
                    patient.name.as_deref().unwrap_or("Unknown"),
                    patient.risk_percent,
                    patient.status.status_label(),
                    patient.count
                );
            }
        }
        Command::Inspect { artifact } => {
            let loaded = load_artifact_file(&artifact, None)
                .with_context(|| format!("Cannot load artifact {:?}", artifact))?;
            let pipeline = ScoringPipeline::new(loaded)?;
            let spec = pipeline.artifact();
            println!(
                "Model: {}\nDigest: {}\nFeatures: {}\nSelected: {}",
                spec.model_version,
                pipeline.digest(),
                spec.features.len(),
                spec.selected_features().join(", ")
            );
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CardioConfig> {
    let Some(path) = path else {
        return Ok(CardioConfig::default());
    };
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config {:?}", path))?;
    let config = serde_json::from_str(&data)
        .with_context(|| format!("Invalid config {:?}", path))?;
    info!("using config from {}", path.display());
    Ok(config)
}
