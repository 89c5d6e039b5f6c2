use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use pcw_core::constants::DEFAULT_CASE_DATA_DIR;
use pcw_core::{
    Actor, CaseId, CaseIntake, CaseWorkflowEngine, CoreConfig, NonEmptyText, Role, Stage,
    StageRecord, StageRecordStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pcw")]
#[command(about = "PCW laboratory case workflow CLI")]
struct Cli {
    /// Case data directory (falls back to PCW_CASE_DATA_DIR, then ./case_data)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ActorArgs {
    /// Acting user's name
    #[arg(long)]
    actor_name: String,
    /// Acting user's email (used for the commit signature)
    #[arg(long)]
    actor_email: String,
    /// Acting user's role (admin, professor, senior_student, student, lab_staff)
    #[arg(long)]
    actor_role: String,
    /// Acting user's id (random if omitted)
    #[arg(long)]
    actor_id: Option<Uuid>,
}

impl ActorArgs {
    fn into_actor(self) -> Result<Actor, Box<dyn std::error::Error>> {
        let role = Role::parse(&self.actor_role)
            .ok_or_else(|| format!("unknown role: {}", self.actor_role))?;
        Ok(Actor {
            id: self.actor_id.unwrap_or_else(Uuid::new_v4),
            name: NonEmptyText::new(&self.actor_name)?,
            email: NonEmptyText::new(&self.actor_email)?,
            role,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new case
    Create {
        /// Laboratory case identifier (e.g. LAB001)
        case_id: String,
        /// Subject chart number
        subject_id: String,
        /// Date the specimen was received (YYYY-MM-DD)
        received_on: NaiveDate,
        /// Requesting clinician
        requested_by: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Record (or re-record) stage data
    Submit {
        case_id: String,
        /// Stage name (gross, preparation, microscopic)
        stage: String,
        /// Stage payload as a JSON document
        payload: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Submit a stage for approval
    RequestApproval {
        case_id: String,
        stage: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Approve a stage awaiting approval
    Approve {
        case_id: String,
        stage: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Return a stage awaiting approval for rework
    Reject {
        case_id: String,
        stage: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Record the final sign-off
    Finalize {
        case_id: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// Show one case
    Show { case_id: String },
    /// List all cases
    List,
    /// Print a case's audit trail
    Audit { case_id: String },
}

fn parse_stage(value: &str) -> Result<Stage, Box<dyn std::error::Error>> {
    Stage::SEQUENCE
        .into_iter()
        .find(|stage| stage.as_str() == value)
        .ok_or_else(|| format!("unknown stage: {value} (expected gross, preparation or microscopic)").into())
}

fn print_case(case: &pcw_core::Case) {
    println!("Case {} [{}]", case.id, case.status);
    println!(
        "  subject: {}, received: {}, requested by: {}",
        case.intake.subject_id, case.intake.received_on, case.intake.requested_by
    );
    for stage in Stage::SEQUENCE {
        let block = case.stage(stage);
        let filled = block
            .filled_by
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or("-");
        let approved = block
            .approved_by
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or("-");
        println!(
            "  {:<12} {:<18} filled by: {:<20} approved by: {}",
            stage.to_string(),
            block.status.to_string(),
            filled,
            approved
        );
    }
    if let Some(signed) = &case.finalized_by {
        println!("  finalized by: {}", signed.name);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .or_else(|| std::env::var_os("PCW_CASE_DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CASE_DATA_DIR));
    let cfg = Arc::new(CoreConfig::new(data_dir));
    let engine = CaseWorkflowEngine::new(Arc::clone(&cfg));

    match cli.command {
        Commands::Create {
            case_id,
            subject_id,
            received_on,
            requested_by,
            actor,
        } => {
            let actor = actor.into_actor()?;
            let case = engine.repository().create_case(
                CaseId::new(&case_id)?,
                CaseIntake {
                    subject_id: NonEmptyText::new(&subject_id)?,
                    received_on,
                    requested_by: NonEmptyText::new(&requested_by)?,
                },
                &actor,
            )?;
            println!("Registered case {} [{}]", case.id, case.status);
        }
        Commands::Submit {
            case_id,
            stage,
            payload,
            actor,
        } => {
            let actor = actor.into_actor()?;
            let stage = parse_stage(&stage)?;
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let case = engine.submit_stage_data(
                &CaseId::new(&case_id)?,
                &actor,
                stage,
                StageRecord::new(payload),
            )?;
            println!("Recorded {stage} data for case {} [{}]", case.id, case.status);
        }
        Commands::RequestApproval {
            case_id,
            stage,
            actor,
        } => {
            let actor = actor.into_actor()?;
            let stage = parse_stage(&stage)?;
            let case = engine.request_approval(&CaseId::new(&case_id)?, &actor, stage)?;
            println!(
                "Submitted {stage} for approval on case {} [{}]",
                case.id, case.status
            );
        }
        Commands::Approve {
            case_id,
            stage,
            actor,
        } => {
            let actor = actor.into_actor()?;
            let stage = parse_stage(&stage)?;
            let case = engine.approve_stage(&CaseId::new(&case_id)?, &actor, stage)?;
            println!("Approved {stage} on case {} [{}]", case.id, case.status);
        }
        Commands::Reject {
            case_id,
            stage,
            actor,
        } => {
            let actor = actor.into_actor()?;
            let stage = parse_stage(&stage)?;
            let case = engine.reject_stage(&CaseId::new(&case_id)?, &actor, stage)?;
            println!(
                "Returned {stage} for rework on case {} [{}]",
                case.id, case.status
            );
        }
        Commands::Finalize { case_id, actor } => {
            let actor = actor.into_actor()?;
            let case = engine.finalize_case(&CaseId::new(&case_id)?, &actor)?;
            println!("Finalized case {} [{}]", case.id, case.status);
        }
        Commands::Show { case_id } => {
            let case = engine.repository().load_case(&CaseId::new(&case_id)?)?;
            print_case(&case);

            let store = StageRecordStore::new(Arc::clone(&cfg));
            for stage in Stage::SEQUENCE {
                if let Some(record) = store.get(&case.id, stage)? {
                    println!("  {stage} payload: {}", record.payload);
                }
            }
        }
        Commands::List => {
            let cases = engine.repository().list_cases();
            if cases.is_empty() {
                println!("No cases found.");
            } else {
                for case in cases {
                    println!(
                        "{:<12} {:<30} subject: {}",
                        case.id.to_string(),
                        case.status.to_string(),
                        case.intake.subject_id
                    );
                }
            }
        }
        Commands::Audit { case_id } => {
            let entries = engine.repository().audit_log(&CaseId::new(&case_id)?)?;
            for entry in entries {
                let actor = entry
                    .actor
                    .as_ref()
                    .map(|a| a.name.as_str())
                    .unwrap_or("<deleted>");
                println!(
                    "{}  {:<24} {:<20} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.action.to_string(),
                    actor,
                    entry.detail
                );
            }
        }
    }

    Ok(())
}
