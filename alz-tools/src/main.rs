use std::{fmt, fs, path::PathBuf};

use alz_common::hash::to_hex;
use alz_coordinator::{init_tracing, CoordinatorConfig, SledAuditLog, Status, AUDIT_DB_ENV};
use alz_proofs::{
    HashCommitmentBackend, Proof, ProofKind, ProofRegistry, ProofSuite, ProofVerifier,
    VerificationResponse, DEFAULT_CIRCUIT_ID,
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

const DEFAULT_AUDIT_DB: &str = "data/audit";

#[derive(Parser)]
#[command(
    name = "alz-tools",
    about = "Utility commands for atomic multi-ledger proofs and audit records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a proof JSON file with the configured providers.
    Verify(VerifyArgs),
    /// Summarise the audit log, or print one record in full.
    Audit(AuditArgs),
    /// Print the effective coordinator configuration.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Zk,
    Inclusion,
    Consensus,
}

impl From<KindArg> for ProofKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Zk => ProofKind::Zk,
            KindArg::Inclusion => ProofKind::Inclusion,
            KindArg::Consensus => ProofKind::Consensus,
        }
    }
}

#[derive(Args)]
struct VerifyArgs {
    /// Proof file as written by the coordinator (tagged JSON).
    #[arg(long)]
    proof: PathBuf,
    /// Expected proof kind. Defaults to the kind in the file.
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
    /// Expected proof id (hex). Defaults to the id in the file.
    #[arg(long)]
    proof_id: Option<String>,
    /// Sled proof registry to report membership against.
    /// Falls back to the registry named by `ALZ_PROOF_DB`.
    #[arg(long)]
    proof_db: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct AuditArgs {
    /// Sled audit log written by the coordinator.
    #[arg(long, env = AUDIT_DB_ENV, default_value = DEFAULT_AUDIT_DB)]
    db: PathBuf,
    /// Print the full record of this atomic id.
    #[arg(long)]
    id: Option<String>,
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing("alz_tools=info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Verify(args) => verify(args).await,
        Commands::Audit(args) => audit(args),
        Commands::Config => show_config(),
    }
}

async fn verify(args: VerifyArgs) -> Result<()> {
    let config = CoordinatorConfig::from_env()?;
    let raw = fs::read(&args.proof)
        .with_context(|| format!("failed to read {}", args.proof.display()))?;
    let proof: Proof = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a proof document", args.proof.display()))?;

    let proof_id = match &args.proof_id {
        Some(hex) => alz_common::hash::from_hex(hex)
            .with_context(|| format!("proof id {hex:?} is not 32 bytes of hex"))?,
        None => proof.proof_id(),
    };
    let kind = args.kind.map(ProofKind::from).unwrap_or_else(|| proof.kind());

    let registry = match &args.proof_db {
        Some(path) => ProofRegistry::persistent(path)?,
        None => ProofRegistry::from_env()?,
    };
    let suite = ProofSuite::with_defaults(
        &config.issuer_id,
        HashCommitmentBackend::from_seed(DEFAULT_CIRCUIT_ID, &config.zk_seed),
    );
    let verifier = ProofVerifier::new(suite, registry);
    let response = verifier.verify_proof(&proof_id, &proof, kind).await;

    let summary = VerifySummary {
        proof_id: to_hex(&proof_id),
        kind: kind.to_string(),
        issuer_id: proof.issuer_id().to_string(),
        ledger_id: proof.ledger_id().to_string(),
        response,
    };
    output_summary(&summary, args.json)?;
    if !summary.response.valid {
        bail!("proof rejected");
    }
    Ok(())
}

fn audit(args: AuditArgs) -> Result<()> {
    let log = SledAuditLog::open(&args.db)
        .with_context(|| format!("failed to open audit db at {}", args.db.display()))?;

    if let Some(id) = &args.id {
        let record = log
            .get(id)?
            .with_context(|| format!("no audit record for {id}"))?;
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let records = log.records()?;
    let summary = AuditSummary {
        db: args.db.display().to_string(),
        total: records.len(),
        committed: count(&records, Status::Committed),
        rolled_back: count(&records, Status::RolledBack),
        rollback_partial: records
            .iter()
            .filter(|tx| tx.status() == Status::RollbackPartial)
            .map(|tx| tx.atomic_id.clone())
            .collect(),
    };
    output_summary(&summary, args.json)
}

fn show_config() -> Result<()> {
    let config = CoordinatorConfig::from_env()?;
    println!("execution_timeout: {:?}", config.execution_timeout);
    println!("proving_timeout: {:?}", config.proving_timeout);
    println!("verification_timeout: {:?}", config.verification_timeout);
    println!("compensation_timeout: {:?}", config.compensation_timeout);
    println!("max_parallelism: {}", config.max_parallelism);
    println!("failure_policy: {}", config.failure_policy);
    println!("require_registry_membership: {}", config.require_registry_membership);
    println!("compensate_read_only: {}", config.compensate_read_only);
    println!("reject_simulated: {}", config.reject_simulated);
    println!("issuer_id: {}", config.issuer_id);
    Ok(())
}

fn count(records: &[alz_coordinator::AtomicTransaction], status: Status) -> usize {
    records.iter().filter(|tx| tx.status() == status).count()
}

fn output_summary<T>(summary: &T, json: bool) -> Result<()>
where
    T: Serialize + fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}

#[derive(Serialize)]
struct VerifySummary {
    proof_id: String,
    kind: String,
    issuer_id: String,
    ledger_id: String,
    #[serde(flatten)]
    response: VerificationResponse,
}

impl fmt::Display for VerifySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "proof_id: {}", self.proof_id)?;
        writeln!(f, "kind: {}", self.kind)?;
        writeln!(f, "issuer: {}", self.issuer_id)?;
        writeln!(f, "ledger: {}", self.ledger_id)?;
        writeln!(f, "valid: {}", self.response.valid)?;
        if let Some(reason) = &self.response.reason {
            writeln!(f, "reason: {}", reason)?;
        }
        writeln!(f, "issued_by_us: {}", self.response.issued_by_us)
    }
}

#[derive(Serialize)]
struct AuditSummary {
    db: String,
    total: usize,
    committed: usize,
    rolled_back: usize,
    rollback_partial: Vec<String>,
}

impl fmt::Display for AuditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "audit db: {}", self.db)?;
        writeln!(f, "records: {}", self.total)?;
        writeln!(f, "committed: {}", self.committed)?;
        writeln!(f, "rolled back: {}", self.rolled_back)?;
        writeln!(f, "rollback partial: {}", self.rollback_partial.len())?;
        for id in &self.rollback_partial {
            writeln!(f, "  {}", id)?;
        }
        Ok(())
    }
}
