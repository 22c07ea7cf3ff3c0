//! Commitment Purchaser
//!
//! Matches cost-saving recommendations to provider reservation offerings
//! and purchases them, one at a time, with a pause between purchases.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::Environment;
use domain_commitments::schema;
use domain_commitments::{
    CloudProvider, Context, PaymentOption, Recommendation, RecommendationParams, ServiceType, Term,
};
use eyre::{Result, WrapErr};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

mod config;
mod orchestrator;
mod providers;
mod source;

use config::Config;
use orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "commitment-purchaser")]
#[command(about = "Purchase cloud reservations and committed use discounts from recommendations")]
struct Cli {
    /// Read and write the legacy flat schema
    #[arg(long, global = true)]
    legacy: bool,

    /// Write Prometheus metrics to this file on exit
    #[arg(long, global = true)]
    metrics_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RecommendationFilters {
    /// Only recommendations in this region
    #[arg(long)]
    region: Option<String>,

    /// Only recommendations for this term (1yr, 3yr)
    #[arg(long)]
    term: Option<Term>,

    /// Only recommendations with this payment option
    #[arg(long)]
    payment_option: Option<PaymentOption>,

    /// Only recommendations for these accounts; defaults to PURCHASE_ACCOUNT_IDS
    #[arg(long, value_delimiter = ',')]
    accounts: Vec<String>,

    /// Minimum estimated monthly savings
    #[arg(long)]
    min_savings: Option<f64>,
}

impl RecommendationFilters {
    /// `default_accounts` applies when no `--accounts` were given
    fn into_params(
        self,
        service: ServiceType,
        default_accounts: &[String],
    ) -> RecommendationParams {
        let account_ids = if self.accounts.is_empty() {
            default_accounts.to_vec()
        } else {
            self.accounts
        };

        RecommendationParams {
            service: Some(service),
            region: self.region,
            term: self.term,
            payment_option: self.payment_option,
            account_ids,
            min_monthly_savings: self.min_savings,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show registered providers and whether they are configured
    Providers,

    /// List recommendations from an input file that pass the filters
    Recommendations {
        #[arg(short, long)]
        provider: CloudProvider,

        #[arg(short, long)]
        service: ServiceType,

        /// Recommendation file (JSON object or array)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        filters: RecommendationFilters,
    },

    /// Purchase a single recommendation
    Purchase {
        #[arg(short, long)]
        input: PathBuf,

        /// Resolve and price only
        #[arg(long)]
        dry_run: bool,
    },

    /// Purchase every recommendation in a file, in order
    Batch {
        #[arg(short, long)]
        input: PathBuf,

        /// Pause between purchases; defaults to PURCHASE_DELAY_MS
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Resolve and price only
        #[arg(long)]
        dry_run: bool,
    },

    /// List active and payment-pending commitments
    Commitments {
        /// Providers to list (aws, azure, gcp). Defaults to all configured.
        #[arg(short, long, value_delimiter = ',')]
        providers: Option<Vec<CloudProvider>>,
    },

    /// Check that a recommendation resolves to a purchasable offering
    Validate {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Price breakdown of the offering a recommendation resolves to
    Details {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Resource types purchasable for a provider and service
    ResourceTypes {
        #[arg(short, long)]
        provider: CloudProvider,

        #[arg(short, long)]
        service: ServiceType,

        #[arg(short, long)]
        region: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let mut config = Config::from_env()?;
    let environment = Environment::from_env();
    init_tracing(&environment);

    observability::init_metrics().wrap_err("Failed to install metrics recorder")?;

    let cli = Cli::parse();
    let ctx = shutdown_context();

    if let Commands::Batch {
        delay_ms: Some(delay_ms),
        ..
    } = &cli.command
    {
        config.purchase.delay_ms = *delay_ms;
    }
    if matches!(
        &cli.command,
        Commands::Purchase { dry_run: true, .. } | Commands::Batch { dry_run: true, .. }
    ) {
        config.purchase.dry_run = true;
    }

    let default_accounts = config.purchase.account_ids.clone();
    let orchestrator = Orchestrator::from_config(config).await?;
    let legacy = cli.legacy;

    match cli.command {
        Commands::Providers => print_json(&orchestrator.provider_status())?,

        Commands::Recommendations {
            provider,
            service,
            input,
            filters,
        } => {
            let params = filters.into_params(service, &default_accounts);
            let recs = orchestrator
                .recommendations(&ctx, provider, service, input, legacy, &params)
                .await?;
            if legacy {
                print_json(&recs.iter().map(schema::to_internal).collect::<Vec<_>>())?;
            } else {
                print_json(&recs)?;
            }
        }

        Commands::Purchase { input, .. } => {
            let rec = load_single(&input, legacy).await?;
            run_purchases(&orchestrator, &ctx, vec![rec], legacy).await?;
        }

        Commands::Batch { input, .. } => {
            let recs = source::load_recommendations(&input, legacy).await?;
            info!(count = recs.len(), input = %input.display(), "Loaded recommendations");
            run_purchases(&orchestrator, &ctx, recs, legacy).await?;
        }

        Commands::Commitments { providers } => {
            let commitments = orchestrator
                .list_commitments(&ctx, providers.as_deref())
                .await?;
            if legacy {
                print_json(
                    &commitments
                        .iter()
                        .map(schema::commitment_to_internal)
                        .collect::<Vec<_>>(),
                )?;
            } else {
                print_json(&commitments)?;
            }
        }

        Commands::Validate { input } => {
            let rec = load_single(&input, legacy).await?;
            let offering = orchestrator.validate(&ctx, &rec).await?;
            print_json(&offering)?;
        }

        Commands::Details { input } => {
            let rec = load_single(&input, legacy).await?;
            let details = orchestrator.details(&ctx, &rec).await?;
            if legacy {
                print_json(&schema::offering_details_to_internal(&details))?;
            } else {
                print_json(&details)?;
            }
        }

        Commands::ResourceTypes {
            provider,
            service,
            region,
        } => {
            let types = orchestrator
                .resource_types(&ctx, provider, service, region.as_deref())
                .await?;
            print_json(&types)?;
        }
    }

    if let Some(path) = cli.metrics_file {
        tokio::fs::write(&path, observability::render_metrics())
            .await
            .wrap_err_with(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    Ok(())
}

async fn run_purchases(
    orchestrator: &Orchestrator,
    ctx: &Context,
    recs: Vec<Recommendation>,
    legacy: bool,
) -> Result<()> {
    if orchestrator.dry_run() {
        info!(count = recs.len(), "Dry run, nothing will be purchased");
        return print_json(&orchestrator.plan(ctx, &recs).await);
    }

    let results = orchestrator.purchase_all(ctx, &recs).await;
    let succeeded = results.iter().filter(|r| r.success).count();
    info!(
        total = results.len(),
        succeeded = succeeded,
        failed = results.len() - succeeded,
        "Purchases complete"
    );

    if legacy {
        print_json(
            &results
                .iter()
                .map(schema::result_to_internal)
                .collect::<Vec<_>>(),
        )
    } else {
        print_json(&results)
    }
}

async fn load_single(path: &Path, legacy: bool) -> Result<Recommendation> {
    let mut recs = source::load_recommendations(path, legacy).await?;
    match recs.len() {
        1 => Ok(recs.remove(0)),
        0 => eyre::bail!("{} holds no usable recommendation", path.display()),
        n => eyre::bail!("{} holds {} recommendations, expected one", path.display(), n),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Context cancelled on Ctrl-C; purchases not yet attempted are reported as cancelled
fn shutdown_context() -> Context {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, cancelling remaining work");
            tx.send_replace(true);
        }
    });
    Context::from_shutdown(rx)
}
