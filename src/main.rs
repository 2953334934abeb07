use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::clock::{Clock, SystemClock};
use turnstile::config::{LoggingConfig, TurnstileConfig};
use turnstile::identity::extract_identity;
use turnstile::ratelimit::{
    AdmissionRequest, Decision, PolicyStore, RateLimiter, RequestMeta, TenantPolicy,
};
use turnstile::store;

#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about = "Per-tenant request admission control")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Tenant to operate on, overriding the configured one
    #[arg(short, long, global = true)]
    tenant: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run admission checks for one identity and print each decision
    Check {
        /// Client identity to check
        #[arg(short, long)]
        identity: Option<String>,

        /// Request header as `Name: value`; used to derive the identity when
        /// `--identity` is not given
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request path reported in decision logs
        #[arg(long, default_value = "/")]
        path: String,

        /// Request method reported in decision logs
        #[arg(long, default_value = "GET")]
        method: String,

        /// Number of consecutive checks
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Inspect or replace tenant policies
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
}

#[derive(Debug, Subcommand)]
enum PolicyAction {
    /// Print the tenant's policy, initializing it if the tenant is new
    Show,
    /// Store a policy document (YAML or JSON) for the tenant
    Put {
        /// Policy document to store
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = TurnstileConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(tenant) = cli.tenant {
        config.limiter.tenant = Some(tenant);
    }

    init_tracing(&config.logging);
    info!("Turnstile version {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Check {
            identity,
            headers,
            path,
            method,
            count,
        } => {
            let limiter = RateLimiter::connect(&config).await?;
            let identity = identity.or_else(|| {
                extract_identity(headers.iter().filter_map(|h| split_header(h)), None)
            });
            let request = AdmissionRequest {
                identity,
                meta: RequestMeta::new(method, path),
            };

            for attempt in 1..=count {
                let decision = limiter.check(&request).await;
                println!("{attempt}: {}", describe(&decision));
            }
        }
        Command::Policy { action } => {
            let (tenant, _) = config.limiter.validate()?;
            let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
            let policies = PolicyStore::new(store::connect(&config.store, clock).await?);

            match action {
                PolicyAction::Show => {
                    let policy = policies.load(tenant).await?;
                    println!("{}", serde_json::to_string_pretty(&*policy)?);
                }
                PolicyAction::Put { file } => {
                    let contents = std::fs::read_to_string(&file)
                        .with_context(|| format!("Failed to read {}", file.display()))?;
                    let policy: TenantPolicy = serde_yaml::from_str(&contents)
                        .with_context(|| format!("Invalid policy document {}", file.display()))?;
                    policies.put(tenant, &policy).await?;
                    println!("Stored policy for tenant {tenant}");
                }
            }
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn split_header(header: &str) -> Option<(&str, &str)> {
    let (name, value) = header.split_once(':')?;
    Some((name.trim(), value.trim()))
}

fn describe(decision: &Decision) -> String {
    match decision {
        Decision::Denied {
            retry_after_secs,
            weighted_rate,
            limit,
        } => format!("denied (rate {weighted_rate:.2} >= {limit}, retry after {retry_after_secs}s)"),
        Decision::Allowed(reason) => format!("allowed ({reason:?})"),
    }
}
