mod config;
mod metrics;

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use config::ServerConfig;
use shoutout_billing::{create_service, BillingService};
use shoutout_engine::submission::parse_platform;
use shoutout_engine::{
    ContentVerifier, HttpContentVerifier, ReferralService, Scheduler, VerificationWorkflow,
    VerifyError,
};
use shoutout_storage::{
    OrganizationId, PayerId, Platform, PostMetrics, SetSubscriptionParams, SlotStatus,
    SocialSubmission, Store, SubmissionId, SubscriptionTier,
};
use shoutout_store_sqlite::SqliteStore;

// ────────────────────────────────────── CLI Types ──────────────────────────────────────

#[derive(Parser)]
#[command(name = "shoutout-server")]
#[command(about = "Shoutout referral rewards: rescan scheduler and administration")]
struct Cli {
    /// Database URL (sqlite://path/to/db.db)
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "sqlite://shoutout.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the rescan scheduler with health and metrics endpoints
    Serve {
        /// Health check HTTP server address
        #[arg(long, env = "SHOUTOUT_HEALTH_ADDR", default_value = "0.0.0.0:8080")]
        health_addr: String,
    },
    /// Submit a post and run its initial scan
    Submit {
        #[arg(long)]
        org: Uuid,
        /// x, linkedin, threads or facebook
        #[arg(long)]
        platform: String,
        url: String,
    },
    /// Show a submission
    Status { id: Uuid },
    /// List an organization's submissions, newest first
    List {
        #[arg(long)]
        org: Uuid,
        #[arg(long, default_value = "20")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
    /// Revoke a verified submission
    Revoke { id: Uuid },
    /// Organization management commands
    Org {
        #[command(subcommand)]
        org_cmd: OrgCommand,
    },
    /// Payer management commands
    Payer {
        #[command(subcommand)]
        payer_cmd: PayerCommand,
    },
}

#[derive(Subcommand)]
enum OrgCommand {
    /// Create an organization on the free tier
    Create {
        name: String,
        #[arg(long)]
        payer: Option<Uuid>,
    },
    /// Register a capacity-consuming account slot
    AddSlot {
        org: Uuid,
        name: String,
        /// registered, connecting or connected
        #[arg(long, default_value = "registered")]
        status: String,
    },
    /// Start or renew a paid subscription
    Subscribe {
        org: Uuid,
        #[arg(long)]
        slots: i32,
        /// Subscription length in days
        #[arg(long, default_value = "30")]
        days: i64,
        #[arg(long)]
        payer: Option<Uuid>,
        #[arg(long)]
        subscription_id: Option<String>,
    },
    /// Cancel billing; paid access lasts until the current period ends
    Cancel { org: Uuid },
    /// Show the resolved premium entitlement
    Entitlement { org: Uuid },
    /// Reduce purchased capacity and disable slots over it
    Downgrade {
        org: Uuid,
        #[arg(long)]
        capacity: i32,
    },
}

#[derive(Subcommand)]
enum PayerCommand {
    /// Create a payer
    Create {
        email: String,
        /// Customer identity at the billing provider
        #[arg(long)]
        customer_id: Option<String>,
    },
}

// ────────────────────────────────────── Wiring ──────────────────────────────────────

/// Verifier for commands that never scan posts.
struct UnconfiguredVerifier;

#[async_trait]
impl ContentVerifier for UnconfiguredVerifier {
    async fn verify(
        &self,
        _url: &str,
        _required_keyword: &str,
        _platform: Platform,
    ) -> Result<PostMetrics, VerifyError> {
        Err(VerifyError::Transport(
            "SHOUTOUT_VERIFIER_URL is not set".to_string(),
        ))
    }
}

struct Context {
    service: ReferralService,
    scheduler: Scheduler,
}

async fn open_context(
    database_url: &str,
    config: &ServerConfig,
    scans_posts: bool,
) -> Result<Context, Box<dyn std::error::Error>> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(database_url).await?);

    let verifier: Arc<dyn ContentVerifier> = if scans_posts {
        let v = config.require_verifier()?;
        Arc::new(HttpContentVerifier::new(
            &v.endpoint,
            v.api_key.clone(),
            v.timeout,
        )?)
    } else {
        Arc::new(UnconfiguredVerifier)
    };
    let billing: Arc<dyn BillingService> = Arc::from(create_service(&config.billing)?);

    let workflow = Arc::new(VerificationWorkflow::new(
        store,
        verifier,
        billing,
        Arc::new(config.reward.clone()),
        config.scheduler.clone(),
    ));
    Ok(Context {
        service: ReferralService::new(workflow.clone()),
        scheduler: Scheduler::new(workflow),
    })
}

fn print_submission(s: &SocialSubmission) {
    println!("ID:          {}", s.id);
    println!("URL:         {} ({})", s.url_normalized, s.platform);
    match s.failure_reason {
        Some(reason) => println!("Status:      {} ({})", s.status, reason.message()),
        None => println!("Status:      {}", s.status),
    }
    println!("Days:        {}", s.days_awarded);
    println!("Scans:       {}", s.scan_count);
    println!(
        "Engagement:  {} likes, {} comments, {} shares",
        s.likes, s.comments, s.shares
    );
    if let Some(next) = s.next_scan_at {
        println!("Next scan:   {}", next);
    }
}

// ────────────────────────────────────── Commands ──────────────────────────────────────

async fn cmd_serve(
    database_url: &str,
    config: &ServerConfig,
    health_addr: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let health_addr: SocketAddr = health_addr.parse()?;
    let ctx = open_context(database_url, config, true).await?;
    let handle = metrics::init_metrics()?;
    let listener = TcpListener::bind(health_addr).await?;

    serve(ctx, listener, Some(handle), None, shutdown_signal()).await
}

/// Run the scheduler and the health server until `shutdown` resolves.
async fn serve<F>(
    ctx: Context,
    listener: TcpListener,
    metrics: Option<PrometheusHandle>,
    ready_tx: Option<oneshot::Sender<SocketAddr>>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let (readiness_tx, readiness_rx) = watch::channel(false);
    let (stop_tx, stop_rx) = watch::channel(false);

    let router = health_router(HealthState {
        ready: readiness_rx,
        metrics,
    });

    let scheduler = ctx.scheduler;
    let scheduler_stop = stop_rx.clone();
    let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_stop).await });

    info!(%addr, "Health checks listening");
    let _ = readiness_tx.send(true);
    if let Some(tx) = ready_tx {
        let _ = tx.send(addr);
    }

    tokio::spawn(async move {
        shutdown.await;
        // Not ready first so probes drain traffic before the listener closes
        let _ = readiness_tx.send(false);
        let _ = stop_tx.send(true);
    });

    let mut http_stop = stop_rx;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = http_stop.wait_for(|stopped| *stopped).await;
        })
        .await?;
    scheduler_task.await?;

    info!("Server stopped");
    Ok(())
}

async fn cmd_submit(
    ctx: &Context,
    org: Uuid,
    platform: &str,
    url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let platform = parse_platform(platform)?;
    let submission = ctx
        .service
        .submit(&OrganizationId(org), url, platform)
        .await?;
    print_submission(&submission);
    Ok(())
}

async fn cmd_list(
    ctx: &Context,
    org: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let submissions = ctx
        .service
        .list(&OrganizationId(org), limit, offset)
        .await?;

    if submissions.is_empty() {
        println!("No submissions found");
        return Ok(());
    }
    for s in &submissions {
        println!(
            "{}  {:<9}  {:>2}d  {}",
            s.id, s.status, s.days_awarded, s.url_normalized
        );
    }
    Ok(())
}

async fn cmd_org(ctx: &Context, cmd: OrgCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        OrgCommand::Create { name, payer } => {
            let org = ctx
                .service
                .create_organization(&name, payer.map(PayerId))
                .await?;
            println!("✓ Organization '{}' created: {}", org.name, org.id.0);
        }
        OrgCommand::AddSlot { org, name, status } => {
            let status: SlotStatus = status.to_ascii_uppercase().parse()?;
            let slot = ctx
                .service
                .add_slot(&OrganizationId(org), &name, status)
                .await?;
            println!("✓ Slot '{}' added ({}): {}", slot.name, slot.status, slot.id.0);
        }
        OrgCommand::Subscribe {
            org,
            slots,
            days,
            payer,
            subscription_id,
        } => {
            let org = ctx
                .service
                .set_subscription(
                    &OrganizationId(org),
                    &SetSubscriptionParams {
                        tier: SubscriptionTier::Premium,
                        expires_at: Some(Utc::now() + Duration::days(days)),
                        purchased_slots: slots,
                        payer_id: payer.map(PayerId),
                        billing_subscription_id: subscription_id,
                    },
                )
                .await?;
            if let Some(expires) = org.subscription_expires_at {
                println!("✓ '{}' subscribed until {} ({} slots)", org.name, expires, slots);
            }
        }
        OrgCommand::Cancel { org } => {
            let org = ctx.service.cancel_subscription(&OrganizationId(org)).await?;
            match org.subscription_expires_at {
                Some(expires) => println!("✓ Billing cancelled; paid access ends {}", expires),
                None => println!("✓ Billing cancelled"),
            }
        }
        OrgCommand::Entitlement { org } => {
            let entitlement = ctx
                .service
                .entitlement(&OrganizationId(org), Utc::now())
                .await?;
            println!("Active:  {}", entitlement.is_active);
            println!("Source:  {}", entitlement.source);
        }
        OrgCommand::Downgrade { org, capacity } => {
            let outcome = ctx
                .service
                .downgrade(&OrganizationId(org), capacity)
                .await?;
            println!(
                "✓ Capacity set to {} ({} accounts disabled)",
                capacity, outcome.num_accounts_disabled
            );
        }
    }
    Ok(())
}

// ────────────────────────────────────── Health ──────────────────────────────────────

#[derive(Clone)]
struct HealthState {
    ready: watch::Receiver<bool>,
    metrics: Option<PrometheusHandle>,
}

fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn readiness_handler(State(state): State<HealthState>) -> Result<&'static str, StatusCode> {
    if *state.ready.borrow() {
        Ok("ok")
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

async fn metrics_handler(State(state): State<HealthState>) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::NOT_FOUND)
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully"),
    }
}

// ────────────────────────────────────── Main ──────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env()?;
    let db = cli.database_url.as_str();

    match cli.command {
        Command::Serve { health_addr } => cmd_serve(db, &config, &health_addr).await?,
        Command::Submit { org, platform, url } => {
            let ctx = open_context(db, &config, true).await?;
            cmd_submit(&ctx, org, &platform, &url).await?;
        }
        Command::Status { id } => {
            let ctx = open_context(db, &config, false).await?;
            let submission = ctx.service.get_status(&SubmissionId(id)).await?;
            print_submission(&submission);
        }
        Command::List { org, limit, offset } => {
            let ctx = open_context(db, &config, false).await?;
            cmd_list(&ctx, org, limit, offset).await?;
        }
        Command::Revoke { id } => {
            let ctx = open_context(db, &config, false).await?;
            let submission = ctx.service.revoke(&SubmissionId(id)).await?;
            println!("✓ Submission {} revoked", submission.id);
        }
        Command::Org { org_cmd } => {
            let ctx = open_context(db, &config, false).await?;
            cmd_org(&ctx, org_cmd).await?;
        }
        Command::Payer {
            payer_cmd: PayerCommand::Create { email, customer_id },
        } => {
            let ctx = open_context(db, &config, false).await?;
            let payer = ctx.service.create_payer(&email, customer_id).await?;
            println!("✓ Payer {} created: {}", payer.email, payer.id.0);
        }
    }

    Ok(())
}

// ────────────────────────────────────── Tests ──────────────────────────────────────
