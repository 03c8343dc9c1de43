use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use hoist_api::{Backends, Config, SessionStore};
use hoist_core::{FullProposal, WorkloadInfo};
use hoist_infer::GroupingMode;
use hoist_wizard::{run, CleanupAction, ScriptedOperator, Settings, Step, TestPhase, Wizard};

#[derive(Parser, Debug)]
#[command(name = "hoistctl", version, about = "Import running Kubernetes workloads into a configuration hub")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Cleanup { Disable, Delete, Keep, Skip }

impl Cleanup {
    fn action(self) -> Option<CleanupAction> {
        match self {
            Cleanup::Disable => Some(CleanupAction::DisableAutoSync),
            Cleanup::Delete => Some(CleanupAction::Delete),
            Cleanup::Keep => Some(CleanupAction::Keep),
            Cleanup::Skip => None,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List namespaces visible to the current context
    Namespaces,
    /// Print the Unit proposal for the workloads in the given namespaces
    Propose {
        /// Namespace to scan (repeatable)
        #[arg(long = "ns", required = true)]
        namespaces: Vec<String>,
        /// App Space name override
        #[arg(long = "space")]
        space: Option<String>,
        /// Align against a local GitOps checkout
        #[arg(long = "repo")]
        repo: Option<PathBuf>,
        /// Group GitOps-owned workloads by their controlling object
        #[arg(long = "controller-aware", action = ArgAction::SetTrue)]
        controller_aware: bool,
    },
    /// Run the import non-interactively: propose, apply, clean up, test
    Import {
        /// Namespaces to import; empty resumes the saved selection or takes all
        namespaces: Vec<String>,
        #[arg(long = "space")]
        space: Option<String>,
        #[arg(long = "repo")]
        repo: Option<PathBuf>,
        /// What to do with competing Argo CD Applications
        #[arg(long = "cleanup", value_enum, default_value_t = Cleanup::Skip)]
        cleanup: Cleanup,
        /// Start a worker with this name after applying
        #[arg(long = "worker")]
        worker: Option<String>,
        /// Run the end-to-end annotation test (needs --worker)
        #[arg(long = "test", action = ArgAction::SetTrue)]
        test: bool,
        /// Session key; defaults to the current kube context
        #[arg(long = "cluster", env = "HOIST_CLUSTER")]
        cluster: Option<String>,
        /// Ignore and overwrite any saved session
        #[arg(long = "fresh", action = ArgAction::SetTrue)]
        fresh: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("HOIST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics(cfg: &Config) {
    if let Some(addr) = cfg.metrics_addr.as_deref() {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid HOIST_METRICS_ADDR; expected host:port");
        }
    }
}

fn current_context() -> Option<String> {
    kube::config::Kubeconfig::read().ok().and_then(|k| k.current_context)
}

fn settings(cfg: &Config, space: Option<String>, repo: Option<PathBuf>) -> Result<Settings> {
    let mut s = Settings::from_config(cfg);
    s.app_space_hint = space;
    if let Some(root) = repo {
        let declared = hoist_infer::scan_repo(&root).with_context(|| format!("scanning {}", root.display()))?;
        info!(apps = declared.apps.len(), kind = %declared.kind, "declared repo scanned");
        s.declared = Some(declared);
    }
    Ok(s)
}

async fn collect_workloads(backends: &Backends, namespaces: &[String]) -> Result<Vec<WorkloadInfo>> {
    let mut all = Vec::new();
    for ns in namespaces {
        let mut ws = backends.cluster.list_workloads(ns).await.with_context(|| format!("listing workloads in {}", ns))?;
        all.append(&mut ws);
    }
    Ok(all)
}

fn print_proposal(p: &FullProposal) {
    println!("App Space: {}", p.app_space);
    if let Some(d) = p.deployer {
        println!("Deployer:  {:?}", d);
    }
    for b in &p.bases {
        println!("  base {:<24} {}", b.slug, b.path);
    }
    for u in &p.units {
        let labels: Vec<String> = u.labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("  {:<28} {:<13} {}", u.slug, u.status.as_str(), labels.join(","));
        for w in &u.workloads {
            println!("      {}", w);
        }
    }
    for (variant, policy) in &p.reconcile {
        println!("  policy {:<10} {}", variant, policy);
    }
    if !p.git_only.is_empty() {
        println!("Declared but not running: {}", p.git_only.join(", "));
    }
    if !p.orphans.is_empty() {
        println!("Running but not declared: {}", p.orphans.join(", "));
    }
}

fn print_summary(w: &Wizard) {
    if let Some(e) = &w.apply.space_error {
        println!("app space creation failed: {}", e);
        return;
    }
    if let Some(p) = w.proposal() {
        println!("App Space {}: {} of {} units applied", p.app_space, w.apply.successes(), w.apply.total);
    }
    for o in w.apply.outcomes.iter().filter(|o| !o.ok) {
        println!("  failed {}: {}", o.slug, o.error.as_deref().unwrap_or("unknown error"));
    }
    if !w.cleanup.apps.is_empty() {
        let state = match (&w.cleanup.error, w.cleanup.skipped, w.cleanup.done) {
            (Some(f), _, _) => format!("failed on {}: {}", f.app, f.error),
            (None, true, _) => "skipped".to_string(),
            (None, false, true) => w.cleanup.action.map(|a| a.as_str()).unwrap_or("done").to_string(),
            _ => "pending".to_string(),
        };
        println!("Argo CD cleanup ({} apps): {}", w.cleanup.apps.len(), state);
    }
    if let Some(name) = &w.worker.name {
        match &w.worker.error {
            Some(e) => println!("worker {}: {}", name, e),
            None => println!("worker {}: started", name),
        }
    }
    if w.test.phase != TestPhase::Idle {
        println!("Test {} (run {}): {}", w.test.unit, w.test.runs, w.test.phase.as_str());
        for r in &w.test.records {
            let mark = if r.ok { "ok" } else { "FAIL" };
            println!("  {:<10} {:<4} {:>6}ms  {}", r.phase.as_str(), mark, r.elapsed.as_millis(), r.detail);
        }
    }
}

fn summary_json(w: &Wizard) -> serde_json::Value {
    serde_json::json!({
        "step": w.step.as_str(),
        "proposal": w.proposal(),
        "apply": {
            "total": w.apply.total,
            "succeeded": w.apply.successes(),
            "failed": w.apply.outcomes.iter().filter(|o| !o.ok).map(|o| serde_json::json!({"unit": o.slug, "error": o.error})).collect::<Vec<_>>(),
            "space_error": w.apply.space_error,
        },
        "cleanup": {
            "apps": w.cleanup.apps,
            "action": w.cleanup.action.map(|a| a.as_str()),
            "done": w.cleanup.done,
            "skipped": w.cleanup.skipped,
            "error": w.cleanup.error.as_ref().map(|f| serde_json::json!({"app": f.app, "error": f.error})),
        },
        "worker": { "name": w.worker.name, "started": w.worker.started, "error": w.worker.error },
        "test": {
            "unit": w.test.unit,
            "phase": w.test.phase.as_str(),
            "verdict": w.test.verdict.as_ref().map(|v| v.detail()),
            "error": w.test.error.as_ref().map(|e| e.to_string()),
            "records": w.test.records.iter().map(|r| serde_json::json!({
                "phase": r.phase.as_str(), "ok": r.ok, "elapsed_ms": r.elapsed.as_millis() as u64, "detail": r.detail,
            })).collect::<Vec<_>>(),
        },
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = Config::from_env();
    init_metrics(&cfg);
    let cli = Cli::parse();
    let backends = Backends::in_process(&cfg);

    match cli.command {
        Commands::Namespaces => {
            let names = backends.cluster.list_namespaces().await?;
            match cli.output {
                Output::Human => names.iter().for_each(|n| println!("{}", n)),
                Output::Json => println!("{}", serde_json::to_string_pretty(&names)?),
            }
        }
        Commands::Propose { namespaces, space, repo, controller_aware } => {
            let s = settings(&cfg, space, repo)?;
            let workloads = collect_workloads(&backends, &namespaces).await?;
            info!(namespaces = ?namespaces, workloads = workloads.len(), "propose invoked");
            let proposal = match (&s.declared, controller_aware) {
                (Some(repo), _) => hoist_infer::build_proposal(&workloads, Some(repo), s.app_space_hint.as_deref()),
                (None, true) => hoist_infer::build_controller_proposal(&workloads, s.app_space_hint.as_deref()),
                (None, false) => hoist_infer::build_proposal(&workloads, None, s.app_space_hint.as_deref()),
            };
            match cli.output {
                Output::Human => print_proposal(&proposal),
                Output::Json => println!("{}", serde_json::to_string_pretty(&proposal)?),
            }
        }
        Commands::Import { namespaces, space, repo, cleanup, worker, test, cluster, fresh } => {
            if test && worker.is_none() {
                bail!("--test needs --worker: the Test applies through a running worker");
            }
            let mut s = settings(&cfg, space, repo)?;
            if s.declared.is_none() {
                s.grouping = GroupingMode::ControllerAware;
            }
            let cluster = cluster.or_else(current_context).unwrap_or_else(|| "default".to_string());
            let sessions = match hoist_api::open_sessions(&cfg) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!(error = ?e, "session store unavailable; continuing without resume");
                    None
                }
            };
            let saved = match (&sessions, fresh) {
                (Some(store), false) => store.load(&cluster, hoist_persist::now_ts(), cfg.session_ttl_secs).unwrap_or_else(|e| {
                    warn!(error = ?e, "session load failed");
                    None
                }),
                _ => None,
            };

            let (mut wizard, mut rx) = Wizard::new(backends, s);
            wizard.start();
            if let Some(msg) = rx.recv().await {
                wizard.update(msg);
            }
            if let Some(err) = wizard.namespaces.error.clone() {
                error!(error = %err, "namespace listing failed");
                bail!("listing namespaces: {}", err);
            }
            let wanted = match &saved {
                Some(snap) if namespaces.is_empty() => {
                    let step = wizard.restore_session(snap);
                    info!(cluster = %cluster, step = ?step.map(|s| s.as_str()), selected = ?snap.selected_namespaces, "resuming saved session");
                    snap.selected_namespaces.clone()
                }
                _ => namespaces,
            };

            metrics::counter!("hoistctl_import_runs", 1u64);
            let mut operator = ScriptedOperator::new(wanted, cleanup.action(), worker, test);
            run(&mut wizard, &mut rx, &mut operator).await;

            if let Some(store) = &sessions {
                let snap = wizard.export_session(&cluster);
                let finished = wizard.step == Step::Test && wizard.test.phase == TestPhase::Passed;
                let res = if finished { store.clear(&cluster) } else { store.save(&snap) };
                if let Err(e) = res {
                    warn!(error = ?e, "session persist failed");
                }
            }

            match cli.output {
                Output::Human => print_summary(&wizard),
                Output::Json => println!("{}", serde_json::to_string_pretty(&summary_json(&wizard))?),
            }
            let failed = wizard.apply.space_error.is_some()
                || wizard.apply.failures() > 0
                || wizard.test.phase == TestPhase::Failed;
            if failed {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
