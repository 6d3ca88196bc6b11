mod output;

use clap::{Args as ClapArgs, Parser, Subcommand};
use futures::StreamExt;
use lib402_storm::{
    create_fetch_client, fetch_domain_list, normalize_domain, read_domain_list, BatchReport, DiscoveryConfig,
    DiscoveryLoop, HeadTransport, JsonLinesSink, ListSource, ProbeConfig, Prober, ReqwestTransport,
    ThrottledTransport, DEFAULT_USER_AGENT,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    io::{self, Write},
    num::NonZeroU32,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Deserialize, Serialize)]
struct Config {
    #[serde(default)]
    probe: ProbeSection,
    #[serde(default)]
    discovery: DiscoverySection,
    #[serde(default)]
    domains: DomainsSection,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct ProbeSection {
    timeout_ms: u64,
    user_agent: String,
    concurrency: usize,
    rate_per_host: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct DiscoverySection {
    batch_size: usize,
    interval_secs: u64,
    output: PathBuf,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct DomainsSection {
    #[serde(default)]
    never: Vec<String>,
}

impl Default for ProbeSection {
    fn default() -> Self {
        let defaults = ProbeConfig::default();
        Self {
            timeout_ms: defaults.timeout.as_millis() as u64,
            user_agent: defaults.user_agent,
            concurrency: defaults.concurrency,
            rate_per_host: None,
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let defaults = DiscoveryConfig::default();
        Self {
            batch_size: defaults.batch_size,
            interval_secs: defaults.interval.as_secs(),
            output: PathBuf::from("discoveries.jsonl"),
        }
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ppc").join("config.toml"))
}

fn load_config() -> Config {
    config_path()
        .and_then(|path| std::fs::read_to_string(&path).ok())
        .and_then(|content| toml::from_str(&content).ok())
        .unwrap_or_default()
}

fn apply_config_to_domains(mut domains: Vec<String>, config: &Config) -> Vec<String> {
    let never_set: HashSet<_> = config
        .domains
        .never
        .iter()
        .map(|s| normalize_domain(s).to_lowercase())
        .collect();

    domains.retain(|domain| !never_set.contains(&normalize_domain(domain).to_lowercase()));
    domains
}

fn get_default_config_toml() -> String {
    format!(
        r#"# Pay-Per-Crawl probe (ppc) Configuration

[probe]
# Per-request deadline in milliseconds
timeout_ms = 10000
user_agent = "{}"
# Maximum probes in flight at once
concurrency = 10
# Optional requests per second per host
# rate_per_host = 2

[discovery]
# Domains pulled from the source per round
batch_size = 100
interval_secs = 60
output = "discoveries.jsonl"

[domains]
# Domains that are never probed
# never = ["example.com", "internal.corp"]
never = []
"#,
        DEFAULT_USER_AGENT
    )
}

#[derive(Parser, Debug)]
#[command(name = "ppc")]
#[command(about = "Pay-Per-Crawl probe - find sites that answer crawlers with HTTP 402", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the default config to stdout and exit
    #[arg(long)]
    print_default_config: bool,

    /// Write the default config to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe a list of domains once and report what they answered
    Probe(ProbeArgs),
    /// Keep probing domains from a list and record pay-per-crawl sites
    Watch(WatchArgs),
}

#[derive(ClapArgs, Debug, Default)]
struct ProbeOptions {
    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// User-Agent header sent with every probe
    #[arg(long)]
    user_agent: Option<String>,

    /// Maximum number of probes in flight
    #[arg(long, short = 'c')]
    concurrency: Option<usize>,

    /// Limit requests per second to any single host
    #[arg(long)]
    rate_per_host: Option<u32>,
}

#[derive(ClapArgs, Debug)]
struct ProbeArgs {
    /// Domains to probe (scheme and trailing slash are ignored)
    domains: Vec<String>,

    /// Read additional domains from a file (one per line or rank,domain)
    #[arg(long, short = 'f')]
    file: Option<PathBuf>,

    /// Print the full JSON report ({summary, results, discovered})
    #[arg(long, conflicts_with = "ndjson")]
    json: bool,

    /// Output results as NDJSON stream (one JSON object per line)
    #[arg(long, short = 'j')]
    ndjson: bool,

    #[command(flatten)]
    options: ProbeOptions,
}

#[derive(ClapArgs, Debug)]
struct WatchArgs {
    /// Domain list file to cycle through
    #[arg(long, conflicts_with = "domains_url", required_unless_present = "domains_url")]
    domains_file: Option<PathBuf>,

    /// URL of a domain list to download once at startup
    #[arg(long)]
    domains_url: Option<String>,

    /// JSON-lines file discoveries are appended to
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Domains probed per round
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seconds to sleep between rounds
    #[arg(long)]
    interval_secs: Option<u64>,

    #[command(flatten)]
    options: ProbeOptions,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .init();
}

fn probe_config(options: &ProbeOptions, config: &Config) -> ProbeConfig {
    ProbeConfig {
        timeout: Duration::from_millis(options.timeout_ms.unwrap_or(config.probe.timeout_ms)),
        user_agent: options
            .user_agent
            .clone()
            .unwrap_or_else(|| config.probe.user_agent.clone()),
        concurrency: options.concurrency.unwrap_or(config.probe.concurrency).max(1),
    }
}

fn build_prober(options: &ProbeOptions, config: &Config) -> Result<Prober, Box<dyn std::error::Error>> {
    let probe_config = probe_config(options, config);
    let transport = ReqwestTransport::new()?;
    let rate = options
        .rate_per_host
        .or(config.probe.rate_per_host)
        .and_then(NonZeroU32::new);

    let transport: Arc<dyn HeadTransport> = match rate {
        Some(rate) => Arc::new(ThrottledTransport::new(transport, rate)),
        None => Arc::new(transport),
    };
    Ok(Prober::with_transport(transport, probe_config))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.print_default_config {
        println!("{}", get_default_config_toml());
        return Ok(());
    }

    if args.write_default_config {
        if let Some(path) = config_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, get_default_config_toml())?;
            println!("Default config written to: {}", path.display());
        } else {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
        return Ok(());
    }

    init_tracing(args.verbose);
    let config = load_config();
    tracing::debug!(?config, path = ?config_path(), "loaded config");

    let Some(command) = args.command else {
        eprintln!("Error: a command is required (try `ppc probe example.com`)");
        std::process::exit(1);
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match command {
            Command::Probe(probe_args) => run_probe(probe_args, &config).await,
            Command::Watch(watch_args) => run_watch(watch_args, &config).await,
        }
    })
}

async fn run_probe(args: ProbeArgs, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut domains = args.domains.clone();
    if let Some(ref file) = args.file {
        domains.extend(read_domain_list(file).await?);
    }
    let domains = apply_config_to_domains(domains, config);

    if domains.is_empty() {
        eprintln!("Error: no domains to probe");
        std::process::exit(1);
    }

    let prober = build_prober(&args.options, config)?;

    if args.ndjson {
        return run_ndjson(&prober, domains).await;
    }

    let report = BatchReport::new(prober.probe_batch(domains).await);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_report(&report);
    }

    Ok(())
}

async fn run_ndjson(prober: &Prober, domains: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = prober.probe_stream(domains);

    while let Some(verdict) = stream.next().await {
        if let Ok(json) = serde_json::to_string(&verdict) {
            println!("{}", json);
            io::stdout().flush()?;
        }
    }

    Ok(())
}

async fn run_watch(args: WatchArgs, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let domains = if let Some(ref file) = args.domains_file {
        read_domain_list(file).await?
    } else if let Some(ref url) = args.domains_url {
        let client = create_fetch_client(Duration::from_secs(30))?;
        fetch_domain_list(&client, url).await?
    } else {
        Vec::new()
    };
    let domains = apply_config_to_domains(domains, config);

    if domains.is_empty() {
        eprintln!("Error: the domain list is empty");
        std::process::exit(1);
    }

    let output = args.output.clone().unwrap_or_else(|| config.discovery.output.clone());
    let discovery_config = DiscoveryConfig {
        batch_size: args.batch_size.unwrap_or(config.discovery.batch_size).max(1),
        interval: Duration::from_secs(args.interval_secs.unwrap_or(config.discovery.interval_secs)),
    };

    eprintln!(
        "Watching {} domains, {} per round every {}s; discoveries go to {}",
        domains.len(),
        discovery_config.batch_size,
        discovery_config.interval.as_secs(),
        output.display()
    );

    let discovery = DiscoveryLoop::new(
        build_prober(&args.options, config)?,
        Arc::new(ListSource::new(domains)),
        Arc::new(JsonLinesSink::new(&output)),
        discovery_config,
    );

    discovery.start().await;
    tokio::signal::ctrl_c().await?;
    eprintln!("Stopping after the current round...");
    discovery.stop().await;

    Ok(())
}
