use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use splitdns::config::{parse_domains, parse_servers};
use splitdns::proxy::{self, ProxyConfig};
use splitdns::resolver_files::DEFAULT_RESOLVER_DIR;
use splitdns::system_dns::DEFAULT_RESOLV_CONF;

#[derive(Parser)]
#[command(name = "splitdns")]
#[command(about = "Split-horizon DNS forwarder for macOS", long_about = None)]
#[command(after_help = "Example:\n  splitdns --servers 1.0.0.1 --domains company.com,company-resources.com")]
struct Args {
    /// Comma separated list of custom DNS servers
    #[arg(short, long)]
    servers: String,

    /// Comma separated list of custom DNS domains
    #[arg(short, long)]
    domains: String,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:53")]
    bind: SocketAddr,

    /// Host resolver configuration to follow
    #[arg(long, default_value = DEFAULT_RESOLV_CONF)]
    resolv_conf: PathBuf,

    /// Directory for per-domain resolver files
    #[arg(long, default_value = DEFAULT_RESOLVER_DIR)]
    resolver_dir: PathBuf,

    /// Timeout for each upstream attempt, in milliseconds
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,

    /// Enable verbose logging (domain, upstream, timing)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if !cfg!(target_os = "macos") {
        error!("splitdns is designed for macOS");
        return ExitCode::FAILURE;
    }

    let config = match build_config(args) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "cannot start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(proxy::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(3)
        }
    }
}

fn build_config(args: Args) -> anyhow::Result<ProxyConfig> {
    Ok(ProxyConfig {
        bind_addr: args.bind,
        servers: parse_servers(&args.servers)?,
        domains: parse_domains(&args.domains)?,
        resolv_conf: args.resolv_conf,
        resolver_dir: args.resolver_dir,
        upstream_timeout: Duration::from_millis(args.timeout_ms),
    })
}
