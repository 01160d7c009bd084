//! statharvest - metric plugin for PostgreSQL, memcached and varnish.
//!
//! Prints metric values (or graph definitions in meta mode) on stdout in the
//! mackerel-agent plugin format. Logs go to stderr.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{Level, debug, error};
use tracing_subscriber::EnvFilter;

use statharvest_core::collector::{MemcachedTarget, PostgresConfig, SslMode};
use statharvest_core::plugin::{MemcachedPlugin, MetricsPlugin, PostgresPlugin, VarnishPlugin};
use statharvest_core::runner::{META_ENV, Runner, RunnerError};

/// Metric plugin for PostgreSQL, memcached and varnish.
#[derive(Parser, Debug)]
#[command(
    name = "statharvest",
    about = "Metric plugin for PostgreSQL, memcached and varnish",
    version
)]
struct Args {
    #[command(subcommand)]
    service: Service,

    /// State file for previous values (default: $TMPDIR/statharvest-<prefix>).
    #[arg(long, global = true)]
    tempfile: Option<PathBuf>,

    /// Print graph definitions instead of values.
    #[arg(
        long,
        global = true,
        env = META_ENV,
        action = clap::ArgAction::Set,
        value_parser = parse_meta_flag,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    meta: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Service {
    /// PostgreSQL statistics views.
    Postgres(PostgresArgs),
    /// memcached `stats`.
    Memcached(MemcachedArgs),
    /// varnishstat counters.
    Varnish(VarnishArgs),
}

#[derive(ClapArgs, Debug)]
struct PostgresArgs {
    /// Hostname to login to.
    #[arg(long, default_value = "localhost")]
    hostname: String,

    /// Database port.
    #[arg(long, default_value_t = 5432)]
    port: u16,

    /// PostgreSQL user.
    #[arg(long)]
    user: String,

    /// PostgreSQL password.
    #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
    password: String,

    /// Database name.
    #[arg(long)]
    database: Option<String>,

    /// Metric key prefix.
    #[arg(long, default_value = PostgresPlugin::DEFAULT_PREFIX)]
    metric_key_prefix: String,

    /// Whether or not to use SSL (disable, allow, prefer, require, verify-ca, verify-full).
    #[arg(long, default_value = "disable")]
    sslmode: SslMode,

    /// Maximum wait for connection, in seconds.
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,
}

#[derive(ClapArgs, Debug)]
struct MemcachedArgs {
    /// Hostname.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port.
    #[arg(long, default_value_t = 11211)]
    port: u16,

    /// Server socket (overrides host and port).
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Metric key prefix.
    #[arg(long, default_value = MemcachedPlugin::DEFAULT_PREFIX)]
    metric_key_prefix: String,
}

#[derive(ClapArgs, Debug)]
struct VarnishArgs {
    /// Path of varnishstat.
    #[arg(long, default_value = "/usr/bin/varnishstat")]
    varnishstat: PathBuf,

    /// Metric key prefix.
    #[arg(long, default_value = VarnishPlugin::DEFAULT_PREFIX)]
    metric_key_prefix: String,
}

/// The agent sets the meta variable to any non-empty value.
fn parse_meta_flag(s: &str) -> Result<bool, String> {
    Ok(!matches!(s.trim(), "" | "0" | "false"))
}

/// Initializes the tracing subscriber on stderr; stdout carries plugin output.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["statharvest", "statharvest_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

impl PostgresArgs {
    fn into_plugin(self) -> PostgresPlugin {
        let config = PostgresConfig {
            host: self.hostname,
            port: self.port,
            user: self.user,
            password: self.password,
            sslmode: self.sslmode,
            connect_timeout: self.connect_timeout,
            option: self.database.map(|db| format!("dbname={}", db)),
        };
        PostgresPlugin::new(config).with_prefix(self.metric_key_prefix)
    }
}

impl MemcachedArgs {
    fn into_plugin(self) -> MemcachedPlugin {
        let target = match self.socket {
            Some(path) => MemcachedTarget::Unix(path),
            None => MemcachedTarget::Tcp(format!("{}:{}", self.host, self.port)),
        };
        MemcachedPlugin::new(target).with_prefix(self.metric_key_prefix)
    }
}

impl VarnishArgs {
    fn into_plugin(self) -> VarnishPlugin {
        VarnishPlugin::new(self.varnishstat).with_prefix(self.metric_key_prefix)
    }
}

fn run<P: MetricsPlugin>(plugin: P, tempfile: Option<PathBuf>, meta: bool) -> Result<(), RunnerError> {
    let mut runner = Runner::new(plugin);
    if let Some(path) = tempfile {
        runner = runner.with_tempfile(path);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if meta {
        debug!("printing graph definitions");
        runner.output_definitions(&mut out)
    } else {
        runner.output_values(&mut out).map(|_| ())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let result = match args.service {
        Service::Postgres(pg) => run(pg.into_plugin(), args.tempfile, args.meta),
        Service::Memcached(mc) => run(mc.into_plugin(), args.tempfile, args.meta),
        Service::Varnish(v) => run(v.into_plugin(), args.tempfile, args.meta),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
