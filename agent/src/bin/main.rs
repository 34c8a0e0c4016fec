use std::{path::Path, sync::Arc};

use anyhow::{Context, anyhow};
use clap::{Args, FromArgMatches};
use cli::{ConfigArgs, ConfigCommand};
use ec2_cost::{Collector, Scheduler, labels::TagSchema, metrics::Ec2Metrics};
use ec2_cost_agent::{
    config::{self, Config},
    init_logger,
};
use plugin_aws_ec2::AwsEc2Client;
use plugin_prometheus_exporter::{MetricsServer, PrometheusSink};
use tokio::sync::oneshot;

const BINARY: &str = env!("CARGO_BIN_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main function of the exporter.
///
/// The steps are:
/// - parse the CLI
/// - parse the config file and apply the CLI overrides
/// - register the metrics and start the HTTP server
/// - poll EC2 until an error occurs or the process is interrupted (Ctrl+C)
///
/// About errors: we use `anyhow::Result` and `context` instead of `expect` to get
/// nicer error messages (`expect` prints errors with `Debug`).
fn main() -> anyhow::Result<()> {
    init_logger();

    // Define the command-line interface.
    let mut cmd = clap::Command::new(BINARY)
        .version(VERSION)
        .about("Exports the EC2 instances, reservations and spot requests of an AWS region as Prometheus metrics.");
    cmd = cli::Cli::augment_args(cmd);

    // Parse CLI arguments and handle some special flags like --version and --help.
    let matches = cmd.get_matches();
    let args = cli::Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    log::info!("Starting {BINARY} v{VERSION}");

    let config_file = Path::new(&args.common.config);
    match args.command {
        Some(cli::Command::Config(ConfigArgs {
            command: ConfigCommand::Regen,
        })) => {
            // (re)generate the default config
            config::write_default(config_file)?;
            log::info!("Default configuration file written to: {}", args.common.config);
            Ok(())
        }
        Some(cli::Command::Run) | None => {
            let mut config = config::load(config_file).context("invalid configuration")?;
            args.common.overrides().apply(&mut config);
            config.validate().context("invalid configuration")?;
            run(config).inspect_err(|e| log::error!("Fatal error, stopping: {e:#}"))
        }
    }
}

/// Starts the async runtime and runs the exporter on it.
fn run(config: Config) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ec2-cost-worker")
        .build()
        .context("failed to start the tokio runtime")?;
    rt.block_on(run_exporter(config))
}

async fn run_exporter(config: Config) -> anyhow::Result<()> {
    let tags = Arc::new(TagSchema::parse(&config.instance_tags));
    if !tags.is_empty() {
        log::info!("Tag labels: {}", tags.label_names().join(", "));
    }

    // Every family must be registered before the first poll cycle.
    let metrics = Ec2Metrics::new(&tags);
    let sink = PrometheusSink::new();
    metrics.register(&sink).context("failed to register the metrics")?;

    let server = MetricsServer::bind(config.listen_address, sink.state())?;
    let (stop_server, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(server.run(async {
        stop_rx.await.ok();
    }));

    let api = Arc::new(AwsEc2Client::new(&config.region).await);
    let collector = Collector::new(api, Arc::new(sink), &metrics, tags).with_fetch_timeout(config.fetch_timeout);
    let scheduler = Scheduler::new(collector, config.poll_interval);

    let mut server_stopped = false;
    let res = tokio::select! {
        res = scheduler.run() => res.context("EC2 polling failed"),
        res = &mut server => {
            server_stopped = true;
            match res {
                Ok(Ok(())) => Err(anyhow!("the HTTP server stopped unexpectedly")),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(anyhow::Error::new(e).context("the HTTP server panicked")),
            }
        }
        res = tokio::signal::ctrl_c() => {
            log::info!("Interrupted, shutting down.");
            res.context("failed to listen for Ctrl+C")
        }
    };

    if !server_stopped {
        let _ = stop_server.send(());
        match server.await {
            Ok(Ok(())) => (),
            Ok(Err(e)) => log::error!("HTTP server error: {e:#}"),
            Err(e) => log::error!("HTTP server task failed: {e}"),
        }
    }
    res
}

/// Exporter command-line interface (CLI).
///
/// We use `clap` to parse these options, therefore the structs
/// derive [`clap::Args`] or other clap trait implementations.
mod cli {
    use std::{net::SocketAddr, time::Duration};

    use clap::{Args, Parser, Subcommand};
    use ec2_cost_agent::config::Overrides;

    #[derive(Parser)]
    pub struct Cli {
        #[command(subcommand)]
        pub command: Option<Command>,

        #[command(flatten)]
        pub common: CommonArgs,
    }

    #[derive(Subcommand)]
    pub enum Command {
        /// Poll EC2 and serve the metrics.
        ///
        /// This is the default command.
        Run,

        /// Manipulate the configuration.
        Config(ConfigArgs),
    }

    #[derive(Args)]
    pub struct ConfigArgs {
        #[command(subcommand)]
        pub command: ConfigCommand,
    }

    #[derive(Subcommand)]
    pub enum ConfigCommand {
        /// Regenerate the configuration file and stop.
        ///
        /// If the file exists, it will be overwritten.
        Regen,
    }

    /// Common CLI arguments.
    ///
    /// Every option except `--config` overrides the corresponding setting of the config file.
    #[derive(Args, Clone)]
    pub struct CommonArgs {
        /// Path to the config file.
        ///
        /// If the file does not exist, the default configuration is used.
        #[arg(long, env = "EC2_COST_EXPORTER_CONFIG", default_value = "ec2-cost-exporter.toml")]
        pub config: String,

        /// AWS region to poll, ex. `us-east-1`.
        #[arg(long)]
        pub region: Option<String>,

        /// Tag keys to expose as labels, separated by commas, ex. `Team,Environment`.
        #[arg(long)]
        pub instance_tags: Option<String>,

        /// Time between two poll cycles, ex. `4m`.
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        pub poll_interval: Option<Duration>,

        /// Address and port of the HTTP server, ex. `0.0.0.0:9190`.
        #[arg(long)]
        pub listen_address: Option<SocketAddr>,

        /// Maximum duration of each fetch, ex. `1m`.
        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        pub fetch_timeout: Option<Duration>,
    }

    impl CommonArgs {
        pub fn overrides(&self) -> Overrides {
            Overrides {
                region: self.region.clone(),
                instance_tags: self.instance_tags.clone(),
                poll_interval: self.poll_interval,
                listen_address: self.listen_address,
                fetch_timeout: self.fetch_timeout,
            }
        }
    }
}
