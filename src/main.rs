use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use rollout_helper::create::CreateResourceConfig;
use rollout_helper::overrides::parse_override;
use rollout_helper::step::run_until_cancelled;
use rollout_helper::tag::TagImageConfig;
use rollout_helper::verify::{VerifyDeploymentConfig, DEFAULT_WAIT_MS};
use rollout_helper::{Overrides, StepConfig};

#[derive(Parser)]
#[command(name = "rollout-helper")]
#[command(bin_name = "rollout-helper")]
enum RolloutHelperCli {
    /// Wait for the latest deployment of a deployment config to complete
    Verify(VerifyArgs),
    /// Tag an image from one image stream into another
    Tag(TagArgs),
    /// Create resources from a JSON or YAML document
    Create(CreateArgs),
}

#[derive(Args)]
struct CommonArgs {
    #[arg(long, default_value = "")]
    api_url: String,
    #[arg(short, long, env = "PROJECT_NAME")]
    namespace: String,
    #[arg(long, env = "ROLLOUT_HELPER_AUTH_TOKEN", default_value = "", hide_env_values = true)]
    auth_token: String,
    #[arg(short, long)]
    verbose: bool,
    /// Shadow a step field for this run, e.g. `-o replicaCount=3`
    #[arg(short = 'o', long = "override", value_parser = parse_override)]
    overrides: Vec<(String, String)>,
}

impl CommonArgs {
    fn split(self) -> (StepConfig, Overrides) {
        let step = StepConfig {
            api_url: self.api_url,
            namespace: self.namespace,
            auth_token: self.auth_token,
            verbose: self.verbose,
        };
        (step, self.overrides.into_iter().collect())
    }
}

#[derive(Args)]
#[command(author, version, about, long_about = None)]
struct VerifyArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(short, long = "dep-cfg")]
    deployment_config: String,
    #[arg(short, long, default_value = "")]
    replica_count: String,
    #[arg(long)]
    verify_replica_count: bool,
    /// How long to wait for the rollout, in milliseconds
    #[arg(long, env = "ROLLOUT_HELPER_WAIT_MS", default_value_t = DEFAULT_WAIT_MS)]
    wait_ms: u64,
}

#[derive(Args)]
#[command(author, version, about, long_about = None)]
struct TagArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long)]
    test_stream: String,
    #[arg(long)]
    test_tag: String,
    #[arg(long)]
    prod_stream: String,
    #[arg(long)]
    prod_tag: String,
    #[arg(long, default_value = "")]
    destination_namespace: String,
    #[arg(long, env = "ROLLOUT_HELPER_DESTINATION_AUTH_TOKEN", default_value = "", hide_env_values = true)]
    destination_auth_token: String,
}

#[derive(Args)]
#[command(author, version, about, long_about = None)]
struct CreateArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Document to create; read from stdin when omitted
    #[arg(short, long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            on_signal.cancel();
        }
    });

    let succeeded = match RolloutHelperCli::parse() {
        RolloutHelperCli::Verify(args) => {
            let (step, overrides) = args.common.split();
            let config = VerifyDeploymentConfig {
                step,
                deployment_config: args.deployment_config,
                replica_count: args.replica_count,
                verify_replica_count: args.verify_replica_count,
            };
            let wait = Duration::from_millis(args.wait_ms);
            run_until_cancelled(&cancel, config.run(&overrides, wait, &cancel)).await?
        }
        RolloutHelperCli::Tag(args) => {
            let (step, overrides) = args.common.split();
            let config = TagImageConfig {
                step,
                test_stream: args.test_stream,
                test_tag: args.test_tag,
                prod_stream: args.prod_stream,
                prod_tag: args.prod_tag,
                destination_namespace: args.destination_namespace,
                destination_auth_token: args.destination_auth_token,
            };
            run_until_cancelled(&cancel, config.run(&overrides)).await?
        }
        RolloutHelperCli::Create(args) => {
            let (step, overrides) = args.common.split();
            let jsonyaml = match args.file {
                Some(path) => std::fs::read_to_string(path)?,
                None => {
                    let mut buffer = String::new();
                    std::io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            let config = CreateResourceConfig { step, jsonyaml };
            run_until_cancelled(&cancel, config.run(&overrides)).await?
        }
    };

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
