//! rivalscope - gateway server, one-shot runs and estimates

use clap::Parser;
use rivalscope::cli::{apply_serve_flags, Cli, Commands};
use rivalscope::logging::init_tracing;
use rivalscope_core::{estimate_completion_secs, Depth, SubmitRequest};
use rivalscope_gateway::start_gateway;
use rivalscope_pipeline::topology;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    match &cli.command {
        Commands::Serve {
            port,
            bind,
            token,
            no_auth,
        } => {
            let config = apply_serve_flags(
                cli.load_config(),
                *port,
                bind.as_deref(),
                token.clone(),
                *no_auth,
            );
            start_gateway(config).await?;
        }

        Commands::Run {
            depth,
            visual,
            tenant,
            no_cache,
            targets,
        } => {
            let config = cli.load_config();
            let request = SubmitRequest {
                targets: targets.clone(),
                depth: depth.clone(),
                visual_analysis: *visual,
                use_cache: !*no_cache,
            };
            let job = rivalscope::run_once(&config, tenant, &request).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            if job.error.is_some() {
                std::process::exit(1);
            }
        }

        Commands::Estimate { depth, targets } => {
            let depth: Depth = depth.parse()?;
            let out = serde_json::json!({
                "depth": depth,
                "targets": targets,
                "topology": topology::select(*targets),
                "estimated_completion_secs": estimate_completion_secs(depth, *targets),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }

        Commands::Config => {
            print!("{}", cli.load_config().to_toml());
        }

        Commands::Version => {
            println!("rivalscope v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
