mod handlers;

use challengebox::{
    cli::{ChallengeboxArgs, ChallengeboxSubcommand, HostSubcommand},
    config::Settings,
    utils, ChallengeboxResult,
};
use clap::{CommandFactory, Parser};
use tracing_subscriber::{fmt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ChallengeboxResult<()> {
    let dotenv = utils::load_dotenv();

    // Parse command line arguments
    let args = ChallengeboxArgs::parse();

    let filter = if args.verbose {
        EnvFilter::new("challengebox=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_env_filter(filter)
        .init();

    match dotenv {
        Ok(Some(path)) => tracing::debug!("loaded environment from {}", path.display()),
        Ok(None) => {}
        Err(e) => tracing::warn!("failed to load .env file: {}", e),
    }

    let Some(subcommand) = args.subcommand else {
        ChallengeboxArgs::command().print_help()?;
        return Ok(());
    };

    let settings = Settings::load(args.config.as_deref()).await?;
    match subcommand {
        ChallengeboxSubcommand::Serve { addr } => {
            handlers::serve_subcommand(settings, addr).await?;
        }
        ChallengeboxSubcommand::Host { subcommand } => match subcommand {
            HostSubcommand::Set {
                owner_id,
                hostname,
                tls,
                ca_cert,
                client_cert,
                client_key,
                repositories,
            } => {
                handlers::host_set_subcommand(
                    settings,
                    owner_id,
                    hostname,
                    tls,
                    ca_cert,
                    client_cert,
                    client_key,
                    repositories,
                )
                .await?;
            }
            HostSubcommand::List => {
                handlers::host_list_subcommand(settings).await?;
            }
        },
        ChallengeboxSubcommand::Images { tags } => {
            handlers::images_subcommand(settings, tags).await?;
        }
        ChallengeboxSubcommand::Status { owner_id } => {
            handlers::status_subcommand(settings, owner_id).await?;
        }
        ChallengeboxSubcommand::Nuke {
            container,
            owner_id,
            all,
        } => {
            handlers::nuke_subcommand(settings, container, owner_id, all).await?;
        }
        ChallengeboxSubcommand::Sweep => {
            handlers::sweep_subcommand(settings).await?;
        }
    }

    Ok(())
}
