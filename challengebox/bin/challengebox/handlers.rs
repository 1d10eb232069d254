use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use challengebox::{
    catalog,
    cli::AnsiStyles,
    config::Settings,
    engine::HttpEngine,
    lifecycle::{LifecycleManager, ReclaimTarget},
    models::{HostConfigUpdate, InstanceRecord},
    platform::HeaderOwnerResolver,
    server::{ChallengeboxServer, ServerState},
    store::{self, HostStore, InstanceTracker, CHALLENGEBOX_DB_MIGRATOR},
    ChallengeboxResult,
};
use tokio::fs;

//--------------------------------------------------------------------------------------------------
// Functions: Handlers
//--------------------------------------------------------------------------------------------------

pub async fn serve_subcommand(
    settings: Settings,
    addr: Option<SocketAddr>,
) -> ChallengeboxResult<()> {
    let manager = Arc::new(build_manager(&settings).await?);
    let resolver = Arc::new(HeaderOwnerResolver::new(*settings.get_owner_kind()));
    let state = ServerState::new(manager, resolver);

    let addr = addr.unwrap_or(*settings.get_listen_addr());
    ChallengeboxServer::new(addr, state, settings.sweep_interval())
        .serve()
        .await
}

#[allow(clippy::too_many_arguments)]
pub async fn host_set_subcommand(
    settings: Settings,
    owner_id: String,
    hostname: String,
    tls: bool,
    ca_cert: Option<PathBuf>,
    client_cert: Option<PathBuf>,
    client_key: Option<PathBuf>,
    repositories: Vec<String>,
) -> ChallengeboxResult<()> {
    let update = HostConfigUpdate {
        owner_id,
        hostname,
        tls_enabled: tls,
        ca_cert: read_pem(ca_cert).await?,
        client_cert: read_pem(client_cert).await?,
        client_key: read_pem(client_key).await?,
        allowed_repositories: repositories,
    };

    let manager = build_manager(&settings).await?;
    let host = manager.save_host(update).await?;
    println!(
        "{} {} -> {}",
        "saved".valid(),
        host.get_owner_id().literal(),
        host.get_hostname()
    );

    Ok(())
}

pub async fn host_list_subcommand(settings: Settings) -> ChallengeboxResult<()> {
    let manager = build_manager(&settings).await?;
    let hosts = manager.get_hosts().list().await?;
    if hosts.is_empty() {
        println!("{}", "no hosts configured".placeholder());
        return Ok(());
    }

    println!("{}", "OWNER\tHOSTNAME\tTLS\tREPOSITORIES".header());
    for host in hosts {
        let repositories = host
            .get_allowed_repositories()
            .iter()
            .cloned()
            .collect::<Vec<_>>();
        println!(
            "{}\t{}\t{}\t{}",
            host.get_owner_id().literal(),
            host.get_hostname(),
            host.tls_enabled(),
            if repositories.is_empty() {
                "*".to_string()
            } else {
                repositories.join(",")
            }
        );
    }

    Ok(())
}

pub async fn images_subcommand(settings: Settings, tags: bool) -> ChallengeboxResult<()> {
    let manager = build_manager(&settings).await?;
    let Some(host) = manager.get_hosts().reference().await? else {
        println!("{}", "no hosts configured".error());
        return Ok(());
    };

    let images = catalog::list_images(
        manager.get_engine().as_ref(),
        &host,
        tags,
        host.get_allowed_repositories(),
    )
    .await;

    if images.is_empty() {
        println!("{}", "no images available".placeholder());
    }

    for image in images {
        println!("{image}");
    }

    Ok(())
}

pub async fn status_subcommand(
    settings: Settings,
    owner_id: Option<String>,
) -> ChallengeboxResult<()> {
    let manager = build_manager(&settings).await?;
    let records = match owner_id {
        Some(id) => {
            let owner = manager.owner(id.clone(), id);
            manager.instances_for(&owner).await?
        }
        None => manager.all_instances().await?,
    };

    if records.is_empty() {
        println!("{}", "no tracked instances".placeholder());
        return Ok(());
    }

    let now = manager.now();
    println!("{}", "OWNER\tIMAGE\tHOST\tPORTS\tAGE\tCONTAINER".header());
    for record in records {
        print_record(&record, now);
    }

    Ok(())
}

pub async fn nuke_subcommand(
    settings: Settings,
    container: Option<String>,
    owner_id: Option<String>,
    all: bool,
) -> ChallengeboxResult<()> {
    let target = match (all, container) {
        (true, _) => ReclaimTarget::All,
        (false, Some(engine_instance_id)) => ReclaimTarget::Instance {
            engine_instance_id,
            owner_id,
        },
        (false, None) => {
            println!("{}", "nothing to remove".error());
            return Ok(());
        }
    };

    let manager = build_manager(&settings).await?;
    let report = manager.admin_force_delete(target).await?;
    for id in &report.removed {
        println!("{} {}", "removed".valid(), id);
    }

    for failure in &report.failures {
        println!(
            "{} {} ({}): {}",
            "failed".error(),
            failure.engine_instance_id,
            failure.owner_id,
            failure.error
        );
    }

    Ok(())
}

pub async fn sweep_subcommand(settings: Settings) -> ChallengeboxResult<()> {
    let manager = build_manager(&settings).await?;
    let reclaimed = manager.sweep_all().await?;
    println!("{} {} stale instance(s)", "reclaimed".valid(), reclaimed);
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn build_manager(settings: &Settings) -> ChallengeboxResult<LifecycleManager> {
    let db_path = settings.resolved_database_path();
    let pool = store::init_db(&db_path, &CHALLENGEBOX_DB_MIGRATOR).await?;
    tracing::debug!("using database {}", db_path.display());

    Ok(LifecycleManager::builder()
        .engine(Arc::new(HttpEngine::new(settings.engine_timeout())?))
        .hosts(HostStore::new(pool.clone()))
        .tracker(InstanceTracker::new(pool))
        .policy(settings.get_policy().clone())
        .owner_kind(*settings.get_owner_kind())
        .build())
}

async fn read_pem(path: Option<PathBuf>) -> ChallengeboxResult<Option<String>> {
    match path {
        Some(path) => Ok(Some(fs::read_to_string(&path).await?)),
        None => Ok(None),
    }
}

fn print_record(record: &InstanceRecord, now: i64) {
    let ports = record
        .get_allocated_ports()
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",");

    println!(
        "{}\t{}\t{}\t{}\t{}s\t{}",
        record.get_owner_id().literal(),
        record.get_reference(),
        record.get_host(),
        ports,
        record.age(now),
        record.get_engine_instance_id()
    );
}
