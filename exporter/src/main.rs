use std::sync::Arc;

use is_terminal::IsTerminal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use exporter::{builder::Builder, config::Options, *};

fn main() {
    use std::process;

    let cmd = config::command();
    if let Err(e) = match cmd.get_matches().subcommand() {
        Some(("run", m)) => Options::try_from(m).and_then(startup),
        _ => unreachable!(),
    } {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn startup(opts: Options) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tokio::{runtime, signal};
    use tracing_subscriber::{filter::EnvFilter, prelude::*};

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let collector = tracing_subscriber::Registry::default()
        .with(env_filter)
        .with(if std::io::stdout().is_terminal() {
            Some(tracing_subscriber::fmt::layer())
        } else {
            None
        })
        .with(if std::io::stdout().is_terminal() {
            None
        } else {
            Some(tracing_subscriber::fmt::layer().json())
        });
    tracing::subscriber::set_global_default(collector)?;
    let prom = PrometheusBuilder::new().with_http_listener(opts.telemetry_address()?);

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let token = CancellationToken::new();
    rt.handle().spawn(async move {
        if let Err(e) = prom.install() {
            error!("error setting up prometheus endpoint: {e}");
        }
    });
    describe_metrics();
    let stop = token.clone();
    rt.handle().spawn(async move {
        if let Err(err) = signal::ctrl_c().await {
            error!("error reading SIGTERM: {err}");
        }
        stop.cancel();
    });
    rt.block_on(run(opts, token))
}

async fn run(opts: Options, token: CancellationToken) -> Result<()> {
    use tokio::task;

    let config = kube::Config::infer().await?;
    let client = kube::client::ClientBuilder::try_from(config)?.build();

    info!(
        namespaces = ?opts.namespaces,
        namespaces_denylist = ?opts.namespaces_denylist,
        shard = opts.shard,
        total_shards = opts.total_shards,
        "setup done, starting watches"
    );
    let mut tasks = task::JoinSet::new();
    let collector = Builder::new(client, &opts, token.clone()).build(&mut tasks)?;
    tasks.spawn(server::serve(
        opts.address()?,
        Arc::new(collector),
        opts.enable_gzip_encoding,
        token.clone(),
    ));
    while let Some(res) = tasks.join_next().await {
        match res {
            Err(e) => error!("error running task: {e}"),
            Ok(res) => {
                if let Err(e) = res {
                    error!("error from task: {e}");
                    token.cancel();
                }
            }
        };
    }
    Ok(())
}
