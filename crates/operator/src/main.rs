use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gitops_operator::{
    config::Config,
    controllers::KubeJobCompletionController,
    server::Server,
    watch::JobWatch,
    Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::load()?;
    info!("Loaded configuration: {:?}", config);

    // Start the cluster-wide Job watch
    let watch = JobWatch::connect(&config.kube).await?;
    let controller = Arc::new(KubeJobCompletionController::for_cluster(
        watch.client().clone(),
        &config.events.reporter,
    ));
    let job_watch = watch.start(controller).await?;

    // Serve health and metrics
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = Server::new(&config);
    let mut server_task = tokio::spawn(server.start(async move {
        let _ = shutdown_rx.await;
    }));

    let finished_early = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Received shutdown signal");
            None
        }
        res = &mut server_task => Some(res),
    };

    let _ = shutdown_tx.send(());
    job_watch.stop().await;

    let server_result = match finished_early {
        Some(res) => res,
        None => server_task.await,
    };
    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
    }

    info!("Shut down");
    Ok(())
}
