use {
    scanstats::{
        clock::SystemClock,
        config::Config,
        connection::{ConnectionController, WebSocketTransport},
        presenter::LogPresenter,
    },
    std::sync::Arc,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    // Write logs to stderr; info unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    // NOTE: Workaround for rustls issue
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        log::warn!("A rustls crypto provider was already installed");
    }

    let url = config.endpoint_url()?;

    log::info!("🚀 Starting scanstats...");
    log::info!("📊 Configuration:");
    log::info!("   Endpoint: {}", url);
    log::info!("   Max display: {}", config.max_display);
    log::info!(
        "   Reconnect: {}s..{}s, policy {:?}",
        config.reconnect_delay_secs,
        config.reconnect_max_delay_secs,
        config.reconnect_policy
    );
    log::info!("   Rate stale slots: {:?}", config.stale_slot_policy);

    let mut controller = ConnectionController::new(
        url,
        Arc::new(WebSocketTransport),
        config.controller_config(),
        Arc::new(SystemClock),
    );
    controller.subscribe(Box::new(LogPresenter::new(config.max_display)));

    let controller = controller
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    let global = controller.store().global();
    log::info!(
        "Final totals: found={} scanned={} users={} projects={}",
        global.found,
        global.scanned,
        controller.store().lifetime().len(),
        controller.store().project().len()
    );

    Ok(())
}
