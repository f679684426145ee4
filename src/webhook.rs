//! # Update Delivery
//!
//! Runs the dispatcher either with long polling or behind the axum webhook server that
//! teloxide provides. In webhook mode the same server also answers `GET /` so that
//! hosting platforms see a live service.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use anyhow::Result;
use axum::routing::get;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use teloxide::update_listeners::UpdateListener;
use tracing::info;

use crate::config::BotConfig;
use crate::errors::error_logging;

/// Body of the status page
pub const STATUS_TEXT: &str = "Bot running";

/// Handler of `GET /` (axum answers `HEAD` with the same route)
pub async fn status_page() -> &'static str {
    STATUS_TEXT
}

/// Register the webhook with Telegram and build the router serving it
///
/// Returns the update listener for the dispatcher, the future that resolves when the
/// listener stops, and the router with the status page merged in.
pub async fn build_webhook_router(
    bot: Bot,
    config: &BotConfig,
) -> Result<(
    impl UpdateListener<Err = Infallible>,
    impl Future<Output = ()> + Send,
    axum::Router,
)> {
    let address = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let url = config.webhook_url()?;

    let mut options = webhooks::Options::new(address, url.clone());
    if let Some(secret) = &config.webhook_secret_token {
        options = options.secret_token(secret.clone());
    }

    let (listener, stop_flag, router) = webhooks::axum_to_router(bot, options).await?;
    let router = router.route("/", get(status_page));

    info!(webhook_url = %url, address = %address, "Webhook registered with Telegram");
    Ok((listener, stop_flag, router))
}

/// Serve the webhook and dispatch updates until shutdown
///
/// Telegram gets a 200 for every accepted POST; handler failures are logged by the
/// dispatcher and never turned into HTTP errors.
pub async fn run_webhook(
    bot: Bot,
    handler: UpdateHandler<anyhow::Error>,
    config: &BotConfig,
) -> Result<()> {
    let (listener, stop_flag, router) = build_webhook_router(bot.clone(), config).await?;

    let address = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let tcp_listener = tokio::net::TcpListener::bind(address).await?;
    info!(address = %address, "Webhook server listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(stop_flag)
            .await
        {
            error_logging::log_network_error(&e, "serve_webhook", None, None);
        }
    });

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("An error from the webhook listener"),
        )
        .await;

    if let Err(e) = server.await {
        error_logging::log_internal_error(&e, "webhook", "join_server_task", None);
    }
    Ok(())
}

/// Dispatch updates with long polling
///
/// A webhook left over from an earlier deployment would make `getUpdates` fail, so it
/// is removed first.
pub async fn run_polling(bot: Bot, handler: UpdateHandler<anyhow::Error>) -> Result<()> {
    bot.delete_webhook().await?;
    info!("Webhook removed, starting long polling");

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}
