use sms_broadcast::config::get_configuration;
use sms_broadcast::startup::Application;
use sms_broadcast::telemetry::{get_subscriber, init_subscriber};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber(
        String::from("sms_broadcast"),
        String::from("info"),
        std::io::stdout,
    );

    init_subscriber(subscriber).map_err(std::io::Error::other)?;

    let config = get_configuration().map_err(std::io::Error::other)?;
    let application = Application::build(config).await?;

    tracing::info!("Server listening on port {}", application.get_port());

    application.run_until_stopped().await
}
