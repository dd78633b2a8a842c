use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::net::TcpListener;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

use crate::broadcast::ResolutionFailurePolicy;
use crate::config::{DatabaseSettings, Settings};
use crate::queue::{DeliveryQueue, RedisDeliveryQueue};
use crate::routes::{handle_send, handle_update, health_check, MAX_SEND_BODY_BYTES};
use crate::sms_client::SmsClient;
use crate::store::{PostgresSubscriberStore, SubscriberStore};
use crate::worker_pool::WorkerPool;

pub struct Application {
    port: u16,
    server: Server,
    worker_pool: WorkerPool,
    settings: Settings,
}

impl Application {
    /// Wires the Postgres store and the Redis queue from `config`.
    pub async fn build(config: Settings) -> Result<Self, std::io::Error> {
        let db_pool = get_connection_db_pool(&config.database);
        let redis_client =
            redis::Client::open(config.get_redis_address()).map_err(std::io::Error::other)?;

        let store = Arc::new(PostgresSubscriberStore::new(db_pool));
        let queue = Arc::new(RedisDeliveryQueue::new(
            redis_client,
            config.redis.queue_name.clone(),
        ));

        Self::build_with(config, store, queue).await
    }

    /// Builds the HTTP server and starts the delivery workers on top of the
    /// given store and queue.
    pub async fn build_with(
        config: Settings,
        store: Arc<dyn SubscriberStore>,
        queue: Arc<dyn DeliveryQueue>,
    ) -> Result<Self, std::io::Error> {
        let sms_client = SmsClient::new(
            config.sms_gateway.base_url.clone(),
            config.sms_gateway.api_key.clone(),
            config.sms_gateway.api_secret.clone(),
            Some(config.sms_gateway.get_timeout()),
        )
        .map_err(std::io::Error::other)?;

        let listener = TcpListener::bind(config.get_address())?;
        let port = listener.local_addr()?.port();
        let server = run(
            listener,
            store,
            queue.clone(),
            config.get_resolution_failure_policy(),
        )?;

        let mut worker_pool =
            WorkerPool::new(config.worker_pool.clone(), queue, Arc::new(sms_client));
        worker_pool.spawn_workers();

        Ok(Self {
            port,
            server,
            worker_pool,
            settings: config,
        })
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Serves until the HTTP server stops (actix handles SIGINT/SIGTERM), then
    /// drains the worker pool.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        let shutdown_timeout = self.settings.worker_pool.shutdown_timeout();

        self.server.await?;

        match self.worker_pool.shutdown_graceful(shutdown_timeout).await {
            Ok(failures) => {
                for failure in failures {
                    tracing::warn!("Delivery worker had failed: {:?}", failure);
                }
                Ok(())
            }
            Err(err) => Err(std::io::Error::other(err)),
        }
    }
}

pub fn run(
    listener: TcpListener,
    store: Arc<dyn SubscriberStore>,
    queue: Arc<dyn DeliveryQueue>,
    policy: ResolutionFailurePolicy,
) -> Result<Server, std::io::Error> {
    let store: web::Data<dyn SubscriberStore> = web::Data::from(store);
    let queue: web::Data<dyn DeliveryQueue> = web::Data::from(queue);
    let policy = web::Data::new(policy);

    let server = HttpServer::new(move || {
        // App is where your application logic lives: routing, middlewares, request handler, etc
        App::new()
            // 'wrap' method adds a middleware to the App. This specific middleware provide incoming
            // request logger
            .wrap(TracingLogger::default())
            .route("/health_check", web::get().to(health_check))
            .route("/send", web::post().to(handle_send))
            .route("/update", web::get().to(handle_update))
            .app_data(store.clone())
            .app_data(queue.clone())
            .app_data(policy.clone())
            // The message text has no length limit of its own, only the body size.
            .app_data(web::JsonConfig::default().limit(MAX_SEND_BODY_BYTES))
            .app_data(web::FormConfig::default().limit(MAX_SEND_BODY_BYTES))
            .app_data(web::PayloadConfig::new(MAX_SEND_BODY_BYTES))
    })
    .listen(listener)?
    .run();

    Ok(server)
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}
