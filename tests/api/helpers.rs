use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Response;
use sqlx::{migrate, Connection, Executor, PgConnection, PgPool};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sms_broadcast::{
    config::{get_configuration, DatabaseSettings, Settings},
    domain::broadcast_settings::BroadcastSettings,
    domain::delivery_job::DeliveryJob,
    domain::phone_number::PhoneNumber,
    domain::subscriber::Subscriber,
    queue::InMemoryDeliveryQueue,
    startup::{get_connection_db_pool, Application},
    store::{
        InMemorySubscriberStore, OptOutOutcome, PostgresSubscriberStore, StoreError,
        SubscriberStore,
    },
    telemetry::{get_subscriber, init_subscriber},
};

static TRACING: OnceLock<()> = OnceLock::new();

// Logs are only printed when TEST_LOG is set, e.g. `TEST_LOG=true cargo test | bunyan`
fn init_tracing() {
    TRACING.get_or_init(|| {
        let name = String::from("test");
        let level = String::from("debug");

        if std::env::var("TEST_LOG").is_ok() {
            let _ = init_subscriber(get_subscriber(name, level, std::io::stdout));
        } else {
            let _ = init_subscriber(get_subscriber(name, level, std::io::sink));
        }
    });
}

pub struct TestApp<S = InMemorySubscriberStore> {
    pub config: Settings,
    pub address: String,
    pub store: Arc<S>,
    pub queue: InMemoryDeliveryQueue,
    pub sms_server: MockServer,
}

impl TestApp {
    /// Application without delivery workers, so published jobs stay queued.
    pub async fn spawn_app() -> TestApp {
        Self::spawn_app_with_workers(0).await
    }

    pub async fn spawn_app_with_workers(worker_count: usize) -> TestApp {
        let store = Arc::new(InMemorySubscriberStore::new(BroadcastSettings {
            from_number: phone_number("1000"),
            prefix: "[ALERT] ".to_string(),
            suffix: String::new(),
        }));

        TestApp::spawn_app_with_store(store, worker_count).await
    }

    pub async fn add_subscriber(&self, number: &str) -> Subscriber {
        let subscriber = Subscriber::new(phone_number(number));
        self.store.insert(subscriber.clone()).await;
        subscriber
    }

    pub async fn set_settings(&self, from: &str, prefix: &str, suffix: &str) {
        self.store
            .set_settings(BroadcastSettings {
                from_number: phone_number(from),
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            })
            .await;
    }
}

impl TestApp<PostgresSubscriberStore> {
    /// Application backed by its own freshly migrated Postgres database.
    pub async fn spawn_app_with_postgres() -> TestApp<PostgresSubscriberStore> {
        let mut config = get_configuration().expect("Missing configuration file.");
        let db_test_name = format!("db_{}", Uuid::new_v4().to_string().replace('-', "_"));

        let db_pool = configure_db(&mut config.database, db_test_name).await;
        let store = Arc::new(PostgresSubscriberStore::new(db_pool));

        TestApp::spawn_app_with_store(store, 0).await
    }

    fn db_pool(&self) -> &PgPool {
        self.store.db_pool()
    }

    pub async fn set_settings(&self, from: &str, prefix: &str, suffix: &str) {
        sqlx::query(
            r#"
            INSERT INTO broadcast_settings (id, from_number, prefix, suffix)
            VALUES (1, $1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET from_number = EXCLUDED.from_number, prefix = EXCLUDED.prefix, suffix = EXCLUDED.suffix
            "#,
        )
        .bind(from)
        .bind(prefix)
        .bind(suffix)
        .execute(self.db_pool())
        .await
        .expect("Failed to store broadcast settings.");
    }

    pub async fn add_subscriber(&self, number: &str, opted_out_at: Option<DateTime<Utc>>) {
        sqlx::query(
            r#"
            INSERT INTO subscribers (id, phone_number, opted_out_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(number)
        .bind(opted_out_at)
        .execute(self.db_pool())
        .await
        .expect("Failed to insert subscriber.");
    }

    pub async fn opted_out_at(&self, number: &str) -> Option<DateTime<Utc>> {
        sqlx::query_scalar::<_, Option<DateTime<Utc>>>("SELECT opted_out_at FROM subscribers WHERE phone_number = $1")
            .bind(number)
            .fetch_one(self.db_pool())
            .await
            .expect("Failed to fetch subscriber.")
    }
}

impl<S: SubscriberStore + 'static> TestApp<S> {
    pub async fn spawn_app_with_store(store: Arc<S>, worker_count: usize) -> TestApp<S> {
        init_tracing();

        let mut config = get_configuration().expect("Missing configuration file.");
        let sms_server = MockServer::start().await;
        let queue = InMemoryDeliveryQueue::new();

        // We are using port 0 as way to define a different port per each test. Port 0 is a special case that operating systems
        // take into account: when port is 0, the OS will search for the first available port
        config.set_app_port(0);
        config.set_sms_gateway_base_url(sms_server.uri());
        config.worker_pool.worker_count = worker_count;
        config.worker_pool.poll_timeout_milliseconds = 20;
        config.worker_pool.shutdown_timeout_seconds = 1;

        let application =
            Application::build_with(config.clone(), store.clone(), Arc::new(queue.clone()))
                .await
                .expect("Failed to build application.");

        let address = format!("http://127.0.0.1:{}", application.get_port());

        tokio::spawn(application.run_until_stopped());

        TestApp {
            config,
            address,
            store,
            queue,
            sms_server,
        }
    }

    pub async fn post_send(&self, body: serde_json::Value) -> Response {
        reqwest::Client::new()
            .post(&format!("{}/send", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_update(&self, query: &[(&str, &str)]) -> Response {
        reqwest::Client::new()
            .get(&format!("{}/update", self.address))
            .query(query)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Queued jobs as (to, from, msg), sorted by recipient.
    pub async fn queued_jobs(&self) -> Vec<(String, String, String)> {
        let mut jobs: Vec<(String, String, String)> = self
            .queue
            .pending()
            .await
            .into_iter()
            .map(|DeliveryJob { to, from, body, .. }| (to.into(), from.into(), body))
            .collect();
        jobs.sort();
        jobs
    }

    pub async fn mount_accepting_gateway(&self, expected_requests: u64) {
        Mock::given(path("/sms/json"))
            .and(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "messages": [{ "status": "0" }] })),
            )
            .expect(expected_requests)
            .mount(&self.sms_server)
            .await;
    }

    /// Waits until the gateway saw `count` requests, or gives up after 5 seconds.
    pub async fn wait_for_gateway_requests(&self, count: usize) -> Vec<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

        loop {
            let requests = self.sms_server.received_requests().await.unwrap();
            if requests.len() >= count || tokio::time::Instant::now() >= deadline {
                return requests
                    .iter()
                    .map(|request| serde_json::from_slice(&request.body).unwrap())
                    .collect();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

async fn configure_db(db_config: &mut DatabaseSettings, db_test_name: String) -> PgPool {
    // Create database
    let mut connection =
        PgConnection::connect_with(&db_config.get_db_options().database("postgres"))
            .await
            .expect("Failed to connect to Postgres.");

    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, db_test_name))
        .await
        .expect("Failed to create database.");

    connection
        .close()
        .await
        .expect("Failed to close connection.");

    // Execute migrations
    db_config.set_name(db_test_name);

    let db_pool = get_connection_db_pool(db_config);

    migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run migrations.");

    db_pool
}

pub fn phone_number(value: &str) -> PhoneNumber {
    PhoneNumber::parse(value.to_string()).unwrap()
}

/// Store that cannot be reached at all.
pub struct UnavailableStore;

#[async_trait]
impl SubscriberStore for UnavailableStore {
    async fn broadcast_settings(&self) -> Result<BroadcastSettings, StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }

    async fn active_subscribers(&self) -> Result<Vec<Subscriber>, StoreError> {
        Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
    }

    async fn opt_out(
        &self,
        _phone_number: &PhoneNumber,
        _at: DateTime<Utc>,
    ) -> Result<OptOutOutcome, StoreError> {
        Err(StoreError::Write(sqlx::Error::PoolTimedOut))
    }
}
