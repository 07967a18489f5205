//! PostgreSQL testcontainer bootstrap shared by the integration tests.
//!
//! One container is started per test binary and reused by every test in it;
//! queues keep tests isolated because each owns its table.

use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

const TEST_DB_NAME: &str = "leaseq";
const TEST_DB_USER: &str = "leaseq";
const TEST_DB_PASSWORD: &str = "leaseq";
const POSTGRES_PORT: u16 = 5432;

static POSTGRES: OnceCell<PostgresContainer> = OnceCell::const_new();

pub struct PostgresContainer {
    // Held in a static for the lifetime of the test process; the container
    // itself is reaped by the testcontainers sidecar after exit.
    _container: ContainerAsync<Postgres>,
    dsn: String,
}

impl PostgresContainer {
    async fn start() -> Self {
        let image = Postgres::default()
            .with_db_name(TEST_DB_NAME)
            .with_user(TEST_DB_USER)
            .with_password(TEST_DB_PASSWORD);

        let container = image.start().await.expect("Failed to start PostgreSQL container");
        let host = container.get_host().await.expect("Failed to resolve container host");
        let port = container
            .get_host_port_ipv4(POSTGRES_PORT)
            .await
            .expect("Failed to resolve container port");

        let dsn = format!(
            "postgres://{}:{}@{}:{}/{}",
            TEST_DB_USER, TEST_DB_PASSWORD, host, port, TEST_DB_NAME
        );

        Self {
            _container: container,
            dsn,
        }
    }
}

/// DSN of the shared test database, starting the container on first use.
pub async fn dsn() -> String {
    POSTGRES.get_or_init(PostgresContainer::start).await.dsn.clone()
}
