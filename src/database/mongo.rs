//! MongoDB provider for the database registry.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use mongodb::bson::doc;
use mongodb::options::{ClientOptions, Credential, ReadPreference, SelectionCriteria};
use mongodb::{Client, ClientSession, Collection};
use tracing::{info, warn};

use super::registry::{DatabaseHandle, DatabaseProvider};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::tenant::MongoTenantDirectory;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared MongoDB client. Every tenant database is reached through it.
#[derive(Debug, Clone)]
pub struct MongoProvider {
    client: Client,
    bootstrap_database: String,
}

impl MongoProvider {
    /// Connect to MongoDB and verify the connection with a ping.
    ///
    /// # Errors
    /// Returns `Error::ConnectionFailure` if the server is unreachable within
    /// the connect timeout.
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.mongodb_uri)
            .await
            .map_err(|e| Error::connection("mongodb", e))?;

        options.max_pool_size = Some(100);
        options.min_pool_size = Some(10);
        options.max_idle_time = Some(Duration::from_secs(30));
        options.selection_criteria = Some(SelectionCriteria::ReadPreference(
            ReadPreference::SecondaryPreferred {
                options: Default::default(),
            },
        ));
        options.retry_writes = Some(true);

        if let (Some(username), Some(password)) =
            (&config.mongodb_username, &config.mongodb_password)
        {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(password.clone())
                    .build(),
            );
        }

        let client = Client::with_options(options).map_err(|e| Error::connection("mongodb", e))?;

        let provider = Self {
            client,
            bootstrap_database: config.bootstrap_database.clone(),
        };

        match tokio::time::timeout(CONNECT_TIMEOUT, provider.ping()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::connection(
                    "mongodb",
                    format!("no response within {:?}", CONNECT_TIMEOUT),
                ));
            }
        }

        info!("Successfully connected to MongoDB");
        Ok(provider)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Handle onto the shared bootstrap database.
    pub fn base_database(&self) -> MongoHandle {
        self.handle(&self.bootstrap_database)
    }

    /// Tenant directory backed by `collection` in the bootstrap database.
    pub fn tenant_directory(&self, collection: &str) -> MongoTenantDirectory {
        MongoTenantDirectory::new(&self.client, &self.bootstrap_database, collection)
    }

    fn handle(&self, name: &str) -> MongoHandle {
        MongoHandle {
            name: name.to_string(),
            db: self.client.database(name),
            client: self.client.clone(),
        }
    }
}

#[async_trait]
impl DatabaseProvider for MongoProvider {
    type Handle = MongoHandle;

    fn open(&self, name: &str) -> Result<MongoHandle> {
        if name.is_empty() {
            return Err(Error::connection("mongodb", "empty database name"));
        }
        Ok(self.handle(name))
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::connection("mongodb", e))?;
        Ok(())
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
        info!("MongoDB client shut down");
    }
}

/// One physical MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoHandle {
    name: String,
    db: mongodb::Database,
    client: Client,
}

impl MongoHandle {
    /// Get a reference to the database.
    pub fn db(&self) -> &mongodb::Database {
        &self.db
    }

    /// Run `f` inside a multi-document transaction.
    ///
    /// Commits when `f` succeeds, aborts otherwise. Operations inside `f` must
    /// pass the session (`.session(&mut *session)`) to take part.
    pub async fn with_transaction<F>(&self, f: F) -> Result<()>
    where
        F: for<'s> FnOnce(&'s mut ClientSession) -> BoxFuture<'s, Result<()>>,
    {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        match f(&mut session).await {
            Ok(()) => {
                session.commit_transaction().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort) = session.abort_transaction().await {
                    warn!("Failed to abort transaction on {}: {}", self.name, abort);
                }
                Err(e)
            }
        }
    }
}

impl DatabaseHandle for MongoHandle {
    type Collection<T: Send + Sync> = Collection<T>;

    fn name(&self) -> &str {
        &self.name
    }

    fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }
}
