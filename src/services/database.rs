use mongodb::{
    bson::doc,
    options::{ClientOptions, IndexOptions},
    Client, Database as MongoDatabase, IndexModel,
};
use tracing::info;

use crate::models::{comment::Comment, document::Document, user::User, Record};

/// Database connection wrapper for MongoDB
///
/// Holds the client and the application's database. Repositories borrow
/// typed collections from it.
#[derive(Clone)]
pub struct Database {
    /// MongoDB client instance for connection management
    pub client: Client,
    /// Specific database instance for this application
    pub database: MongoDatabase,
}

impl Database {
    /// Connects and pings the server by listing databases.
    ///
    /// # Example
    /// ```no_run
    /// # async fn run() -> Result<(), mongodb::error::Error> {
    /// let db = issue_tracker::services::database::Database::new("mongodb://localhost:27017", "issue_tracker").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(database_url: &str, db_name: &str) -> Result<Self, mongodb::error::Error> {
        info!("Connecting to MongoDB: {}", database_url);

        let mut client_options = ClientOptions::parse(database_url).await?;
        client_options.app_name = Some("issue-tracker".to_string());

        let client = Client::with_options(client_options)?;
        let database = client.database(db_name);

        client.list_database_names(None, None).await?;

        info!("MongoDB connection established successfully");

        Ok(Self { client, database })
    }

    /// Creates the indexes the services rely on. Safe to run on every start.
    pub async fn ensure_indexes(&self) -> Result<(), mongodb::error::Error> {
        let unique = IndexOptions::builder().unique(true).build();
        let username = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(unique)
            .build();
        self.database
            .collection::<User>(User::COLLECTION)
            .create_index(username, None)
            .await?;

        let by_issue = || IndexModel::builder().keys(doc! { "issue": 1 }).build();
        self.database
            .collection::<Comment>(Comment::COLLECTION)
            .create_index(by_issue(), None)
            .await?;
        self.database
            .collection::<Document>(Document::COLLECTION)
            .create_index(by_issue(), None)
            .await?;

        info!("Database indexes are in place");
        Ok(())
    }
}
