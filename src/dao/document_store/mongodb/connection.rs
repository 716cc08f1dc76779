use mongodb::{Client, Database, bson::doc, options::ClientOptions};

use super::error::{MongoDaoError, MongoResult};

/// Build a database handle. The driver connects lazily and reconnects on its
/// own, so no round trip happens here.
pub fn build_client(options: &ClientOptions, database_name: &str) -> MongoResult<Database> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    Ok(client.database(database_name))
}

pub async fn ping(database: &Database) -> MongoResult<()> {
    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(|source| MongoDaoError::HealthPing { source })?;
    Ok(())
}
