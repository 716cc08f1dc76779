use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "scoreboard";
const APP_NAME: &str = "scoreboard-back";

/// Parsed driver options plus the database holding `scores` and `groups`.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`; the database defaults to the one named in the URI, then `scoreboard`.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        if options.app_name.is_none() {
            options.app_name = Some(APP_NAME.to_owned());
        }

        let database_name = db_name
            .map(str::to_owned)
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_owned());

        Ok(Self {
            options,
            database_name,
        })
    }

    /// Read `MONGO_URI` (required) and `MONGO_DB` (optional).
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok().filter(|db| !db.is_empty());
        Self::from_uri(&uri, db.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn database_name_prefers_explicit_then_uri_then_default() {
        let explicit = MongoConfig::from_uri("mongodb://localhost:27017/fest", Some("other"))
            .await
            .unwrap();
        assert_eq!(explicit.database_name, "other");
        assert_eq!(explicit.options.app_name.as_deref(), Some(APP_NAME));

        let from_uri = MongoConfig::from_uri("mongodb://localhost:27017/fest", None)
            .await
            .unwrap();
        assert_eq!(from_uri.database_name, "fest");

        let fallback = MongoConfig::from_uri("mongodb://localhost:27017", None)
            .await
            .unwrap();
        assert_eq!(fallback.database_name, DEFAULT_DATABASE);
    }

    #[tokio::test]
    async fn malformed_uri_is_rejected() {
        let err = MongoConfig::from_uri("not-a-uri", None).await.err().unwrap();
        assert!(matches!(err, MongoDaoError::InvalidUri { .. }));
    }
}
