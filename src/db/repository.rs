use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use sea_orm::{
    ActiveValue::Set, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryOrder, Schema,
};

use super::{entity, PriceRepository, PriceSnapshotRecord};
use crate::config::DatabaseConfig;
use crate::error::DbError;

/// SQL-backed price history (Postgres or SQLite, depending on the URL).
#[derive(Clone)]
pub struct SeaOrmRepository {
    db: DatabaseConnection,
}

impl SeaOrmRepository {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let mut opt = ConnectOptions::new(config.url.clone());
        opt.max_connections(config.max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .sqlx_logging(true)
            .sqlx_logging_level(log::LevelFilter::Debug);

        let db = Database::connect(opt).await?;
        let repository = Self::from_connection(db);
        repository.ensure_schema().await?;

        info!("Connected to database ({:?})", repository.db.get_database_backend());
        Ok(repository)
    }

    pub fn from_connection(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn ensure_schema(&self) -> Result<(), DbError> {
        let backend = self.db.get_database_backend();
        let mut create = Schema::new(backend).create_table_from_entity(entity::Entity);
        create.if_not_exists();

        self.db.execute(backend.build(&create)).await?;
        debug!("Ensured stock_prices table exists");
        Ok(())
    }
}

#[async_trait]
impl PriceRepository for SeaOrmRepository {
    async fn save(&self, symbol: &str, price: f64) -> Result<(), DbError> {
        let row = entity::ActiveModel {
            stock_name: Set(symbol.to_string()),
            price: Set(price),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        entity::Entity::insert(row).exec(&self.db).await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<PriceSnapshotRecord>, DbError> {
        let rows = entity::Entity::find()
            .order_by_desc(entity::Column::CreatedAt)
            .order_by_desc(entity::Column::Id)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(PriceSnapshotRecord::from).collect())
    }

    async fn close(&self) -> Result<(), DbError> {
        self.db.clone().close().await?;
        info!("Database connection closed");
        Ok(())
    }
}
