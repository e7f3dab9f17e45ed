use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auth::{
    AppState, Backends,
    config::AuthConfig,
    create_router,
    jwt::{JwtConfig, JwtService},
    oauth::DiscordProvider,
    repositories::{
        PgGuildDirectory, PgOrganizationRepository, PgPartnerRepository, RedisTokenStore,
    },
};
use common::{
    cache::{RedisConfig, RedisPool},
    database::{self, DatabaseConfig},
    error::DatabaseError,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting authentication service");

    let auth_config = AuthConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = database::init_pool(&db_config).await?;
    if database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| DatabaseError::Migration(e.to_string()))?;
    info!("Database migrations applied");

    let redis_pool = RedisPool::new(&RedisConfig::from_env()?).await?;
    if !redis_pool.health_check().await? {
        anyhow::bail!("Failed to connect to Redis");
    }

    let jwt_service = JwtService::new(JwtConfig::from_env()?)?;

    let backends = Backends {
        provider: Arc::new(DiscordProvider::new(&auth_config)?),
        organizations: Arc::new(PgOrganizationRepository::new(pool.clone())),
        partners: Arc::new(PgPartnerRepository::new(pool.clone())),
        guilds: Arc::new(PgGuildDirectory::new(pool)),
        token_store: Arc::new(RedisTokenStore::new(redis_pool)),
    };

    let bind_addr = auth_config.bind_addr.clone();
    let app = create_router(AppState::new(auth_config, jwt_service, backends));

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Authentication service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
