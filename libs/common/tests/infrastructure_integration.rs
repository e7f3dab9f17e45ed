//! Integration tests for the infrastructure components
//!
//! These tests verify that PostgreSQL and Redis are reachable with the
//! configuration the services load from the environment. They need live
//! backends and are ignored by default.

use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool},
};
use sqlx::Row;

#[tokio::test]
#[ignore = "requires PostgreSQL and Redis"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;
    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;
    assert!(redis_pool.health_check().await?, "Redis health check failed");

    // A revocation entry should behave like the token store uses it
    let key = "blacklisted_token:integration-test";
    redis_pool.set(key, "1", Some(10)).await?;
    assert!(redis_pool.exists(key).await?);
    assert!(redis_pool.delete(key).await?);
    assert!(!redis_pool.exists(key).await?);

    Ok(())
}
