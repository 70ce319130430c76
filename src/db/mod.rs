pub mod memory;
pub mod postgres;
pub mod redis;
pub mod store;

pub use memory::InMemoryStore;
pub use postgres::{create_pool, run_migrations, PgMediaStore};
pub use redis::{create_redis_client, Cache, CacheKey, CacheWriterHandle};
pub use store::MediaStore;

#[cfg(test)]
pub use store::MockMediaStore;
