pub mod app_config;
pub mod catalog_repo;
pub mod consumer;
pub mod database;
pub mod error_codes;
pub mod events;
pub mod redis_repo;
pub mod reservation_repo;

pub use catalog_repo::PostgresCatalogRepository;
pub use consumer::SupervisedConsumer;
pub use database::DbClient;
pub use events::EventProducer;
pub use redis_repo::RedisClient;
pub use reservation_repo::PostgresReservationRepository;
