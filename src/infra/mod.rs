pub mod catalog_fetcher;
pub mod http_client;
pub mod in_memory_repository;
pub mod sqlite_repository;
pub mod use_case_logger;
