mod model;
mod repository;

pub use model::{format_timestamp, PriceCacheDB};
pub use repository::PriceCacheRepository;
