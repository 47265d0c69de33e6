pub mod analytics;
pub mod assistant;
pub mod errors;
pub mod exchange;
pub mod realtime;
pub mod replies;
pub mod services;
pub mod traits;
