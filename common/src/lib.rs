pub mod error;
pub mod governor;
pub mod ontology;
pub mod storage;
pub mod utils;

pub use error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
