pub mod models;
pub mod pii;

pub use models::events;
pub use pii::Masked;
