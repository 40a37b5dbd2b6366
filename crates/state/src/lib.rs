pub mod error;
pub mod store;
pub mod testing;

pub use error::StateError;
pub use store::{ProcessedStore, SenderStore, TokenStore};
