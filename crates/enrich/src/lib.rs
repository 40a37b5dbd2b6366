pub mod error;
pub mod extract;
pub mod mock;
pub mod search;

pub use error::EnrichError;
pub use extract::{ArticleExtractor, FirecrawlClient, FirecrawlConfig};
pub use mock::{MockExtractor, MockSearch};
pub use search::{BraveClient, BraveConfig, SearchResult, WebSearch};
