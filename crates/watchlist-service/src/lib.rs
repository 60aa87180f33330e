pub mod service;
pub mod store;

pub use service::{WatchlistRow, WatchlistService};
pub use store::{LazyWatchlistDb, WatchlistDb};
