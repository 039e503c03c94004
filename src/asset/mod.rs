pub mod cache;

pub use cache::AssetCache;
