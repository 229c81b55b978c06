pub mod scaling;
pub mod hdbscan;
pub mod clusterer;
pub mod matching;

// Re-export commonly used types
pub use clusterer::{cluster_droplets, Clustering};
pub use hdbscan::{Hdbscan, HdbscanResult};
pub use matching::{match_clusters, MatchOutcome};
pub use scaling::StandardScaler;
