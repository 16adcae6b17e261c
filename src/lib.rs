pub mod annotation;
pub mod config;
pub mod db;
pub mod import;
pub mod normalize;
pub mod pose;
pub mod scanner;
pub mod stats;

/// Annotation file extensions picked up by `import`
pub const LABEL_EXTENSIONS: &[&str] = &["csv"];

/// Application name for XDG paths
pub const APP_NAME: &str = "behavior-ingest";
