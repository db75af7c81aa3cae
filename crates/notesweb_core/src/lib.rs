pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod frontmatter;
pub mod html;
pub mod identifier;
pub mod output_paths;
pub mod paths;
pub mod record;
pub mod render;
pub mod runtime;
pub mod site;
pub mod store;
pub mod views;
pub mod walk;

pub use classify::{Classification, Classifier, ContentSniffer, MagicSniffer};
pub use error::{PropertyError, PropertyResult};
pub use output_paths::{OutputPaths, SiteLayout};
pub use record::Record;
pub use store::{PropertyStore, TagPolicy};
