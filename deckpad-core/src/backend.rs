use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;

use crate::error::DeckResult;
use crate::model::Document;
use crate::units::Rgb;

/// Reads and writes packaged presentation files.
pub trait PackageCodec: Send + Sync {
    fn load(&self, path: &Path) -> Result<Document>;
    fn save(&self, document: &Document, path: &Path) -> Result<()>;
}

/// A recolored icon ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconImage {
    pub name: String,
    pub svg: String,
    pub png: Vec<u8>,
    pub pixel_size: u32,
}

/// Catalog of bundled vector icons.
pub trait IconProvider: Send + Sync {
    /// Icon names grouped by category, both sorted.
    fn catalog(&self) -> BTreeMap<String, Vec<String>>;

    fn contains(&self, name: &str) -> bool;

    /// Close matches for a name that was not found.
    fn suggest(&self, name: &str) -> Vec<String>;

    fn render(&self, name: &str, color: Rgb, pixel_size: u32) -> DeckResult<IconImage>;
}
