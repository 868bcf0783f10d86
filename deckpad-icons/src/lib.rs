use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deckpad_core::{DeckError, DeckResult, IconImage, IconProvider, Rgb};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

mod raster;
mod recolor;

pub use recolor::recolor_svg;

/// Category for icons placed directly in the bundle root.
pub const UNCATEGORIZED: &str = "uncategorized";

const DEFAULT_CACHE_CAPACITY: usize = 64;
const MAX_SUGGESTIONS: usize = 5;

struct IconAsset {
    category: String,
    svg: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RenderKey {
    color: Rgb,
    pixel_size: u32,
}

#[derive(Default)]
struct RenderCache {
    entries: HashMap<(String, RenderKey), IconImage>,
    order: VecDeque<(String, RenderKey)>,
}

/// Vector icons loaded from `<dir>/<category>/<name>.svg`.
///
/// Sources are read once at load time and never change afterwards, so a
/// render depends only on the name, color and size and can be cached.
pub struct IconLibrary {
    root: Option<PathBuf>,
    assets: BTreeMap<String, IconAsset>,
    cache: Mutex<RenderCache>,
    capacity: usize,
}

impl IconLibrary {
    pub fn empty() -> Self {
        Self {
            root: None,
            assets: BTreeMap::new(),
            cache: Mutex::new(RenderCache::default()),
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Loads a bundle directory. A missing directory yields an empty library.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut library = Self::empty();
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "icon directory not found; no icons available");
            return Ok(library);
        }

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
        {
            let entry = entry.with_context(|| format!("failed to walk {:?}", dir))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some("svg")
            {
                continue;
            }
            let Some(name) = icon_name(path) else {
                continue;
            };
            let category = if entry.depth() == 1 {
                UNCATEGORIZED.to_string()
            } else {
                path.parent()
                    .and_then(Path::file_name)
                    .map(|category| category.to_string_lossy().into_owned())
                    .unwrap_or_else(|| UNCATEGORIZED.to_string())
            };

            let svg = match fs::read_to_string(path) {
                Ok(svg) => svg,
                Err(err) => {
                    warn!(?err, path = %path.display(), "skipping unreadable icon");
                    continue;
                }
            };
            if let Some(existing) = library.assets.get(&name) {
                warn!(
                    name = %name,
                    kept = %existing.category,
                    skipped = %category,
                    "duplicate icon name"
                );
                continue;
            }
            library.assets.insert(name, IconAsset { category, svg });
        }

        info!(count = library.assets.len(), dir = %dir.display(), "loaded icon library");
        library.root = Some(dir.to_path_buf());
        Ok(library)
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    fn cached(&self, name: &str, key: RenderKey) -> Option<IconImage> {
        self.cache
            .lock()
            .entries
            .get(&(name.to_string(), key))
            .cloned()
    }

    fn remember(&self, name: &str, key: RenderKey, image: &IconImage) {
        if self.capacity == 0 {
            return;
        }
        let mut cache = self.cache.lock();
        let entry = (name.to_string(), key);
        if cache.entries.contains_key(&entry) {
            return;
        }
        while cache.order.len() >= self.capacity {
            match cache.order.pop_front() {
                Some(oldest) => {
                    cache.entries.remove(&oldest);
                }
                None => break,
            }
        }
        cache.order.push_back(entry.clone());
        cache.entries.insert(entry, image.clone());
    }
}

impl IconProvider for IconLibrary {
    fn catalog(&self) -> BTreeMap<String, Vec<String>> {
        let mut catalog: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, asset) in &self.assets {
            catalog
                .entry(asset.category.clone())
                .or_default()
                .push(name.clone());
        }
        catalog
    }

    fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    fn suggest(&self, name: &str) -> Vec<String> {
        let query = name.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        let tokens: Vec<&str> = query.split(['-', '_', ' ']).filter(|t| !t.is_empty()).collect();

        let mut scored: Vec<(u8, &String)> = self
            .assets
            .keys()
            .filter_map(|candidate| {
                let lower = candidate.to_lowercase();
                if lower.contains(&query) || query.contains(&lower) {
                    Some((0, candidate))
                } else if lower.split('-').any(|part| tokens.contains(&part)) {
                    Some((1, candidate))
                } else {
                    None
                }
            })
            .collect();
        scored.sort();
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, candidate)| candidate.clone())
            .collect()
    }

    #[instrument(skip(self))]
    fn render(&self, name: &str, color: Rgb, pixel_size: u32) -> DeckResult<IconImage> {
        let asset = self
            .assets
            .get(name)
            .ok_or_else(|| DeckError::icon_not_found(name, &self.suggest(name)))?;
        let key = RenderKey { color, pixel_size };
        if let Some(image) = self.cached(name, key) {
            debug!("icon render cache hit");
            return Ok(image);
        }

        let svg = recolor_svg(&asset.svg, color)
            .with_context(|| format!("failed to recolor icon '{name}'"))?;
        let png = rasterize_png(&svg, pixel_size)?;
        let image = IconImage {
            name: name.to_string(),
            svg,
            png,
            pixel_size,
        };
        self.remember(name, key, &image);
        Ok(image)
    }
}

#[cfg(feature = "raster")]
fn rasterize_png(svg: &str, pixel_size: u32) -> DeckResult<Vec<u8>> {
    let raster = raster::rasterize(svg, pixel_size)?;
    Ok(raster::encode_png(&raster)?)
}

#[cfg(not(feature = "raster"))]
fn rasterize_png(_svg: &str, _pixel_size: u32) -> DeckResult<Vec<u8>> {
    Err(DeckError::RenderingUnavailable(
        "deckpad-icons was built without the `raster` feature".to_string(),
    ))
}

/// File stem with the `-fill` variant suffix removed.
fn icon_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let name = stem.strip_suffix("-fill").unwrap_or(stem);
    (!name.is_empty()).then(|| name.to_string())
}

/// Resolves the bundle shipped with the binary: `icons/` next to the
/// executable, then in the working directory.
pub fn default_icons_dir() -> Option<PathBuf> {
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("icons")));
    beside_exe
        .into_iter()
        .chain(std::env::current_dir().ok().map(|dir| dir.join("icons")))
        .find(|dir| dir.is_dir())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SQUARE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 256 256" fill="currentColor"><path d="M32,32H224V224H32Z"/></svg>"#;

    fn bundle() -> (tempfile::TempDir, IconLibrary) {
        let dir = tempdir().unwrap();
        for (category, file) in [
            ("status", "check-circle.svg"),
            ("status", "check-fill.svg"),
            ("status", "x-circle.svg"),
            ("arrows", "arrow-up.svg"),
        ] {
            let folder = dir.path().join(category);
            fs::create_dir_all(&folder).unwrap();
            fs::write(folder.join(file), SQUARE).unwrap();
        }
        fs::write(dir.path().join("star.svg"), SQUARE).unwrap();
        fs::write(dir.path().join("status").join("notes.txt"), "ignored").unwrap();
        let library = IconLibrary::load(dir.path()).unwrap();
        (dir, library)
    }

    #[test]
    fn catalog_groups_by_category() {
        let (_dir, library) = bundle();
        let catalog = library.catalog();
        assert_eq!(catalog["status"], vec!["check", "check-circle", "x-circle"]);
        assert_eq!(catalog["arrows"], vec!["arrow-up"]);
        assert_eq!(catalog[UNCATEGORIZED], vec!["star"]);
        assert!(library.contains("check"));
        assert!(!library.contains("check-fill"));
    }

    #[test]
    fn missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let library = IconLibrary::load(&dir.path().join("nope")).unwrap();
        assert!(library.is_empty());
        assert!(library.root().is_none());
        assert!(matches!(
            library.render("check", Rgb::new(0, 0, 0), 96),
            Err(DeckError::IconNotFound { .. })
        ));
    }

    #[test]
    fn suggestions_prefer_substring_matches() {
        let (_dir, library) = bundle();
        assert_eq!(library.suggest("circle"), vec!["check-circle", "x-circle"]);
        assert_eq!(
            library.suggest("arrow-down"),
            vec!["arrow-up".to_string()]
        );
        assert!(library.suggest("zzz").is_empty());
        let err = library.render("chek", Rgb::new(0, 0, 0), 96).unwrap_err();
        assert_eq!(err.kind(), "IconNotFoundError");
    }

    #[cfg(feature = "raster")]
    #[test]
    fn renders_recolored_svg_and_png() {
        let (_dir, library) = bundle();
        let color = Rgb::new(0x1F, 0x6F, 0xEB);
        let image = library.render("check", color, 120).unwrap();
        assert!(image.svg.contains(r##"fill="#1F6FEB""##));
        assert_eq!(&image.png[1..4], b"PNG");
        assert_eq!(image.pixel_size, 120);

        let again = library.render("check", color, 120).unwrap();
        assert_eq!(again, image);
    }

    #[cfg(feature = "raster")]
    #[test]
    fn cache_evicts_oldest_render() {
        let (_dir, library) = bundle();
        let library = library.with_cache_capacity(2);
        let black = Rgb::new(0, 0, 0);
        for size in [96, 97, 98] {
            library.render("star", black, size).unwrap();
        }
        let cache = library.cache.lock();
        assert_eq!(cache.entries.len(), 2);
        let key = RenderKey {
            color: black,
            pixel_size: 96,
        };
        assert!(!cache.entries.contains_key(&("star".to_string(), key)));
    }

    #[cfg(not(feature = "raster"))]
    #[test]
    fn rendering_without_rasterizer_is_reported() {
        let (_dir, library) = bundle();
        let err = library.render("check", Rgb::new(0, 0, 0), 96).unwrap_err();
        assert_eq!(err.kind(), "RenderingUnavailableError");
    }
}
