use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use directories::BaseDirs;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::backend::PackageCodec;
use crate::content::ShapeIdentity;
use crate::error::{DeckError, DeckResult};
use crate::model::Document;
use crate::modify::{CellReport, ModifyReport, ReplaceReport};
use crate::script::{self, EvaluationResult, ScriptLimits};
use crate::slides::SlideChange;
use crate::units::{emu_to_inches, extent_to_emu, DEFAULT_SLIDE_HEIGHT, DEFAULT_SLIDE_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Empty,
    Open,
    Dirty,
}

/// Whether a successful mutation actually changed the document.
pub trait Outcome {
    fn changed_document(&self) -> bool {
        true
    }
}

impl Outcome for ShapeIdentity {}
impl Outcome for SlideChange {}

impl Outcome for ReplaceReport {
    fn changed_document(&self) -> bool {
        self.replacements > 0
    }
}

impl Outcome for CellReport {
    fn changed_document(&self) -> bool {
        self.changed
    }
}

impl Outcome for ModifyReport {
    fn changed_document(&self) -> bool {
        !self.changed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideOverview {
    pub slide: usize,
    pub shape_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub slide_count: usize,
    /// Inches.
    pub width: f64,
    /// Inches.
    pub height: f64,
    pub dirty: bool,
    pub slides: Vec<SlideOverview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub discarded_changes: bool,
}

struct OpenDocument {
    document: Document,
    path: Option<PathBuf>,
    dirty: bool,
}

/// Owner of the one open presentation.
///
/// Every operation re-resolves its target against the live document, and
/// nothing outside the session keeps a reference to it between calls.
pub struct Session {
    current: Option<OpenDocument>,
    codec: Arc<dyn PackageCodec>,
    default_size: (i64, i64),
    limits: ScriptLimits,
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

impl Session {
    pub fn new(codec: Arc<dyn PackageCodec>) -> Self {
        Self {
            current: None,
            codec,
            default_size: (DEFAULT_SLIDE_WIDTH, DEFAULT_SLIDE_HEIGHT),
            limits: ScriptLimits::default(),
        }
    }

    /// Slide size used by `create` when the caller gives none, in inches.
    pub fn with_default_size(mut self, width: f64, height: f64) -> DeckResult<Self> {
        self.default_size = (
            extent_to_emu("slide width", width)?,
            extent_to_emu("slide height", height)?,
        );
        Ok(self)
    }

    pub fn with_script_limits(mut self, limits: ScriptLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn state(&self) -> SessionState {
        match &self.current {
            None => SessionState::Empty,
            Some(open) if open.dirty => SessionState::Dirty,
            Some(_) => SessionState::Open,
        }
    }

    fn ensure_closed(&self) -> DeckResult<()> {
        match &self.current {
            None => Ok(()),
            Some(open) => Err(DeckError::AlreadyOpen {
                path: open
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "unsaved presentation".to_string()),
            }),
        }
    }

    fn open_document(&self) -> DeckResult<&OpenDocument> {
        self.current.as_ref().ok_or(DeckError::NoOpenDocument)
    }

    fn open_document_mut(&mut self) -> DeckResult<&mut OpenDocument> {
        self.current.as_mut().ok_or(DeckError::NoOpenDocument)
    }

    /// Starts a new, empty presentation. Nothing is written until `save`.
    #[instrument(skip(self))]
    pub fn create(
        &mut self,
        path: Option<PathBuf>,
        dimensions: Option<(f64, f64)>,
    ) -> DeckResult<SessionInfo> {
        self.ensure_closed()?;
        let (width, height) = match dimensions {
            Some((width, height)) => (
                extent_to_emu("slide width", width)?,
                extent_to_emu("slide height", height)?,
            ),
            None => self.default_size,
        };
        self.current = Some(OpenDocument {
            document: Document::new(width, height),
            path: path.as_deref().map(expand_home),
            dirty: false,
        });
        info!("created presentation");
        self.info()
    }

    #[instrument(skip(self))]
    pub fn open(&mut self, path: &Path) -> DeckResult<SessionInfo> {
        self.ensure_closed()?;
        let path = expand_home(path);
        if !path.is_file() {
            return Err(DeckError::invalid(format!(
                "file not found: {}",
                path.display()
            )));
        }
        let document = self
            .codec
            .load(&path)
            .with_context(|| format!("failed to open presentation {:?}", path))?;
        info!(slides = document.slide_count(), "opened presentation");
        self.current = Some(OpenDocument {
            document,
            path: Some(path),
            dirty: false,
        });
        self.info()
    }

    #[instrument(skip(self))]
    pub fn save(&mut self) -> DeckResult<PathBuf> {
        let open = self.open_document()?;
        let path = open.path.clone().ok_or_else(|| {
            DeckError::invalid("presentation has no file path yet; use save_as")
        })?;
        self.write_to(path)
    }

    #[instrument(skip(self))]
    pub fn save_as(&mut self, path: &Path) -> DeckResult<PathBuf> {
        self.open_document()?;
        let path = expand_home(path);
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {:?}", parent))?;
        }
        self.write_to(path)
    }

    fn write_to(&mut self, path: PathBuf) -> DeckResult<PathBuf> {
        let tmp = temp_path(&path);
        if let Err(err) = self.write_temp(&tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move {:?} into place", tmp))?;
        let open = self.open_document_mut()?;
        open.path = Some(path.clone());
        open.dirty = false;
        info!(path = %path.display(), "saved presentation");
        Ok(path)
    }

    fn write_temp(&self, tmp: &Path) -> DeckResult<()> {
        let open = self.open_document()?;
        self.codec
            .save(&open.document, tmp)
            .with_context(|| format!("failed to write presentation {:?}", tmp))?;
        Ok(())
    }

    /// Ends the session. Unsaved changes block closing unless discarded.
    #[instrument(skip(self))]
    pub fn close(&mut self, discard_unsaved: bool) -> DeckResult<CloseReport> {
        let open = self.open_document()?;
        if open.dirty && !discard_unsaved {
            return Err(DeckError::UnsavedChanges);
        }
        let discarded_changes = open.dirty;
        if discarded_changes {
            warn!("closing presentation with unsaved changes discarded");
        }
        let path = self.current.take().and_then(|open| open.path);
        Ok(CloseReport {
            path,
            discarded_changes,
        })
    }

    pub fn info(&self) -> DeckResult<SessionInfo> {
        let open = self.open_document()?;
        let doc = &open.document;
        Ok(SessionInfo {
            state: self.state(),
            path: open.path.clone(),
            slide_count: doc.slide_count(),
            width: emu_to_inches(doc.width),
            height: emu_to_inches(doc.height),
            dirty: open.dirty,
            slides: doc
                .slides
                .iter()
                .enumerate()
                .map(|(idx, slide)| SlideOverview {
                    slide: idx + 1,
                    shape_count: slide.shapes.len(),
                    title: slide.title(),
                })
                .collect(),
        })
    }

    /// Read-only access to the open document.
    pub fn read<T>(&self, f: impl FnOnce(&Document) -> DeckResult<T>) -> DeckResult<T> {
        f(&self.open_document()?.document)
    }

    /// Runs a mutation, marking the session dirty when it changed something.
    ///
    /// Mutations validate before touching the document, so an `Err` leaves
    /// the session as it was.
    pub fn mutate<T: Outcome>(
        &mut self,
        f: impl FnOnce(&mut Document) -> DeckResult<T>,
    ) -> DeckResult<T> {
        let open = self.open_document_mut()?;
        let outcome = f(&mut open.document)?;
        if outcome.changed_document() {
            open.dirty = true;
        }
        Ok(outcome)
    }

    /// Runs caller-supplied script against the open document.
    ///
    /// The script sees a working copy; it replaces the document only when the
    /// script finishes without a fault.
    #[instrument(skip(self, code))]
    pub fn evaluate(&mut self, code: &str, slide: Option<usize>) -> DeckResult<EvaluationResult> {
        let limits = self.limits;
        let open = self.open_document_mut()?;
        if let Some(number) = slide {
            crate::resolve::slide_index(&open.document, number)?;
        }
        let (mut result, document) = script::evaluate(&open.document, code, slide, limits);
        if let Some(document) = document.filter(|document| *document != open.document) {
            open.document = document;
            open.dirty = true;
            result.modified = true;
        }
        if let Some(fault) = &result.fault {
            warn!(kind = %fault.kind, message = %fault.message, "script fault");
        }
        Ok(result)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    use tempfile::tempdir;

    use crate::content::{add_table, add_textbox, TextFormat};
    use crate::modify::{find_and_replace, modify_table_cell, CellFormat, ReplaceScope};
    use crate::resolve::TableRef;
    use crate::slides::add_slide;
    use crate::units::Placement;

    /// Keeps "files" in memory and writes a marker so renames succeed.
    #[derive(Default)]
    struct FakeCodec {
        files: Mutex<HashMap<PathBuf, Document>>,
    }

    impl PackageCodec for FakeCodec {
        fn load(&self, path: &Path) -> anyhow::Result<Document> {
            self.files
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("not a presentation"))
        }

        fn save(&self, document: &Document, path: &Path) -> anyhow::Result<()> {
            fs::write(path, b"deck")?;
            let target = path.with_extension("");
            self.files.lock().insert(target, document.clone());
            Ok(())
        }
    }

    fn session() -> Session {
        Session::new(Arc::new(FakeCodec::default()))
    }

    fn add_box(session: &mut Session) -> ShapeIdentity {
        session
            .mutate(|doc| {
                if doc.slides.is_empty() {
                    add_slide(doc, None)?;
                }
                add_textbox(doc, 1, "hello", Placement::default(), &TextFormat::default())
            })
            .unwrap()
    }

    #[test]
    fn lifecycle_walks_the_state_machine() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        let mut session = session();
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.save().unwrap_err().kind(), "NoOpenDocumentError");

        session.create(Some(path.clone()), None).unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(
            session.create(None, None).unwrap_err().kind(),
            "AlreadyOpenError"
        );
        assert_eq!(session.open(&path).unwrap_err().kind(), "AlreadyOpenError");

        add_box(&mut session);
        assert_eq!(session.state(), SessionState::Dirty);
        assert_eq!(
            session.close(false).unwrap_err().kind(),
            "UnsavedChangesError"
        );

        assert_eq!(session.save().unwrap(), path);
        assert_eq!(session.state(), SessionState::Open);
        assert!(path.exists());
        assert!(!dir.path().join("deck.pptx.tmp").exists());

        let report = session.close(false).unwrap();
        assert!(!report.discarded_changes);
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.close(true).unwrap_err().kind(), "NoOpenDocumentError");
    }

    #[test]
    fn discarding_close_always_succeeds() {
        let mut session = session();
        session.create(None, Some((13.333, 7.5))).unwrap();
        add_box(&mut session);
        let report = session.close(true).unwrap();
        assert!(report.discarded_changes);
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn failed_or_empty_mutations_stay_clean() {
        let mut session = session();
        session.create(None, None).unwrap();
        let err = session
            .mutate(|doc| add_textbox(doc, 4, "x", Placement::default(), &TextFormat::default()))
            .unwrap_err();
        assert_eq!(err.kind(), "SlideIndexError");
        assert_eq!(session.state(), SessionState::Open);

        let report = session
            .mutate(|doc| find_and_replace(doc, &ReplaceScope::default(), "zzz", "y", true))
            .unwrap();
        assert_eq!(report.replacements, 0);
        assert_eq!(session.state(), SessionState::Open);
    }

    #[test]
    fn unchanged_table_cell_stays_clean() {
        let dir = tempdir().unwrap();
        let mut session = session();
        session
            .create(Some(dir.path().join("cells.pptx")), None)
            .unwrap();
        session
            .mutate(|doc| {
                add_slide(doc, None)?;
                add_table(doc, 1, 2, 2, None, Placement::default(), None)
            })
            .unwrap();
        session.save().unwrap();
        assert_eq!(session.state(), SessionState::Open);

        let report = session
            .mutate(|doc| {
                modify_table_cell(doc, 1, &TableRef::Index(1), 1, 1, None, &CellFormat::default())
            })
            .unwrap();
        assert!(!report.changed);
        assert_eq!(session.state(), SessionState::Open);

        session
            .mutate(|doc| {
                modify_table_cell(
                    doc,
                    1,
                    &TableRef::Index(1),
                    1,
                    1,
                    Some("Q3"),
                    &CellFormat::default(),
                )
            })
            .unwrap();
        assert_eq!(session.state(), SessionState::Dirty);
    }

    #[test]
    fn save_without_path_needs_save_as() {
        let dir = tempdir().unwrap();
        let mut session = session();
        session.create(None, None).unwrap();
        add_box(&mut session);
        assert_eq!(session.save().unwrap_err().kind(), "InvalidInputError");

        let nested = dir.path().join("out/nested/deck.pptx");
        assert_eq!(session.save_as(&nested).unwrap(), nested);
        assert!(nested.exists());
        assert_eq!(session.info().unwrap().path, Some(nested));
    }

    #[test]
    fn info_reports_dimensions_and_overview() {
        let mut session = session();
        assert_eq!(session.info().unwrap_err().kind(), "NoOpenDocumentError");
        session.create(None, Some((13.5, 7.5))).unwrap();
        add_box(&mut session);
        let info = session.info().unwrap();
        assert_eq!((info.width, info.height), (13.5, 7.5));
        assert_eq!(info.slide_count, 1);
        assert_eq!(info.slides[0].shape_count, 1);
        assert!(info.dirty);
    }

    #[test]
    fn open_rejects_missing_files() {
        let mut session = session();
        let err = session.open(Path::new("/definitely/not/here.pptx")).unwrap_err();
        assert_eq!(err.kind(), "InvalidInputError");
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn scripts_commit_only_on_success() {
        let mut session = session();
        assert_eq!(
            session.evaluate("1", None).unwrap_err().kind(),
            "NoOpenDocumentError"
        );
        session.create(None, None).unwrap();

        let result = session.evaluate("doc.add_slide(); throw \"stop\"", None).unwrap();
        assert!(!result.ok);
        assert!(!result.modified);
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.info().unwrap().slide_count, 0);

        let result = session.evaluate("doc.slide_count", None).unwrap();
        assert_eq!(result.value.as_deref(), Some("0"));
        assert_eq!(session.state(), SessionState::Open);

        let result = session.evaluate("doc.add_slide()", None).unwrap();
        assert!(result.modified);
        assert_eq!(session.state(), SessionState::Dirty);
        assert_eq!(session.info().unwrap().slide_count, 1);
    }

    #[test]
    fn home_prefix_is_expanded() {
        let plain = Path::new("/tmp/deck.pptx");
        assert_eq!(expand_home(plain), plain);
        let expanded = expand_home(Path::new("~/decks/q3.pptx"));
        assert!(expanded.ends_with("decks/q3.pptx"));
    }
}
