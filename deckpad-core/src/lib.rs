//! In-memory presentation model, session lifecycle and content editing.
//!
//! File formats and icon sources plug in through [`PackageCodec`] and
//! [`IconProvider`]; everything here works on the [`Document`] tree alone.

pub mod backend;
pub mod content;
pub mod error;
pub mod model;
pub mod modify;
pub mod resolve;
pub mod script;
pub mod session;
pub mod slides;
pub mod text;
pub mod units;

pub use backend::{IconImage, IconProvider, PackageCodec};
pub use error::{DeckError, DeckResult};
pub use model::{Document, Shape, ShapeKind, Slide};
pub use resolve::{ShapeRef, TableRef};
pub use script::{EvaluationResult, ScriptLimits};
pub use session::{Session, SessionInfo, SessionState};
pub use units::{Placement, Rgb};
