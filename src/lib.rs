//! Incremental reconciliation for sectioned list controls.
//!
//! Callers hand a [`Reconciler`] their complete, ordered list of sections
//! whenever their data changes. A background worker compares each submission
//! with what the list is currently showing and decides between doing nothing,
//! re-measuring row heights, or applying a minimal batch of section and row
//! insertions, deletions and moves. The [`ListBinding`] half lives on the UI
//! thread and is the only thing that ever touches the list control.
//!
//! ```ignore
//! let (reconciler, mut binding) = Reconciler::spawn(
//!     ReconcilerConfig::default(),
//!     BindingSurface::new(|item: &Message, _cx: &mut RowContext| item.body.clone()),
//!     control,
//! )?;
//! reconciler.submit(vec![ListSection::new("inbox", messages)])?;
//! // in the host's event loop
//! binding.pump();
//! ```
pub mod binding;
pub mod config;
pub mod control;
pub mod diff_engine;
pub mod engine;
pub mod errors;
pub mod memory_list;
pub mod render_cache;
pub mod snapshot;
pub mod surface;
pub mod types;

pub use binding::ListBinding;
pub use config::{ReconcilerConfig, ReconcilerConfigBuilder};
pub use control::{CellPool, ListControl};
pub use diff_engine::{DiffEngine, DiffPlan, PlanFor, diff};
pub use engine::{CycleEvent, EnginePhase, Outcome, ReconcileStats, Reconciler};
pub use errors::{ApplyError, ReconcilerError};
pub use memory_list::{ListEvent, MemoryList};
pub use render_cache::{
    ActionStyle, Affordance, AffordanceKind, ContextMenu, RenderCache, RowAffordances, RowContext, SwipeAction,
};
pub use snapshot::{Snapshot, Submission};
pub use surface::{BindingSurface, SupplementaryHeight};
pub use types::{
    Change, ChangeAction, EdgeInsets, Identifiable, Identity, IndexPath, ItemIdOf, ItemsSection, ListSection,
    SectionIdOf,
};
