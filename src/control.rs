//! Collaborator traits implemented by the platform list control
use crate::diff_engine::PlanFor;
use crate::errors::ApplyError;
use crate::types::{EdgeInsets, IndexPath, ItemsSection};

/// Row views are on loan from the platform's reuse pool; the binding only
/// ever hands content to a position, it never owns the view.
pub trait CellPool {
    type Content;

    fn bind(&mut self, content: Self::Content, position: IndexPath);

    fn bind_header(&mut self, _content: Self::Content, _section: usize) {}

    fn bind_footer(&mut self, _content: Self::Content, _section: usize) {}
}

/// The live list control. Every method is called on the UI thread only.
pub trait ListControl<T: ItemsSection>: CellPool {
    /// Apply one structural batch. An error halts the reconciler for good.
    fn apply_plan(&mut self, plan: &PlanFor<T>, animated: bool) -> Result<(), ApplyError>;

    /// Re-measure row heights without animating or reordering anything.
    fn refresh_sizes(&mut self) -> Result<(), ApplyError>;

    fn scroll_to_top(&mut self, animated: bool);

    fn end_refreshing(&mut self) {}

    fn set_content_insets(&mut self, _insets: EdgeInsets) {}

    /// Called at most once per binding, the first time a pull-to-refresh
    /// callback is registered.
    fn install_refresh_control(&mut self) {}
}
