//! Declarative binding surface: row/header/footer factories and host callbacks
use crate::engine::CycleEvent;
use crate::render_cache::RowContext;
use crate::types::ItemsSection;
use std::sync::Arc;

pub type ContentFactory<T, C> = Arc<dyn Fn(&<T as ItemsSection>::Item, &mut RowContext) -> C + Send + Sync>;
pub type SupplementaryFactory<T, C> = Arc<dyn Fn(&T, usize) -> C + Send + Sync>;
pub type Callback = Arc<dyn Fn() + Send + Sync>;
pub type DiagnosticHook = Arc<dyn Fn(&CycleEvent) + Send + Sync>;

/// Height policy for a section header or footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupplementaryHeight {
    /// No factory registered; the control should collapse the view.
    Hidden,
    /// Let the control size the view from its content.
    Automatic,
}

/// What the caller plugs into a list: how to render rows and supplementary
/// views, plus the callbacks the list fires back.
///
/// Factories run on the UI thread whenever a row or section view is
/// configured. Row factories may register swipe actions or a context menu
/// through the [`RowContext`] they receive.
pub struct BindingSurface<T: ItemsSection, C> {
    pub(crate) content: ContentFactory<T, C>,
    pub(crate) header: Option<SupplementaryFactory<T, C>>,
    pub(crate) footer: Option<SupplementaryFactory<T, C>>,
    pub(crate) on_prefetch: Option<Callback>,
    pub(crate) on_pull_to_refresh: Option<Callback>,
    pub(crate) on_diagnostic: Option<DiagnosticHook>,
}

impl<T: ItemsSection, C> BindingSurface<T, C> {
    pub fn new<F>(content: F) -> Self
    where
        F: Fn(&T::Item, &mut RowContext) -> C + Send + Sync + 'static,
    {
        BindingSurface {
            content: Arc::new(content),
            header: None,
            footer: None,
            on_prefetch: None,
            on_pull_to_refresh: None,
            on_diagnostic: None,
        }
    }

    pub fn header<F>(mut self, factory: F) -> Self
    where
        F: Fn(&T, usize) -> C + Send + Sync + 'static,
    {
        self.header = Some(Arc::new(factory));
        self
    }

    pub fn footer<F>(mut self, factory: F) -> Self
    where
        F: Fn(&T, usize) -> C + Send + Sync + 'static,
    {
        self.footer = Some(Arc::new(factory));
        self
    }

    /// Fired when the last row of the last section is about to be shown.
    pub fn on_prefetch<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_prefetch = Some(Arc::new(callback));
        self
    }

    pub fn on_pull_to_refresh<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_pull_to_refresh = Some(Arc::new(callback));
        self
    }

    /// Observes reconciliation cycles, including discarded stale submissions.
    /// Called from the submitting thread or the worker thread.
    pub fn on_diagnostic<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CycleEvent) + Send + Sync + 'static,
    {
        self.on_diagnostic = Some(Arc::new(hook));
        self
    }

    pub fn header_height(&self) -> SupplementaryHeight {
        height_for(self.header.is_some())
    }

    pub fn footer_height(&self) -> SupplementaryHeight {
        height_for(self.footer.is_some())
    }
}

fn height_for(registered: bool) -> SupplementaryHeight {
    if registered { SupplementaryHeight::Automatic } else { SupplementaryHeight::Hidden }
}
