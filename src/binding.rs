//! UI-thread half of a reconciler: applies plans to the list control and
//! answers the control's synchronous questions (rows, headers, affordances).
use crate::control::ListControl;
use crate::engine::{Reconciler, Shared, UiCommand};
use crate::render_cache::{Affordance, AffordanceKind, RenderCache, RowContext};
use crate::snapshot::Submission;
use crate::surface::{BindingSurface, Callback, SupplementaryHeight};
use crate::types::{EdgeInsets, IndexPath, ItemsSection};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use log::{debug, error, trace};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Owns the list control and everything that must only be touched on the UI
/// thread. The host's event loop drives it with [`ListBinding::pump`].
pub struct ListBinding<T: ItemsSection, L: ListControl<T>> {
    shared: Arc<Shared<T>>,
    commands: Option<Receiver<UiCommand<T>>>,
    control: L,
    surface: BindingSurface<T, L::Content>,
    current: Arc<Submission<T>>,
    cache: RenderCache,
    refresh_callback: Option<Callback>,
    refresh_installed: bool,
    owner: ThreadId,
}

impl<T: ItemsSection, L: ListControl<T>> ListBinding<T, L> {
    pub(crate) fn new(
        shared: Arc<Shared<T>>,
        commands: Receiver<UiCommand<T>>,
        surface: BindingSurface<T, L::Content>,
        control: L,
        insets: EdgeInsets,
    ) -> Self {
        let mut binding = ListBinding {
            shared,
            commands: Some(commands),
            control,
            current: Arc::new(Submission::empty()),
            cache: RenderCache::new(),
            refresh_callback: None,
            refresh_installed: false,
            owner: thread::current().id(),
            surface,
        };
        binding.control.set_content_insets(insets);
        if let Some(callback) = binding.surface.on_pull_to_refresh.clone() {
            binding.install_refresh(callback);
        }
        binding
    }

    fn assert_owner(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "ListBinding must only be used on the thread that created it"
        );
    }

    /// A submission handle for this list.
    pub fn reconciler(&self) -> Reconciler<T> {
        Reconciler::from_shared(self.shared.clone())
    }

    /// Handles every command already queued for the UI thread.
    pub fn pump(&mut self) -> usize {
        self.assert_owner();
        let mut handled = 0;
        loop {
            let next = match &self.commands {
                Some(commands) => commands.try_recv(),
                None => return handled,
            };
            match next {
                Ok(command) => {
                    self.handle(command);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return handled,
            }
        }
    }

    /// Waits up to `timeout` for a command, then handles everything queued.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        self.assert_owner();
        let first = match &self.commands {
            Some(commands) => commands.recv_timeout(timeout),
            None => return 0,
        };
        match first {
            Ok(command) => {
                self.handle(command);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Pumps until the reconciler has nothing queued or in flight. Returns
    /// `false` if that did not happen within `timeout`.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump();
            let drained = self.commands.as_ref().is_none_or(|c| c.is_empty());
            if drained && self.reconciler().is_settled() {
                // The worker may have queued one last command before settling.
                self.pump();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.pump_timeout((deadline - now).min(Duration::from_millis(5)));
        }
    }

    fn handle(&mut self, command: UiCommand<T>) {
        match command {
            UiCommand::ApplyDiff { submission, plan, animated, scroll_to_top, ack } => {
                trace!("ListBinding: applying {} changes for submission #{}", plan.len(), submission.sequence);
                let result = self.control.apply_plan(&plan, animated);
                match &result {
                    Ok(()) => {
                        self.current = submission.clone();
                        self.cache.clear();
                        if scroll_to_top && self.current.snapshot.number_of_sections() > 0 {
                            self.control.scroll_to_top(true);
                        }
                        self.finish_refresh();
                    }
                    Err(err) => error!("ListBinding: apply of submission #{} failed: {}", submission.sequence, err),
                }
                if ack.send(result).is_err() {
                    debug!("ListBinding: worker gone before apply of submission #{} was acknowledged", submission.sequence);
                }
            }
            UiCommand::RefreshSizes { submission, ack } => {
                let result = self.control.refresh_sizes();
                match &result {
                    Ok(()) => {
                        self.current = submission.clone();
                        self.finish_refresh();
                    }
                    Err(err) => error!("ListBinding: size refresh of submission #{} failed: {}", submission.sequence, err),
                }
                if ack.send(result).is_err() {
                    debug!("ListBinding: worker gone before size refresh of submission #{} was acknowledged", submission.sequence);
                }
            }
            UiCommand::EndRefresh => self.finish_refresh(),
            UiCommand::ContentInsets(insets) => self.control.set_content_insets(insets),
            UiCommand::InstallRefreshControl(callback) => self.install_refresh(callback),
        }
    }

    fn install_refresh(&mut self, callback: Callback) {
        self.refresh_callback = Some(callback);
        if !self.refresh_installed {
            self.control.install_refresh_control();
            self.refresh_installed = true;
        }
    }

    fn finish_refresh(&mut self) {
        if self.shared.refresh_pending.swap(false, Ordering::AcqRel) {
            self.control.end_refreshing();
        }
    }

    /// The user pulled to refresh. Runs the registered callback and keeps the
    /// indicator up until the next apply, size refresh or suppression.
    pub fn begin_refresh(&mut self) -> bool {
        self.assert_owner();
        let Some(callback) = self.refresh_callback.clone() else {
            return false;
        };
        self.shared.refresh_pending.store(true, Ordering::Release);
        callback();
        true
    }

    pub fn is_refreshing(&self) -> bool {
        self.shared.refresh_pending.load(Ordering::Acquire)
    }

    /// Renders the row at `at` and binds it to a pooled cell. Affordances the
    /// factory registers replace whatever the cache held for that position.
    pub fn configure_row(&mut self, at: IndexPath) -> bool {
        self.assert_owner();
        let Some(item) = self.current.item_at(at) else {
            trace!("ListBinding: ignoring configure for stale position {}", at);
            return false;
        };
        let mut context = RowContext::new(at);
        let content = (self.surface.content)(item, &mut context);
        self.cache.replace_row(at, context.into_affordances());
        self.control.bind(content, at);
        true
    }

    pub fn configure_header(&mut self, section: usize) -> bool {
        self.assert_owner();
        let (Some(factory), Some(value)) = (self.surface.header.clone(), self.current.section_at(section)) else {
            return false;
        };
        let content = factory(value, section);
        self.control.bind_header(content, section);
        true
    }

    pub fn configure_footer(&mut self, section: usize) -> bool {
        self.assert_owner();
        let (Some(factory), Some(value)) = (self.surface.footer.clone(), self.current.section_at(section)) else {
            return false;
        };
        let content = factory(value, section);
        self.control.bind_footer(content, section);
        true
    }

    pub fn header_height(&self, _section: usize) -> SupplementaryHeight {
        self.surface.header_height()
    }

    pub fn footer_height(&self, _section: usize) -> SupplementaryHeight {
        self.surface.footer_height()
    }

    /// Affordance registered by the row currently displayed at `at`. Positions
    /// outside the applied state answer `None`.
    pub fn affordance(&self, at: IndexPath, kind: AffordanceKind) -> Option<&Affordance> {
        if !self.current.snapshot.contains(at) {
            return None;
        }
        self.cache.affordance(at, kind)
    }

    /// Prefetch notification from the control. Fires the prefetch callback
    /// when the last row of the last section is among `paths`.
    pub fn prefetch_rows(&self, paths: &[IndexPath]) -> bool {
        let Some(last) = self.current.snapshot.last_index_path() else {
            return false;
        };
        if !paths.contains(&last) {
            return false;
        }
        debug!("ListBinding: last row {} requested, notifying prefetch", last);
        if let Some(callback) = &self.surface.on_prefetch {
            callback();
        }
        true
    }

    pub fn will_display_row(&self, at: IndexPath) -> bool {
        self.prefetch_rows(&[at])
    }

    pub fn number_of_sections(&self) -> usize {
        self.current.snapshot.number_of_sections()
    }

    pub fn number_of_rows(&self, section: usize) -> usize {
        self.current.snapshot.number_of_items_in(section).unwrap_or(0)
    }

    pub fn item(&self, at: IndexPath) -> Option<&T::Item> {
        self.current.item_at(at)
    }

    pub fn section(&self, index: usize) -> Option<&T> {
        self.current.section_at(index)
    }

    /// The submission currently rendered by the control.
    pub fn applied(&self) -> &Submission<T> {
        &self.current
    }

    pub fn render_cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn control(&self) -> &L {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut L {
        &mut self.control
    }

    pub fn is_dismantled(&self) -> bool {
        self.commands.is_none()
    }

    /// Tears the list down: cancels any queued submission, drops pending UI
    /// work, releases the applied state and the render cache, and joins the
    /// worker. An apply the worker already computed is abandoned.
    pub fn dismantle(&mut self) {
        let Some(commands) = self.commands.take() else {
            return;
        };
        self.shared.dismantle();
        let dropped = commands.try_iter().count();
        drop(commands);
        self.cache.clear();
        self.current = Arc::new(Submission::empty());
        self.refresh_callback = None;
        self.shared.refresh_pending.store(false, Ordering::Release);
        self.shared.join_worker();
        debug!("ListBinding: dismantled ({} queued commands dropped)", dropped);
    }
}

impl<T: ItemsSection, L: ListControl<T>> Drop for ListBinding<T, L> {
    fn drop(&mut self) {
        self.dismantle();
    }
}
