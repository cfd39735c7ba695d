//! Gesture handling over the display tree and store.
//!
//! Everything here runs on one control thread. Fetches are the only
//! suspension points: they run on workers and their results are applied when
//! [`InteractionController::poll`], [`InteractionController::tick`] or
//! [`InteractionController::wait_idle`] drains them.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::TreeConfig;
use crate::display::{DisplayId, DisplayTree, Expansion};
use crate::error::{FetchError, FragmentError, Result, TreeError};
use crate::fetch::{FetchCompletion, FetchDispatcher, SubtreeFetcher};
use crate::gesture::{ClickDebouncer, ClickPolicy, Gesture, GestureAction};
use crate::id::NodeId;
use crate::session::Session;
use crate::tree::TreeStore;

/// Immediate effect of a controller call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Children were materialized from known data.
    Expanded,
    Collapsed,
    Uncollapsed,
    /// Nothing to do in the node's current state.
    Unchanged,
    /// A fetch was started; the node expands when it resolves.
    FetchIssued,
    /// Another display node already started the fetch for this data node.
    AwaitingFetch,
    /// This node already waits on a pending fetch.
    DuplicateFetchSuppressed,
    DeepRevealStarted,
}

/// Asynchronous results, reported to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    Revealed {
        node: NodeId,
        displays: Vec<DisplayId>,
    },
    /// The node is still in the frontier; repeating the gesture retries.
    FetchFailed { node: NodeId, error: FetchError },
    /// The fragment was rejected as a whole; the store is unchanged.
    MergeRejected { node: NodeId, error: FragmentError },
    DeepRevealFinished { origin: DisplayId },
}

#[derive(Debug)]
struct DeepReveal {
    origin: DisplayId,
    level: Vec<DisplayId>,
    levels_left: usize,
    level_revealed: bool,
    outstanding: HashSet<NodeId>,
}

pub struct InteractionController {
    session: Session,
    dispatcher: FetchDispatcher,
    /// In-flight fetches and the display nodes waiting on each.
    pending: HashMap<NodeId, Vec<DisplayId>>,
    deep_reveals: Vec<DeepReveal>,
    policy: ClickPolicy,
    debouncer: ClickDebouncer,
    events: Vec<ControllerEvent>,
}

impl InteractionController {
    pub fn new(session: Session, fetcher: Arc<dyn SubtreeFetcher>, config: &TreeConfig) -> Self {
        let policy = ClickPolicy::from_config(config);
        Self {
            session,
            dispatcher: FetchDispatcher::new(fetcher),
            pending: HashMap::new(),
            deep_reveals: Vec::new(),
            policy,
            debouncer: ClickDebouncer::new(policy.debounce_window(config.double_click_window())),
            events: Vec::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &TreeStore {
        &self.session.store
    }

    pub fn display(&self) -> &DisplayTree {
        &self.session.display
    }

    pub fn policy(&self) -> ClickPolicy {
        self.policy
    }

    pub fn is_pending(&self, node: NodeId) -> bool {
        self.pending.contains_key(&node)
    }

    pub fn pending_fetches(&self) -> usize {
        self.pending.len()
    }

    /// No fetch in flight and no deep reveal in progress.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.deep_reveals.is_empty()
    }

    fn expansion(&self, id: DisplayId) -> Result<(NodeId, Expansion)> {
        self.session
            .display
            .node(id)
            .map(|n| (n.data_id, n.expansion))
            .ok_or(TreeError::UnknownDisplayNode)
    }

    /// Make a node's children visible, fetching them first if undiscovered.
    pub fn reveal(&mut self, id: DisplayId) -> Result<Transition> {
        let (data, expansion) = self.expansion(id)?;
        match expansion {
            Expansion::Expanded => Ok(Transition::Unchanged),
            Expansion::Collapsed => {
                self.session.display.uncollapse(id);
                Ok(Transition::Uncollapsed)
            }
            Expansion::Unrevealed => {
                // known children win even while a fetch for the node is in flight
                let Session { store, display, .. } = &mut self.session;
                if display.materialize(id, store) {
                    return Ok(Transition::Expanded);
                }

                if let Some(waiters) = self.pending.get_mut(&data) {
                    if waiters.contains(&id) {
                        tracing::debug!(node = %data, "duplicate fetch suppressed");
                        return Ok(Transition::DuplicateFetchSuppressed);
                    }
                    waiters.push(id);
                    return Ok(Transition::AwaitingFetch);
                }

                self.pending.insert(data, vec![id]);
                self.dispatcher.dispatch(data);
                Ok(Transition::FetchIssued)
            }
        }
    }

    pub fn collapse(&mut self, id: DisplayId) -> Result<Transition> {
        self.expansion(id)?;
        Ok(if self.session.display.collapse(id) {
            Transition::Collapsed
        } else {
            Transition::Unchanged
        })
    }

    pub fn uncollapse(&mut self, id: DisplayId) -> Result<Transition> {
        self.expansion(id)?;
        Ok(if self.session.display.uncollapse(id) {
            Transition::Uncollapsed
        } else {
            Transition::Unchanged
        })
    }

    /// One-level gesture: collapse if expanded, otherwise reveal.
    pub fn toggle(&mut self, id: DisplayId) -> Result<Transition> {
        match self.expansion(id)?.1 {
            Expansion::Expanded => self.collapse(id),
            Expansion::Collapsed | Expansion::Unrevealed => self.reveal(id),
        }
    }

    /// Reveal `depth` levels below `id`, one level at a time.
    ///
    /// A level's fetches all settle before the next level is requested.
    /// Collapsed nodes on the way are uncollapsed.
    pub fn reveal_depth(&mut self, id: DisplayId, depth: usize) -> Result<Transition> {
        self.expansion(id)?;
        if depth == 0 {
            return Ok(Transition::Unchanged);
        }
        let mut job = DeepReveal {
            origin: id,
            level: vec![id],
            levels_left: depth,
            level_revealed: false,
            outstanding: HashSet::new(),
        };
        if self.drive(&mut job) {
            self.events.push(ControllerEvent::DeepRevealFinished { origin: id });
        } else {
            self.deep_reveals.push(job);
        }
        Ok(Transition::DeepRevealStarted)
    }

    pub fn handle_gesture(&mut self, gesture: Gesture) -> Result<Transition> {
        let target = gesture.target();
        match self.policy.action_for(gesture) {
            GestureAction::Toggle => self.toggle(target),
            GestureAction::RevealDepth(depth) => self.reveal_depth(target, depth),
        }
    }

    /// Raw press from the UI. Single clicks may be held back for the
    /// double-click window; see [`Self::tick`].
    pub fn press(&mut self, id: DisplayId, now: Instant) -> Result<Vec<Transition>> {
        self.expansion(id)?;
        self.debouncer
            .press(id, now)
            .into_iter()
            .map(|gesture| self.handle_gesture(gesture))
            .collect()
    }

    /// Fire an elapsed single click and apply finished fetches.
    pub fn tick(&mut self, now: Instant) -> Vec<ControllerEvent> {
        if let Some(gesture) = self.debouncer.poll(now) {
            if let Err(err) = self.handle_gesture(gesture) {
                tracing::warn!(error = %err, "deferred click dropped");
            }
        }
        self.poll()
    }

    /// Apply every fetch completion that has arrived.
    pub fn poll(&mut self) -> Vec<ControllerEvent> {
        for completion in self.dispatcher.try_completions() {
            self.apply(completion);
        }
        mem::take(&mut self.events)
    }

    /// Block until idle or until `timeout` passes.
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<ControllerEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            for completion in self.dispatcher.try_completions() {
                self.apply(completion);
            }
            if self.is_idle() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(pending = self.pending.len(), "timed out waiting for fetches");
                break;
            }
            if let Some(completion) = self.dispatcher.wait_completion(deadline - now) {
                self.apply(completion);
            }
        }
        mem::take(&mut self.events)
    }

    fn apply(&mut self, completion: FetchCompletion) {
        let FetchCompletion { id: node, result } = completion;
        let waiters = self.pending.remove(&node).unwrap_or_default();

        let event = match result {
            Err(error) => {
                tracing::warn!(node = %node, %error, "fetch failed");
                ControllerEvent::FetchFailed { node, error }
            }
            Ok(wire) => match wire.decode().and_then(|fragment| {
                if fragment.root != node {
                    return Err(FragmentError::UnexpectedRoot {
                        requested: node,
                        actual: fragment.root,
                    });
                }
                self.session.store.merge(&fragment)
            }) {
                Err(error) => {
                    tracing::warn!(node = %node, %error, "fragment rejected");
                    ControllerEvent::MergeRejected { node, error }
                }
                Ok(_) => {
                    let Session { store, display, .. } = &mut self.session;
                    let displays = waiters
                        .into_iter()
                        .filter(|&w| display.materialize(w, store))
                        .collect();
                    ControllerEvent::Revealed { node, displays }
                }
            },
        };
        self.events.push(event);

        let mut jobs = mem::take(&mut self.deep_reveals);
        jobs.retain_mut(|job| {
            job.outstanding.remove(&node);
            if self.drive(job) {
                self.events
                    .push(ControllerEvent::DeepRevealFinished { origin: job.origin });
                false
            } else {
                true
            }
        });
        jobs.append(&mut self.deep_reveals);
        self.deep_reveals = jobs;
    }

    /// Advance a deep reveal as far as it goes without waiting. Returns true
    /// when it is finished.
    fn drive(&mut self, job: &mut DeepReveal) -> bool {
        while job.outstanding.is_empty() {
            if job.levels_left == 0 {
                return true;
            }
            if job.level_revealed {
                job.level = job
                    .level
                    .iter()
                    .flat_map(|&d| self.session.display.visible_children(d))
                    .collect();
                job.level_revealed = false;
            }
            if job.level.is_empty() {
                return true;
            }

            for &id in &job.level.clone() {
                let Ok((data, _)) = self.expansion(id) else {
                    continue;
                };
                match self.reveal(id) {
                    Ok(Transition::FetchIssued)
                    | Ok(Transition::AwaitingFetch)
                    | Ok(Transition::DuplicateFetchSuppressed) => {
                        job.outstanding.insert(data);
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "deep reveal skipped a node"),
                }
            }
            job.levels_left -= 1;
            job.level_revealed = true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFetcher, SourceTree};

    const WAIT: Duration = Duration::from_secs(5);

    fn controller(source: SourceTree, config: TreeConfig) -> (InteractionController, Arc<MockFetcher>) {
        let payload = source.initial_payload(config.root_id, 1);
        let fetcher = Arc::new(MockFetcher::new(source).with_prefetch_depth(1));
        let session = Session::start(&payload, &config).expect("session starts");
        let controller = InteractionController::new(session, fetcher.clone(), &config);
        (controller, fetcher)
    }

    fn child(c: &InteractionController, id: DisplayId, i: usize) -> DisplayId {
        c.display().visible_children(id)[i]
    }

    #[test]
    fn test_reveal_fetches_frontier_node() {
        let (mut c, fetcher) = controller(SourceTree::generate(2, 3), TreeConfig::default());
        let a = child(&c, c.display().root(), 0);

        assert_eq!(c.reveal(a).expect("known node"), Transition::FetchIssued);
        assert!(c.is_pending(NodeId::new(1)));
        let events = c.wait_idle(WAIT);

        assert_eq!(
            events,
            vec![ControllerEvent::Revealed {
                node: NodeId::new(1),
                displays: vec![a]
            }]
        );
        assert_eq!(c.display().state(a), Some(Expansion::Expanded));
        assert_eq!(c.display().visible_children(a).len(), 2);
        assert_eq!(fetcher.total_fetches(), 1);
    }

    #[test]
    fn test_duplicate_reveal_issues_one_fetch() {
        let (mut c, fetcher) = controller(SourceTree::generate(2, 3), TreeConfig::default());
        let a = child(&c, c.display().root(), 0);

        assert_eq!(c.reveal(a).expect("known"), Transition::FetchIssued);
        assert_eq!(c.reveal(a).expect("known"), Transition::DuplicateFetchSuppressed);
        c.wait_idle(WAIT);
        assert_eq!(fetcher.fetch_count(NodeId::new(1)), 1);
    }

    #[test]
    fn test_failed_fetch_leaves_node_revealable() {
        let (mut c, fetcher) = controller(SourceTree::generate(2, 3), TreeConfig::default());
        let b = child(&c, c.display().root(), 1);
        let b_data = NodeId::new(2);
        fetcher.fail_next(b_data, FetchError::Timeout);

        c.reveal(b).expect("known");
        let events = c.wait_idle(WAIT);
        assert_eq!(
            events,
            vec![ControllerEvent::FetchFailed {
                node: b_data,
                error: FetchError::Timeout
            }]
        );
        assert!(c.store().is_frontier(b_data));
        assert_eq!(c.display().state(b), Some(Expansion::Unrevealed));

        assert_eq!(c.reveal(b).expect("known"), Transition::FetchIssued);
        c.wait_idle(WAIT);
        assert_eq!(c.display().state(b), Some(Expansion::Expanded));
        assert_eq!(fetcher.fetch_count(b_data), 2);
    }

    #[test]
    fn test_toggle_collapses_and_restores_without_fetch() {
        let (mut c, fetcher) = controller(SourceTree::generate(2, 2), TreeConfig::default());
        let root = c.display().root();
        let before = c.display().visible_children(root);

        assert_eq!(c.toggle(root).expect("known"), Transition::Collapsed);
        assert_eq!(c.toggle(root).expect("known"), Transition::Uncollapsed);
        assert_eq!(c.display().visible_children(root), before);
        assert_eq!(fetcher.total_fetches(), 0);
    }

    #[test]
    fn test_reveal_depth_goes_level_by_level() {
        let (mut c, fetcher) = controller(SourceTree::generate(2, 4), TreeConfig::default());
        let root = c.display().root();

        assert_eq!(c.reveal_depth(root, 3).expect("known"), Transition::DeepRevealStarted);
        let events = c.wait_idle(WAIT);
        assert!(events.contains(&ControllerEvent::DeepRevealFinished { origin: root }));

        // root (known) + 2 children + 4 grandchildren were revealed
        assert_eq!(fetcher.total_fetches(), 6);
        assert_eq!(c.display().visible_nodes().len(), 1 + 2 + 4 + 8);
        assert!(c.is_idle());
    }

    #[test]
    fn test_merge_rejection_is_reported() {
        struct Garbage;
        impl SubtreeFetcher for Garbage {
            fn fetch(&self, id: NodeId) -> std::result::Result<crate::wire::WireFragment, FetchError> {
                Ok(crate::wire::WireFragment {
                    root_id: crate::wire::encode_id(id),
                    root_children: vec![9],
                    ..Default::default()
                })
            }
        }

        let source = SourceTree::generate(2, 2);
        let config = TreeConfig::default();
        let payload = source.initial_payload(config.root_id, 1);
        let session = Session::start(&payload, &config).expect("starts");
        let mut c = InteractionController::new(session, Arc::new(Garbage), &config);
        let a = child(&c, c.display().root(), 0);
        let before = c.store().clone();

        c.reveal(a).expect("known");
        let events = c.wait_idle(WAIT);
        assert!(matches!(
            events.as_slice(),
            [ControllerEvent::MergeRejected {
                error: FragmentError::LengthMismatch { .. },
                ..
            }]
        ));
        assert_eq!(c.store(), &before);
    }

    #[test]
    fn test_press_with_deep_policy_waits_for_window() {
        let config = TreeConfig {
            click_expand_depth: 2,
            ..TreeConfig::default()
        };
        let (mut c, fetcher) = controller(SourceTree::generate(2, 3), config);
        let a = child(&c, c.display().root(), 0);
        let t0 = Instant::now();

        assert!(c.press(a, t0).expect("known").is_empty());
        assert_eq!(fetcher.total_fetches(), 0);

        c.tick(t0 + Duration::from_secs(1));
        c.wait_idle(WAIT);
        // deep reveal of two levels: a, then a's two children
        assert_eq!(fetcher.total_fetches(), 3);
    }

    #[test]
    fn test_double_press_toggles_under_deep_policy() {
        let config = TreeConfig {
            click_expand_depth: 2,
            ..TreeConfig::default()
        };
        let (mut c, fetcher) = controller(SourceTree::generate(2, 3), config);
        let root = c.display().root();
        let t0 = Instant::now();

        c.press(root, t0).expect("known");
        let fired = c.press(root, t0 + Duration::from_millis(50)).expect("known");
        assert_eq!(fired, vec![Transition::Collapsed]);
        assert_eq!(fetcher.total_fetches(), 0);
    }

    #[test]
    fn test_reveal_depth_settles_each_level_before_the_next() {
        use std::sync::Mutex;

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum Step {
            Start(NodeId),
            End(NodeId),
        }

        struct Recording {
            inner: MockFetcher,
            log: Mutex<Vec<Step>>,
        }

        impl SubtreeFetcher for Recording {
            fn fetch(&self, id: NodeId) -> std::result::Result<crate::wire::WireFragment, FetchError> {
                self.log.lock().expect("log lock").push(Step::Start(id));
                // odd ids are slow so ends arrive out of request order
                let delay = if id.get() % 2 == 1 { 60 } else { 5 };
                std::thread::sleep(Duration::from_millis(delay));
                let result = self.inner.fetch(id);
                self.log.lock().expect("log lock").push(Step::End(id));
                result
            }
        }

        let source = SourceTree::generate(2, 3);
        let config = TreeConfig::default();
        let payload = source.initial_payload(config.root_id, 1);
        let fetcher = Arc::new(Recording {
            inner: MockFetcher::new(source).with_prefetch_depth(1),
            log: Mutex::new(Vec::new()),
        });
        let session = Session::start(&payload, &config).expect("starts");
        let mut c = InteractionController::new(session, fetcher.clone(), &config);
        let root = c.display().root();

        c.reveal_depth(root, 3).expect("known");
        c.wait_idle(WAIT);

        let log = fetcher.log.lock().expect("log lock").clone();
        let position = |step: Step| log.iter().position(|s| *s == step).expect("step logged");
        let second: Vec<NodeId> = (1..=2).map(NodeId::new).collect();
        let third: Vec<NodeId> = (3..=6).map(NodeId::new).collect();
        assert_eq!(log.len(), 2 * (second.len() + third.len()));

        let last_second_end = second.iter().map(|&id| position(Step::End(id))).max();
        let first_third_start = third.iter().map(|&id| position(Step::Start(id))).min();
        assert!(last_second_end < first_third_start, "{log:?}");

        // fetches within one level run side by side
        let first_second_end = second.iter().map(|&id| position(Step::End(id))).min();
        let last_second_start = second.iter().map(|&id| position(Step::Start(id))).max();
        assert!(last_second_start < first_second_end, "{log:?}");
    }

    #[test]
    fn test_reveal_uses_children_resolved_while_fetch_is_pending() {
        use crate::wire::{encode_id, WireFragment};

        // root -> [A, B]; A -> [X, C]; B -> [X]; C -> [X]; X -> [Y]
        let mut source = SourceTree::new();
        let root = source.add_node("root");
        let a = source.add_child(root, "A");
        let b = source.add_child(root, "B");
        let x = source.add_child(a, "X");
        let c_node = source.add_child(a, "C");
        source.link(b, x);
        source.link(c_node, x);
        let y = source.add_child(x, "Y");

        struct SlowFailingX {
            x: NodeId,
            c: NodeId,
            y: NodeId,
        }

        impl SubtreeFetcher for SlowFailingX {
            fn fetch(&self, id: NodeId) -> std::result::Result<WireFragment, FetchError> {
                if id == self.x {
                    std::thread::sleep(Duration::from_millis(300));
                    return Err(FetchError::Timeout);
                }
                assert_eq!(id, self.c);
                Ok(WireFragment {
                    root_id: encode_id(self.c),
                    root_children: vec![encode_id(self.x)],
                    children: vec![vec![encode_id(self.y)], vec![]],
                    text: vec!["X".into(), "Y".into()],
                    ..WireFragment::default()
                })
            }
        }

        let config = TreeConfig {
            initial_expand_depth: 2,
            ..TreeConfig::default()
        };
        let payload = source.initial_payload(config.root_id, 2);
        let session = Session::start(&payload, &config).expect("starts");
        let fetcher = Arc::new(SlowFailingX { x, c: c_node, y });
        let mut c = InteractionController::new(session, fetcher, &config);

        let displays_of = |c: &InteractionController, id: NodeId| -> Vec<DisplayId> {
            c.display()
                .visible_nodes()
                .into_iter()
                .filter(|v| v.data_id == id)
                .map(|v| v.display)
                .collect()
        };
        let x_displays = displays_of(&c, x);
        let c_display = displays_of(&c, c_node)[0];
        assert_eq!(x_displays.len(), 2);

        assert_eq!(c.reveal(x_displays[0]).expect("known"), Transition::FetchIssued);
        assert_eq!(c.reveal(c_display).expect("known"), Transition::FetchIssued);

        let deadline = Instant::now() + WAIT;
        while !c.store().is_resolved(x) && Instant::now() < deadline {
            c.poll();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(c.store().is_resolved(x));
        assert!(c.is_pending(x));

        assert_eq!(c.reveal(x_displays[1]).expect("known"), Transition::Expanded);

        let events = c.wait_idle(WAIT);
        assert!(events.contains(&ControllerEvent::FetchFailed {
            node: x,
            error: FetchError::Timeout
        }));
        assert_eq!(c.display().state(x_displays[1]), Some(Expansion::Expanded));
        assert_eq!(c.reveal(x_displays[0]).expect("known"), Transition::Expanded);
    }
}
