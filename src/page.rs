use crate::config::FocusConfig;
use crate::controller::{ChapterFocus, ControllerId};
use crate::dom::{Dom, NodeId, truncate_chars};
use crate::events::{EventPhase, EventState, ListenerStore};
use crate::host::{Diagnostic, Host, ScrollRecord};
use crate::html::{ParseOutput, parse_html};
use crate::location::FragmentWrite;
use crate::resolver::FocusState;
use crate::timers::{PendingTimer, ScheduledTask, task_label};
use crate::{Error, Result};

/// Deterministic page host for chapter focus controllers.
///
/// Built from static HTML. Interaction, navigation, and time are all driven
/// explicitly by the caller, so every run with the same seed and the same
/// calls produces the same document.
#[derive(Debug)]
pub struct Page {
    host: Host,
    listeners: ListenerStore,
    controllers: Vec<ChapterFocus>,
    next_controller_id: usize,
}

impl Page {
    pub fn from_html(html: &str) -> Result<Self> {
        Self::from_html_with_url("about:blank", html)
    }

    pub fn from_html_with_url(url: &str, html: &str) -> Result<Self> {
        let ParseOutput { dom } = parse_html(html)?;
        Ok(Self {
            host: Host::new(dom, url)?,
            listeners: ListenerStore::default(),
            controllers: Vec::new(),
            next_controller_id: 0,
        })
    }

    /// Attaches a controller and runs its startup. `Ok(None)` means the
    /// container was not found and nothing was registered.
    pub fn attach(&mut self, config: FocusConfig) -> Result<Option<ControllerId>> {
        let id = ControllerId(self.next_controller_id);
        let Some(controller) = ChapterFocus::attach(id, config, &mut self.host, &mut self.listeners)?
        else {
            return Ok(None);
        };
        self.next_controller_id += 1;
        self.controllers.push(controller);
        self.drain_hashchanges()?;
        Ok(Some(id))
    }

    /// Removes the controller with its listeners and pending timers. Markers it
    /// set stay in the document.
    pub fn detach(&mut self, id: ControllerId) -> bool {
        let Some(pos) = self.controllers.iter().position(|c| c.id() == id) else {
            return false;
        };
        self.controllers.remove(pos);
        let listeners = self.listeners.remove_for(id);
        let timers = self.host.timers.clear_for(id);
        self.host.trace_event_line(format!(
            "[focus] controller={} detached listeners={listeners} timers={timers}",
            id.0
        ));
        true
    }

    pub fn controller(&self, id: ControllerId) -> Option<&ChapterFocus> {
        self.controllers.iter().find(|c| c.id() == id)
    }

    pub fn focus_state(&self, id: ControllerId) -> Option<FocusState> {
        self.controller(id).map(ChapterFocus::state)
    }

    pub fn dom(&self) -> &Dom {
        &self.host.dom
    }

    /// A user click: `pointerdown`, then `click`, then the default action of
    /// an in-page anchor when nothing prevented it.
    pub fn click(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.press(target)?;

        let click = self.dispatch_event(target, "click", true)?;
        if !click.default_prevented {
            self.follow_link(target)?;
        }
        self.drain_hashchanges()
    }

    pub fn pointer_down(&mut self, selector: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.press(target)?;
        self.drain_hashchanges()
    }

    /// Dispatches a bubbling event of any type with no default action.
    pub fn dispatch(&mut self, selector: &str, event_type: &str) -> Result<()> {
        let target = self.select_one(selector)?;
        self.dispatch_event(target, event_type, true)?;
        self.drain_hashchanges()
    }

    /// `location.hash = fragment`.
    pub fn navigate_fragment(&mut self, fragment: &str) -> Result<()> {
        self.host.write_fragment(fragment, FragmentWrite::Assign)?;
        self.drain_hashchanges()
    }

    /// `history.replaceState` with a new fragment; no listener observes it.
    pub fn replace_fragment(&mut self, fragment: &str) -> Result<()> {
        self.host.write_fragment(fragment, FragmentWrite::Replace)?;
        Ok(())
    }

    pub fn history_back(&mut self) -> Result<()> {
        self.host.traverse_history(-1)?;
        self.drain_hashchanges()
    }

    pub fn history_forward(&mut self) -> Result<()> {
        self.host.traverse_history(1)?;
        self.drain_hashchanges()
    }

    pub fn location_href(&self) -> String {
        self.host.location_href()
    }

    pub fn location_hash(&self) -> &str {
        self.host.location_hash()
    }

    pub fn history_len(&self) -> usize {
        self.host.history_len()
    }

    pub fn history_index(&self) -> usize {
        self.host.history_index()
    }

    pub fn has_class(&self, selector: &str, class_name: &str) -> Result<bool> {
        let target = self.select_one(selector)?;
        Ok(self.host.dom.class_contains(target, class_name))
    }

    /// Ids of identified elements carrying `class_name`, in document order.
    pub fn ids_with_class(&self, class_name: &str) -> Vec<String> {
        let dom = &self.host.dom;
        dom.all_element_nodes()
            .into_iter()
            .filter(|node| dom.class_contains(*node, class_name))
            .filter_map(|node| dom.id_of(node).map(str::to_string))
            .collect()
    }

    pub fn attr(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let target = self.select_one(selector)?;
        Ok(self.host.dom.attr(target, name).map(str::to_string))
    }

    pub fn active_element_id(&self) -> Option<String> {
        let active = self.host.active_element()?;
        self.host.dom.id_of(active).map(str::to_string)
    }

    pub fn scroll_log(&self) -> &[ScrollRecord] {
        self.host.scroll_log()
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        self.host.take_notices()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.host.take_diagnostics()
    }

    pub fn dump_dom(&self, selector: &str) -> Result<String> {
        let target = self.select_one(selector)?;
        Ok(self.host.dom.dump_node(target))
    }

    pub fn assert_class(&self, selector: &str, class_name: &str, expected: bool) -> Result<()> {
        let target = self.select_one(selector)?;
        let actual = self.host.dom.class_contains(target, class_name);
        if actual != expected {
            return Err(Error::AssertionFailed {
                selector: selector.to_string(),
                expected: class_expectation(class_name, expected),
                actual: class_expectation(class_name, actual),
                dom_snippet: self.node_snippet(target),
            });
        }
        Ok(())
    }

    /// Checks the complete marker set of the controller owning
    /// `container_selector`: with `Some(target)` the container, that target,
    /// and exactly its ancestors up to the container are marked; with `None`
    /// no marker is present.
    pub fn assert_marked(&self, container_selector: &str, target: Option<&str>) -> Result<()> {
        let container = self.select_one(container_selector)?;
        let controller = self
            .controllers
            .iter()
            .find(|c| c.container() == container)
            .ok_or_else(|| {
                Error::Runtime(format!("no controller attached to {container_selector}"))
            })?;
        let markers = &controller.config().markers;
        let dom = &self.host.dom;

        let target = target.map(|selector| self.select_one(selector)).transpose()?;
        let mut expected_ancestors = Vec::new();
        if let Some(target) = target {
            let mut cursor = dom.parent_element(target);
            while let Some(node) = cursor.filter(|node| *node != container) {
                expected_ancestors.push(node);
                cursor = dom.parent_element(node);
            }
            expected_ancestors.sort();
        }

        let inside = dom.descendant_elements(container);
        let carrying = |class_name: &str| {
            inside
                .iter()
                .copied()
                .filter(|node| *node != container && dom.class_contains(*node, class_name))
                .collect::<Vec<_>>()
        };
        let mut ancestors = carrying(&markers.ancestor_visible);
        ancestors.sort();

        let expected = describe_marks(
            dom,
            target.is_some(),
            target.into_iter().collect(),
            &expected_ancestors,
        );
        let actual = describe_marks(
            dom,
            dom.class_contains(container, &markers.focus_active),
            carrying(&markers.directly_visible),
            &ancestors,
        );
        if expected != actual {
            return Err(Error::AssertionFailed {
                selector: container_selector.to_string(),
                expected,
                actual,
                dom_snippet: self.node_snippet(container),
            });
        }
        Ok(())
    }

    pub fn set_random_seed(&mut self, seed: u64) {
        self.host.set_random_seed(seed);
    }

    pub fn set_timer_step_limit(&mut self, max_steps: usize) -> Result<()> {
        self.host.timers.set_step_limit(max_steps)
    }

    pub fn set_trace_log_limit(&mut self, max_entries: usize) -> Result<()> {
        self.host.set_trace_log_limit(max_entries)
    }

    pub fn set_diagnostic_limit(&mut self, max_entries: usize) -> Result<()> {
        self.host.set_diagnostic_limit(max_entries)
    }

    pub fn enable_trace(&mut self, enabled: bool) {
        self.host.enable_trace(enabled);
    }

    pub fn set_trace_events(&mut self, enabled: bool) {
        self.host.set_trace_events(enabled);
    }

    pub fn set_trace_timers(&mut self, enabled: bool) {
        self.host.set_trace_timers(enabled);
    }

    pub fn set_trace_stderr(&mut self, enabled: bool) {
        self.host.set_trace_stderr(enabled);
    }

    pub fn take_trace_logs(&mut self) -> Vec<String> {
        self.host.take_trace_logs()
    }

    pub fn now_ms(&self) -> i64 {
        self.host.timers.now_ms()
    }

    pub fn advance_time(&mut self, delta_ms: i64) -> Result<()> {
        if delta_ms < 0 {
            return Err(Error::Runtime(
                "advance_time requires non-negative milliseconds".into(),
            ));
        }
        let from = self.now_ms();
        self.host.timers.advance_to(from.saturating_add(delta_ms))?;
        let ran = self.run_due_timers_internal()?;
        self.host.trace_timer_line(format!(
            "[timer] advance delta_ms={delta_ms} from={from} to={} ran_due={ran}",
            self.now_ms()
        ));
        Ok(())
    }

    pub fn advance_time_to(&mut self, target_ms: i64) -> Result<()> {
        let from = self.now_ms();
        self.host.timers.advance_to(target_ms)?;
        let ran = self.run_due_timers_internal()?;
        self.host.trace_timer_line(format!(
            "[timer] advance_to from={from} to={} ran_due={ran}",
            self.now_ms()
        ));
        Ok(())
    }

    /// Runs every pending timer, jumping the clock to each due time.
    pub fn flush(&mut self) -> Result<()> {
        let from = self.now_ms();
        let ran = self.run_timer_queue(None, true)?;
        self.host.trace_timer_line(format!(
            "[timer] flush from={from} to={} ran={ran}",
            self.now_ms()
        ));
        Ok(())
    }

    pub fn run_due_timers(&mut self) -> Result<usize> {
        let ran = self.run_due_timers_internal()?;
        self.host.trace_timer_line(format!(
            "[timer] run_due now_ms={} ran={ran}",
            self.now_ms()
        ));
        Ok(ran)
    }

    pub fn run_next_timer(&mut self) -> Result<bool> {
        let Some(task) = self.host.timers.take_next(None, true) else {
            self.host.trace_timer_line("[timer] run_next none".into());
            return Ok(false);
        };
        self.execute_timer_task(task)?;
        Ok(true)
    }

    pub fn pending_timers(&self) -> Vec<PendingTimer> {
        self.host.timers.pending()
    }

    pub fn clear_timer(&mut self, timer_id: i64) -> bool {
        let existed = self.host.timers.clear(timer_id);
        self.host
            .trace_timer_line(format!("[timer] clear id={timer_id} existed={existed}"));
        existed
    }

    pub fn clear_all_timers(&mut self) -> usize {
        let cleared = self.host.timers.clear_all();
        self.host
            .trace_timer_line(format!("[timer] clear_all cleared={cleared}"));
        cleared
    }

    fn run_due_timers_internal(&mut self) -> Result<usize> {
        let now = self.now_ms();
        self.run_timer_queue(Some(now), false)
    }

    fn run_timer_queue(&mut self, due_limit: Option<i64>, advance_clock: bool) -> Result<usize> {
        let mut steps = 0usize;
        while self.host.timers.has_next(due_limit) {
            steps += 1;
            if steps > self.host.timers.step_limit() {
                return Err(self.host.timers.step_limit_error(steps, due_limit));
            }
            let Some(task) = self.host.timers.take_next(due_limit, advance_clock) else {
                break;
            };
            self.execute_timer_task(task)?;
        }
        Ok(steps)
    }

    fn execute_timer_task(&mut self, task: ScheduledTask) -> Result<()> {
        self.host.trace_timer_line(format!(
            "[timer] run id={} due_at={} task={}",
            task.id,
            task.due_at,
            task_label(&task.task)
        ));
        let Some(controller) = self
            .controllers
            .iter_mut()
            .find(|c| c.id() == task.task.controller)
        else {
            return Ok(());
        };
        controller.run_timer(task.task.kind, &mut self.host)?;
        self.drain_hashchanges()
    }

    /// `pointerdown` plus its default action: focusing the nearest focusable
    /// element.
    fn press(&mut self, target: NodeId) -> Result<()> {
        let event = self.dispatch_event(target, "pointerdown", true)?;
        if event.default_prevented {
            return Ok(());
        }
        if let Some(focusable) = self.host.dom.closest(target, "a[href], button")? {
            self.host.focus(focusable);
        }
        Ok(())
    }

    fn follow_link(&mut self, target: NodeId) -> Result<()> {
        let Some(anchor) = self.host.dom.closest(target, "a[href]")? else {
            return Ok(());
        };
        let href = self.host.dom.attr(anchor, "href").unwrap_or_default().to_string();
        match href.strip_prefix('#') {
            Some(fragment) => {
                self.host.write_fragment(fragment, FragmentWrite::Assign)?;
            }
            None => {
                self.host
                    .trace_event_line(format!("[event] navigation to {href} ignored"));
            }
        }
        Ok(())
    }

    fn drain_hashchanges(&mut self) -> Result<()> {
        while let Some(change) = self.host.take_pending_hashchange() {
            self.host.trace_event_line(format!(
                "[event] hashchange {} -> {}",
                change.old_url, change.new_url
            ));
            let root = self.host.dom.root();
            self.dispatch_event(root, "hashchange", false)?;
        }
        Ok(())
    }

    fn dispatch_event(
        &mut self,
        target: NodeId,
        event_type: &str,
        bubbles: bool,
    ) -> Result<EventState> {
        let mut event = EventState::new(event_type, target, self.now_ms());
        event.bubbles = bubbles;

        let mut path = Vec::new();
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            path.push(node);
            cursor = self.host.dom.parent(node);
        }
        path.reverse();

        let outcome = self.propagate(&mut event, &path)?;
        self.trace_event_done(&event, outcome);
        Ok(event)
    }

    fn propagate(&mut self, event: &mut EventState, path: &[NodeId]) -> Result<&'static str> {
        let target = event.target;
        let ancestors = &path[..path.len().saturating_sub(1)];

        // Capture phase.
        for node in ancestors {
            event.event_phase = EventPhase::Capturing;
            event.current_target = *node;
            self.invoke_listeners(*node, event, true)?;
            if event.propagation_stopped {
                return Ok("propagation_stopped");
            }
        }

        // Target phase: capture listeners first.
        event.event_phase = EventPhase::AtTarget;
        event.current_target = target;
        for capture in [true, false] {
            self.invoke_listeners(target, event, capture)?;
            if event.propagation_stopped {
                return Ok("propagation_stopped");
            }
        }

        // Bubble phase.
        if event.bubbles {
            for node in ancestors.iter().rev() {
                event.event_phase = EventPhase::Bubbling;
                event.current_target = *node;
                self.invoke_listeners(*node, event, false)?;
                if event.propagation_stopped {
                    return Ok("propagation_stopped");
                }
            }
        }
        Ok("completed")
    }

    fn invoke_listeners(
        &mut self,
        node_id: NodeId,
        event: &mut EventState,
        capture: bool,
    ) -> Result<()> {
        for listener in self.listeners.get(node_id, &event.event_type, capture) {
            let id = listener.handler.controller();
            let Some(controller) = self.controllers.iter_mut().find(|c| c.id() == id) else {
                continue;
            };
            controller.handle(listener.handler, event, &mut self.host)?;
        }
        Ok(())
    }

    fn trace_event_done(&mut self, event: &EventState, outcome: &str) {
        if !self.host.is_tracing() {
            return;
        }
        let target_label = self.host.dom.node_label(event.target);
        let current_label = self.host.dom.node_label(event.current_target);
        self.host.trace_event_line(format!(
            "[event] done {} target={} current={} phase={:?} at_ms={} outcome={} default_prevented={}",
            event.event_type,
            target_label,
            current_label,
            event.event_phase,
            event.time_stamp_ms,
            outcome,
            event.default_prevented
        ));
    }

    fn select_one(&self, selector: &str) -> Result<NodeId> {
        self.host
            .dom
            .query_selector(selector)?
            .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
    }

    fn node_snippet(&self, node_id: NodeId) -> String {
        truncate_chars(&self.host.dom.dump_node(node_id), 200)
    }
}

fn class_expectation(class_name: &str, present: bool) -> String {
    if present {
        format!("class {class_name:?} present")
    } else {
        format!("class {class_name:?} absent")
    }
}

fn describe_marks(dom: &Dom, active: bool, targets: Vec<NodeId>, ancestors: &[NodeId]) -> String {
    let labels = |nodes: &[NodeId]| {
        nodes
            .iter()
            .map(|node| dom.node_label(*node))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        "active={active} target=[{}] ancestors=[{}]",
        labels(&targets),
        labels(ancestors)
    )
}
