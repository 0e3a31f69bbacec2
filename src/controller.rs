use log::Level;

use crate::config::FocusConfig;
use crate::dom::NodeId;
use crate::events::{EventState, Handler, Listener, ListenerStore};
use crate::host::Host;
use crate::location::FragmentWrite;
use crate::resolver::{FocusState, FragmentRef, ResolvedTarget, parse_fragment, resolve};
use crate::section_index::SectionIndex;
use crate::timers::{TimerKind, TimerTask};
use crate::{Result, visibility};

/// Handle for one attached controller on a [`crate::Page`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(pub(crate) usize);

/// Chapter focus for one container.
///
/// Owns the section index, the trigger, and the current [`FocusState`]. The
/// page routes events and timers here; all document access goes through the
/// host passed into each call.
#[derive(Debug)]
pub struct ChapterFocus {
    id: ControllerId,
    config: FocusConfig,
    container: NodeId,
    trigger: Option<NodeId>,
    index: SectionIndex,
    state: FocusState,
}

impl ChapterFocus {
    /// Builds the index, prepares the trigger, registers listeners, and runs
    /// the first resolution. Returns `None` when the container is missing; the
    /// controller then stays inert.
    pub(crate) fn attach(
        id: ControllerId,
        config: FocusConfig,
        host: &mut Host,
        listeners: &mut ListenerStore,
    ) -> Result<Option<Self>> {
        config.validate()?;

        let trigger = match &config.trigger_id {
            Some(trigger_id) => {
                let found = host.dom.by_id(trigger_id);
                if found.is_none() {
                    host.diagnose(
                        Level::Warn,
                        format!("random chapter control #{trigger_id} not found"),
                    );
                }
                found
            }
            None => None,
        };

        let Some(container) = host.dom.by_id(&config.container_id) else {
            host.diagnose(
                Level::Error,
                format!(
                    "book container #{} not found; chapter focus disabled",
                    config.container_id
                ),
            );
            if let Some(trigger) = trigger {
                disable_trigger(host, trigger)?;
            }
            return Ok(None);
        };

        let index = SectionIndex::discover(&host.dom, container, &config.eligibility);
        log::debug!(
            target: "chapter_focus",
            "indexed {} sections in #{}",
            index.len(),
            config.container_id
        );
        if index.is_empty() {
            host.diagnose(
                Level::Warn,
                format!("no chapter sections found in #{}", config.container_id),
            );
            if let Some(trigger) = trigger {
                disable_trigger(host, trigger)?;
            }
        }

        let mut controller = Self {
            id,
            config,
            container,
            trigger,
            index,
            state: FocusState::NoTarget,
        };
        controller.trace(host, format!("attach sections={}", controller.index.len()));

        let root = host.dom.root();
        listeners.add(
            root,
            "hashchange",
            Listener {
                capture: false,
                handler: Handler::HashChange(id),
            },
        );
        listeners.add(
            root,
            "pointerdown",
            Listener {
                capture: true,
                handler: Handler::ClearOnPointerDown(id),
            },
        );
        if let Some(trigger) = trigger {
            listeners.add(
                trigger,
                "click",
                Listener {
                    capture: false,
                    handler: Handler::TriggerClick(id),
                },
            );
        }

        let starts_random = matches!(
            parse_fragment(host.location_hash(), &controller.config),
            Ok(FragmentRef::Random)
        );
        if starts_random {
            // Resolved from a timer so the initial navigation settles first.
            let delay = controller.config.startup_delay_ms;
            host.timers.schedule(
                delay,
                TimerTask {
                    controller: id,
                    kind: TimerKind::StartupResolve,
                },
            );
            controller.trace(host, format!("startup resolve deferred delay_ms={delay}"));
        } else {
            controller.resolve_current(host)?;
        }

        Ok(Some(controller))
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn trigger(&self) -> Option<NodeId> {
        self.trigger
    }

    pub fn index(&self) -> &SectionIndex {
        &self.index
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    pub(crate) fn handle(
        &mut self,
        handler: Handler,
        event: &mut EventState,
        host: &mut Host,
    ) -> Result<()> {
        match handler {
            Handler::HashChange(_) => self.resolve_current(host),
            Handler::ClearOnPointerDown(_) => self.handle_pointer_down(event.target, host),
            Handler::TriggerClick(_) => self.handle_trigger_click(event, host),
        }
    }

    pub(crate) fn run_timer(&mut self, kind: TimerKind, host: &mut Host) -> Result<()> {
        match kind {
            TimerKind::StartupResolve => self.resolve_current(host),
            TimerKind::ScrollIntoView(target) => {
                if host
                    .dom
                    .class_contains(target, &self.config.markers.directly_visible)
                {
                    host.scroll_into_view(
                        target,
                        self.config.scroll_behavior,
                        self.config.scroll_block,
                    );
                } else {
                    let label = host.dom.node_label(target);
                    self.trace(host, format!("scroll skipped {label} no longer focused"));
                }
                Ok(())
            }
        }
    }

    /// Reads the current fragment and shows whatever it names.
    fn resolve_current(&mut self, host: &mut Host) -> Result<()> {
        let fragment = host.location_hash().to_string();
        let resolution = resolve(
            &fragment,
            &self.index,
            &host.dom,
            self.container,
            &self.config,
        );
        if let Some(rejection) = &resolution.rejection {
            if rejection.is_warning() {
                host.diagnose(Level::Warn, rejection.to_string());
            } else {
                log::debug!(target: "chapter_focus", "{rejection}");
            }
        }

        let target = match resolution.target {
            ResolvedTarget::None => None,
            ResolvedTarget::Literal(node) => Some(node),
            ResolvedTarget::Random => self.settle_random(host)?,
        };
        self.show(target, host)
    }

    /// Turns a random token into a concrete chapter and rewrites the fragment in
    /// place, so the resulting URL names that chapter.
    fn settle_random(&mut self, host: &mut Host) -> Result<Option<NodeId>> {
        let unit = host.next_random_f64();
        let Some((node, id)) = self.index.pick(unit) else {
            host.write_fragment("", FragmentWrite::Replace)?;
            host.diagnose(
                Level::Warn,
                "random chapter requested but no chapter sections were found".into(),
            );
            host.notify_user("No chapters are available to choose from.".into());
            return Ok(None);
        };
        let id = id.to_string();
        host.write_id_fragment(&id, FragmentWrite::Replace)?;
        self.trace(host, format!("random -> #{id}"));
        Ok(Some(node))
    }

    fn show(&mut self, target: Option<NodeId>, host: &mut Host) -> Result<()> {
        let applied = visibility::apply(
            &mut host.dom,
            self.container,
            &self.config.markers,
            target,
        )?;
        match applied.target {
            Some(node) => {
                self.state = FocusState::Target(node);
                let label = host.dom.node_label(node);
                self.trace(
                    host,
                    format!("focus {label} ancestors={}", applied.ancestors.len()),
                );
                host.timers.schedule(
                    self.config.scroll_delay_ms,
                    TimerTask {
                        controller: self.id,
                        kind: TimerKind::ScrollIntoView(node),
                    },
                );
            }
            None => {
                if self.state.is_active() {
                    self.trace(host, "cleared".into());
                }
                self.state = FocusState::NoTarget;
            }
        }
        Ok(())
    }

    fn handle_pointer_down(&mut self, target: NodeId, host: &mut Host) -> Result<()> {
        if !self.state.is_active() {
            return Ok(());
        }
        if self
            .trigger
            .is_some_and(|trigger| host.dom.is_inclusive_descendant_of(target, trigger))
        {
            return Ok(());
        }
        let inside_region = host
            .dom
            .closest_with_any_class(target, &self.config.markers.region())
            .is_some_and(|marked| host.dom.is_inclusive_descendant_of(marked, self.container));
        if inside_region {
            return Ok(());
        }

        visibility::clear(&mut host.dom, self.container, &self.config.markers)?;
        self.state = FocusState::NoTarget;
        let label = host.dom.node_label(target);
        self.trace(host, format!("cleared by pointerdown on {label}"));
        Ok(())
    }

    fn handle_trigger_click(&mut self, event: &mut EventState, host: &mut Host) -> Result<()> {
        event.prevent_default();
        if self.index.is_empty() {
            return Ok(());
        }
        let unit = host.next_random_f64();
        let Some((_, id)) = self.index.pick(unit) else {
            return Ok(());
        };
        let id = id.to_string();
        self.trace(host, format!("trigger -> #{id}"));
        let navigated = host.write_id_fragment(&id, FragmentWrite::Assign)?;
        if !navigated {
            // Same chapter as the current fragment: no hashchange will follow.
            self.resolve_current(host)?;
        }
        if let Some(trigger) = self.trigger {
            host.blur(trigger);
        }
        Ok(())
    }

    fn trace(&self, host: &mut Host, message: String) {
        if host.is_tracing() {
            host.trace_line(format!("[focus] controller={} {message}", self.id.0));
        }
    }
}

fn disable_trigger(host: &mut Host, trigger: NodeId) -> Result<()> {
    host.dom.set_attr(trigger, "hidden", "")?;
    host.dom.set_attr(trigger, "aria-disabled", "true")?;
    Ok(())
}
