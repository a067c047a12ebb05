// animation.rs — frame-driven, cancelable interpolation tasks
//
// Everything here runs on the render thread: a task advances only when its owner
// calls `tick` with the current frame timestamp (milliseconds).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::easing::Easing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Cancelled,
    Resolved,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Cancelled | TaskState::Resolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Resolved,
    Cancelled,
}

type Reaction = Box<dyn FnOnce(Settlement)>;

struct TaskCell {
    state: Cell<TaskState>,
    source: Option<TaskHandle>,
    reactions: RefCell<Vec<Reaction>>,
}

/// Shared settlement handle of a task.
///
/// Clones observe the same task. A handle settles exactly once, either resolved
/// or cancelled; later `cancel` calls are no-ops.
#[derive(Clone)]
pub struct TaskHandle(Rc<TaskCell>);

impl TaskHandle {
    pub fn new() -> Self {
        Self::with_source(None)
    }

    /// A handle that is already resolved, for requests with nothing to animate.
    pub fn resolved() -> Self {
        let handle = Self::new();
        handle.settle(Settlement::Resolved);
        handle
    }

    fn with_source(source: Option<TaskHandle>) -> Self {
        TaskHandle(Rc::new(TaskCell {
            state: Cell::new(TaskState::Pending),
            source,
            reactions: RefCell::new(Vec::new()),
        }))
    }

    pub fn state(&self) -> TaskState {
        self.0.state.get()
    }

    pub fn is_settled(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// Cancel this task and, through a chain, the task it was derived from.
    ///
    /// Returns whether this call left the handle cancelled. A handle from [`catch`]
    /// recovers instead, so cancelling it returns `false` and it ends up resolved.
    ///
    /// [`catch`]: TaskHandle::catch
    pub fn cancel(&self) -> bool {
        if self.is_settled() {
            return false;
        }
        if let Some(source) = &self.0.source {
            source.cancel();
        }
        self.settle(Settlement::Cancelled);
        self.is_cancelled()
    }

    pub(crate) fn mark_running(&self) {
        if self.state() == TaskState::Pending {
            self.0.state.set(TaskState::Running);
        }
    }

    pub(crate) fn resolve(&self) -> bool {
        self.settle(Settlement::Resolved)
    }

    fn settle(&self, settlement: Settlement) -> bool {
        if self.is_settled() {
            return false;
        }
        self.0.state.set(match settlement {
            Settlement::Resolved => TaskState::Resolved,
            Settlement::Cancelled => TaskState::Cancelled,
        });

        let reactions = std::mem::take(&mut *self.0.reactions.borrow_mut());
        for reaction in reactions {
            reaction(settlement);
        }
        true
    }

    fn on_settle(&self, reaction: impl FnOnce(Settlement) + 'static) {
        match self.state() {
            TaskState::Resolved => reaction(Settlement::Resolved),
            TaskState::Cancelled => reaction(Settlement::Cancelled),
            _ => self.0.reactions.borrow_mut().push(Box::new(reaction)),
        }
    }

    /// Chain a reaction; the derived handle settles with whatever the reaction returns,
    /// the reaction itself runs even when nobody keeps the derived handle.
    fn derive(&self, reaction: impl FnOnce(Settlement) -> Settlement + 'static) -> TaskHandle {
        let derived = TaskHandle::with_source(Some(self.clone()));
        let weak: Weak<TaskCell> = Rc::downgrade(&derived.0);
        self.on_settle(move |settlement| {
            let outcome = reaction(settlement);
            if let Some(cell) = weak.upgrade() {
                TaskHandle(cell).settle(outcome);
            }
        });
        derived
    }

    /// Run `f` once this task resolves. The returned handle resolves after `f`,
    /// and is cancelled if this task is cancelled.
    pub fn then(&self, f: impl FnOnce() + 'static) -> TaskHandle {
        self.derive(move |settlement| {
            if settlement == Settlement::Resolved {
                f();
            }
            settlement
        })
    }

    /// Run `f` if this task is cancelled; the returned handle resolves either way, also
    /// when it is the one being cancelled.
    pub fn catch(&self, f: impl FnOnce() + 'static) -> TaskHandle {
        self.derive(move |settlement| {
            if settlement == Settlement::Cancelled {
                f();
            }
            Settlement::Resolved
        })
    }

    /// Run `f` on either outcome; the returned handle mirrors this one.
    pub fn finally(&self, f: impl FnOnce() + 'static) -> TaskHandle {
        self.derive(move |settlement| {
            f();
            settlement
        })
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.state()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyRange {
    pub start: f64,
    pub end: f64,
}

impl PropertyRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Interpolated values of one frame, by property name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationValues(Vec<(&'static str, f64)>);

impl AnimationValues {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnimationOptions {
    pub properties: Vec<(&'static str, PropertyRange)>,
    /// Milliseconds.
    pub duration: f64,
    /// Milliseconds before the first tick fires.
    pub delay: f64,
    pub easing: Easing,
}

impl AnimationOptions {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    pub fn property(mut self, name: &'static str, start: f64, end: f64) -> Self {
        self.properties.push((name, PropertyRange::new(start, end)));
        self
    }

    pub fn delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Settled,
}

/// Something advanced once per frame against a mutable context.
pub trait FrameDriver<C> {
    fn tick(&mut self, now: f64, ctx: &mut C) -> TickOutcome;

    /// Stop the driver; it must not touch the context afterwards.
    fn cancel(&mut self);
}

pub type TickFn<C> = Box<dyn FnMut(&mut C, &AnimationValues, f64)>;

/// Interpolates named properties over a duration and hands each frame's values to a callback.
pub struct AnimationTask<C> {
    options: AnimationOptions,
    on_tick: TickFn<C>,
    handle: TaskHandle,
    begin: Option<f64>,
}

impl<C> AnimationTask<C> {
    pub fn new(
        options: AnimationOptions,
        on_tick: impl FnMut(&mut C, &AnimationValues, f64) + 'static,
    ) -> Self {
        Self {
            options,
            on_tick: Box::new(on_tick),
            handle: TaskHandle::new(),
            begin: None,
        }
    }

    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> TaskState {
        self.handle.state()
    }

    fn values_at(&self, eased: f64) -> AnimationValues {
        AnimationValues(
            self.options
                .properties
                .iter()
                .map(|(name, range)| (*name, range.start + (range.end - range.start) * eased))
                .collect(),
        )
    }

    fn end_values(&self) -> AnimationValues {
        AnimationValues(
            self.options
                .properties
                .iter()
                .map(|(name, range)| (*name, range.end))
                .collect(),
        )
    }
}

impl<C> FrameDriver<C> for AnimationTask<C> {
    fn tick(&mut self, now: f64, ctx: &mut C) -> TickOutcome {
        if self.handle.is_settled() {
            return TickOutcome::Settled;
        }

        let begin = *self.begin.get_or_insert(now + self.options.delay.max(0.0));
        if now < begin {
            return TickOutcome::Continue;
        }
        self.handle.mark_running();

        let progress = if self.options.duration > 0.0 {
            (now - begin) / self.options.duration
        } else {
            1.0
        };

        if progress < 1.0 {
            let values = self.values_at(self.options.easing.apply(progress));
            (self.on_tick)(ctx, &values, progress);
            return if self.handle.is_settled() {
                TickOutcome::Settled
            } else {
                TickOutcome::Continue
            };
        }

        // the last frame always lands exactly on the targets
        let values = self.end_values();
        (self.on_tick)(ctx, &values, 1.0);
        self.handle.resolve();
        TickOutcome::Settled
    }

    fn cancel(&mut self) {
        self.handle.cancel();
    }
}

/// Which navigation driver currently owns the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Animation,
    Zoom,
    Inertia,
    Transition,
    Autorotate,
    Gyroscope,
}

/// Holds the single primary navigation driver.
///
/// Starting a driver cancels the active one first, so two drivers never write the
/// position during the same frame.
pub struct AnimationScheduler<C> {
    active: Option<(DriverKind, Box<dyn FrameDriver<C>>)>,
}

impl<C> AnimationScheduler<C> {
    pub fn new() -> Self {
        Self { active: None }
    }

    /// Install `driver`, returning the kind of the driver it replaced.
    pub fn start(&mut self, kind: DriverKind, driver: Box<dyn FrameDriver<C>>) -> Option<DriverKind> {
        let previous = self.stop();
        log::debug!("navigation driver {:?} started (replacing {:?})", kind, previous);
        self.active = Some((kind, driver));
        previous
    }

    /// Cancel the active driver, if any.
    pub fn stop(&mut self) -> Option<DriverKind> {
        let (kind, mut driver) = self.active.take()?;
        driver.cancel();
        Some(kind)
    }

    pub fn active_kind(&self) -> Option<DriverKind> {
        self.active.as_ref().map(|(kind, _)| *kind)
    }

    pub fn is_active(&self, kind: DriverKind) -> bool {
        self.active_kind() == Some(kind)
    }

    /// Advance the active driver; returns the kind of a driver that settled this frame.
    pub fn tick(&mut self, now: f64, ctx: &mut C) -> Option<DriverKind> {
        let (kind, driver) = self.active.as_mut()?;
        let kind = *kind;
        match driver.tick(now, ctx) {
            TickOutcome::Continue => None,
            TickOutcome::Settled => {
                self.active = None;
                Some(kind)
            }
        }
    }
}

impl<C> Default for AnimationScheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<(f64, f64)>,
    }

    fn recording_task(options: AnimationOptions) -> AnimationTask<Recorder> {
        AnimationTask::new(options, |rec: &mut Recorder, values, progress| {
            rec.frames.push((values.get("x").unwrap(), progress));
        })
    }

    #[test]
    fn final_frame_lands_exactly_on_target() {
        let mut rec = Recorder::default();
        let mut task = recording_task(
            AnimationOptions::new(100.0)
                .property("x", 0.3, 0.7)
                .easing(Easing::InOutSine),
        );

        assert_eq!(task.tick(1000.0, &mut rec), TickOutcome::Continue);
        assert_eq!(task.state(), TaskState::Running);
        assert_eq!(task.tick(1050.0, &mut rec), TickOutcome::Continue);
        assert_eq!(task.tick(1130.0, &mut rec), TickOutcome::Settled);
        assert_eq!(task.tick(1140.0, &mut rec), TickOutcome::Settled);

        assert_eq!(rec.frames.len(), 3);
        assert_eq!(rec.frames[0], (0.3, 0.0));
        assert!((rec.frames[1].0 - 0.5).abs() < 1e-12);
        assert_eq!(rec.frames[2], (0.7, 1.0));
        assert_eq!(rec.frames.iter().filter(|(_, p)| *p == 1.0).count(), 1);
        assert_eq!(task.state(), TaskState::Resolved);
    }

    #[test]
    fn cancelled_task_never_ticks_again() {
        let mut rec = Recorder::default();
        let mut task = recording_task(AnimationOptions::new(100.0).property("x", 0.0, 1.0));
        task.tick(0.0, &mut rec);
        let handle = task.handle();

        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert_eq!(task.tick(50.0, &mut rec), TickOutcome::Settled);
        assert_eq!(task.tick(500.0, &mut rec), TickOutcome::Settled);
        assert_eq!(rec.frames.len(), 1);
        assert_eq!(handle.state(), TaskState::Cancelled);
    }

    #[test]
    fn cancel_during_delay_prevents_first_tick() {
        let mut rec = Recorder::default();
        let mut task = recording_task(
            AnimationOptions::new(100.0)
                .property("x", 0.0, 1.0)
                .delay(200.0),
        );
        assert_eq!(task.tick(0.0, &mut rec), TickOutcome::Continue);
        assert_eq!(task.tick(150.0, &mut rec), TickOutcome::Continue);
        assert_eq!(task.state(), TaskState::Pending);

        task.cancel();
        assert_eq!(task.tick(250.0, &mut rec), TickOutcome::Settled);
        assert!(rec.frames.is_empty());
    }

    #[test]
    fn zero_duration_resolves_on_first_tick() {
        let mut rec = Recorder::default();
        let mut task = recording_task(AnimationOptions::new(0.0).property("x", 1.0, 2.0));
        assert_eq!(task.tick(10.0, &mut rec), TickOutcome::Settled);
        assert_eq!(rec.frames, vec![(2.0, 1.0)]);
    }

    #[test]
    fn settlement_fires_exactly_once() {
        let count = Rc::new(Cell::new(0));
        let handle = TaskHandle::new();
        let c = count.clone();
        handle.finally(move || c.set(c.get() + 1));

        assert!(handle.resolve());
        assert!(!handle.resolve());
        assert!(!handle.cancel());
        assert_eq!(count.get(), 1);
        assert_eq!(handle.state(), TaskState::Resolved);
    }

    #[test]
    fn then_runs_on_resolve_only() {
        let ran = Rc::new(Cell::new(false));
        let handle = TaskHandle::new();
        let r = ran.clone();
        let derived = handle.then(move || r.set(true));
        handle.resolve();
        assert!(ran.get());
        assert_eq!(derived.state(), TaskState::Resolved);

        let ran = Rc::new(Cell::new(false));
        let handle = TaskHandle::new();
        let r = ran.clone();
        let derived = handle.then(move || r.set(true));
        handle.cancel();
        assert!(!ran.get());
        assert_eq!(derived.state(), TaskState::Cancelled);
    }

    #[test]
    fn cancelling_a_derived_task_cancels_its_source() {
        let source = TaskHandle::new();
        let middle = source.then(|| {});
        let leaf = middle.finally(|| {});

        leaf.cancel();
        assert_eq!(source.state(), TaskState::Cancelled);
        assert_eq!(middle.state(), TaskState::Cancelled);
        assert_eq!(leaf.state(), TaskState::Cancelled);
    }

    #[test]
    fn resolving_a_source_does_not_settle_unrelated_handles() {
        let source = TaskHandle::new();
        let derived = source.then(|| {});
        let other = TaskHandle::new();
        source.resolve();
        assert_eq!(derived.state(), TaskState::Resolved);
        assert_eq!(other.state(), TaskState::Pending);
    }

    #[test]
    fn catch_recovers_from_cancellation() {
        let caught = Rc::new(Cell::new(false));
        let handle = TaskHandle::new();
        let c = caught.clone();
        let derived = handle.catch(move || c.set(true));
        handle.cancel();
        assert!(caught.get());
        assert_eq!(derived.state(), TaskState::Resolved);
    }

    #[test]
    fn cancelling_a_catch_handle_reports_the_recovery() {
        let caught = Rc::new(Cell::new(false));
        let source = TaskHandle::new();
        let c = caught.clone();
        let recovered = source.catch(move || c.set(true));

        assert!(!recovered.cancel());
        assert!(caught.get());
        assert_eq!(source.state(), TaskState::Cancelled);
        assert_eq!(recovered.state(), TaskState::Resolved);

        // a plain chain still reports the cancellation
        let source = TaskHandle::new();
        let chained = source.then(|| {});
        assert!(chained.cancel());
        assert!(chained.is_cancelled());
    }

    #[test]
    fn reactions_on_settled_handles_run_immediately() {
        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        let derived = TaskHandle::resolved().then(move || r.set(true));
        assert!(ran.get());
        assert!(derived.is_settled());
    }

    #[test]
    fn scheduler_cancels_previous_driver_before_installing() {
        let mut sched: AnimationScheduler<Recorder> = AnimationScheduler::new();
        let first = recording_task(AnimationOptions::new(100.0).property("x", 0.0, 1.0));
        let first_handle = first.handle();
        sched.start(DriverKind::Animation, Box::new(first));

        let second = recording_task(AnimationOptions::new(100.0).property("x", 5.0, 6.0));
        let second_handle = second.handle();
        let replaced = sched.start(DriverKind::Inertia, Box::new(second));

        assert_eq!(replaced, Some(DriverKind::Animation));
        assert!(first_handle.is_cancelled());
        assert_eq!(second_handle.state(), TaskState::Pending);

        let mut rec = Recorder::default();
        assert_eq!(sched.tick(0.0, &mut rec), None);
        assert_eq!(sched.tick(200.0, &mut rec), Some(DriverKind::Inertia));
        assert_eq!(rec.frames, vec![(5.0, 0.0), (6.0, 1.0)]);
        assert_eq!(sched.active_kind(), None);
    }
}
