//! # Debug Event Bridge
//!
//! Turns host lifecycle notifications into an ordered sequence of calls into
//! the anti-anti-debug module.
//!
//! ## Per-process state machine
//!
//! ```text
//! Untracked --ProcessCreated--> Initializing --create call--> Active
//! Active    --ModuleLoaded(*.dll)--> debugLoop(LOAD_DLL, pid, false, is_loader)
//! Active    --BoundBreakpoint-->     debugLoop(BREAKPOINT, pid)
//! Active    --anything else-->       debugLoop(HEARTBEAT, pid)
//! Active    --ProcessExited-->       Untracked (no call)
//! ```
//!
//! ## Guarantees
//!
//! - The module is loaded and bound at most once per bridge. A load or bind
//!   failure disables the bridge for good.
//! - `init` runs exactly once, before the first per-process call.
//! - The create call for a pid runs at most once and before any other call
//!   for that pid. Concurrent deliveries for the same pid are serialized.
//! - Calls for a pid follow host delivery order. Nothing is batched,
//!   reordered, or retried.
//! - With the feature disabled, events are observed and nothing is called.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use once_cell::sync::OnceCell;
use tracing::{debug, info, trace, warn};

use crate::codes::ProtocolEvent;
use crate::config::BridgeSettings;
use crate::error::{UmbraError, UmbraResult};
use crate::events::{DebugEvent, EventKind};
use crate::host::{LifecycleObserver, ProcessSnapshot};
use crate::native::binder::NativeModuleBinder;
use crate::native::exports::{AntiDebugModule, NativeAntiDebugModule, RESET_EXPORT};
use crate::types::{PointerWidth, ProcessId};

/// Produces the module on first use.
pub type ModuleFactory = Box<dyn Fn() -> UmbraResult<Arc<dyn AntiDebugModule>> + Send + Sync>;

/// Where a process is in its lifecycle, as far as the module is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState
{
    /// No create call issued
    Untracked,
    /// Create call in progress
    Initializing,
    /// Create call issued
    Active,
}

/// Per-process bookkeeping.
#[derive(Debug, Clone)]
pub struct ProcessContext
{
    pid: ProcessId,
    pointer_width: Option<PointerWidth>,
    state: ProcessState,
    loader_loaded: bool,
    calls: u64,
}

impl ProcessContext
{
    fn new(pid: ProcessId, pointer_width: Option<PointerWidth>) -> Self
    {
        Self {
            pid,
            pointer_width,
            state: ProcessState::Untracked,
            loader_loaded: false,
            calls: 0,
        }
    }

    /// Process id.
    #[must_use]
    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    /// Pointer width, if the host reported one.
    #[must_use]
    pub fn pointer_width(&self) -> Option<PointerWidth>
    {
        self.pointer_width
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> ProcessState
    {
        self.state
    }

    /// Whether the system loader module has been reported loaded.
    #[must_use]
    pub fn loader_loaded(&self) -> bool
    {
        self.loader_loaded
    }

    /// Native calls issued for this process.
    #[must_use]
    pub fn calls(&self) -> u64
    {
        self.calls
    }
}

type SharedContext = Arc<Mutex<ProcessContext>>;

/// Bridges host lifecycle notifications to an [`AntiDebugModule`].
pub struct DebugEventBridge
{
    settings: Arc<BridgeSettings>,
    host: Arc<dyn ProcessSnapshot>,
    factory: ModuleFactory,
    /// `None` once binding has failed.
    module: OnceCell<Option<Arc<dyn AntiDebugModule>>>,
    /// Whether global init succeeded.
    global_init: OnceCell<bool>,
    processes: Mutex<HashMap<ProcessId, SharedContext>>,
    /// Pids whose exit has been seen and that have not been created again.
    retired: Mutex<HashSet<ProcessId>>,
}

impl DebugEventBridge
{
    /// Bridge that obtains its module from `factory` on first use.
    #[must_use]
    pub fn new(settings: Arc<BridgeSettings>, host: Arc<dyn ProcessSnapshot>, factory: ModuleFactory) -> Self
    {
        Self {
            settings,
            host,
            factory,
            module: OnceCell::new(),
            global_init: OnceCell::new(),
            processes: Mutex::default(),
            retired: Mutex::default(),
        }
    }

    /// Bridge over the real native module, loaded through `binder`.
    #[must_use]
    pub fn native(settings: Arc<BridgeSettings>, host: Arc<dyn ProcessSnapshot>, binder: Arc<NativeModuleBinder>) -> Self
    {
        let stem = settings.module_stem.clone();
        let factory: ModuleFactory = Box::new(move || {
            let module = NativeAntiDebugModule::load(&binder, &stem)?;
            Ok(Arc::new(module) as Arc<dyn AntiDebugModule>)
        });
        Self::new(settings, host, factory)
    }

    /// Bridge over an already constructed module.
    #[must_use]
    pub fn with_module(settings: Arc<BridgeSettings>, host: Arc<dyn ProcessSnapshot>, module: Arc<dyn AntiDebugModule>) -> Self
    {
        Self::new(settings, host, Box::new(move || Ok(Arc::clone(&module))))
    }

    /// Settings the bridge reads.
    #[must_use]
    pub fn settings(&self) -> &Arc<BridgeSettings>
    {
        &self.settings
    }

    /// Bind the module now if that has not happened yet.
    ///
    /// Returns whether a module is available.
    pub fn bind(&self) -> bool
    {
        self.module().is_some()
    }

    /// Whether the module was bound successfully. Does not trigger binding.
    #[must_use]
    pub fn is_available(&self) -> bool
    {
        matches!(self.module.get(), Some(Some(_)))
    }

    /// Whether binding has been attempted and failed.
    #[must_use]
    pub fn is_disabled_by_failure(&self) -> bool
    {
        matches!(self.module.get(), Some(None))
    }

    /// State of `pid`.
    #[must_use]
    pub fn process_state(&self, pid: ProcessId) -> ProcessState
    {
        self.context(pid).map_or(ProcessState::Untracked, |ctx| snapshot(&ctx).state)
    }

    /// Snapshot of a process context.
    #[must_use]
    pub fn process_context(&self, pid: ProcessId) -> Option<ProcessContext>
    {
        self.context(pid).map(|ctx| snapshot(&ctx))
    }

    /// Pids with a live context, in ascending order.
    #[must_use]
    pub fn tracked_processes(&self) -> Vec<ProcessId>
    {
        let mut pids: Vec<_> = lock(&self.processes).keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Exited pids whose late events are still being dropped, in ascending
    /// order.
    #[must_use]
    pub fn retired_processes(&self) -> Vec<ProcessId>
    {
        let mut pids: Vec<_> = lock(&self.retired).iter().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Call the module's reset routine.
    ///
    /// Never invoked by the bridge itself.
    ///
    /// ## Errors
    ///
    /// `SymbolNotFound` when there is no module or no reset routine.
    pub fn reset_module(&self) -> UmbraResult<()>
    {
        let module = self.module().ok_or_else(|| UmbraError::SymbolNotFound {
            module: self.settings.library_file_name(),
            symbol: RESET_EXPORT.to_string(),
        })?;
        info!("resetting native module state");
        module.reset()
    }

    fn module(&self) -> Option<&Arc<dyn AntiDebugModule>>
    {
        self.module
            .get_or_init(|| match (self.factory)() {
                Ok(module) => {
                    info!(module = %self.settings.library_file_name(), "anti-anti-debug module bound");
                    Some(module)
                }
                Err(e) => {
                    warn!(error = %e, "anti-anti-debug module unavailable, disabled for this session");
                    None
                }
            })
            .as_ref()
    }

    fn context(&self, pid: ProcessId) -> Option<SharedContext>
    {
        lock(&self.processes).get(&pid).cloned()
    }

    fn ensure_global_init(&self, module: &Arc<dyn AntiDebugModule>) -> bool
    {
        *self.global_init.get_or_init(|| {
            let dir = match self.working_dir() {
                Ok(dir) => dir,
                Err(e) => {
                    warn!(error = %e, "cannot determine working directory, module not initialized");
                    return false;
                }
            };
            match module.init(&dir) {
                Ok(()) => {
                    info!(dir = %dir.display(), "native module initialized");
                    true
                }
                Err(e) => {
                    warn!(error = %e, "native module init failed");
                    false
                }
            }
        })
    }

    fn working_dir(&self) -> UmbraResult<PathBuf>
    {
        match &self.settings.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    fn dispatch(&self, pid: ProcessId, width_hint: Option<PointerWidth>, event: &DebugEvent)
    {
        let Some(module) = self.module() else {
            return;
        };

        match event.kind {
            EventKind::ProcessCreated => self.on_process_created(module, pid, event.pointer_width.or(width_hint)),
            EventKind::ProcessExited => self.on_process_exited(pid),
            kind => {
                let Some(context) = self.context_for_event(pid, kind, width_hint) else {
                    return;
                };
                let mut ctx = lock(&context);
                if ctx.pointer_width.is_none() {
                    ctx.pointer_width = event.pointer_width.or(width_hint);
                }
                match kind {
                    EventKind::ModuleLoaded => self.on_module_loaded(module, &mut ctx, event),
                    EventKind::BoundBreakpoint => self.call(module, &mut ctx, ProtocolEvent::Breakpoint, false, false),
                    _ => self.call(module, &mut ctx, ProtocolEvent::Other, false, false),
                }
            }
        }
    }

    fn on_process_created(&self, module: &Arc<dyn AntiDebugModule>, pid: ProcessId, width: Option<PointerWidth>)
    {
        let context = {
            let mut processes = lock(&self.processes);
            lock(&self.retired).remove(&pid);
            Arc::clone(
                processes
                    .entry(pid)
                    .or_insert_with(|| Arc::new(Mutex::new(ProcessContext::new(pid, width)))),
            )
        };

        let mut ctx = lock(&context);
        if width.is_some() {
            ctx.pointer_width = width;
        }
        if ctx.state != ProcessState::Untracked {
            debug!(%pid, "duplicate process-created notification ignored");
            return;
        }

        ctx.state = ProcessState::Initializing;
        info!(
            %pid,
            width = ctx.pointer_width.map_or("unknown", PointerWidth::module_suffix),
            "process created"
        );
        self.call(module, &mut ctx, ProtocolEvent::ProcessCreate, true, false);
        ctx.state = ProcessState::Active;
    }

    // No native call on exit: the module has no per-process teardown entry.
    fn on_process_exited(&self, pid: ProcessId)
    {
        let listed: HashSet<ProcessId> = self.host.processes().into_iter().map(|p| p.pid).collect();

        let mut processes = lock(&self.processes);
        let removed = processes.remove(&pid);
        {
            // The host raises no more events for pids it has stopped listing
            let mut retired = lock(&self.retired);
            retired.retain(|retired_pid| listed.contains(retired_pid));
            retired.insert(pid);
        }
        drop(processes);

        match removed {
            Some(context) => info!(%pid, calls = snapshot(&context).calls, "process exited"),
            None => debug!(%pid, "exit for untracked process"),
        }
    }

    fn context_for_event(&self, pid: ProcessId, kind: EventKind, width: Option<PointerWidth>) -> Option<SharedContext>
    {
        let mut processes = lock(&self.processes);
        if let Some(context) = processes.get(&pid) {
            return Some(Arc::clone(context));
        }
        if lock(&self.retired).contains(&pid) {
            trace!(%pid, ?kind, "event for exited process dropped");
            return None;
        }

        // Delivered anyway, but without a synthetic create call.
        let unexpected = UmbraError::UnexpectedEventOrdering { pid, kind };
        warn!(error = %unexpected, "out-of-order host event");
        let context = Arc::new(Mutex::new(ProcessContext::new(pid, width)));
        processes.insert(pid, Arc::clone(&context));
        Some(context)
    }

    fn on_module_loaded(&self, module: &Arc<dyn AntiDebugModule>, ctx: &mut ProcessContext, event: &DebugEvent)
    {
        let Some(file_name) = event.module_file_name() else {
            trace!(pid = %ctx.pid, "module load without a path ignored");
            return;
        };
        if !self.settings.is_library(file_name) {
            trace!(pid = %ctx.pid, module = file_name, "not a library, ignored");
            return;
        }

        let is_loader = self.settings.is_loader_module(file_name);
        if is_loader {
            ctx.loader_loaded = true;
        }
        self.call(module, ctx, ProtocolEvent::DllLoad, false, is_loader);
    }

    fn call(
        &self,
        module: &Arc<dyn AntiDebugModule>,
        ctx: &mut ProcessContext,
        event: ProtocolEvent,
        flag_a: bool,
        flag_b: bool,
    )
    {
        if !self.ensure_global_init(module) {
            return;
        }

        debug!(pid = %ctx.pid, code = event.code(), flag_a, flag_b, "{}", event.name());
        match module.debug_loop(event, ctx.pid, flag_a, flag_b) {
            Ok(()) => ctx.calls += 1,
            Err(e) => warn!(pid = %ctx.pid, error = %e, "native call skipped"),
        }
    }
}

impl LifecycleObserver for DebugEventBridge
{
    fn on_start(&self)
    {
        info!(
            host_width = %PointerWidth::host(),
            enabled = self.settings.is_enabled(),
            "debugger engine started"
        );
        self.bind();
    }

    fn on_event(&self, event: &DebugEvent)
    {
        if event.kind == EventKind::ModuleLoaded {
            if let Some(file_name) = event.module_file_name() {
                debug!(pid = ?event.process, module = file_name, "module loaded");
            }
        }

        if !self.settings.is_enabled() {
            trace!(kind = ?event.kind, "bridge disabled, event observed only");
            return;
        }

        match event.process {
            Some(pid) => self.dispatch(pid, None, event),
            None => {
                for process in self.host.processes() {
                    self.dispatch(process.pid, process.pointer_width, event);
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T>
{
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn snapshot(context: &SharedContext) -> ProcessContext
{
    lock(context).clone()
}
