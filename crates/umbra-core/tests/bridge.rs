//! Tests for the debug event bridge, driven through the in-memory host

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use umbra_core::bridge::{DebugEventBridge, ModuleFactory, ProcessState};
use umbra_core::codes::ProtocolEvent;
use umbra_core::config::BridgeSettings;
use umbra_core::error::UmbraError;
use umbra_core::events::{DebugEvent, EventKind, EventPayload};
use umbra_core::host::{LifecycleEventSource, LifecycleObserver, SyntheticHost};
use umbra_core::native::{AntiDebugModule, NativeCall, NativeModuleBinder, RecordingModule};
use umbra_core::types::{PointerWidth, ProcessId, TrackedProcess};

const WORK_DIR: &str = "/tmp/umbra-work";

struct Harness
{
    host: SyntheticHost,
    module: Arc<RecordingModule>,
    bridge: Arc<DebugEventBridge>,
}

impl Harness
{
    fn new() -> Self
    {
        let mut settings = BridgeSettings::default();
        settings.working_dir = Some(PathBuf::from(WORK_DIR));
        Self::with_settings(settings)
    }

    fn with_settings(settings: BridgeSettings) -> Self
    {
        let host = SyntheticHost::new();
        let module = Arc::new(RecordingModule::new());
        let recorder: Arc<dyn AntiDebugModule> = module.clone();
        let bridge = Arc::new(DebugEventBridge::with_module(Arc::new(settings), host.snapshot(), recorder));
        host.subscribe(bridge.clone());
        Self { host, module, bridge }
    }

    fn emit(&self, event: DebugEvent)
    {
        self.host.emit(&event);
    }

    fn debug_loop_calls(&self) -> Vec<NativeCall>
    {
        self.module
            .calls()
            .into_iter()
            .filter(|call| matches!(call, NativeCall::DebugLoop { .. }))
            .collect()
    }

    fn count(&self, wanted: ProtocolEvent) -> usize
    {
        self.module
            .calls()
            .iter()
            .filter(|call| matches!(call, NativeCall::DebugLoop { event, .. } if *event == wanted))
            .count()
    }
}

/// Counts every notification it sees.
#[derive(Default)]
struct CountingObserver
{
    starts: AtomicUsize,
    events: AtomicUsize,
}

impl LifecycleObserver for CountingObserver
{
    fn on_start(&self)
    {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_event(&self, _event: &DebugEvent)
    {
        self.events.fetch_add(1, Ordering::SeqCst);
    }
}

fn mixed_events(count: u32) -> Vec<DebugEvent>
{
    (0..count)
        .map(|i| {
            let pid = ProcessId(100 + i % 4);
            match i % 8 {
                0 => DebugEvent::process_created(pid, Some(PointerWidth::Bits64)),
                1 => DebugEvent::module_loaded(pid, r"C:\Windows\System32\ntdll.dll"),
                2 => DebugEvent::module_loaded(pid, r"C:\app\plugin.dll"),
                3 => DebugEvent::bound_breakpoint(pid),
                4 => DebugEvent::new(EventKind::ThreadCreated, pid),
                5 => DebugEvent::host_message(),
                6 => DebugEvent::module_unloaded(pid, r"C:\app\plugin.dll"),
                _ => DebugEvent::process_exited(pid),
            }
        })
        .collect()
}

#[test]
fn test_concrete_scenario()
{
    let harness = Harness::with_settings(BridgeSettings::default());
    let cwd = std::env::current_dir().unwrap();

    harness.host.start();
    harness.emit(DebugEvent::process_created(ProcessId(10), None));
    harness.emit(DebugEvent::module_loaded(ProcessId(10), "C:\\Windows\\System32\\ntdll.dll"));
    harness.emit(DebugEvent::bound_breakpoint(ProcessId(10)));

    assert_eq!(
        harness.module.calls(),
        vec![
            NativeCall::Init(cwd),
            NativeCall::debug_loop(ProtocolEvent::ProcessCreate, 10, true, false),
            NativeCall::debug_loop(ProtocolEvent::DllLoad, 10, false, true),
            NativeCall::debug_loop(ProtocolEvent::Breakpoint, 10, false, false),
        ]
    );
    assert_eq!(harness.bridge.process_state(ProcessId(10)), ProcessState::Active);

    let ctx = harness.bridge.process_context(ProcessId(10)).unwrap();
    assert!(ctx.loader_loaded());
    assert_eq!(ctx.calls(), 3);
}

#[test]
fn test_load_failure_isolation()
{
    let host = SyntheticHost::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let factory: ModuleFactory = {
        let attempts = Arc::clone(&attempts);
        Box::new(move || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(UmbraError::SymbolNotFound {
                module: "ScyllaHideDnSpyPluginx64.dll".to_string(),
                symbol: "ScyllaHideInit".to_string(),
            })
        })
    };
    let bridge = Arc::new(DebugEventBridge::new(
        Arc::new(BridgeSettings::default()),
        host.snapshot(),
        factory,
    ));
    let before = Arc::new(CountingObserver::default());
    let after = Arc::new(CountingObserver::default());

    host.subscribe(before.clone());
    host.subscribe(bridge.clone());
    host.subscribe(after.clone());

    host.start();
    let events = mixed_events(40);
    for event in &events {
        host.emit(event);
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(bridge.is_disabled_by_failure());
    assert!(!bridge.is_available());
    assert!(bridge.tracked_processes().is_empty());
    assert!(bridge.reset_module().is_err());
    for observer in [&before, &after] {
        assert_eq!(observer.starts.load(Ordering::SeqCst), 1);
        assert_eq!(observer.events.load(Ordering::SeqCst), events.len());
    }
}

#[test]
fn test_missing_native_module_disables_bridge()
{
    let dir = std::env::temp_dir().join("umbra-missing-module-dir");
    let mut settings = BridgeSettings::default();
    settings.module_dir = Some(dir.clone());
    let host = SyntheticHost::new();
    let bridge = Arc::new(DebugEventBridge::native(
        Arc::new(settings),
        host.snapshot(),
        Arc::new(NativeModuleBinder::with_search_dir(dir)),
    ));
    host.subscribe(bridge.clone());

    host.start();
    host.emit(&DebugEvent::process_created(ProcessId(1), None));
    host.emit(&DebugEvent::bound_breakpoint(ProcessId(1)));

    assert!(bridge.is_disabled_by_failure());
    assert_eq!(bridge.process_state(ProcessId(1)), ProcessState::Untracked);
}

#[test]
fn test_init_runs_once_before_first_create()
{
    let harness = Harness::new();

    for pid in [1, 2, 3] {
        harness.emit(DebugEvent::process_created(ProcessId(pid), None));
        harness.emit(DebugEvent::bound_breakpoint(ProcessId(pid)));
    }

    let calls = harness.module.calls();
    let inits: Vec<_> = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(call, NativeCall::Init(_)))
        .collect();
    assert_eq!(inits.len(), 1);
    assert_eq!(inits[0].0, 0);
    assert_eq!(calls[0], NativeCall::Init(PathBuf::from(WORK_DIR)));
    assert_eq!(calls[1], NativeCall::debug_loop(ProtocolEvent::ProcessCreate, 1, true, false));
}

#[test]
fn test_init_precedes_out_of_order_events()
{
    let harness = Harness::new();

    harness.emit(DebugEvent::bound_breakpoint(ProcessId(5)));

    assert_eq!(
        harness.module.calls(),
        vec![
            NativeCall::Init(PathBuf::from(WORK_DIR)),
            NativeCall::debug_loop(ProtocolEvent::Breakpoint, 5, false, false),
        ]
    );
}

#[test]
fn test_duplicate_create_is_ignored()
{
    let harness = Harness::new();

    harness.emit(DebugEvent::process_created(ProcessId(10), None));
    harness.emit(DebugEvent::process_created(ProcessId(10), Some(PointerWidth::Bits32)));
    harness.emit(DebugEvent::process_created(ProcessId(10), None));

    assert_eq!(harness.count(ProtocolEvent::ProcessCreate), 1);
    // The later notification still fills in the width
    let ctx = harness.bridge.process_context(ProcessId(10)).unwrap();
    assert_eq!(ctx.pointer_width(), Some(PointerWidth::Bits32));
}

#[test]
fn test_concurrent_create_calls_module_once()
{
    let harness = Harness::new();
    let pid = ProcessId(77);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..16 {
                    harness.bridge.on_event(&DebugEvent::process_created(pid, None));
                }
            });
        }
    });

    assert_eq!(harness.count(ProtocolEvent::ProcessCreate), 1);
    assert_eq!(harness.bridge.process_state(pid), ProcessState::Active);
}

#[test]
fn test_concurrent_processes_share_one_init()
{
    let harness = Harness::new();

    thread::scope(|scope| {
        for pid in 0..8 {
            let harness = &harness;
            scope.spawn(move || {
                harness.bridge.on_event(&DebugEvent::process_created(ProcessId(pid), None));
                harness.bridge.on_event(&DebugEvent::bound_breakpoint(ProcessId(pid)));
            });
        }
    });

    let calls = harness.module.calls();
    assert!(matches!(calls[0], NativeCall::Init(_)));
    assert_eq!(calls.iter().filter(|c| matches!(c, NativeCall::Init(_))).count(), 1);
    assert_eq!(harness.count(ProtocolEvent::ProcessCreate), 8);
    assert_eq!(harness.count(ProtocolEvent::Breakpoint), 8);

    // Per process, create comes before the breakpoint
    for pid in 0..8 {
        let own: Vec<_> = calls
            .iter()
            .filter_map(|call| match call {
                NativeCall::DebugLoop { event, pid: p, .. } if p.0 == pid => Some(*event),
                _ => None,
            })
            .collect();
        assert_eq!(own, vec![ProtocolEvent::ProcessCreate, ProtocolEvent::Breakpoint]);
    }
}

#[test]
fn test_loader_flag()
{
    let harness = Harness::new();
    let pid = ProcessId(3);
    harness.emit(DebugEvent::process_created(pid, None));

    harness.emit(DebugEvent::module_loaded(pid, r"C:\Windows\SysWOW64\NTDLL.DLL"));
    harness.emit(DebugEvent::module_loaded(pid, r"C:\Windows\System32\kernel32.dll"));
    harness.emit(DebugEvent::module_loaded(pid, r"C:\app\Target.exe"));
    harness.emit(DebugEvent::module_loaded(pid, r"C:\app\resources.dll.mui"));
    harness.emit(DebugEvent::module_loaded(pid, "/usr/lib/ntdll.dll"));

    assert_eq!(
        harness.debug_loop_calls()[1..],
        [
            NativeCall::debug_loop(ProtocolEvent::DllLoad, 3, false, true),
            NativeCall::debug_loop(ProtocolEvent::DllLoad, 3, false, false),
            NativeCall::debug_loop(ProtocolEvent::DllLoad, 3, false, true),
        ]
    );
}

#[test]
fn test_custom_loader_module()
{
    let mut settings = BridgeSettings::default();
    settings.working_dir = Some(PathBuf::from(WORK_DIR));
    settings.loader_module = "loader.dll".to_string();
    let harness = Harness::with_settings(settings);
    let pid = ProcessId(3);

    harness.emit(DebugEvent::process_created(pid, None));
    harness.emit(DebugEvent::module_loaded(pid, r"C:\Windows\System32\ntdll.dll"));
    harness.emit(DebugEvent::module_loaded(pid, r"C:\boot\Loader.dll"));

    assert_eq!(
        harness.debug_loop_calls()[1..],
        [
            NativeCall::debug_loop(ProtocolEvent::DllLoad, 3, false, false),
            NativeCall::debug_loop(ProtocolEvent::DllLoad, 3, false, true),
        ]
    );
}

#[test]
fn test_event_codes_follow_kind()
{
    let harness = Harness::new();
    let pid = ProcessId(8);

    harness.emit(DebugEvent::process_created(pid, None));
    harness.emit(DebugEvent::new(EventKind::ThreadCreated, pid));
    harness.emit(DebugEvent::new(EventKind::ThreadExited, pid));
    harness.emit(DebugEvent::module_unloaded(pid, r"C:\app\plugin.dll"));
    harness.emit(DebugEvent::bound_breakpoint(pid).with_payload(EventPayload::Breakpoint { address: 0x401000 }));
    harness.emit(DebugEvent::new(EventKind::Message, pid).with_payload(EventPayload::Text("hi".to_string())));

    let events: Vec<_> = harness
        .debug_loop_calls()
        .into_iter()
        .map(|call| match call {
            NativeCall::DebugLoop { event, .. } => event.code(),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(events, vec![3, 0, 0, 0, 1, 0]);
}

#[test]
fn test_exit_issues_no_call_and_retires_pid()
{
    let harness = Harness::new();
    let pid = ProcessId(12);

    harness.emit(DebugEvent::process_created(pid, None));
    let before = harness.module.call_count();
    harness.emit(DebugEvent::process_exited(pid));
    assert_eq!(harness.module.call_count(), before);
    assert_eq!(harness.bridge.process_state(pid), ProcessState::Untracked);

    // Late events for an exited process are dropped
    harness.emit(DebugEvent::bound_breakpoint(pid));
    harness.emit(DebugEvent::module_loaded(pid, r"C:\a.dll"));
    assert_eq!(harness.module.call_count(), before);
    assert!(harness.bridge.tracked_processes().is_empty());

    // A reused pid starts over
    harness.emit(DebugEvent::process_created(pid, None));
    assert_eq!(harness.count(ProtocolEvent::ProcessCreate), 2);
    assert_eq!(harness.bridge.process_state(pid), ProcessState::Active);
}

#[test]
fn test_unexpected_ordering_gets_no_synthetic_create()
{
    let harness = Harness::new();
    let pid = ProcessId(44);

    harness.emit(DebugEvent::module_loaded(pid, r"C:\Windows\System32\ntdll.dll"));
    harness.emit(DebugEvent::bound_breakpoint(pid));

    assert_eq!(harness.count(ProtocolEvent::ProcessCreate), 0);
    assert_eq!(
        harness.debug_loop_calls(),
        vec![
            NativeCall::debug_loop(ProtocolEvent::DllLoad, 44, false, true),
            NativeCall::debug_loop(ProtocolEvent::Breakpoint, 44, false, false),
        ]
    );
    assert_eq!(harness.bridge.process_state(pid), ProcessState::Untracked);

    // A create arriving late is still issued
    harness.emit(DebugEvent::process_created(pid, None));
    assert_eq!(harness.count(ProtocolEvent::ProcessCreate), 1);
}

#[test]
fn test_disabled_feature_is_no_op()
{
    let mut settings = BridgeSettings::default().with_enabled(false);
    settings.working_dir = Some(PathBuf::from(WORK_DIR));
    let harness = Harness::with_settings(settings);

    harness.host.start();
    for event in mixed_events(100) {
        harness.emit(event);
    }

    assert_eq!(harness.module.call_count(), 0);
    assert!(harness.bridge.tracked_processes().is_empty());
}

#[test]
fn test_runtime_toggle()
{
    let harness = Harness::new();
    let pid = ProcessId(9);
    harness.bridge.settings().set_enabled(false);

    harness.emit(DebugEvent::process_created(pid, None));
    assert_eq!(harness.module.call_count(), 0);

    harness.bridge.settings().set_enabled(true);
    harness.emit(DebugEvent::process_created(pid, None));
    harness.emit(DebugEvent::bound_breakpoint(pid));
    assert_eq!(harness.count(ProtocolEvent::ProcessCreate), 1);
    assert_eq!(harness.count(ProtocolEvent::Breakpoint), 1);

    harness.bridge.settings().set_enabled(false);
    harness.emit(DebugEvent::bound_breakpoint(pid));
    assert_eq!(harness.count(ProtocolEvent::Breakpoint), 1);
}

#[test]
fn test_fan_out_reaches_every_tracked_process()
{
    let harness = Harness::new();
    for pid in [21, 22, 23] {
        harness.emit(DebugEvent::process_created(ProcessId(pid), Some(PointerWidth::Bits32)));
    }
    let before = harness.debug_loop_calls().len();

    harness.emit(DebugEvent::host_message());

    let fanned: Vec<_> = harness.debug_loop_calls().split_off(before);
    assert_eq!(
        fanned,
        vec![
            NativeCall::debug_loop(ProtocolEvent::Other, 21, false, false),
            NativeCall::debug_loop(ProtocolEvent::Other, 22, false, false),
            NativeCall::debug_loop(ProtocolEvent::Other, 23, false, false),
        ]
    );
}

#[test]
fn test_fan_out_skips_exited_process()
{
    let harness = Harness::new();
    for pid in [31, 32, 33] {
        harness.emit(DebugEvent::process_created(ProcessId(pid), None));
    }
    harness.emit(DebugEvent::process_exited(ProcessId(32)));
    assert_eq!(harness.host.snapshot().len(), 2);
    let before = harness.debug_loop_calls().len();

    harness.emit(DebugEvent::host_message());

    let pids: Vec<_> = harness
        .debug_loop_calls()
        .split_off(before)
        .into_iter()
        .map(|call| match call {
            NativeCall::DebugLoop { pid, .. } => pid.0,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(pids, vec![31, 33]);
}

#[test]
fn test_fan_out_records_host_width()
{
    let harness = Harness::new();
    harness
        .host
        .track(TrackedProcess::new(ProcessId(50), Some(PointerWidth::Bits32)));

    harness.emit(DebugEvent::host_message());

    // Known to the host but never created: delivered without a create call
    assert_eq!(
        harness.debug_loop_calls(),
        vec![NativeCall::debug_loop(ProtocolEvent::Other, 50, false, false)]
    );
    let ctx = harness.bridge.process_context(ProcessId(50)).unwrap();
    assert_eq!(ctx.pointer_width(), Some(PointerWidth::Bits32));
}

#[test]
fn test_fan_out_fills_missing_width()
{
    let harness = Harness::new();
    let pid = ProcessId(60);
    harness.emit(DebugEvent::process_created(pid, None));
    assert_eq!(harness.bridge.process_context(pid).unwrap().pointer_width(), None);

    // The host learns the width later
    harness.host.track(TrackedProcess::new(pid, Some(PointerWidth::Bits64)));
    harness.emit(DebugEvent::host_message());
    assert_eq!(
        harness.bridge.process_context(pid).unwrap().pointer_width(),
        Some(PointerWidth::Bits64)
    );

    // A known width is not overwritten
    harness.host.track(TrackedProcess::new(pid, Some(PointerWidth::Bits32)));
    harness.emit(DebugEvent::host_message());
    assert_eq!(
        harness.bridge.process_context(pid).unwrap().pointer_width(),
        Some(PointerWidth::Bits64)
    );
}

#[test]
fn test_retired_pids_are_pruned()
{
    let harness = Harness::new();

    harness.emit(DebugEvent::process_created(ProcessId(1), None));
    harness.emit(DebugEvent::process_exited(ProcessId(1)));
    assert_eq!(harness.bridge.retired_processes(), vec![ProcessId(1)]);

    harness.emit(DebugEvent::process_created(ProcessId(2), None));
    harness.emit(DebugEvent::process_created(ProcessId(3), None));
    harness.emit(DebugEvent::process_exited(ProcessId(2)));
    // pid 1 is no longer listed by the host
    assert_eq!(harness.bridge.retired_processes(), vec![ProcessId(2)]);

    harness.emit(DebugEvent::process_exited(ProcessId(3)));
    assert_eq!(harness.bridge.retired_processes(), vec![ProcessId(3)]);
    assert!(harness.host.snapshot().is_empty());
}

#[test]
fn test_start_hook_binds_eagerly()
{
    let harness = Harness::new();
    assert!(!harness.bridge.is_available());

    harness.host.start();

    assert!(harness.bridge.is_available());
    assert_eq!(harness.module.call_count(), 0);
}

#[test]
fn test_reset_module_is_explicit()
{
    let harness = Harness::new();
    harness.emit(DebugEvent::process_created(ProcessId(1), None));
    assert!(!harness.module.calls().contains(&NativeCall::Reset));

    harness.bridge.reset_module().unwrap();
    assert_eq!(harness.module.calls().last(), Some(&NativeCall::Reset));
}
