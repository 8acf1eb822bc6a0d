//! End-to-end dispatch scenarios driven by a manual clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use taskfsm::{
    ApiHooks, ConfigurationError, DigitalOutput, ManualClock, MemoryRecorder, Record, SendError,
    Session, SessionConfig, SessionError, StepOutcome, TaskBuilder, TaskDefinition, Value,
    VariableSnapshot,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[derive(Clone, Default)]
struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

fn session(task: TaskDefinition, clock: &ManualClock) -> Session {
    init_tracing();
    Session::with_clock(task, SessionConfig::default(), Arc::new(clock.clone())).unwrap()
}

fn delivered(recorder: &MemoryRecorder, event: &str) -> Vec<(Duration, bool)> {
    recorder
        .records()
        .into_iter()
        .filter_map(|record| match record {
            Record::Event {
                time,
                name,
                delivered,
                ..
            } if name == event => Some((time, delivered)),
            _ => None,
        })
        .collect()
}

fn ping_pong(trace: &Trace) -> TaskDefinition {
    let a = trace.clone();
    let b = trace.clone();
    TaskBuilder::new("ping_pong")
        .states(["A", "B"])
        .events(["go", "back"])
        .initial_state("A")
        .handler("A", move |ctx, event| {
            a.push(format!("A:{}", event.name()));
            if event.is("go") {
                ctx.goto_state("B");
            }
        })
        .handler("B", move |ctx, event| {
            b.push(format!("B:{}", event.name()));
            if event.is("back") {
                ctx.goto_state("A");
            }
        })
        .build()
        .unwrap()
}

#[test]
fn events_drive_transitions_in_order() {
    let trace = Trace::default();
    let clock = ManualClock::new();
    let mut session = session(ping_pong(&trace), &clock);
    let sender = session.sender();

    session.start().unwrap();
    for name in ["go", "back", "go"] {
        clock.advance_ms(10);
        sender.send(name).unwrap();
    }
    assert_eq!(session.run_until_idle().unwrap(), 3);

    assert_eq!(
        trace.take(),
        vec![
            "A:entry", "A:go", "A:exit", "B:entry", "B:back", "B:exit", "A:entry", "A:go",
            "A:exit", "B:entry",
        ]
    );
    assert_eq!(session.history().get_path(), vec!["A", "B", "A", "B"]);
    assert!(session.history().transitions()[0].from.is_none());
    assert_eq!(session.current_state(), "B");
}

#[test]
fn step_before_start_is_rejected() {
    let clock = ManualClock::new();
    let mut session = session(ping_pong(&Trace::default()), &clock);

    assert!(matches!(session.step(), Err(SessionError::NotStarted)));
    session.start().unwrap();
    assert!(matches!(session.start(), Err(SessionError::AlreadyStarted)));
}

#[test]
fn disarmed_timer_never_fires() {
    let clock = ManualClock::new();
    let task = TaskBuilder::new("disarm")
        .states(["wait"])
        .events(["X", "cancel"])
        .variable("left", 0)
        .initial_state("wait")
        .handler("wait", |ctx, event| {
            if event.is_entry() {
                ctx.set_timer("X", Duration::from_millis(1000));
            } else if event.is("cancel") {
                ctx.disarm_timer("X");
                let left = i64::try_from(ctx.timer_remaining("X")).unwrap();
                ctx.set_var("left", left);
                // absent timers are fine
                ctx.disarm_timer("X");
            }
        })
        .build()
        .unwrap();
    let recorder = MemoryRecorder::new();
    let mut session = session(task, &clock);
    session.add_recorder(recorder.clone());
    let sender = session.sender();

    session.start().unwrap();
    clock.advance_ms(500);
    assert_eq!(session.timer_remaining("X"), 500);
    sender.send("cancel").unwrap();
    session.run_until_idle().unwrap();

    clock.advance_ms(1000);
    assert_eq!(session.run_until_idle().unwrap(), 0);
    assert_eq!(session.variables().get("left"), Some(&Value::Int(0)));
    assert_eq!(session.timer_remaining("X"), 0);
    assert!(delivered(&recorder, "X").is_empty());
}

#[test]
fn rearming_replaces_pending_timer() {
    let clock = ManualClock::new();
    let trace = Trace::default();
    let log = trace.clone();
    let task = TaskBuilder::new("rearm")
        .states(["wait"])
        .events(["X", "poke"])
        .initial_state("wait")
        .handler("wait", move |ctx, event| {
            if event.is_entry() || event.is("poke") {
                ctx.set_timer("X", Duration::from_millis(100));
            } else if event.is("X") {
                log.push(format!("X@{}", event.time().as_millis()));
            }
        })
        .build()
        .unwrap();
    let mut session = session(task, &clock);
    let sender = session.sender();

    session.start().unwrap();
    clock.advance_ms(60);
    sender.send("poke").unwrap();
    session.run_until_idle().unwrap();
    clock.advance_ms(60);
    session.run_until_idle().unwrap();
    assert!(trace.take().is_empty());

    clock.advance_ms(100);
    session.run_until_idle().unwrap();
    // expired timers carry their due time, not the time they were noticed
    assert_eq!(trace.take(), vec!["X@160"]);
}

#[test]
fn stop_completes_requested_transition_first() {
    let trace = Trace::default();
    let (a, b) = (trace.clone(), trace.clone());
    let run_end_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&run_end_calls);
    let task = TaskBuilder::new("stopper")
        .states(["A", "B"])
        .events(["go"])
        .initial_state("A")
        .handler("A", move |ctx, event| {
            a.push(format!("A:{}", event.name()));
            if event.is("go") {
                ctx.goto_state("B");
                ctx.stop_framework();
            }
        })
        .handler("B", move |_ctx, event| b.push(format!("B:{}", event.name())))
        .run_end(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let recorder = MemoryRecorder::new();
    let mut session = session(task, &clock);
    session.add_recorder(recorder.clone());
    let sender = session.sender();

    session.start().unwrap();
    sender.send("go").unwrap();
    clock.advance_ms(1);
    sender.send("go").unwrap();

    assert_eq!(session.step().unwrap(), StepOutcome::Stopped);
    assert_eq!(trace.take(), vec!["A:entry", "A:go", "A:exit", "B:entry"]);
    assert!(session.is_stopped());
    assert_eq!(run_end_calls.load(Ordering::SeqCst), 1);

    // the second event was never handed to a handler
    assert_eq!(
        delivered(&recorder, "go"),
        vec![(Duration::ZERO, true), (Duration::from_millis(1), false)]
    );

    let summary = session.stop();
    assert_eq!(run_end_calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.final_state, "B");
    assert_eq!(summary.events_delivered, 1);
    assert!(summary.error.is_none());
}

#[test]
fn self_transition_runs_exit_and_entry() {
    let trace = Trace::default();
    let log = trace.clone();
    let task = TaskBuilder::new("self")
        .states(["A"])
        .events(["again"])
        .initial_state("A")
        .handler("A", move |ctx, event| {
            log.push(event.name().to_string());
            if event.is("again") {
                ctx.goto_state("A");
            }
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);

    session.start().unwrap();
    session.sender().send("again").unwrap();
    session.run_until_idle().unwrap();

    assert_eq!(trace.take(), vec!["entry", "again", "exit", "entry"]);
    let last = session.history().transitions().last().unwrap();
    assert!(last.is_self_transition());
}

#[test]
fn global_handler_runs_first_and_state_handler_wins() {
    let trace = Trace::default();
    let (g, a) = (trace.clone(), trace.clone());
    let task = TaskBuilder::new("global")
        .states(["A", "B", "C"])
        .events(["go", "abort"])
        .initial_state("A")
        .all_states(move |ctx, event| {
            g.push(format!("global:{}", event.name()));
            ctx.goto_state("C");
        })
        .handler("A", move |ctx, event| {
            a.push(format!("A:{}", event.name()));
            if event.is("go") {
                ctx.goto_state("B");
            }
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);
    let sender = session.sender();

    session.start().unwrap();
    sender.send("go").unwrap();
    session.run_until_idle().unwrap();
    assert_eq!(session.current_state(), "B");
    assert_eq!(trace.take(), vec!["A:entry", "global:go", "A:go", "A:exit"]);

    // B has no handler, so only the global request stands
    sender.send("abort").unwrap();
    session.run_until_idle().unwrap();
    assert_eq!(session.current_state(), "C");
    assert_eq!(trace.take(), vec!["global:abort"]);
}

#[test]
fn undeclared_state_stops_session_cleanly() {
    let led = Arc::new(DigitalOutput::new("led"));
    let handler_led = Arc::clone(&led);
    let run_end_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&run_end_calls);
    let task = TaskBuilder::new("broken")
        .states(["A"])
        .events(["go"])
        .initial_state("A")
        .output(led.clone())
        .handler("A", move |ctx, event| {
            if event.is_entry() {
                handler_led.on();
                ctx.set_timer("go", Duration::from_secs(5));
            } else if event.is("go") {
                ctx.goto_state("Z");
            }
        })
        .run_end(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let recorder = MemoryRecorder::new();
    let mut session = session(task, &clock);
    session.add_recorder(recorder.clone());

    session.start().unwrap();
    assert!(led.is_on());
    session.sender().send("go").unwrap();

    let err = session.step().unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        SessionError::Configuration(ConfigurationError::UndeclaredState(ref name)) if name == "Z"
    ));
    assert!(session.is_stopped());
    assert!(!led.is_on());
    assert_eq!(session.timer_remaining("go"), 0);
    assert_eq!(run_end_calls.load(Ordering::SeqCst), 1);
    assert!(recorder
        .records()
        .iter()
        .any(|r| matches!(r, Record::Error { message, .. } if message.contains("'Z'"))));

    let summary = session.stop();
    assert!(summary.error.is_some());
    drop(session);
    assert_eq!(run_end_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn undeclared_event_from_producer_is_fatal() {
    let clock = ManualClock::new();
    let mut session = session(ping_pong(&Trace::default()), &clock);
    let sender = session.sender();
    session.start().unwrap();

    assert_eq!(
        sender.send("lever"),
        Err(SendError::Undeclared("lever".to_string()))
    );
    assert!(matches!(
        session.step(),
        Err(SessionError::Configuration(ConfigurationError::UndeclaredEvent(name))) if name == "lever"
    ));
    assert!(session.is_stopped());
}

#[test]
fn goto_during_entry_is_not_allowed() {
    let task = TaskBuilder::new("entry_goto")
        .states(["A", "B"])
        .events(["go"])
        .initial_state("A")
        .handler("A", |ctx, event| {
            if event.is_entry() {
                ctx.goto_state("B");
            }
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);

    assert!(matches!(
        session.start(),
        Err(SessionError::Configuration(
            ConfigurationError::TransitionNotAllowed { ref target, .. }
        )) if target == "B"
    ));
    assert!(session.is_stopped());
}

#[test]
fn goto_in_run_start_is_not_allowed_but_timers_are() {
    let run_end_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&run_end_calls);
    let task = TaskBuilder::new("run_start_goto")
        .states(["A", "B"])
        .events(["go"])
        .initial_state("A")
        .run_start(|ctx| {
            ctx.set_timer("go", Duration::from_millis(10));
            ctx.goto_state("B");
        })
        .run_end(move |ctx| {
            // ignored after stop
            ctx.goto_state("B");
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);

    assert!(matches!(
        session.start(),
        Err(SessionError::Configuration(ConfigurationError::TransitionNotAllowed { during, .. }))
            if during == "run_start"
    ));
    assert_eq!(run_end_calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.current_state(), "A");
}

#[test]
fn inbox_overflow_is_fatal() {
    let clock = ManualClock::new();
    let mut session = Session::with_clock(
        ping_pong(&Trace::default()),
        SessionConfig::default().with_queue_capacity(2),
        Arc::new(clock.clone()),
    )
    .unwrap();
    let sender = session.sender();
    session.start().unwrap();

    sender.send("go").unwrap();
    sender.send("back").unwrap();
    assert!(matches!(sender.send("go"), Err(SendError::Overflow { .. })));

    let err = session.step().unwrap_err();
    assert!(matches!(err, SessionError::QueueOverflow { dropped: 1, .. }));
    assert!(session.is_stopped());
}

#[test]
fn control_edits_apply_between_dispatches() {
    let task = TaskBuilder::new("control")
        .states(["A"])
        .events(["go"])
        .variable("reward_ms", 50)
        .variable("seen", Value::None)
        .variable("label", "left")
        .variable("calibration___", 1.5)
        .initial_state("A")
        .handler("A", |ctx, event| {
            if event.is("go") {
                let reward = ctx.var_int("reward_ms").unwrap_or_default();
                ctx.set_var("seen", reward);
            }
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let recorder = MemoryRecorder::new();
    let mut session = session(task, &clock);
    session.add_recorder(recorder.clone());
    let control = session.control();
    let sender = session.sender();

    session.start().unwrap();
    assert_eq!(control.current_state().as_deref(), Some("A"));
    assert!(!control.variables().contains_key("calibration___"));

    control.set_variable("reward_ms", 80).unwrap();
    control.set_variable("label", 3).unwrap();
    control.set_variable("calibration___", 2.0).unwrap();
    control.set_variable("missing", true).unwrap();
    sender.send("go").unwrap();
    session.run_until_idle().unwrap();

    assert_eq!(session.variables().get("seen"), Some(&Value::Int(80)));
    assert_eq!(session.variables().get("label"), Some(&Value::Str("left".into())));
    assert_eq!(
        session.variables().get("calibration___"),
        Some(&Value::Float(1.5))
    );
    assert_eq!(control.variables().get("seen"), Some(&Value::Int(80)));

    let rejected: Vec<String> = recorder
        .records()
        .into_iter()
        .filter_map(|r| match r {
            Record::RejectedEdit { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec!["label", "calibration___", "missing"]);
}

#[test]
fn paused_timer_keeps_its_remainder() {
    let trace = Trace::default();
    let log = trace.clone();
    let task = TaskBuilder::new("pause")
        .states(["A"])
        .events(["tick", "hold", "release"])
        .initial_state("A")
        .handler("A", move |ctx, event| match event.name() {
            "entry" => ctx.set_timer("tick", Duration::from_millis(1000)),
            "hold" => ctx.pause_timer("tick"),
            "release" => ctx.unpause_timer("tick"),
            "tick" => log.push(format!("tick@{}", ctx.current_time())),
            _ => {}
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);
    let sender = session.sender();

    session.start().unwrap();
    clock.advance_ms(200);
    sender.send("hold").unwrap();
    session.run_until_idle().unwrap();

    clock.advance_ms(1300);
    session.run_until_idle().unwrap();
    assert!(trace.take().is_empty());
    assert_eq!(session.timer_remaining("tick"), 800);

    sender.send("release").unwrap();
    session.run_until_idle().unwrap();
    clock.advance_ms(800);
    session.run_until_idle().unwrap();
    assert_eq!(trace.take(), vec!["tick@2300"]);
}

#[test]
fn timed_goto_survives_transitions_until_cancelled() {
    let task = TaskBuilder::new("timed")
        .states(["A", "B", "C"])
        .events(["go", "cancel"])
        .initial_state("A")
        .handler("A", |ctx, event| {
            if event.is_entry() {
                ctx.timed_goto_state("B", Duration::from_millis(300));
            } else if event.is("go") {
                ctx.goto_state("C");
            }
        })
        .handler("C", |ctx, event| {
            if event.is("cancel") {
                ctx.cancel_timed_gotos();
            }
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);
    let sender = session.sender();

    session.start().unwrap();
    sender.send("go").unwrap();
    session.run_until_idle().unwrap();
    assert_eq!(session.current_state(), "C");

    clock.advance_ms(300);
    session.run_until_idle().unwrap();
    assert_eq!(session.current_state(), "B");
    assert_eq!(session.history().get_path(), vec!["A", "C", "B"]);
}

#[test]
fn cancelled_timed_goto_does_not_fire() {
    let task = TaskBuilder::new("timed_cancel")
        .states(["A", "B"])
        .events(["cancel"])
        .initial_state("A")
        .handler("A", |ctx, event| {
            if event.is_entry() {
                ctx.timed_goto_state("B", Duration::from_millis(300));
            } else if event.is("cancel") {
                ctx.cancel_timed_gotos();
            }
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);

    session.start().unwrap();
    session.sender().send("cancel").unwrap();
    session.run_until_idle().unwrap();
    clock.advance_ms(1000);
    session.run_until_idle().unwrap();
    assert_eq!(session.current_state(), "A");
}

#[test]
fn published_events_wait_for_current_dispatch() {
    let trace = Trace::default();
    let (a, b) = (trace.clone(), trace.clone());
    let task = TaskBuilder::new("publish")
        .states(["A", "B"])
        .events(["go", "next"])
        .initial_state("A")
        .handler("A", move |ctx, event| {
            if event.is("go") {
                ctx.publish_event("next", Some(Value::Int(7)));
                ctx.goto_state("B");
                a.push("A:go");
            }
        })
        .handler("B", move |_ctx, event| {
            let payload = event.payload().and_then(Value::as_int);
            b.push(format!("B:{}:{payload:?}", event.name()));
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);

    session.start().unwrap();
    session.sender().send("go").unwrap();
    assert_eq!(session.run_until_idle().unwrap(), 2);
    assert_eq!(
        trace.take(),
        vec!["A:go", "B:entry:None", "B:next:Some(7)"]
    );
}

#[test]
fn snapshot_restores_into_new_session() {
    let task = Arc::new(
        TaskBuilder::new("snap")
            .states(["A"])
            .events(["bump"])
            .variable("count", 0)
            .initial_state("A")
            .handler("A", |ctx, event| {
                if event.is("bump") {
                    let count = ctx.var_int("count").unwrap_or_default();
                    ctx.set_var("count", count + 1);
                }
            })
            .build()
            .unwrap(),
    );
    let clock = ManualClock::new();
    let mut first = session_from(&task, &clock);
    first.start().unwrap();
    first.sender().send("bump").unwrap();
    first.sender().send("bump").unwrap();
    first.run_until_idle().unwrap();

    let json = first.save_variables().to_json().unwrap();
    let snapshot = VariableSnapshot::from_json(&json).unwrap();

    let mut second = session_from(&task, &clock);
    second.load_variables(&snapshot).unwrap();
    assert_eq!(second.variables().get("count"), Some(&Value::Int(2)));

    let other = TaskBuilder::new("other")
        .states(["A"])
        .initial_state("A")
        .build()
        .unwrap();
    let mut third = session(other, &clock);
    assert!(matches!(
        third.load_variables(&snapshot),
        Err(SessionError::Snapshot(_))
    ));
}

fn session_from(task: &Arc<TaskDefinition>, clock: &ManualClock) -> Session {
    Session::with_clock(
        Arc::clone(task),
        SessionConfig::default(),
        Arc::new(clock.clone()),
    )
    .unwrap()
}

#[derive(Clone, Default)]
struct Hooks {
    starts: Arc<AtomicUsize>,
    ends: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<Record>>>,
}

impl ApiHooks for Hooks {
    fn run_start(&mut self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn run_end(&mut self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }

    fn process_data(&mut self, batch: &[Record]) {
        self.seen.lock().unwrap().extend_from_slice(batch);
    }
}

#[test]
fn api_hooks_see_every_record_once() {
    let clock = ManualClock::new();
    let hooks = Hooks::default();
    let mut session = session(ping_pong(&Trace::default()), &clock);
    session.set_api_hooks(hooks.clone());
    let sender = session.sender();

    session.start().unwrap();
    sender.send("go").unwrap();
    clock.advance_ms(150);
    session.run_until_idle().unwrap();
    sender.send("back").unwrap();
    session.run_until_idle().unwrap();
    session.stop();

    assert_eq!(hooks.starts.load(Ordering::SeqCst), 1);
    assert_eq!(hooks.ends.load(Ordering::SeqCst), 1);
    let transitions = hooks
        .seen
        .lock()
        .unwrap()
        .iter()
        .filter(|r| matches!(r, Record::Transition { .. }))
        .count();
    assert_eq!(transitions, 3);
}

#[test]
fn future_stamped_event_waits_for_its_time() {
    let trace = Trace::default();
    let log = trace.clone();
    let task = TaskBuilder::new("future")
        .states(["A"])
        .events(["tmr", "ext"])
        .initial_state("A")
        .handler("A", move |ctx, event| {
            if event.is_entry() {
                ctx.set_timer("tmr", Duration::from_millis(5));
            } else {
                log.push(format!("{}@{}", event.name(), event.time().as_millis()));
            }
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);
    let sender = session.sender();

    session.start().unwrap();
    sender
        .send_at("ext", Duration::from_millis(1000), None)
        .unwrap();
    assert_eq!(session.run_until_idle().unwrap(), 0);
    assert_eq!(session.queued(), 1);

    clock.advance_ms(5);
    session.run_until_idle().unwrap();
    assert_eq!(trace.take(), vec!["tmr@5"]);

    clock.set(Duration::from_millis(1000));
    session.run_until_idle().unwrap();
    assert_eq!(trace.take(), vec!["ext@1000"]);
}

#[test]
fn stop_in_run_start_skips_initial_entry() {
    let trace = Trace::default();
    let log = trace.clone();
    let run_end_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&run_end_calls);
    let task = TaskBuilder::new("early_stop")
        .states(["A"])
        .events(["go"])
        .initial_state("A")
        .run_start(|ctx| ctx.stop_framework())
        .handler("A", move |_ctx, event| log.push(event.name().to_string()))
        .run_end(move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    let clock = ManualClock::new();
    let mut session = session(task, &clock);

    session.start().unwrap();
    assert!(session.is_stopped());
    assert!(trace.take().is_empty());
    assert!(session.history().is_empty());
    assert_eq!(session.step().unwrap(), StepOutcome::Stopped);
    assert_eq!(run_end_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_records_inbox_leftovers_when_queue_is_full() {
    let clock = ManualClock::new();
    let recorder = MemoryRecorder::new();
    let mut session = Session::with_clock(
        ping_pong(&Trace::default()),
        SessionConfig::default().with_queue_capacity(2),
        Arc::new(clock.clone()),
    )
    .unwrap();
    session.add_recorder(recorder.clone());
    let sender = session.sender();
    session.start().unwrap();

    // parked in the ordered queue until t=1s
    let later = Duration::from_secs(1);
    sender.send_at("go", later, None).unwrap();
    sender.send_at("back", later, None).unwrap();
    assert_eq!(session.step().unwrap(), StepOutcome::Idle);
    assert_eq!(session.queued(), 2);

    sender.send("go").unwrap();
    sender.send("back").unwrap();
    session.stop();

    let undelivered: Vec<(String, Duration)> = recorder
        .records()
        .into_iter()
        .filter_map(|r| match r {
            Record::Event {
                name,
                time,
                delivered: false,
                ..
            } => Some((name, time)),
            _ => None,
        })
        .collect();
    assert_eq!(
        undelivered,
        vec![
            ("go".to_string(), later),
            ("back".to_string(), later),
            ("go".to_string(), Duration::ZERO),
            ("back".to_string(), Duration::ZERO),
        ]
    );
}

fn timed_task() -> TaskDefinition {
    TaskBuilder::new("timed_run")
        .states(["A", "B"])
        .events(["go"])
        .initial_state("A")
        .handler("A", |ctx, event| {
            if event.is_entry() {
                ctx.set_timer("go", Duration::from_millis(20));
            } else if event.is("go") {
                ctx.goto_state("B");
            }
        })
        .build()
        .unwrap()
}

#[test]
fn run_for_fires_timers_and_stops_at_deadline() {
    init_tracing();
    let mut session = Session::new(timed_task(), SessionConfig::default()).unwrap();

    let summary = session.run_for(Duration::from_millis(60)).unwrap();

    assert!(session.is_stopped());
    assert_eq!(summary.final_state, "B");
    assert_eq!(summary.events_delivered, 1);
    assert!(summary.duration >= Duration::from_millis(60));
    assert!(summary.error.is_none());
}

#[test]
fn control_stop_from_another_thread_ends_run() {
    init_tracing();
    let mut session = Session::new(timed_task(), SessionConfig::default()).unwrap();
    let control = session.control();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        control.stop();
    });
    let summary = session.run().unwrap();
    stopper.join().unwrap();

    assert!(session.is_stopped());
    assert_eq!(summary.final_state, "B");
    assert!(summary.duration >= Duration::from_millis(30));
    assert!(summary.error.is_none());
}

#[test]
fn overflow_during_run_is_returned() {
    init_tracing();
    let mut session = Session::new(
        ping_pong(&Trace::default()),
        SessionConfig::default()
            .with_queue_capacity(2)
            .with_run_duration(Duration::from_secs(5)),
    )
    .unwrap();
    let sender = session.sender();
    for name in ["go", "back"] {
        sender.send(name).unwrap();
    }
    assert!(matches!(sender.send("go"), Err(SendError::Overflow { .. })));

    let err = session.run().unwrap_err();
    assert!(matches!(err, SessionError::QueueOverflow { dropped: 1, .. }));
    assert!(session.is_stopped());
}
