//! Reward holding a sampled signal above threshold for `hold_ms`.
//!
//! A sensor thread feeds a slow sine wave through a threshold detector.
//! Run with `cargo run --example hold_threshold`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use taskfsm::{
    DigitalOutput, Session, SessionConfig, TaskBuilder, ThresholdCrossing, TracingRecorder,
};
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"{ "queue_capacity": 256, "api_interval_ms": 50, "run_duration_ms": 3000 }"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let solenoid = Arc::new(DigitalOutput::new("solenoid"));
    let reward_out = Arc::clone(&solenoid);

    let task = TaskBuilder::new("hold_threshold")
        .states(["wait_for_rise", "holding", "reward", "inter_trial"])
        .events(["above", "below", "hold_done", "reward_done"])
        .variable("hold_ms", 300)
        .variable("reward_ms", 100)
        .variable("iti_ms", 400)
        .variable("n_rewards", 0)
        .variable("last_peak___", 0.0)
        .initial_state("wait_for_rise")
        .output(solenoid.clone())
        .handler("wait_for_rise", |ctx, event| {
            if event.is("above") {
                ctx.goto_state("holding");
            }
        })
        .handler("holding", |ctx, event| {
            if event.is_entry() {
                let hold = ctx.var_int("hold_ms").unwrap_or(300);
                ctx.set_timer("hold_done", Duration::from_millis(hold.max(0) as u64));
            } else if event.is_exit() {
                ctx.disarm_timer("hold_done");
            } else if event.is("below") {
                ctx.print(format!("released after {}ms", ctx.elapsed().as_millis()));
                ctx.goto_state("wait_for_rise");
            } else if event.is("hold_done") {
                ctx.goto_state("reward");
            }
        })
        .handler("reward", move |ctx, event| {
            if event.is_entry() {
                reward_out.on();
                let rewards = ctx.var_int("n_rewards").unwrap_or_default();
                ctx.set_var("n_rewards", rewards + 1);
                let reward = ctx.var_int("reward_ms").unwrap_or(100);
                ctx.timed_goto_state("inter_trial", Duration::from_millis(reward.max(0) as u64));
            } else if event.is_exit() {
                reward_out.off();
            }
        })
        .handler("inter_trial", |ctx, event| {
            if event.is_entry() {
                let iti = ctx.var_int("iti_ms").unwrap_or(400);
                ctx.timed_goto_state("wait_for_rise", Duration::from_millis(iti.max(0) as u64));
            }
        })
        .all_states(|ctx, event| {
            if let Some(sample) = event.payload().and_then(|p| p.as_float()) {
                let peak = ctx.var_float("last_peak___").unwrap_or_default();
                if sample > peak {
                    ctx.set_var("last_peak___", sample);
                }
            }
        })
        .build()?;

    let config = SessionConfig::from_json_str(CONFIG)?;
    let mut session = Session::new(task, config)?;
    session.add_recorder(TracingRecorder);

    let control = session.control();
    let mut detector = ThresholdCrossing::new(session.sender(), 0.5, Some("above"), Some("below"))?;
    let sensor = thread::spawn(move || {
        for step in 0..300u32 {
            let phase = f64::from(step) * 0.05;
            if detector.sample(phase.sin()).is_err() {
                break;
            }
            if step == 150 {
                let _ = control.set_variable("hold_ms", 150);
            }
            thread::sleep(Duration::from_millis(10));
        }
    });

    let summary = session.run()?;
    let _ = sensor.join();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
