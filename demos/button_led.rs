//! Toggle an LED on each button press, with a simulated button thread.
//!
//! Run with `cargo run --example button_led`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use taskfsm::{DigitalInput, DigitalOutput, Session, SessionConfig, TaskBuilder, TracingRecorder};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let led = Arc::new(DigitalOutput::new("led"));
    let (on_led, off_led) = (Arc::clone(&led), Arc::clone(&led));

    let task = TaskBuilder::new("button_led")
        .states(["led_off", "led_on"])
        .events(["button_press", "button_release"])
        .variable("presses", 0)
        .initial_state("led_off")
        .output(led.clone())
        .all_states(|ctx, event| {
            if event.is("button_press") {
                let presses = ctx.var_int("presses").unwrap_or_default();
                ctx.set_var("presses", presses + 1);
            }
        })
        .handler("led_off", move |ctx, event| {
            if event.is_entry() {
                off_led.off();
            } else if event.is("button_press") {
                ctx.goto_state("led_on");
            }
        })
        .handler("led_on", move |ctx, event| {
            if event.is_entry() {
                on_led.on();
            } else if event.is("button_press") {
                ctx.goto_state("led_off");
            }
        })
        .run_end(|ctx| {
            let presses = ctx.var_int("presses").unwrap_or_default();
            ctx.print(format!("{presses} presses"));
        })
        .build()?;

    let mut session = Session::new(task, SessionConfig::default())?;
    session.add_recorder(TracingRecorder);

    let button = DigitalInput::new(session.sender(), Some("button_press"), Some("button_release"))?;
    let presser = thread::spawn(move || {
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(150));
            let _ = button.signal(true);
            thread::sleep(Duration::from_millis(50));
            let _ = button.signal(false);
        }
    });

    let summary = session.run_for(Duration::from_millis(1200))?;
    let _ = presser.join();

    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("led on after stop: {}", led.is_on());
    Ok(())
}
