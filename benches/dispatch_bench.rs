//! Quick benchmark for key dispatch and extended-input capture

use std::sync::Arc;
use std::time::Instant;

use steer::{ActionTable, MemoryLog, Severity, SharedRunState, KEY_ENTER};

fn main() {
    // Error threshold: measure dispatch, not log formatting
    let log = MemoryLog::new(Severity::Error);
    let state = SharedRunState::shared(Arc::new(log));
    let table = ActionTable::new(Arc::clone(&state));
    let input = table.extended_input();
    table.register(b'x', "x - closes capture", move || {
        input.begin_or_end(b'x');
    });

    println!("Key Dispatch Performance Test");
    println!("=============================\n");

    let iterations = 1_000_000;

    let start = Instant::now();
    for _ in 0..iterations {
        table.keyboard_handler(b'-');
        table.keyboard_handler(b'+');
    }
    let elapsed = start.elapsed();
    println!(
        "Built-in keys:   {:>8.1} ns/key",
        elapsed.as_nanos() as f64 / (2 * iterations) as f64
    );

    let start = Instant::now();
    for _ in 0..iterations / 10 {
        table.begin_or_end_extended_input(b'x');
        for b in b"0.125" {
            table.keyboard_handler(*b);
        }
        table.keyboard_handler(KEY_ENTER);
    }
    let elapsed = start.elapsed();
    println!(
        "Capture + close: {:>8.1} ns/entry",
        elapsed.as_nanos() as f64 / (iterations / 10) as f64
    );

    println!("\nFinal sleep interval: {:.6}s", state.sleep_interval_secs());
}
