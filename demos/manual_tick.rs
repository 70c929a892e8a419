//! Manual test driver for [`bgm_engine::Engine`].
//!
//! Reads one command per line from stdin and ticks the engine at a fixed rate in between reads.
//! Not part of the library surface — this binary exists only so a developer can play a BGM file
//! with real loop points, mix in a few SFX, and listen to the result without writing a game.
//!
//! Commands:
//!   bgm <path> [loop_begin_seconds] [loop_end_seconds]
//!   sfx <path>
//!   pause | unpause | stop
//!   quit

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use bgm_engine::{Engine, EngineConfig, SfxHandle};

const TICK_PERIOD: Duration = Duration::from_millis(16);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut engine = match Engine::initialize(EngineConfig::default()) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to initialize engine: {err}");
            std::process::exit(1);
        }
    };

    println!("bgm-engine manual test driver. Commands: bgm <path> [begin] [end], sfx <path>, pause, unpause, stop, quit");
    let mut sfx_handles: Vec<SfxHandle> = Vec::new();

    let stdin = io::stdin();
    let (tx, rx) = std::sync::mpsc::channel::<String>();
    thread::spawn(move || {
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    'outer: loop {
        while let Ok(line) = rx.try_recv() {
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                ["bgm", path] => run_bgm(&mut engine, path, None, None),
                ["bgm", path, begin] => run_bgm(&mut engine, path, parse_f64(begin), None),
                ["bgm", path, begin, end] => {
                    run_bgm(&mut engine, path, parse_f64(begin), parse_f64(end))
                }
                ["sfx", path] => match engine.load_sfx(PathBuf::from(path)) {
                    Ok(handle) => {
                        sfx_handles.push(handle);
                        let played = engine.play_sfx_oneshot(handle, 1.0);
                        println!("loaded+played {path}: {played}");
                    }
                    Err(err) => println!("failed to load {path}: {err}"),
                },
                ["pause"] => println!("pause_bgm -> {}", engine.pause_bgm()),
                ["unpause"] => println!("unpause_bgm -> {}", engine.unpause_bgm()),
                ["stop"] => println!("stop_bgm -> {}", engine.stop_bgm()),
                ["quit"] | ["exit"] => break 'outer,
                [] => {}
                _ => println!("unrecognized command: {line}"),
            }
            let _ = io::stdout().flush();
        }

        engine.tick();
        thread::sleep(TICK_PERIOD);
    }

    engine.shutdown();
}

fn run_bgm(engine: &mut Engine, path: &str, loop_begin: Option<f64>, loop_end: Option<f64>) {
    let descriptor = engine.load_bgm(PathBuf::from(path), loop_begin, loop_end);
    let ok = engine.play_bgm(&descriptor, 1.0);
    println!("play_bgm {path} -> {ok}");
}

fn parse_f64(s: &str) -> Option<f64> {
    s.parse().ok()
}
