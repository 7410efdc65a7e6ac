//! `nodebus-cli` – runs the demo node graph on a message bus.
//!
//! This binary:
//!
//! 1. Installs structured logging (see `nodebus_runtime::telemetry`).
//! 2. Loads `~/.nodebus/config.toml`, with `NODEBUS_*` overrides.
//! 3. Starts a [`MessageBus`] and hosts the scanner → nearest-hit → marker-log
//!    graph for `run_seconds` (or until Ctrl-C).
//! 4. Prints the channel viewer, then disables the nodes and stops the bus.

mod config;
mod demo;
mod viewer;

use colored::Colorize;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use nodebus_middleware::MessageBus;
use nodebus_runtime::NodeHost;

use demo::{MarkerLog, NearestHit, SweepScanner};
use viewer::ViewFormat;

fn main() -> ExitCode {
    let _telemetry = nodebus_runtime::init_tracing("nodebus");

    // JSON output keeps stdout parseable: only the snapshot is printed.
    let format = ViewFormat::from_env();
    let chatty = format == ViewFormat::Text;
    macro_rules! say {
        ($($arg:tt)*) => {
            if chatty {
                println!($($arg)*);
            }
        };
    }

    if chatty {
        print_banner();
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        // stderr, so JSON output on stdout stays parseable.
        report_interrupt(&mut std::io::stderr().lock());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the demo will only stop at its deadline");
    }

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "config error; using defaults");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    say!("  Config: {}", config::config_path().display().to_string().dimmed());

    let bus = match MessageBus::start(cfg.bus.clone()) {
        Ok(bus) => bus,
        Err(e) => {
            error!(error = %e, "failed to start the message bus");
            return ExitCode::FAILURE;
        }
    };

    let mut host = NodeHost::new(bus.clone());
    let log = MarkerLog::new(&cfg.nearest_channel);
    let stats = log.stats();
    let added = [
        host.add(SweepScanner::new(&cfg.scan_channel, cfg.scan_rate, cfg.beams)),
        host.add(NearestHit::new(&cfg.scan_channel, &cfg.nearest_channel)),
        host.add(log),
    ];
    for result in added {
        match result {
            Ok(name) => say!("  {} {}", "+".green().bold(), name),
            Err(e) => {
                error!(error = %e, "failed to add node");
                return ExitCode::FAILURE;
            }
        }
    }

    let deadline = (cfg.run_seconds > 0).then(|| Duration::from_secs(cfg.run_seconds));
    match deadline {
        Some(d) => say!("\n  Running for {}s …\n", d.as_secs()),
        None => say!("\n  Running until Ctrl-C …\n"),
    }

    host.enable_all();
    let summary = host.run(Duration::from_millis(cfg.frame_ms.max(1)), deadline, &shutdown);
    if let Err(e) = bus.flush() {
        warn!(error = %e, "bus flush failed");
    }

    let received = stats.lock().received;
    info!(frames = summary.frames, ticks = summary.ticks, markers = received, "demo finished");

    match viewer::render(&bus.snapshot(), format) {
        Ok(view) => println!("{view}"),
        Err(e) => error!(error = %e, "viewer failed"),
    }

    host.disable_all();
    bus.shutdown();
    say!("  {} Bus {}.", "✓".green().bold(), bus.state());
    ExitCode::SUCCESS
}

fn report_interrupt(out: &mut impl Write) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", "⚠  Ctrl-C received – stopping nodes …".yellow().bold());
}

fn print_banner() {
    println!();
    println!("  {} {}",
        "nodebus".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Typed publish/subscribe for robot nodes");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_notice_goes_to_the_given_writer() {
        let mut err = Vec::new();
        report_interrupt(&mut err);
        let text = String::from_utf8(err).unwrap();
        assert!(text.starts_with('\n'));
        assert!(text.contains("Ctrl-C received"), "{text}");
    }
}
