//! Log output of collection cycles, captured with a test subscriber.

mod common;

use std::io::{self, Write};
use std::sync::Arc;

use common::{harness, insert_leaves, manual_config, oid};
use parking_lot::Mutex;
use tracing::Level;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run_cycle(verbose: bool, level: Level) -> String {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let h = harness(cluster_dgc::DgcConfig {
            verbose,
            ..manual_config()
        });
        insert_leaves(&h.objects, 1..=3);
        h.objects.add_root(oid(1));
        h.collector.gc().unwrap();
    });
    captured.text()
}

#[test]
fn test_start_and_completion_are_logged() {
    let out = run_cycle(false, Level::INFO);
    assert!(out.contains("DGC start"), "{out}");
    assert!(out.contains("DGC complete"), "{out}");
    assert!(out.contains("garbage=2"), "{out}");
    assert!(!out.contains("rescue 1 complete"), "{out}");
}

#[test]
fn test_verbose_logs_every_stage() {
    let out = run_cycle(true, Level::INFO);
    for stage in [
        "mark results",
        "rescue 1 complete",
        "pausing",
        "paused",
        "rescue 2 start",
        "mark complete",
        "cycle completed",
    ] {
        assert!(out.contains(stage), "missing {stage}: {out}");
    }
}

#[test]
fn test_debug_output_carries_cycle_span() {
    let out = run_cycle(false, Level::DEBUG);
    assert!(out.contains("gc_cycle"), "{out}");
    assert!(out.contains("collection_type="), "{out}");
    assert!(out.contains("Full"), "{out}");
    assert!(out.contains("computed rescue set"), "{out}");
}
