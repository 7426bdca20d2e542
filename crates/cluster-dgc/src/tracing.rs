//! GC tracing support.
//!
//! Structured `tracing` spans and events for collection cycles, and the
//! [`GcLogger`] listener every collector registers at construction.

use tracing::{span, Level};

use crate::events::GarbageCollectorEventListener;
use crate::info::{CollectionKind, GarbageCollectionInfo};

/// Create a span for an entire collection cycle.
pub fn trace_gc_cycle(kind: CollectionKind, gc_id: u64) -> span::EnteredSpan {
    span!(
        Level::DEBUG,
        "gc_cycle",
        collection_type = kind.description(),
        gc_id
    )
    .entered()
}

/// Logs lifecycle events.
///
/// Start, completion and cancellation are always logged. Intermediate stages
/// are logged at `info` when verbose, otherwise at `debug`.
#[derive(Debug, Clone, Copy)]
pub struct GcLogger {
    verbose: bool,
}

macro_rules! stage {
    ($self:expr, $info:expr, $stage:literal $(, $key:ident = $value:expr)*) => {
        if $self.verbose {
            tracing::info!(
                gc_id = $info.cycle_id,
                collection_type = $info.kind.description(),
                $($key = $value,)*
                $stage
            );
        } else {
            tracing::debug!(
                gc_id = $info.cycle_id,
                collection_type = $info.kind.description(),
                $($key = $value,)*
                $stage
            );
        }
    };
}

impl GcLogger {
    /// Create a logger.
    #[must_use]
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Whether intermediate stages are logged at `info`.
    #[must_use]
    pub const fn is_verbose(&self) -> bool {
        self.verbose
    }
}

impl GarbageCollectorEventListener for GcLogger {
    fn garbage_collector_start(&self, info: &GarbageCollectionInfo) {
        tracing::info!(
            gc_id = info.cycle_id,
            collection_type = info.kind.description(),
            live_objects = info.live_object_count,
            "DGC start"
        );
    }

    fn garbage_collector_mark(&self, info: &GarbageCollectionInfo) {
        stage!(self, info, "mark", begin_objects = info.begin_object_count);
    }

    fn garbage_collector_mark_results(&self, info: &GarbageCollectionInfo) {
        stage!(
            self,
            info,
            "mark results",
            pre_rescue = info.pre_rescue_count,
            mark_ms = info.mark_duration.as_millis()
        );
    }

    fn garbage_collector_rescue1_complete(&self, info: &GarbageCollectionInfo) {
        stage!(
            self,
            info,
            "rescue 1 complete",
            candidate_garbage = info.candidate_garbage_count,
            rescue1_ms = info.rescue1_duration.as_millis()
        );
    }

    fn garbage_collector_pausing(&self, info: &GarbageCollectionInfo) {
        stage!(self, info, "pausing");
    }

    fn garbage_collector_paused(&self, info: &GarbageCollectionInfo) {
        stage!(
            self,
            info,
            "paused",
            pause_ms = info.pause_duration.as_millis()
        );
    }

    fn garbage_collector_rescue2_start(&self, info: &GarbageCollectionInfo) {
        stage!(self, info, "rescue 2 start");
    }

    fn garbage_collector_mark_complete(&self, info: &GarbageCollectionInfo) {
        stage!(
            self,
            info,
            "mark complete",
            garbage = info.actual_garbage_count,
            rescue2_ms = info.mark_complete_duration.as_millis()
        );
    }

    fn garbage_collector_cycle_completed(&self, info: &GarbageCollectionInfo) {
        stage!(
            self,
            info,
            "cycle completed",
            garbage = info.actual_garbage_count
        );
    }

    fn garbage_collector_delete(&self, info: &GarbageCollectionInfo) {
        stage!(self, info, "delete", garbage = info.actual_garbage_count);
    }

    fn garbage_collector_completed(&self, info: &GarbageCollectionInfo) {
        tracing::info!(
            gc_id = info.cycle_id,
            collection_type = info.kind.description(),
            begin_objects = info.begin_object_count,
            garbage = info.actual_garbage_count,
            end_objects = info.end_object_count,
            elapsed_ms = info.elapsed.as_millis(),
            "DGC complete"
        );
    }

    fn garbage_collector_canceled(&self, info: &GarbageCollectionInfo) {
        tracing::warn!(
            gc_id = info.cycle_id,
            collection_type = info.kind.description(),
            elapsed_ms = info.elapsed.as_millis(),
            "DGC canceled"
        );
    }
}
