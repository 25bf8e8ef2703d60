//! Pattern hand-off policy: switch now, or at the next bar with a fill

use std::sync::Arc;

use tracing::debug;

use crate::mutator;
use crate::pattern::Pattern;
use crate::scheduler::Scheduler;

/// How a requested pattern change was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Transport stopped; the pattern is active right away
    Immediate,
    /// Queued for the next bar wrap
    Queued,
    /// Queued, and the current bar's last beat was replaced with a fill
    QueuedWithFill,
    /// Nothing to transition from
    Ignored,
}

/// Route `next` into the scheduler.
///
/// While playing, the change waits for the bar wrap. If at least one full beat
/// remains before the last beat starts, the active bar is swapped for a copy
/// whose last beat is a fill, so the change is announced musically.
pub fn request_change(scheduler: &mut Scheduler, next: Arc<Pattern>) -> Transition {
    if !scheduler.is_playing() {
        scheduler.install_now(next);
        return Transition::Immediate;
    }
    let Some(active) = scheduler.active() else {
        debug!("Pattern change requested with nothing active");
        return Transition::Ignored;
    };

    let last_beat_start = active.last_beat_start() as i32;
    let outcome = if scheduler.cursor() < last_beat_start && !scheduler.has_fill() {
        scheduler.install_fill(Arc::new(mutator::inject_fill(&active)));
        Transition::QueuedWithFill
    } else {
        Transition::Queued
    };
    debug!(
        cursor = scheduler.cursor(),
        last_beat_start,
        next = %next.label,
        ?outcome,
        "Pattern change queued"
    );
    scheduler.set_pending(next);
    outcome
}
