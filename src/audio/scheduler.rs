// Gapless output scheduling on the playback clock
//
// Segments are placed back-to-back on the output device's clock. A segment
// that arrives after the previous one finished starts immediately rather than
// at the stale cursor, and an interruption stops everything at once.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use super::backend::{AudioSegment, OutputBackend, SegmentId};
use crate::error::Result;

/// Placement of one segment on the playback clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    pub id: SegmentId,
    /// Start time in seconds on the playback clock
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl ScheduledSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Schedules decoded segments on an output device
pub struct OutputScheduler {
    output: Box<dyn OutputBackend>,
    next_start_time: f64,
    active: BTreeMap<SegmentId, ScheduledSegment>,
    next_id: SegmentId,
}

impl OutputScheduler {
    pub fn new(output: Box<dyn OutputBackend>) -> Self {
        let next_start_time = output.current_time();
        Self {
            output,
            next_start_time,
            active: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Schedule a segment right after everything already queued
    pub fn enqueue(&mut self, segment: AudioSegment) -> Result<ScheduledSegment> {
        let now = self.output.current_time();
        let start = self.next_start_time.max(now);
        let id = self.next_id;

        self.output.play(id, &segment, start)?;
        self.next_id += 1;

        let scheduled = ScheduledSegment {
            id,
            start,
            duration: segment.duration(),
        };
        self.next_start_time = scheduled.end();
        self.active.insert(id, scheduled);

        debug!(
            "Scheduled segment {} at {:.3}s for {:.3}s ({} active)",
            id,
            start,
            scheduled.duration,
            self.active.len()
        );

        Ok(scheduled)
    }

    /// Stop every active segment and rewind the cursor to now
    ///
    /// Returns the number of segments that were stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();
        for id in self.active.keys() {
            self.output.stop(*id);
        }
        self.active.clear();
        self.next_start_time = self.output.current_time();

        if stopped > 0 {
            debug!("Interrupted {} scheduled segments", stopped);
        }
        stopped
    }

    /// Retire segments whose playback has ended
    ///
    /// Returns `true` when this call drained the last active segment, which is
    /// the "AI no longer speaking" signal.
    pub fn reap(&mut self) -> bool {
        if self.active.is_empty() {
            return false;
        }

        let now = self.output.current_time();
        self.active.retain(|_, segment| segment.end() > now);
        self.active.is_empty()
    }

    /// Time until the earliest active segment finishes
    pub fn until_next_completion(&self) -> Option<Duration> {
        let now = self.output.current_time();
        self.active
            .values()
            .map(ScheduledSegment::end)
            .reduce(f64::min)
            .map(|end| Duration::from_secs_f64((end - now).max(0.0)))
    }

    pub fn is_playing(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn current_time(&self) -> f64 {
        self.output.current_time()
    }

    pub fn output_mut(&mut self) -> &mut dyn OutputBackend {
        self.output.as_mut()
    }
}
