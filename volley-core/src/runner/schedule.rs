use std::time::Duration;

use crate::config::{Interpolation, Stage};

/// Upper bound for how long a parked VU sleeps before re-checking the ramp.
const MAX_RECHECK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Piecewise target curve over a list of `{duration, target}` stages.
#[derive(Debug, Clone)]
pub struct RampSchedule {
    start: u64,
    stages: Vec<Stage>,
    interpolation: Interpolation,
    cumulative_ends: Vec<Duration>,
}

struct Position {
    idx: usize,
    stage_start: Duration,
    stage_end: Duration,
    start_target: u64,
    end_target: u64,
}

impl RampSchedule {
    pub fn new(start: u64, stages: Vec<Stage>, interpolation: Interpolation) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            start,
            stages,
            interpolation,
            cumulative_ends,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    fn final_target(&self) -> u64 {
        self.stages.last().map_or(self.start, |s| s.target)
    }

    /// Stage containing `elapsed` (half-open `[start, end)`); `None` once the ramp is over.
    fn position(&self, elapsed: Duration) -> Option<Position> {
        let idx = self.cumulative_ends.partition_point(|end| *end <= elapsed);
        let stage = self.stages.get(idx)?;
        let stage_start = match idx {
            0 => Duration::ZERO,
            i => self.cumulative_ends[i - 1],
        };
        let start_target = match idx {
            0 => self.start,
            i => self.stages[i - 1].target,
        };

        Some(Position {
            idx,
            stage_start,
            stage_end: self.cumulative_ends[idx],
            start_target,
            end_target: stage.target,
        })
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let Some(pos) = self.position(elapsed) else {
            return self.final_target();
        };

        match self.interpolation {
            Interpolation::Step => pos.end_target,
            Interpolation::Linear => {
                let stage_duration = pos.stage_end.saturating_sub(pos.stage_start);
                let stage_elapsed = elapsed.saturating_sub(pos.stage_start);

                let start_i = i128::from(pos.start_target);
                let delta = i128::from(pos.end_target) - start_i;
                let num = stage_elapsed.as_nanos() as i128;
                let den = (stage_duration.as_nanos() as i128).max(1);

                let cur = start_i + delta.saturating_mul(num) / den;
                cur.clamp(0, i128::from(u64::MAX)) as u64
            }
        }
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let count = self.stages.len();
        let pos = match self.position(elapsed) {
            Some(pos) => pos,
            // Past the end: report the last stage as complete.
            None => {
                let idx = count - 1;
                return Some(StageSnapshot {
                    index: idx,
                    count,
                    stage_elapsed: self.stages[idx].duration,
                    stage_remaining: Duration::ZERO,
                    start_target: match idx {
                        0 => self.start,
                        i => self.stages[i - 1].target,
                    },
                    end_target: self.stages[idx].target,
                    current_target: self.final_target(),
                });
            }
        };

        let stage_elapsed = elapsed.saturating_sub(pos.stage_start);
        Some(StageSnapshot {
            index: pos.idx,
            count,
            stage_elapsed,
            stage_remaining: pos
                .stage_end
                .saturating_sub(pos.stage_start)
                .saturating_sub(stage_elapsed),
            start_target: pos.start_target,
            end_target: pos.end_target,
            current_target: self.target_at(elapsed),
        })
    }

    /// How long VU `vu_index` (1-based) can sleep before its active state may change.
    pub fn next_recheck_in(&self, elapsed: Duration, vu_index: u64) -> Duration {
        let Some(pos) = self.position(elapsed) else {
            return Duration::ZERO;
        };

        if vu_index <= self.target_at(elapsed) {
            return Duration::from_millis(1);
        }

        let until_stage_end = pos.stage_end.saturating_sub(elapsed);
        let not_reached_in_stage = match self.interpolation {
            Interpolation::Step => true,
            Interpolation::Linear => {
                pos.end_target <= pos.start_target || vu_index > pos.end_target
            }
        };
        if not_reached_in_stage {
            return until_stage_end.min(MAX_RECHECK);
        }

        // Solve start + delta * t / dur >= vu_index for t.
        let start_i = i128::from(pos.start_target);
        let delta = i128::from(pos.end_target) - start_i;
        let stage_ns = pos.stage_end.saturating_sub(pos.stage_start).as_nanos() as i128;
        let elapsed_ns = elapsed.saturating_sub(pos.stage_start).as_nanos() as i128;

        let needed_ns = (i128::from(vu_index) - start_i).saturating_mul(stage_ns) / delta.max(1);
        let wait_ns = needed_ns.saturating_sub(elapsed_ns).max(0);
        Duration::from_nanos(wait_ns.min(i128::from(u64::MAX)) as u64).min(MAX_RECHECK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn stages() -> Vec<Stage> {
        vec![
            Stage {
                duration: secs(10),
                target: 10,
            },
            Stage {
                duration: secs(10),
                target: 10,
            },
            Stage {
                duration: secs(10),
                target: 0,
            },
        ]
    }

    #[test]
    fn linear_ramp_interpolates_between_targets() {
        let s = RampSchedule::new(0, stages(), Interpolation::Linear);
        assert_eq!(s.total_duration(), secs(30));
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(secs(5)), 5);
        assert_eq!(s.target_at(secs(10)), 10);
        assert_eq!(s.target_at(secs(15)), 10);
        assert_eq!(s.target_at(secs(25)), 5);
        assert_eq!(s.target_at(secs(30)), 0);
        assert!(s.is_done(secs(30)));
    }

    #[test]
    fn step_ramp_jumps_at_stage_start() {
        let s = RampSchedule::new(1, stages(), Interpolation::Step);
        assert_eq!(s.target_at(Duration::ZERO), 10);
        assert_eq!(s.target_at(secs(9)), 10);
        assert_eq!(s.target_at(secs(20)), 0);
    }

    #[test]
    fn snapshot_reports_current_stage() {
        let s = RampSchedule::new(0, stages(), Interpolation::Linear);
        let snap = s
            .stage_snapshot_at(secs(12))
            .unwrap_or_else(|| panic!("missing snapshot"));
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 3);
        assert_eq!(snap.stage_elapsed, secs(2));
        assert_eq!(snap.stage_remaining, secs(8));
        assert_eq!(snap.current_target, 10);

        let end = s
            .stage_snapshot_at(secs(99))
            .unwrap_or_else(|| panic!("missing snapshot"));
        assert_eq!(end.index, 2);
        assert_eq!(end.stage_remaining, Duration::ZERO);
    }

    #[test]
    fn recheck_waits_until_ramp_reaches_vu() {
        let s = RampSchedule::new(0, stages(), Interpolation::Linear);
        // Target reaches 5 at t=5s.
        assert_eq!(s.next_recheck_in(secs(1), 5), MAX_RECHECK);
        let near = s.next_recheck_in(Duration::from_millis(4990), 5);
        assert_eq!(near, Duration::from_millis(10));
        assert_eq!(s.next_recheck_in(secs(6), 5), Duration::from_millis(1));
        assert_eq!(s.next_recheck_in(secs(30), 5), Duration::ZERO);
    }
}
