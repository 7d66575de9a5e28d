//! Milestone progress shared by concurrent workers.
//!
//! Each finished unit claims a unique completion index with a single
//! `fetch_add`. Whether that index crosses a 20% boundary depends only on the
//! index itself, so every boundary is reported by exactly one worker no matter
//! how completions interleave.

use std::sync::atomic::{AtomicUsize, Ordering};

const MILESTONE_STEP: usize = 20;

/// A crossed progress boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    pub completed: usize,
    pub total: usize,
    /// Highest 20% boundary reached, `20..=100`.
    pub percent: usize,
}

#[derive(Debug)]
pub struct ProgressTracker {
    label: &'static str,
    total: usize,
    completed: AtomicUsize,
}

impl ProgressTracker {
    pub fn new(label: &'static str, total: usize) -> Self {
        Self {
            label,
            total,
            completed: AtomicUsize::new(0),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Record one finished unit. Returns the milestone this completion
    /// crossed, if any, after logging it.
    pub fn complete(&self) -> Option<Milestone> {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let percent = milestone_bucket(completed, self.total);
        if percent <= milestone_bucket(completed - 1, self.total) {
            return None;
        }
        tracing::info!(
            completed,
            total = self.total,
            percent,
            "{} {}/{} test cases",
            self.label,
            completed,
            self.total
        );
        Some(Milestone {
            completed,
            total: self.total,
            percent,
        })
    }
}

/// Largest multiple of 20 not above the integer completion percentage.
fn milestone_bucket(completed: usize, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    let percent = completed.min(total) * 100 / total;
    percent / MILESTONE_STEP * MILESTONE_STEP
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn concurrent_milestones(total: usize) -> Vec<Milestone> {
        let tracker = Arc::new(ProgressTracker::new("Finished", total));
        let handles: Vec<_> = (0..total)
            .map(|i| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    // Stagger completions so they land out of spawn order.
                    tokio::time::sleep(std::time::Duration::from_millis(((i * 7) % 5) as u64)).await;
                    tracker.complete()
                })
            })
            .collect();

        let mut milestones = Vec::new();
        for handle in handles {
            if let Some(m) = handle.await.unwrap() {
                milestones.push(m);
            }
        }
        assert_eq!(tracker.completed(), total);
        milestones.sort_by_key(|m| m.percent);
        milestones
    }

    fn percents(milestones: &[Milestone]) -> Vec<usize> {
        milestones.iter().map(|m| m.percent).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn single_unit_reports_once() {
        let milestones = concurrent_milestones(1).await;
        assert_eq!(percents(&milestones), vec![100]);
        assert_eq!(milestones[0].completed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn five_units_report_every_boundary_once() {
        let milestones = concurrent_milestones(5).await;
        assert_eq!(percents(&milestones), vec![20, 40, 60, 80, 100]);
        let completed: Vec<usize> = milestones.iter().map(|m| m.completed).collect();
        assert_eq!(completed, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn seventeen_units_report_every_boundary_once() {
        for _ in 0..20 {
            let milestones = concurrent_milestones(17).await;
            assert_eq!(percents(&milestones), vec![20, 40, 60, 80, 100]);
            let completed: Vec<usize> = milestones.iter().map(|m| m.completed).collect();
            assert_eq!(completed, vec![4, 7, 11, 14, 17]);
        }
    }

    #[test]
    fn buckets() {
        assert_eq!(milestone_bucket(0, 5), 0);
        assert_eq!(milestone_bucket(3, 17), 0);
        assert_eq!(milestone_bucket(4, 17), 20);
        assert_eq!(milestone_bucket(1, 1), 100);
        assert_eq!(milestone_bucket(1, 0), 0);
    }

    #[test]
    fn completions_beyond_total_report_nothing() {
        let tracker = ProgressTracker::new("Graded", 2);
        assert!(tracker.complete().is_some());
        assert!(tracker.complete().is_some());
        assert!(tracker.complete().is_none());
    }
}
