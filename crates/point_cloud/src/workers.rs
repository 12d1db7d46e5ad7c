//! Bounded worker batches with a single aggregator.
//!
//! The calling thread is the producer: it reads one job at a time and hands
//! each to a fresh scoped worker. After `batch_size` workers are running it
//! joins them all before reading further. Workers never touch shared state;
//! they send their local points back over a channel and the calling thread
//! merges them in job order.

use crate::data::Point;
use crossbeam_channel::unbounded;
use std::io;
use std::thread;

/// What a batched run produced.
#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    /// Merged worker output, in the order the jobs were produced.
    pub points: Vec<Point>,
    /// Jobs dispatched to workers.
    pub jobs: usize,
    /// Producer error that stopped the run early, if any. Jobs produced
    /// before the error are still merged.
    pub error: Option<io::Error>,
}

pub(crate) fn run_batched<J, P, W>(mut next_job: P, batch_size: usize, work: W) -> BatchOutcome
where
    J: Send,
    P: FnMut() -> io::Result<Option<J>>,
    W: Fn(J) -> Vec<Point> + Sync,
{
    let batch_size = batch_size.max(1);
    let (tx, rx) = unbounded::<(usize, Vec<Point>)>();
    let mut outcome = BatchOutcome::default();
    let work = &work;

    loop {
        let first_ordinal = outcome.jobs;
        let mut error = None;

        let exhausted = thread::scope(|scope| {
            let mut launched = 0;

            while launched < batch_size {
                match next_job() {
                    Ok(Some(job)) => {
                        let tx = tx.clone();
                        let ordinal = first_ordinal + launched;
                        scope.spawn(move || {
                            // The receiver outlives the scope, so this cannot fail.
                            let _ = tx.send((ordinal, work(job)));
                        });
                        launched += 1;
                    }
                    Ok(None) => return (launched, true),
                    Err(err) => {
                        error = Some(err);
                        return (launched, true);
                    }
                }
            }

            (launched, false)
        });

        let (launched, done) = exhausted;
        outcome.jobs += launched;

        let mut results: Vec<(usize, Vec<Point>)> = rx.try_iter().collect();
        results.sort_unstable_by_key(|(ordinal, _)| *ordinal);

        let merged_before = outcome.points.len();
        for (_, points) in results {
            outcome.points.extend(points);
        }

        log::debug!(
            "worker batch joined: {} jobs, {} points merged",
            launched,
            outcome.points.len() - merged_before
        );

        if error.is_some() {
            outcome.error = error;
        }

        if done {
            break;
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pt(v: f32) -> Point {
        Point::new([v, 0.0, 0.0], 1.0, [0.0; 3])
    }

    #[test]
    fn merges_in_job_order_across_batches() {
        let mut next = 0u32;
        let outcome = run_batched(
            || {
                next += 1;
                Ok((next <= 10).then_some(next))
            },
            3,
            |job| {
                // Later jobs finish first.
                thread::sleep(std::time::Duration::from_millis((10 - job as u64) * 2));
                vec![pt(job as f32), pt(job as f32 + 0.5)]
            },
        );

        assert_eq!(outcome.jobs, 10);
        assert!(outcome.error.is_none());
        let xs: Vec<f32> = outcome.points.iter().map(|p| p.position[0]).collect();
        let expected: Vec<f32> = (1..=10)
            .flat_map(|j| [j as f32, j as f32 + 0.5])
            .collect();
        assert_eq!(xs, expected);
    }

    #[test]
    fn never_more_than_batch_size_in_flight() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let mut remaining = 17;

        run_batched(
            || {
                if remaining == 0 {
                    return Ok(None);
                }
                remaining -= 1;
                Ok(Some(()))
            },
            4,
            |_| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(std::time::Duration::from_millis(2));
                active.fetch_sub(1, Ordering::SeqCst);
                Vec::new()
            },
        );

        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn producer_error_keeps_earlier_results() {
        let mut calls = 0;
        let outcome = run_batched(
            || {
                calls += 1;
                match calls {
                    1 | 2 => Ok(Some(calls)),
                    _ => Err(io::Error::new(io::ErrorKind::Other, "disk gone")),
                }
            },
            8,
            |job| vec![pt(job as f32)],
        );

        assert_eq!(outcome.jobs, 2);
        assert_eq!(outcome.points.len(), 2);
        assert!(outcome.error.is_some());
    }
}
