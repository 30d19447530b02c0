use crossbeam::channel;

use crate::common::WorkerSnafu;
use crate::models::DomainConfig;

use super::{DomainReport, Mode, Orchestrator};

/// Runs domains on `workers` scoped threads fed from a shared queue.
/// Each domain stays on one thread, so its corrections remain ordered.
pub(super) fn run_parallel(
    orchestrator: &Orchestrator<'_>,
    domains: Vec<DomainConfig>,
    mode: Mode,
    workers: usize,
) -> Vec<DomainReport> {
    let names: Vec<String> = domains.iter().map(|dc| dc.name.clone()).collect();
    let (job_tx, job_rx) = channel::unbounded::<(usize, DomainConfig)>();
    let (done_tx, done_rx) = channel::unbounded::<(usize, DomainReport)>();
    for job in domains.into_iter().enumerate() {
        // The receiver is still held here, so this cannot fail.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let workers = workers.min(names.len()).max(1);
    let scoped = crossbeam::scope(|scope| {
        for worker in 0..workers {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            scope.spawn(move |_| {
                for (index, dc) in jobs.iter() {
                    tracing::debug!(worker, domain = %dc.name, "Picked up domain");
                    if done.send((index, orchestrator.process_domain(dc, mode))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(done_tx);
    if scoped.is_err() {
        tracing::error!("A domain worker panicked");
    }

    let mut reports: Vec<Option<DomainReport>> = names.iter().map(|_| None).collect();
    for (index, report) in done_rx.iter() {
        reports[index] = Some(report);
    }
    reports
        .into_iter()
        .zip(names)
        .map(|(report, name)| {
            report.unwrap_or_else(|| {
                let error = WorkerSnafu { domain: name.as_str() }.build();
                DomainReport::failed(&name, error)
            })
        })
        .collect()
}
