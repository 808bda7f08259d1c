use std::sync::Arc;

use tracing::{debug, warn};

use super::job::{CompletedJob, JobRecord};
use crate::communication::{BoundedQueue, PushError};
use crate::engine::Engine;
use crate::pool::ScratchPool;

/// Drives submitted jobs to completion.
///
/// Pops job records in submission order, suspends on the engine until
/// each completes, and hands the result downstream. A failed wait drops
/// the job: its input is released, its scratch buffer goes back to the
/// pool, and nothing reaches the output side. The loop exits once the
/// in-flight queue is cancelled and empty.
pub(crate) async fn completion_loop(
    engine: Arc<dyn Engine>,
    in_flight: Arc<BoundedQueue<JobRecord>>,
    completed: Arc<BoundedQueue<CompletedJob>>,
    pool: Arc<ScratchPool>,
) {
    while let Some(job) = in_flight.pop().await {
        let JobRecord {
            handle,
            mut scratch,
            input,
        } = job;

        let descriptors = match engine.wait(handle, &mut scratch).await {
            Ok(descriptors) => descriptors,
            Err(err) => {
                warn!(handle = handle.raw(), error = %err, "wait failed, dropping job");
                drop(input);
                pool.give_back(scratch);
                continue;
            }
        };

        // The engine released the handle; the input is no longer needed.
        drop(input);

        let result = completed
            .push(CompletedJob {
                descriptors,
                scratch,
            })
            .await;
        if let Err(PushError(rejected)) = result {
            // Shutdown raced the handoff; release what the job held.
            pool.give_back(rejected.scratch);
            break;
        }
    }
    debug!("completion worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::engine::MockEngine;
    use crate::tensor::{ElementType, Tensor, TensorBundle, TensorData};

    struct Fixture {
        engine: Arc<MockEngine>,
        in_flight: Arc<BoundedQueue<JobRecord>>,
        completed: Arc<BoundedQueue<CompletedJob>>,
        pool: Arc<ScratchPool>,
        cancel: CancellationToken,
    }

    fn fixture(engine: MockEngine) -> Fixture {
        let cancel = CancellationToken::new();
        let pool =
            Arc::new(ScratchPool::new(4, engine.output_scratch_size(), cancel.clone()).unwrap());
        Fixture {
            engine: Arc::new(engine),
            in_flight: Arc::new(BoundedQueue::new(16, cancel.clone())),
            completed: Arc::new(BoundedQueue::new(16, cancel.clone())),
            pool,
            cancel,
        }
    }

    async fn submit_job(fixture: &Fixture, fill: u8) {
        let mut scratch = fixture.pool.checkout().await.unwrap();
        let input = TensorBundle::from_tensors(vec![Tensor::new(
            "input",
            ElementType::Uint8,
            vec![4],
            TensorData::from_vec(vec![fill; 4]),
        )
        .unwrap()]);
        let handle = fixture
            .engine
            .submit(input.tensors()[0].data(), &mut scratch)
            .await
            .unwrap();
        fixture
            .in_flight
            .push(JobRecord {
                handle,
                scratch,
                input,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn completes_jobs_in_order() {
        let fixture = fixture(MockEngine::single_uint8(
            "out",
            vec![8],
            Duration::from_millis(1),
        ));
        for fill in [3, 5, 7] {
            submit_job(&fixture, fill).await;
        }

        let worker = tokio::spawn(completion_loop(
            fixture.engine.clone(),
            fixture.in_flight.clone(),
            fixture.completed.clone(),
            fixture.pool.clone(),
        ));

        for expected in [3u8, 5, 7] {
            let job = fixture.completed.pop().await.unwrap();
            assert_eq!(job.descriptors.len(), 1);
            assert!(job.scratch.as_slice()[..8].iter().all(|&b| b == expected));
            fixture.pool.give_back(job.scratch);
        }

        fixture.cancel.cancel();
        worker.await.unwrap();
        assert_eq!(fixture.pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn failed_wait_drops_the_job_and_repools_its_scratch() {
        let engine = MockEngine::single_uint8("out", vec![8], Duration::from_millis(1));
        engine.fail_on_nth_wait(1);
        let fixture = fixture(engine);

        submit_job(&fixture, 1).await;
        submit_job(&fixture, 2).await;

        let worker = tokio::spawn(completion_loop(
            fixture.engine.clone(),
            fixture.in_flight.clone(),
            fixture.completed.clone(),
            fixture.pool.clone(),
        ));

        // Only the second job survives; the first was dropped.
        let job = fixture.completed.pop().await.unwrap();
        assert!(job.scratch.as_slice()[..8].iter().all(|&b| b == 2));
        fixture.pool.give_back(job.scratch);

        fixture.cancel.cancel();
        worker.await.unwrap();
        assert_eq!(fixture.completed.len(), 0);
        assert_eq!(fixture.pool.outstanding(), 0);
        assert_eq!(fixture.pool.available(), 4);
    }

    #[tokio::test]
    async fn exits_once_cancelled_and_empty() {
        let fixture = fixture(MockEngine::single_uint8(
            "out",
            vec![8],
            Duration::from_millis(1),
        ));
        submit_job(&fixture, 9).await;
        fixture.cancel.cancel();

        // The queued job is still drained before the worker exits.
        completion_loop(
            fixture.engine.clone(),
            fixture.in_flight.clone(),
            fixture.completed.clone(),
            fixture.pool.clone(),
        )
        .await;

        assert_eq!(fixture.in_flight.len(), 0);
        assert_eq!(fixture.completed.len(), 1);
        assert_eq!(fixture.pool.outstanding(), 1);

        for job in fixture.completed.drain() {
            fixture.pool.forget(job.scratch);
        }
        assert_eq!(fixture.pool.outstanding(), 0);
    }
}
