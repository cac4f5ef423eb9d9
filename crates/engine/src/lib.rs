//! Worker pool that renders tile jobs on several threads and feeds a shared tiled film.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, TrySendError, bounded};
use crossbeam_queue::ArrayQueue;
use film_protocol::ImageBlock;
use model::{PixelPoint, PixelSize, TileCoord, TileGrid};
use tiles::{FilmError, SharedAccumulator, TiledImageStore};

/// One unit of rendering work: the core region of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileJob {
    pub coord: TileCoord,
    pub offset: PixelPoint,
    /// Clipped to the image, so edge jobs can be smaller than a tile.
    pub size: PixelSize,
}

impl TileJob {
    pub fn for_tile(grid: &TileGrid, coord: TileCoord) -> Self {
        Self {
            coord,
            offset: grid.tile_origin(coord),
            size: grid.tile_extent(coord),
        }
    }
}

/// Every tile of `grid` as a job, in raster order.
pub fn tile_jobs(grid: &TileGrid) -> Vec<TileJob> {
    grid.iter_coords()
        .map(|coord| TileJob::for_tile(grid, coord))
        .collect()
}

/// Produces the padded block for a job. Called concurrently from every worker.
pub trait BlockSource: Sync {
    fn render(&self, job: &TileJob) -> ImageBlock;
}

impl<F> BlockSource for F
where
    F: Fn(&TileJob) -> ImageBlock + Sync,
{
    fn render(&self, job: &TileJob) -> ImageBlock {
        self(job)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("worker pool needs at least one worker")]
    NoWorkers,
    #[error("tile {coord} failed: {source}")]
    Submit {
        coord: TileCoord,
        #[source]
        source: FilmError,
    },
    #[error("render worker {worker} panicked")]
    WorkerPanicked { worker: usize },
}

/// Counters of a finished [`WorkerPool::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderReport {
    pub blocks_submitted: usize,
    /// Blocks submitted by each worker, indexed by worker id.
    pub per_worker: Vec<usize>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Result<Self, EngineError> {
        if worker_count == 0 {
            return Err(EngineError::NoWorkers);
        }
        Ok(Self { worker_count })
    }

    /// One worker per available core.
    pub fn with_available_parallelism() -> Self {
        let worker_count = thread::available_parallelism().map_or(1, |count| count.get());
        Self { worker_count }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Renders and submits every job, then returns. The film is not shut down.
    ///
    /// The first failing submit stops all workers; jobs not yet taken are skipped and that
    /// error is returned.
    pub fn run<S, B>(
        &self,
        film: &SharedAccumulator<S>,
        source: &B,
        jobs: Vec<TileJob>,
    ) -> Result<RenderReport, EngineError>
    where
        S: TiledImageStore + Send,
        B: BlockSource,
    {
        let started = Instant::now();
        let job_count = jobs.len();
        let queue = ArrayQueue::new(job_count.max(1));
        for job in jobs {
            if queue.push(job).is_err() {
                panic!("job queue sized below its job count");
            }
        }
        let stop = AtomicBool::new(false);
        let submitted = AtomicUsize::new(0);
        let (failure_sender, failure_receiver) = bounded(1);

        tracing::info!(jobs = job_count, workers = self.worker_count, "rendering tiles");
        let per_worker = thread::scope(|scope| {
            let handles = (0..self.worker_count)
                .map(|worker| {
                    let worker_context = WorkerContext {
                        worker,
                        queue: &queue,
                        stop: &stop,
                        submitted: &submitted,
                        failures: failure_sender.clone(),
                    };
                    scope.spawn(move || worker_context.drain(film, source))
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .enumerate()
                .map(|(worker, handle)| {
                    handle
                        .join()
                        .map_err(|_| EngineError::WorkerPanicked { worker })
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        if let Ok(failure) = failure_receiver.try_recv() {
            return Err(failure);
        }
        let report = RenderReport {
            blocks_submitted: submitted.load(Ordering::Relaxed),
            per_worker,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            blocks = report.blocks_submitted,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "all tiles submitted"
        );
        Ok(report)
    }
}

struct WorkerContext<'a> {
    worker: usize,
    queue: &'a ArrayQueue<TileJob>,
    stop: &'a AtomicBool,
    submitted: &'a AtomicUsize,
    failures: Sender<EngineError>,
}

impl WorkerContext<'_> {
    fn drain<S, B>(self, film: &SharedAccumulator<S>, source: &B) -> usize
    where
        S: TiledImageStore,
        B: BlockSource,
    {
        let mut blocks = 0;
        while !self.stop.load(Ordering::Acquire) {
            let Some(job) = self.queue.pop() else {
                break;
            };
            let block = source.render(&job);
            if let Err(source) = film.submit(&block) {
                self.stop.store(true, Ordering::Release);
                // only the first failure is kept; later ones are consequences of it
                match self.failures.try_send(EngineError::Submit {
                    coord: job.coord,
                    source,
                }) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => {
                        panic!("worker failure channel disconnected")
                    }
                }
                break;
            }
            blocks += 1;
            self.submitted.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(worker = self.worker, blocks, "render worker finished");
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use film_protocol::{ComponentEncoding, FilmSettings, PixelLayout};
    use tiles::{MemoryTileStore, ProtocolError, TileAccumulator};

    fn shared_film(width: u32, height: u32) -> SharedAccumulator<MemoryTileStore> {
        let settings = FilmSettings::new(
            width,
            height,
            16,
            PixelLayout::Luminance,
            ComponentEncoding::Float32,
        )
        .expect("settings");
        let film = SharedAccumulator::new(TileAccumulator::new(settings, MemoryTileStore::new()));
        film.prepare(["Y"]).expect("prepare");
        film
    }

    fn constant_source(job: &TileJob) -> ImageBlock {
        let mut block = ImageBlock::new(job.offset, job.size, 1, 1);
        block.data_mut().fill(0.25);
        block
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(EngineError::NoWorkers)));
    }

    #[test]
    fn edge_jobs_are_clipped_to_the_image() {
        let grid = TileGrid::new(40, 20, 16).expect("grid");
        let jobs = tile_jobs(&grid);
        assert_eq!(jobs.len(), 6);
        assert_eq!(jobs[2].offset, PixelPoint::new(32, 0));
        assert_eq!(jobs[2].size, PixelSize::new(8, 16));
        assert_eq!(jobs[5].size, PixelSize::new(8, 4));
    }

    #[test]
    fn pool_flushes_every_tile() {
        let film = shared_film(100, 70);
        let grid = film.with(|film| film.settings().grid);
        let pool = WorkerPool::new(4).expect("pool");
        let report = pool
            .run(&film, &constant_source, tile_jobs(&grid))
            .expect("run");
        assert_eq!(report.blocks_submitted, grid.tile_count());
        assert_eq!(report.per_worker.iter().sum::<usize>(), grid.tile_count());

        let summary = film.shutdown().expect("shutdown");
        assert_eq!(summary.tiles_written, grid.tile_count());
        assert_eq!(summary.tiles_abandoned, 0);
        film.with(|film| {
            let mut written = film.store().write_log().to_vec();
            assert_eq!(written.len(), grid.tile_count());
            written.sort_by_key(|coord| (coord.y, coord.x));
            assert_eq!(written, grid.iter_coords().collect::<Vec<_>>());
        });
    }

    #[test]
    fn first_failure_stops_the_pool() {
        let film = shared_film(64, 64);
        let grid = TileGrid::new(64, 64, 16).expect("grid");
        let mut jobs = tile_jobs(&grid);
        // the same tile twice is a protocol error on the second submit
        jobs.insert(1, jobs[0]);
        let pool = WorkerPool::new(1).expect("pool");
        let error = pool
            .run(&film, &constant_source, jobs)
            .expect_err("duplicate tile");
        assert!(matches!(
            error,
            EngineError::Submit {
                source: FilmError::Protocol(ProtocolError::SlotOccupied { .. }),
                ..
            }
        ));
        assert!(film.is_aborted());
        assert_eq!(film.with(|film| film.tiles_written()), 0);
    }
}
