//! Threaded milling: a miller thread produces step deltas, a consumer drains
//! them at its own frame rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{info, warn};

use crate::driver::{MillingDriver, StepOutput};
use crate::stock::{IntersectionResult, Stock, StoredData, ToolPose, VoxelUpdate};
use crate::versioner::PtrVersioner;
use crate::StockSimError;

/// Full stock state published every few steps for late-joining readers.
#[derive(Debug, Clone, PartialEq)]
pub struct StockSnapshot {
    /// Steps applied.
    pub step: u64,
    /// Stock version.
    pub version: u64,
    /// Totals so far.
    pub totals: IntersectionResult,
    /// Every live leaf.
    pub leaves: Vec<VoxelUpdate>,
}

impl StockSnapshot {
    fn capture<I>(driver: &MillingDriver<I>) -> Self
    where
        I: Iterator<Item = ToolPose>,
    {
        Self {
            step: driver.steps(),
            version: driver.stock().version(),
            totals: driver.totals(),
            leaves: driver.stock().leaf_snapshot(),
        }
    }
}

/// What a consumer got from one drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Drain {
    /// Step outputs in step order.
    pub batches: Vec<StepOutput>,
    /// The miller has finished; nothing more will arrive.
    pub finished: bool,
}

impl Drain {
    /// Voxel deltas of every batch, concatenated in step order.
    pub fn merged(&mut self) -> StoredData {
        let mut merged = StoredData::default();
        for batch in &mut self.batches {
            merged.append(&mut batch.data);
        }
        merged
    }
}

/// Consumer end of the step queue between the miller and one reader.
///
/// The producer side is a plain [`Sender`]; dropping it marks the stream
/// finished once everything already sent has been drained.
#[derive(Debug)]
pub struct Handoff {
    receiver: Receiver<StepOutput>,
}

impl Handoff {
    /// An unbounded queue and its producer end.
    pub fn channel() -> (Sender<StepOutput>, Self) {
        let (sender, receiver) = channel::unbounded();
        (sender, Self { receiver })
    }

    /// Take everything queued, waiting up to `timeout` for the first step.
    /// Returns an empty, unfinished batch on timeout.
    pub fn wait_drain(&self, timeout: Duration) -> Drain {
        match self.receiver.recv_timeout(timeout) {
            Ok(first) => {
                let mut drain = Drain {
                    batches: vec![first],
                    finished: false,
                };
                self.drain_into(&mut drain);
                drain
            }
            Err(RecvTimeoutError::Timeout) => Drain::default(),
            Err(RecvTimeoutError::Disconnected) => Drain {
                batches: Vec::new(),
                finished: true,
            },
        }
    }

    /// Take everything queued without waiting.
    pub fn try_drain(&self) -> Drain {
        let mut drain = Drain::default();
        self.drain_into(&mut drain);
        drain
    }

    /// Number of queued steps.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    fn drain_into(&self, drain: &mut Drain) {
        loop {
            match self.receiver.try_recv() {
                Ok(output) => drain.batches.push(output),
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => {
                    drain.finished = true;
                    return;
                }
            }
        }
    }
}

/// Pacing for a [`MillingSession`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Publish a [`StockSnapshot`] every this many steps; 0 publishes only
    /// at the end.
    pub snapshot_interval: u64,
    /// Consumer frame rate in Hz; sets the drain timeout.
    pub frame_rate: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            snapshot_interval: 16,
            frame_rate: 30.0,
        }
    }
}

impl SessionOptions {
    /// Drain timeout for one consumer frame.
    pub fn frame_timeout(&self) -> Duration {
        if self.frame_rate.is_finite() && self.frame_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.frame_rate)
        } else {
            Duration::ZERO
        }
    }
}

/// Final state returned when the miller thread ends.
#[derive(Debug)]
pub struct MillingOutcome {
    /// The milled stock.
    pub stock: Stock,
    /// Totals over every applied step.
    pub totals: IntersectionResult,
    /// Steps applied.
    pub steps: u64,
    /// The run ended because a stop was requested.
    pub stopped: bool,
}

/// A miller thread running a [`MillingDriver`].
#[derive(Debug)]
pub struct MillingSession {
    handle: JoinHandle<MillingOutcome>,
    handoff: Handoff,
    snapshots: Arc<PtrVersioner<StockSnapshot>>,
    stop: Arc<AtomicBool>,
    options: SessionOptions,
}

impl MillingSession {
    /// Start milling on a new thread.
    pub fn spawn<I>(
        driver: MillingDriver<I>,
        options: SessionOptions,
    ) -> Result<Self, StockSimError>
    where
        I: Iterator<Item = ToolPose> + Send + 'static,
    {
        let (sender, handoff) = Handoff::channel();
        let snapshots = Arc::new(PtrVersioner::new());
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let snapshots = Arc::clone(&snapshots);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("miller".into())
                .spawn(move || mill(driver, options, sender, &snapshots, &stop))?
        };

        Ok(Self {
            handle,
            handoff,
            snapshots,
            stop,
            options,
        })
    }

    /// Consumer side of the step queue.
    pub fn handoff(&self) -> &Handoff {
        &self.handoff
    }

    /// Published full-stock snapshots.
    pub fn snapshots(&self) -> &Arc<PtrVersioner<StockSnapshot>> {
        &self.snapshots
    }

    /// Wait at most one frame for new steps.
    pub fn drain_frame(&self) -> Drain {
        self.handoff.wait_drain(self.options.frame_timeout())
    }

    /// Ask the miller to stop after the current step.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether the miller thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the miller and take back the stock.
    pub fn join(self) -> Result<MillingOutcome, StockSimError> {
        self.handle.join().map_err(|_| StockSimError::MillerPanicked)
    }
}

fn mill<I>(
    mut driver: MillingDriver<I>,
    options: SessionOptions,
    sender: Sender<StepOutput>,
    snapshots: &PtrVersioner<StockSnapshot>,
    stop: &AtomicBool,
) -> MillingOutcome
where
    I: Iterator<Item = ToolPose>,
{
    info!(
        max_depth = driver.stock().max_depth(),
        leaves = driver.stock().octree().leaf_count(),
        "milling started"
    );
    let mut published = 0;
    let mut stopped = false;
    loop {
        if stop.load(Ordering::Acquire) {
            warn!(steps = driver.steps(), "stop requested");
            stopped = true;
            break;
        }
        let Some(output) = driver.step() else {
            break;
        };
        let step = output.step;
        // the reader may have gone away; keep milling regardless
        let _ = sender.send(output);
        if options.snapshot_interval > 0 && step % options.snapshot_interval == 0 {
            published = publish(&driver, snapshots, published);
        }
    }
    publish(&driver, snapshots, published);
    drop(sender);

    let totals = driver.totals();
    info!(
        steps = driver.steps(),
        waste = totals.waste,
        purged = totals.purged_leaves,
        stopped,
        "milling finished"
    );
    MillingOutcome {
        steps: driver.steps(),
        stock: driver.into_stock(),
        totals,
        stopped,
    }
}

/// Publish the current stock unless this version is already out. Returns
/// the latest published version.
fn publish<I>(
    driver: &MillingDriver<I>,
    snapshots: &PtrVersioner<StockSnapshot>,
    published: u64,
) -> u64
where
    I: Iterator<Item = ToolPose>,
{
    let version = driver.stock().version();
    if version <= published {
        return published;
    }
    let snapshot = StockSnapshot::capture(driver);
    let leaves = snapshot.leaves.len();
    match snapshots.set_data(snapshot, version) {
        Ok(()) => {
            info!(version, leaves, "snapshot published");
            version
        }
        Err(err) => {
            warn!(%err, "snapshot rejected");
            published
        }
    }
}
