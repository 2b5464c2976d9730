use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;

use rayon::ThreadPool;

use crate::consts::MIN_AHEAD;
use crate::error::{Result, TesseraError};

use super::CancellationToken;

/// Turns one input into one output on a worker thread.
pub trait TaskFactory<I, O>: Sync {
    fn process(&self, input: I) -> O;
}

impl<I, O, F> TaskFactory<I, O> for F
where
    F: Fn(I) -> O + Sync,
{
    fn process(&self, input: I) -> O {
        self(input)
    }
}

/// Factory adaptor handing each task the number of tasks created before it.
pub struct CountingTaskFactory<F> {
    inner: F,
    counter: AtomicUsize,
}

impl<F> CountingTaskFactory<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            counter: AtomicUsize::new(0),
        }
    }

    /// Tasks created so far.
    pub fn count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

impl<I, O, F> TaskFactory<I, O> for CountingTaskFactory<F>
where
    F: Fn(I, usize) -> O + Sync,
{
    fn process(&self, input: I) -> O {
        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        (self.inner)(input, index)
    }
}

/// Number of jobs kept in flight for a pool of `threads` workers.
fn ahead(threads: usize) -> usize {
    (2 * threads).max(MIN_AHEAD)
}

/// Run `factory` over `inputs` on `pool` with at most `max(2 * threads, 4)`
/// jobs in flight, returning outputs in input order.
///
/// Cancellation is polled before every submission; once set, no further jobs
/// are submitted, queued jobs are skipped, and the call returns
/// `Interrupted`. Must not be called from a worker of `pool` itself.
pub fn progressive<I, O, F, It>(
    inputs: It,
    factory: &F,
    pool: &ThreadPool,
    cancel: &CancellationToken,
) -> Result<Vec<O>>
where
    It: IntoIterator<Item = I>,
    I: Send,
    O: Send,
    F: TaskFactory<I, O> + ?Sized,
{
    let window = ahead(pool.current_num_threads());
    let (tx, rx) = channel::<(usize, Option<O>)>();
    let mut slots: Vec<Option<O>> = Vec::new();
    let mut in_flight = 0usize;
    let mut panicked = false;

    let receive = |slots: &mut Vec<Option<O>>, panicked: &mut bool| -> Result<()> {
        let (index, output) = rx
            .recv()
            .map_err(|_| TesseraError::Pipeline("worker channel closed".to_string()))?;
        match output {
            Some(o) => slots[index] = Some(o),
            None => *panicked = true,
        }
        Ok(())
    };

    pool.in_place_scope(|scope| -> Result<()> {
        let mut inputs = inputs.into_iter().enumerate();
        loop {
            cancel.check("task submission")?;
            // Inputs are only pulled once a slot in the window is free.
            while in_flight >= window {
                receive(&mut slots, &mut panicked)?;
                in_flight -= 1;
            }
            let Some((index, input)) = inputs.next() else {
                break;
            };
            slots.push(None);
            let tx = tx.clone();
            scope.spawn(move |_| {
                let output = if cancel.is_cancelled() {
                    None
                } else {
                    catch_unwind(AssertUnwindSafe(|| factory.process(input))).ok()
                };
                let _ = tx.send((index, output));
            });
            in_flight += 1;
        }
        while in_flight > 0 {
            receive(&mut slots, &mut panicked)?;
            in_flight -= 1;
        }
        Ok(())
    })?;

    cancel.check("task execution")?;
    if panicked {
        return Err(TesseraError::Pipeline("a task panicked".to_string()));
    }
    slots
        .into_iter()
        .map(|s| s.ok_or_else(|| TesseraError::Pipeline("missing task output".to_string())))
        .collect()
}

/// Outputs of an [`unbound`] run. Dropping the handle discards them.
pub struct UnboundHandle<O> {
    rx: Receiver<(usize, O)>,
    submitted: usize,
}

impl<O> UnboundHandle<O> {
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Block until every submitted job has reported and return
    /// `(input index, output)` pairs in completion order. Jobs that panicked
    /// or were skipped after cancellation are missing.
    pub fn wait(self) -> Vec<(usize, O)> {
        self.rx.iter().take(self.submitted).collect()
    }
}

/// Submit one job per input to `pool` without limiting the number in
/// flight. Cancellation is polled before every submission.
pub fn unbound<I, O, F, It>(
    inputs: It,
    factory: Arc<F>,
    pool: &ThreadPool,
    cancel: &CancellationToken,
) -> Result<UnboundHandle<O>>
where
    It: IntoIterator<Item = I>,
    I: Send + 'static,
    O: Send + 'static,
    F: TaskFactory<I, O> + Send + 'static,
{
    let (tx, rx) = channel();
    let mut submitted = 0;
    for (index, input) in inputs.into_iter().enumerate() {
        cancel.check("task submission")?;
        let tx = tx.clone();
        let factory = Arc::clone(&factory);
        let cancel = cancel.clone();
        pool.spawn(move || {
            if !cancel.is_cancelled() {
                let _ = tx.send((index, factory.process(input)));
            }
        });
        submitted += 1;
    }
    Ok(UnboundHandle { rx, submitted })
}
