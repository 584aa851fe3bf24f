//! Parallel translation helpers: build a derived collection from an input
//! sequence using a worker pool, with results observed in input order.
//!
//! These are the library's only parallel entry points. A translator may
//! skip an element, stop the whole run early, or fail it; the first error
//! wins and cancels the rest cooperatively.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use crossbeam_channel::{Receiver, Sender};

/// Cooperative cancellation shared between callers, workers and the
/// rolodex's remote fetcher.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What a translator did with one element.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Translation<O> {
    /// Keep this result.
    Value(O),
    /// Drop this element and keep going.
    Skip,
    /// Drop this element and everything after it.
    Stop,
}

/// Translates a slice on a worker pool sized to the host's CPU count,
/// returning the surviving results in input order.
pub fn translate_slice_parallel<I, O, E, F>(items: &[I], translator: F) -> Result<Vec<O>, E>
where
    I: Sync,
    O: Send,
    E: Send,
    F: Fn(usize, &I) -> Result<Translation<O>, E> + Sync,
{
    translate_slice_cancellable(items, &CancelToken::new(), translator)
}

/// As [`translate_slice_parallel`], with an external cancellation token.
/// Cancellation surfaces as a truncated (not errored) result.
pub fn translate_slice_cancellable<I, O, E, F>(
    items: &[I],
    cancel: &CancelToken,
    translator: F,
) -> Result<Vec<O>, E>
where
    I: Sync,
    O: Send,
    E: Send,
    F: Fn(usize, &I) -> Result<Translation<O>, E> + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let workers = num_cpus::get().max(1).min(items.len());
    let next = AtomicUsize::new(0);
    let stop_at = AtomicUsize::new(usize::MAX);
    let first_error: Mutex<Option<E>> = Mutex::new(None);
    let (tx, rx) = crossbeam_channel::unbounded::<(usize, O)>();
    let translator = &translator;
    let next = &next;
    let stop_at = &stop_at;
    let first_error = &first_error;

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            scope.spawn(move || loop {
                if cancel.is_cancelled() {
                    break;
                }
                let idx = next.fetch_add(1, Ordering::Relaxed);
                if idx >= items.len() || idx >= stop_at.load(Ordering::Relaxed) {
                    break;
                }
                match translator(idx, &items[idx]) {
                    Ok(Translation::Value(value)) => {
                        let _ = tx.send((idx, value));
                    }
                    Ok(Translation::Skip) => {}
                    Ok(Translation::Stop) => {
                        stop_at.fetch_min(idx, Ordering::Relaxed);
                    }
                    Err(err) => {
                        // First error wins; the rest observe cancellation.
                        let mut slot = first_error
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                        cancel.cancel();
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    if let Some(err) = first_error
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take()
    {
        return Err(err);
    }

    let limit = stop_at.load(Ordering::Relaxed);
    let mut translated: Vec<(usize, O)> = rx.try_iter().filter(|&(idx, _)| idx < limit).collect();
    translated.sort_unstable_by_key(|&(idx, _)| idx);
    Ok(translated.into_iter().map(|(_, value)| value).collect())
}

/// Pipeline translation: items flow in from `input`, through the worker
/// pool, and out of `output` in input order. The caller closes `input` to
/// signal EOF; `output` closes when everything has drained. The first
/// translator error cancels the pipeline and is returned.
pub fn translate_pipeline<I, O, E, F>(
    input: Receiver<I>,
    output: Sender<O>,
    cancel: &CancelToken,
    translator: F,
) -> Result<(), E>
where
    I: Send,
    O: Send,
    E: Send,
    F: Fn(I) -> Result<O, E> + Sync,
{
    let workers = num_cpus::get().max(1);
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, I)>();
    let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, O)>();
    let first_error: Mutex<Option<E>> = Mutex::new(None);
    let translator = &translator;
    let first_error = &first_error;

    std::thread::scope(|scope| {
        // Pump the caller's channel into sequenced jobs.
        scope.spawn(move || {
            for (seq, item) in input.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                if job_tx.send((seq, item)).is_err() {
                    break;
                }
            }
            drop(job_tx);
        });

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                for (seq, item) in job_rx.iter() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match translator(item) {
                        Ok(value) => {
                            if done_tx.send((seq, value)).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            let mut slot = first_error
                                .lock()
                                .unwrap_or_else(std::sync::PoisonError::into_inner);
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                            cancel.cancel();
                            break;
                        }
                    }
                }
            });
        }
        drop(done_tx);
        drop(job_rx);

        // Reorder by sequence number and emit as soon as the next one in
        // line is ready.
        let mut pending = std::collections::BTreeMap::new();
        let mut emit_next = 0usize;
        for (seq, value) in done_rx.iter() {
            pending.insert(seq, value);
            while let Some(value) = pending.remove(&emit_next) {
                if output.send(value).is_err() {
                    return;
                }
                emit_next += 1;
            }
        }
    });

    match first_error
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take()
    {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
