//! Parallel scan fan-out (spec §4.10), living inside C6 since it is just
//! `Executor::scan` run `total_segments` times concurrently and reassembled.
//!
//! The teacher has no built-in parallel-scan primitive to ground this on;
//! the shape here — one `tokio::spawn`ed task per unit of work, a
//! `Semaphore` bounding concurrency, results joined back in submission
//! order — follows the same "`tokio` as the only concurrency primitive"
//! idiom the rest of this crate uses for backoff sleeps and credential
//! single-flighting.

use crate::deadline::Ctx;
use crate::error::ScanError;
use crate::exec::{Executor, ScanOptions};
use crate::registry::Model;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

impl Executor {
    /// Scan every segment of `total_segments` concurrently, bounded by
    /// `concurrency` (defaulting to `total_segments`), paginating each
    /// segment to completion. Results are returned in segment order
    /// regardless of completion order. The first segment to fail flips a
    /// shared flag the other segments check between pages, so they stop
    /// issuing further requests once it is set, and the first error is
    /// returned.
    pub async fn scan_all_segments<M: Model>(
        &self,
        ctx: &Ctx,
        total_segments: i32,
        concurrency: Option<usize>,
        opts: ScanOptions,
    ) -> Result<Vec<M>, ScanError> {
        ctx.check_deadline()?;
        let permits = concurrency.unwrap_or(total_segments.max(1) as usize).max(1);
        let semaphore = Arc::new(tokio::sync::Semaphore::new(permits));
        let cancelled = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(total_segments.max(0) as usize);
        for segment in 0..total_segments {
            let exec = self.clone();
            let ctx = ctx.clone();
            let mut segment_opts = opts.clone();
            segment_opts.segment = Some(segment);
            segment_opts.total_segments = Some(total_segments);
            let semaphore = semaphore.clone();
            let cancelled = cancelled.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                exec.scan_segment_to_completion::<M>(&ctx, segment_opts, &cancelled).await
            }));
        }

        let mut out = Vec::with_capacity(handles.len());
        let mut first_error: Option<ScanError> = None;
        for handle in handles {
            match handle.await.expect("scan segment task panicked") {
                Ok(items) => out.push(items),
                Err(e) => {
                    cancelled.store(true, Ordering::Relaxed);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(out.into_iter().flatten().collect())
    }

    async fn scan_segment_to_completion<M: Model>(
        &self,
        ctx: &Ctx,
        mut opts: ScanOptions,
        cancelled: &AtomicBool,
    ) -> Result<Vec<M>, ScanError> {
        let mut items = Vec::new();
        loop {
            if cancelled.load(Ordering::Relaxed) {
                return Ok(items);
            }
            let page = self.scan::<M>(ctx, opts.clone()).await?;
            items.extend(page.items);
            match page.last_evaluated_key {
                Some(key) => opts.exclusive_start_key = Some(key),
                None => return Ok(items),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::test_support::{widget_executor, Widget};

    #[tokio::test]
    async fn fans_out_and_collects_every_segment() {
        let exec = widget_executor();
        for i in 0..4 {
            exec.put(&Ctx::new(), &Widget::new(format!("p{i}"), "gadget"), false).await.unwrap();
        }

        let items = exec
            .scan_all_segments::<Widget>(&Ctx::new(), 4, None, ScanOptions::default())
            .await
            .unwrap();

        // The fake wire ignores segment/total_segments and returns the
        // whole table for every call, so each of the 4 segments sees all 4
        // items; this test only exercises that fan-out completes and
        // reassembles without panicking or hanging, not per-segment
        // partitioning (the fake store doesn't partition).
        assert_eq!(items.len(), 16);
    }
}
