//! 章节抓取协调器。
//!
//! 并发模式下使用固定数量的工作线程从队列中取章节地址；顺序模式下按序号逐章抓取。
//! 单章失败只记录在结果中，不影响其他章节。

use std::collections::HashSet;
use std::thread;
use std::time::Instant;

use crossbeam_channel as channel;
use tracing::{debug, info, warn};

use super::error::{FetchError, HarvestError};
use super::models::{
    ChapterContent, ChapterLocation, HarvestMode, HarvestOptions, HarvestResult, Ordinal,
};
use super::progress::{StatusSink, failure_message, success_message};
use crate::base_system::logging::catch_recoverable;

/// 抓取单章内容的外部实现。
pub trait ChapterFetcher: Send + Sync {
    fn fetch(&self, location: &ChapterLocation) -> Result<ChapterContent, FetchError>;
}

impl<F> ChapterFetcher for F
where
    F: Fn(&ChapterLocation) -> Result<ChapterContent, FetchError> + Send + Sync,
{
    fn fetch(&self, location: &ChapterLocation) -> Result<ChapterContent, FetchError> {
        self(location)
    }
}

/// 抓取全部章节并按序号汇总。
///
/// 仅在输入本身有问题（序号重复，或要求非空但列表为空）时返回 `Err`；
/// 函数返回时所有已启动的抓取都已结束。
pub fn harvest(
    locations: &[ChapterLocation],
    fetcher: &dyn ChapterFetcher,
    options: HarvestOptions,
    sink: Option<&dyn StatusSink>,
) -> Result<HarvestResult, HarvestError> {
    validate(locations, options.require_chapters)?;
    if locations.is_empty() {
        return Ok(HarvestResult::default());
    }

    let start = Instant::now();
    info!(target: "harvest", mode = ?options.mode, chapters = locations.len(), "开始抓取章节");

    let result = match options.mode {
        HarvestMode::Sequential => run_sequential(locations, fetcher, sink),
        HarvestMode::Concurrent => run_concurrent(locations, fetcher, options.max_workers, sink),
    }
    .finish();

    info!(
        target: "harvest",
        "抓取结束：成功 {} 章，失败 {} 章，用时 {:.1}s",
        result.successes.len(),
        result.failures.len(),
        start.elapsed().as_secs_f32()
    );
    Ok(result)
}

fn validate(locations: &[ChapterLocation], require_chapters: bool) -> Result<(), HarvestError> {
    if locations.is_empty() && require_chapters {
        return Err(HarvestError::EmptyInput);
    }
    let mut seen = HashSet::with_capacity(locations.len());
    for loc in locations {
        if !seen.insert(loc.ordinal()) {
            return Err(HarvestError::MalformedInput {
                ordinal: loc.ordinal(),
            });
        }
    }
    Ok(())
}

fn run_sequential(
    locations: &[ChapterLocation],
    fetcher: &dyn ChapterFetcher,
    sink: Option<&dyn StatusSink>,
) -> HarvestResult {
    let mut ordered: Vec<&ChapterLocation> = locations.iter().collect();
    ordered.sort_by_key(|loc| loc.ordinal());

    let mut result = HarvestResult::default();
    for loc in ordered {
        let outcome = fetch_one(fetcher, loc, sink);
        result.record(loc.ordinal(), outcome);
    }
    result
}

fn run_concurrent(
    locations: &[ChapterLocation],
    fetcher: &dyn ChapterFetcher,
    max_workers: usize,
    sink: Option<&dyn StatusSink>,
) -> HarvestResult {
    let total = locations.len();
    let workers = if max_workers == 0 {
        total
    } else {
        max_workers.min(total)
    };
    debug!(target: "harvest", workers, total, "启动抓取工作线程");

    let (tx, rx) = channel::unbounded::<&ChapterLocation>();
    let (done_tx, done_rx) = channel::unbounded::<(Ordinal, Result<ChapterContent, FetchError>)>();
    for loc in locations {
        // rx 仍在本函数中持有，发送不会失败。
        let _ = tx.send(loc);
    }
    drop(tx);

    let mut result = HarvestResult::default();
    thread::scope(|s| {
        let mut spawned = 0usize;
        for idx in 0..workers {
            let rx = rx.clone();
            let done_tx = done_tx.clone();
            let spawn = thread::Builder::new()
                .name(format!("harvest-{idx}"))
                .spawn_scoped(s, move || {
                    for loc in rx.iter() {
                        let outcome = fetch_one(fetcher, loc, sink);
                        if done_tx.send((loc.ordinal(), outcome)).is_err() {
                            return;
                        }
                    }
                });
            match spawn {
                Ok(_) => spawned += 1,
                Err(err) => {
                    warn!(target: "harvest", error = %err, "创建工作线程失败，使用已有线程继续");
                    break;
                }
            }
        }
        drop(done_tx);

        if spawned == 0 {
            // 一个线程都没起来时，在当前线程里把队列消化完。
            for loc in rx.try_iter() {
                let outcome = fetch_one(fetcher, loc, sink);
                result.record(loc.ordinal(), outcome);
            }
            return;
        }
        drop(rx);

        for (ordinal, outcome) in done_rx.iter() {
            result.record(ordinal, outcome);
        }
    });

    result
}

fn fetch_one(
    fetcher: &dyn ChapterFetcher,
    location: &ChapterLocation,
    sink: Option<&dyn StatusSink>,
) -> Result<ChapterContent, FetchError> {
    let outcome = catch_recoverable(|| fetcher.fetch(location))
        .unwrap_or_else(|payload| Err(FetchError::new(panic_message(payload.as_ref()))));

    let message = match &outcome {
        Ok(content) => {
            debug!(target: "harvest", ordinal = location.ordinal(), name = content.name(), "章节完成");
            success_message(content)
        }
        Err(err) => {
            warn!(target: "harvest", ordinal = location.ordinal(), address = location.address(), error = %err, "章节抓取失败");
            failure_message(location, err)
        }
    };
    if let Some(sink) = sink
        && let Err(payload) = catch_recoverable(|| sink.report(&message))
    {
        warn!(target: "harvest", ordinal = location.ordinal(), "状态上报失败：{}", panic_message(payload.as_ref()));
    }
    outcome
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("fetch panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("fetch panicked: {s}")
    } else {
        "fetch panicked".to_string()
    }
}
