use std::time::Duration;

use clap::Parser;
use tokio::sync::{oneshot, watch};

use super::*;
use crate::args::SockmeArgs;
use crate::error::{AppError, AppResult, ConfigError, ValidationError};
use crate::ramp::{AdmissionOutcome, OpenTally};
use crate::shutdown_handlers::shutdown_channel;
use crate::test_support::{ServerBehavior, TEST_TIMEOUT, run_async_test, spawn_ws_server};
use crate::worker::protocol::{ConnectionId, Event};

const URL: &str = "ws://orchestrator.test";

fn new_state(ramps: usize) -> AppResult<(RunState, watch::Receiver<ProgressSnapshot>)> {
    let (tx, rx) = watch::channel(ProgressSnapshot::default());
    Ok((RunState::new(3, ramps, 1, tx)?, rx))
}

fn admit(state: &mut RunState, ordinal: u64) -> (ConnectionId, oneshot::Receiver<AdmissionOutcome>) {
    let id = ConnectionId::new(URL, ordinal);
    let (opened, rx) = oneshot::channel();
    feed(state, RunSignal::Admitted {
        id: id.clone(),
        opened,
    });
    (id, rx)
}

fn feed(state: &mut RunState, signal: RunSignal) {
    let _flow = state.handle(signal);
}

fn event(event: Event) -> RunSignal {
    RunSignal::Event { worker: 0, event }
}

fn open(id: &ConnectionId) -> RunSignal {
    event(Event::Open {
        id: id.clone(),
        duration: 1,
    })
}

fn close(id: &ConnectionId) -> RunSignal {
    event(Event::Close {
        id: id.clone(),
        read: 0,
        send: 0,
    })
}

fn ramp_complete() -> RunSignal {
    RunSignal::RampComplete {
        url: URL.to_owned(),
        tally: OpenTally::default(),
    }
}

fn args(extra: &[&str]) -> AppResult<SockmeArgs> {
    let mut argv = vec!["sockme"];
    argv.extend_from_slice(extra);
    SockmeArgs::try_parse_from(argv).map_err(AppError::from)
}

#[test]
fn run_drains_only_after_every_admission_closes() -> AppResult<()> {
    let (mut state, progress) = new_state(1)?;
    let ids: Vec<ConnectionId> = (1..=3).map(|ordinal| admit(&mut state, ordinal).0).collect();

    for id in &ids {
        if state.handle(open(id)) != RunFlow::Continue {
            return Err(AppError::validation("Opens must not drain the run"));
        }
    }
    if state.handle(ramp_complete()) != RunFlow::Continue {
        return Err(AppError::validation("Ramp completion with open connections"));
    }
    if *progress.borrow() != (ProgressSnapshot { created: 3, active: 3 }) {
        return Err(AppError::validation(format!(
            "Unexpected progress {:?}",
            *progress.borrow()
        )));
    }

    let mut flows = Vec::new();
    for id in &ids {
        flows.push(state.handle(close(id)));
    }
    if flows != vec![RunFlow::Continue, RunFlow::Continue, RunFlow::Drained] {
        return Err(AppError::validation(format!("Unexpected flows {:?}", flows)));
    }
    if state.outstanding() != 0 || progress.borrow().active != 0 {
        return Err(AppError::validation("Expected nothing outstanding"));
    }
    Ok(())
}

#[test]
fn empty_ledger_between_batches_does_not_end_the_run() -> AppResult<()> {
    let (mut state, _progress) = new_state(1)?;
    let (first, _first_rx) = admit(&mut state, 2);
    feed(&mut state, open(&first));
    if state.handle(close(&first)) != RunFlow::Continue {
        return Err(AppError::validation("Run drained while the ramp was admitting"));
    }
    let (second, _second_rx) = admit(&mut state, 1);
    feed(&mut state, close(&second));
    if state.handle(ramp_complete()) != RunFlow::Drained {
        return Err(AppError::validation("Expected drain once the ramp completed"));
    }
    Ok(())
}

#[test]
fn open_waiters_are_settled_by_open_or_close() -> AppResult<()> {
    let (mut state, _progress) = new_state(1)?;
    let (opened_id, mut opened_rx) = admit(&mut state, 2);
    let (failed_id, mut failed_rx) = admit(&mut state, 1);

    feed(&mut state, open(&opened_id));
    feed(&mut state, event(Event::Error {
        id: failed_id.clone(),
        message: "connection refused".to_owned(),
    }));
    feed(&mut state, close(&failed_id));

    if opened_rx.try_recv().ok() != Some(AdmissionOutcome::Opened) {
        return Err(AppError::validation("Open should settle as opened"));
    }
    if failed_rx.try_recv().ok() != Some(AdmissionOutcome::Abandoned) {
        return Err(AppError::validation("Close without open should settle as abandoned"));
    }
    Ok(())
}

#[test]
fn rejected_admissions_count_as_errors_and_settle() -> AppResult<()> {
    let (mut state, _progress) = new_state(1)?;
    let (id, mut rx) = admit(&mut state, 1);
    feed(&mut state, RunSignal::Rejected {
        id,
        reason: "No workers available for dispatch.".to_owned(),
    });
    if state.handle(ramp_complete()) != RunFlow::Drained {
        return Err(AppError::validation("Rejected admission should not stay outstanding"));
    }
    if rx.try_recv().ok() != Some(AdmissionOutcome::Abandoned) {
        return Err(AppError::validation("Rejected admission should be abandoned"));
    }
    let report = state
        .finalize()
        .ok_or_else(|| AppError::validation("Missing report"))?;
    if report.summary.errors != 1 {
        return Err(AppError::validation("Expected one error"));
    }
    Ok(())
}

#[test]
fn shutdown_and_finalization_happen_once() -> AppResult<()> {
    let (mut state, _progress) = new_state(1)?;
    let (id, _rx) = admit(&mut state, 1);
    feed(&mut state, open(&id));

    if !state.request_shutdown() || state.request_shutdown() {
        return Err(AppError::validation("Shutdown should only start once"));
    }
    feed(&mut state, ramp_complete());
    if state.handle(close(&id)) != RunFlow::Drained {
        return Err(AppError::validation("Expected drained after shutdown"));
    }

    let first = state.finalize();
    if state.request_shutdown() || state.finalize().is_some() {
        return Err(AppError::validation("Finalization must happen exactly once"));
    }
    let report = first.ok_or_else(|| AppError::validation("Missing report"))?;
    if report.summary.connected != 1 || report.counters.counter("socket_closed") != 1 {
        return Err(AppError::validation(format!("Unexpected report {:?}", report)));
    }
    Ok(())
}

#[test]
fn exited_workers_end_the_run() -> AppResult<()> {
    let (mut state, _progress) = new_state(1)?;
    let (_id, _rx) = admit(&mut state, 1);
    if state.handle(RunSignal::WorkerExited { worker: 0 }) != RunFlow::WorkersGone {
        return Err(AppError::validation("Expected the run to stop without workers"));
    }
    Ok(())
}

#[test]
fn run_config_requires_websocket_urls() -> AppResult<()> {
    match RunConfig::from_args(&args(&[])?) {
        Err(AppError::Validation(ValidationError::MissingUrls)) => {}
        other => return Err(AppError::validation(format!("Unexpected {:?}", other))),
    }
    match RunConfig::from_args(&args(&["http://example.com"])?) {
        Err(AppError::Validation(ValidationError::UnsupportedScheme { scheme, .. }))
            if scheme == "http" => {}
        other => return Err(AppError::validation(format!("Unexpected {:?}", other))),
    }
    match RunConfig::from_args(&args(&["not a url"])?) {
        Err(AppError::Validation(ValidationError::InvalidUrl { .. })) => {}
        other => return Err(AppError::validation(format!("Unexpected {:?}", other))),
    }

    let config = RunConfig::from_args(&args(&[
        "-A",
        "50",
        "-C",
        "10",
        "-I",
        "4",
        "-B",
        "64",
        "ws://a.test",
        "wss://b.test/socket",
    ])?)?;
    if config.scheduled() != 100 || config.plan.batches() != 5 {
        return Err(AppError::validation("Unexpected plan"));
    }
    if config.plan.delay() != Duration::from_secs(1) || config.template.buffer != Some(64) {
        return Err(AppError::validation("Unexpected pacing or buffer"));
    }
    Ok(())
}

#[test]
fn run_config_caps_payload_sizes() -> AppResult<()> {
    let limit = MAX_PAYLOAD_BYTES.to_string();
    let over = MAX_PAYLOAD_BYTES.saturating_add(1).to_string();
    let range = format!("1,{}", over);
    for argv in [
        vec!["-B", "18446744073709551615", "ws://a.test"],
        vec!["-B", over.as_str(), "ws://a.test"],
        vec!["-p", range.as_str(), "ws://a.test"],
    ] {
        match RunConfig::from_args(&args(&argv)?) {
            Err(AppError::Validation(ValidationError::PayloadTooLarge { .. })) => {}
            other => return Err(AppError::validation(format!("Unexpected {:?}", other))),
        }
    }
    let config = RunConfig::from_args(&args(&["-B", limit.as_str(), "ws://a.test"])?)?;
    if config.template.buffer != Some(MAX_PAYLOAD_BYTES) {
        return Err(AppError::validation("Expected the limit itself to be accepted"));
    }
    Ok(())
}

#[test]
fn run_config_loads_the_generator_file() -> AppResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("payload.txt");
    std::fs::write(&path, "{\"event\":\"tick\"}\n")?;
    let path = path.to_string_lossy().into_owned();

    let config = RunConfig::from_args(&args(&["-G", path.as_str(), "ws://a.test"])?)?;
    match config.worker_options.generator.as_ref() {
        Some(source) if source.text() == "{\"event\":\"tick\"}" => {}
        other => return Err(AppError::validation(format!("Unexpected {:?}", other))),
    }

    let missing = dir.path().join("missing.txt").to_string_lossy().into_owned();
    match RunConfig::from_args(&args(&["-G", missing.as_str(), "ws://a.test"])?) {
        Err(AppError::Config(ConfigError::ReadGenerator { .. })) => Ok(()),
        other => Err(AppError::validation(format!("Unexpected {:?}", other))),
    }
}

fn thread_config(url: &str, extra: &[&str]) -> AppResult<RunConfig> {
    let mut argv = vec!["--worker-mode", "thread", "-W", "2", "-L"];
    argv.extend_from_slice(extra);
    argv.push(url);
    RunConfig::from_args(&args(&argv)?)
}

#[test]
fn run_against_echo_server_closes_every_connection() -> AppResult<()> {
    run_async_test(async {
        let (url, server) = spawn_ws_server(ServerBehavior::Echo).await?;
        let config = thread_config(&url, &["-A", "6", "-C", "3", "-D", "1", "-F", "20,40"])?;
        let (shutdown_tx, _) = shutdown_channel();

        let outcome = tokio::time::timeout(TEST_TIMEOUT, run(config, &shutdown_tx))
            .await
            .map_err(|_err| AppError::validation("Run did not finish"))??;
        server.abort();

        let summary = &outcome.report.summary;
        if outcome.reason != StopReason::Drained || outcome.report.outstanding != 0 {
            return Err(AppError::validation(format!(
                "Expected a drained run, got {:?}",
                outcome.reason
            )));
        }
        if summary.connected != 6 || summary.has_failures() {
            return Err(AppError::validation(format!("Unexpected summary {:?}", summary)));
        }
        if summary.tx.messages == 0 || summary.established_ms.is_none() {
            return Err(AppError::validation("Expected traffic and an established mark"));
        }
        if outcome.report.counters.counter("socket_closed") != 6 {
            return Err(AppError::validation("Expected six close counters"));
        }
        Ok(())
    })
}

#[test]
fn run_ends_early_when_every_connection_drops() -> AppResult<()> {
    run_async_test(async {
        let (url, server) = spawn_ws_server(ServerBehavior::CloseAfterFirst(4000)).await?;
        let config = thread_config(&url, &["-A", "4", "-D", "60", "-F", "10,20"])?;
        let (shutdown_tx, _) = shutdown_channel();

        let outcome = tokio::time::timeout(TEST_TIMEOUT, run(config, &shutdown_tx))
            .await
            .map_err(|_err| AppError::validation("Run did not end early"))??;
        server.abort();

        let summary = &outcome.report.summary;
        if outcome.reason != StopReason::Drained || summary.disconnected != 4 {
            return Err(AppError::validation(format!("Unexpected summary {:?}", summary)));
        }
        if outcome.report.counters.counter("socket_disconnect.going_away") != 4 {
            return Err(AppError::validation("Expected disconnect counters by reason"));
        }
        Ok(())
    })
}

#[test]
fn external_shutdown_stops_the_run() -> AppResult<()> {
    run_async_test(async {
        let (url, server) = spawn_ws_server(ServerBehavior::Echo).await?;
        let config = thread_config(&url, &["-A", "3", "-D", "60"])?;
        let (shutdown_tx, _) = shutdown_channel();

        let trigger = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(trigger.send(()));
        });
        let outcome = tokio::time::timeout(TEST_TIMEOUT, run(config, &shutdown_tx))
            .await
            .map_err(|_err| AppError::validation("Run ignored shutdown"))??;
        server.abort();

        if outcome.reason != StopReason::Drained || outcome.report.summary.connected != 3 {
            return Err(AppError::validation(format!(
                "Unexpected outcome {:?}",
                outcome.reason
            )));
        }
        Ok(())
    })
}

#[test]
fn unanswered_close_frames_still_drain_before_the_timeout() -> AppResult<()> {
    run_async_test(async {
        let (url, server) = spawn_ws_server(ServerBehavior::IgnoreClose).await?;
        let config = thread_config(&url, &["-A", "3", "-D", "1", "--drain-timeout", "2s"])?;
        let (shutdown_tx, _) = shutdown_channel();

        let outcome = tokio::time::timeout(TEST_TIMEOUT, run(config, &shutdown_tx))
            .await
            .map_err(|_err| AppError::validation("Run did not finish"))??;
        server.abort();

        if outcome.reason != StopReason::Drained || outcome.report.outstanding != 0 {
            return Err(AppError::validation(format!(
                "Expected every close inside the drain, got {:?} with {} outstanding",
                outcome.reason, outcome.report.outstanding
            )));
        }
        if outcome.report.counters.counter("socket_closed") != 3
            || outcome.report.summary.tx.total_bytes == 0
        {
            return Err(AppError::validation(format!(
                "Unexpected report {:?}",
                outcome.report
            )));
        }
        Ok(())
    })
}
