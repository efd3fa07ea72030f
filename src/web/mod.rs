//! Live JSON feed of a running simulation.

use std::{
    collections::VecDeque,
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{error, info};

use crate::{
    engine::{EngineBuilder, EngineSettings},
    scenario::Scenario,
    world::WorldSnapshot,
};

#[derive(Clone, Serialize)]
pub struct UiFrame {
    pub snapshot: WorldSnapshot,
    pub completed: bool,
}

#[derive(Clone, Serialize)]
pub struct StateEnvelope {
    pub scenario: String,
    pub total_ticks: u64,
    pub frame: Option<UiFrame>,
    pub completed: bool,
}

#[derive(Clone)]
struct AppState {
    broadcaster: broadcast::Sender<String>,
    latest_frame: Arc<Mutex<Option<UiFrame>>>,
    frames: Arc<Mutex<VecDeque<UiFrame>>>,
    total_ticks: u64,
    scenario_name: String,
    simulation_done: Arc<AtomicBool>,
}

pub struct WebServerConfig {
    pub scenario: Scenario,
    pub ticks: u64,
    pub snapshot_interval: u64,
    pub snapshot_dir: PathBuf,
    pub host: String,
    pub port: u16,
}

/// Frames kept for `/api/frames`; older ones are dropped first.
pub const FRAME_HISTORY: usize = 512;

// A panicking writer must not take the feed down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn publish(
    frame: UiFrame,
    latest: &Mutex<Option<UiFrame>>,
    frames: &Mutex<VecDeque<UiFrame>>,
    tx: &broadcast::Sender<String>,
) {
    *lock(latest) = Some(frame.clone());
    {
        let mut guard = lock(frames);
        match guard.back_mut() {
            Some(last) if frame.completed && last.snapshot.tick == frame.snapshot.tick => {
                *last = frame.clone();
            }
            _ => guard.push_back(frame.clone()),
        }
        while guard.len() > FRAME_HISTORY {
            guard.pop_front();
        }
    }
    if let Ok(payload) = serde_json::to_string(&frame) {
        let _ = tx.send(payload);
    }
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        scenario,
        ticks,
        snapshot_interval,
        snapshot_dir,
        host,
        port,
    } = config;

    let scenario_name = scenario.name.clone();
    let mut world = scenario.build_world()?;
    let settings = EngineSettings {
        snapshot_interval_ticks: snapshot_interval,
        ..EngineSettings::for_scenario(&scenario, snapshot_dir)
    };
    let mut engine = EngineBuilder::standard(settings).build();

    let (tx, _) = broadcast::channel::<String>(512);
    let latest_frame: Arc<Mutex<Option<UiFrame>>> = Arc::new(Mutex::new(None));
    let frames: Arc<Mutex<VecDeque<UiFrame>>> = Arc::new(Mutex::new(VecDeque::new()));
    let simulation_done = Arc::new(AtomicBool::new(false));

    let latest_for_sim = latest_frame.clone();
    let frames_for_sim = frames.clone();
    let done_for_sim = simulation_done.clone();
    let tx_for_sim = tx.clone();
    let name_for_sim = scenario_name.clone();

    let sim_handle = tokio::task::spawn_blocking(move || -> Result<()> {
        let mut last_snapshot = None;
        engine.run_with_hook(&mut world, ticks, |summary, world| {
            let snapshot = world.snapshot(&name_for_sim, summary.total_co2);
            last_snapshot = Some(snapshot.clone());
            let frame = UiFrame {
                snapshot,
                completed: false,
            };
            publish(frame, &latest_for_sim, &frames_for_sim, &tx_for_sim);
        })?;

        done_for_sim.store(true, Ordering::SeqCst);
        let snapshot = last_snapshot
            .unwrap_or_else(|| world.snapshot(&name_for_sim, engine.carbon().level()));
        let frame = UiFrame {
            snapshot,
            completed: true,
        };
        publish(frame, &latest_for_sim, &frames_for_sim, &tx_for_sim);
        Ok(())
    });

    let state = Arc::new(AppState {
        broadcaster: tx.clone(),
        latest_frame,
        frames,
        total_ticks: ticks,
        scenario_name: scenario_name.clone(),
        simulation_done,
    });

    let label = scenario_name.clone();
    tokio::spawn(async move {
        match sim_handle.await {
            Ok(Ok(())) => info!(scenario = %label, "simulation completed"),
            Ok(Err(err)) => error!(scenario = %label, "simulation error: {err:?}"),
            Err(err) => error!(scenario = %label, "simulation task failed: {err:?}"),
        }
    });

    let router = Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/frames", get(all_frames))
        .route("/api/events", get(stream_events))
        .with_state(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    info!(%addr, scenario = %scenario_name, "feed live (Ctrl+C to stop)");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down feed");
}

async fn latest_state(State(state): State<Arc<AppState>>) -> Json<StateEnvelope> {
    let frame = lock(&state.latest_frame).clone();
    Json(StateEnvelope {
        scenario: state.scenario_name.clone(),
        total_ticks: state.total_ticks,
        frame,
        completed: state.simulation_done.load(Ordering::SeqCst),
    })
}

#[derive(Serialize)]
struct FramesResponse {
    scenario: String,
    total_ticks: u64,
    completed: bool,
    frames: Vec<UiFrame>,
}

async fn all_frames(State(state): State<Arc<AppState>>) -> Json<FramesResponse> {
    let frames = lock(&state.frames).iter().cloned().collect();
    Json(FramesResponse {
        scenario: state.scenario_name.clone(),
        total_ticks: state.total_ticks,
        completed: state.simulation_done.load(Ordering::SeqCst),
        frames,
    })
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::EcologyParams;
    use crate::world::initialize_grid;

    fn frame(tick: u64, completed: bool) -> UiFrame {
        let world = initialize_grid(2, 2, 1, EcologyParams::default()).unwrap();
        let mut snapshot = world.snapshot("feed", 0.0);
        snapshot.tick = tick;
        UiFrame {
            snapshot,
            completed,
        }
    }

    #[test]
    fn completion_replaces_the_final_frame() {
        let latest = Mutex::new(None);
        let frames = Mutex::new(VecDeque::new());
        let (tx, mut rx) = broadcast::channel(8);

        publish(frame(1, false), &latest, &frames, &tx);
        publish(frame(2, false), &latest, &frames, &tx);
        publish(frame(2, true), &latest, &frames, &tx);

        let frames = frames.into_inner().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].completed);
        assert!(latest.into_inner().unwrap().unwrap().completed);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn frame_history_is_bounded() {
        let latest = Mutex::new(None);
        let frames = Mutex::new(VecDeque::new());
        let (tx, _rx) = broadcast::channel(8);
        let template = frame(0, false);
        for tick in 1..=(FRAME_HISTORY as u64 + 5) {
            let mut next = template.clone();
            next.snapshot.tick = tick;
            publish(next, &latest, &frames, &tx);
        }

        let frames = frames.into_inner().unwrap();
        assert_eq!(frames.len(), FRAME_HISTORY);
        assert_eq!(frames.front().unwrap().snapshot.tick, 6);
        assert_eq!(
            frames.back().unwrap().snapshot.tick,
            FRAME_HISTORY as u64 + 5
        );
    }
}
