//! Background loops: awareness update, pattern recognition, insight
//! generation, and metrics emission. Each runs in its own task bound to
//! the process cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::CognitiveEngine;

pub fn spawn_all(engine: Arc<CognitiveEngine>, cancel: CancellationToken) {
    let config = engine.config().clone();

    spawn_interval(
        "awareness",
        Duration::from_secs(config.awareness_interval_secs),
        cancel.clone(),
        {
            let engine = engine.clone();
            move || {
                let level = engine.awareness_tick();
                tracing::debug!(awareness_level = level, "awareness updated");
            }
        },
    );

    spawn_interval(
        "patterns",
        Duration::from_secs(config.pattern_interval_secs),
        cancel.clone(),
        {
            let engine = engine.clone();
            move || engine.pattern_tick()
        },
    );

    spawn_interval(
        "insights",
        Duration::from_secs(config.insight_interval_secs),
        cancel.clone(),
        {
            let engine = engine.clone();
            move || engine.insight_tick()
        },
    );

    spawn_interval(
        "metrics",
        Duration::from_secs(config.metrics_interval_secs),
        cancel,
        move || {
            let stats = engine.stats();
            tracing::info!(
                patterns = stats["patterns"].as_u64().unwrap_or(0),
                insights = stats["insights"].as_u64().unwrap_or(0),
                reflections = stats["reflections"].as_u64().unwrap_or(0),
                awareness_level = stats["awareness_level"].as_f64().unwrap_or(0.0),
                learning_rate = stats["learning_rate"].as_f64().unwrap_or(0.0),
                experiences = stats["experiences"].as_u64().unwrap_or(0),
                "cognitive state"
            );
        },
    );
}

fn spawn_interval(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: impl FnMut() + Send + 'static,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        // The first tick fires immediately; skip it so loops measure
        // steady state, not startup.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => tick(),
                _ = cancel.cancelled() => {
                    tracing::debug!(loop_name = name, "background loop stopped");
                    return;
                }
            }
        }
    });
}
