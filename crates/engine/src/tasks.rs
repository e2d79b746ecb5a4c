//! Background-task spawning: the stale-session reaper and the pointer
//! auditor.  The loop bodies live on [`Engine`] (`reap_stale_once`,
//! `audit_pointers_once`) so they can be driven directly in tests.

use std::sync::Arc;

use crate::Engine;

/// Spawn the two long-running reconciliation loops.  Call after
/// [`Engine::restore_on_startup`].
pub fn spawn_background_tasks(engine: &Arc<Engine>) {
    // ── Stale-session reaper ─────────────────────────────────────────
    {
        let engine = engine.clone();
        let period = std::time::Duration::from_secs(engine.config.sessions.reaper_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match engine.reap_stale_once().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(reaped = n, "stale sessions closed"),
                    Err(e) => tracing::warn!(error = %e, "stale-session reap failed"),
                }
            }
        });
    }

    // ── Pointer auditor ──────────────────────────────────────────────
    {
        let engine = engine.clone();
        let period = std::time::Duration::from_secs(engine.config.sessions.audit_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match engine.audit_pointers_once() {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(repaired = n, "orphaned pointers cleared"),
                    Err(e) => tracing::warn!(error = %e, "pointer audit failed"),
                }
            }
        });
    }

    tracing::info!("background tasks spawned");
}
