//! CPU and heap profiling endpoints.
//!
//! # Design Decisions
//! - CPU sampling runs on a blocking worker; the profiler is process-wide so
//!   only one profile can run at a time
//! - Heap data comes from jemalloc's own statistics, refreshed per request
//! - Platforms without the profiler or jemalloc answer 501

use std::time::Duration;

use axum::{
    extract::Query,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROFILE_SECS: u64 = 30;
pub const MAX_PROFILE_SECS: u64 = 120;

/// Why a profile could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("a CPU profile is already running")]
    Busy,

    #[error("profiling is not supported on this platform")]
    Unsupported,

    #[error("profiler failed: {0}")]
    Profiler(String),

    #[error("allocator statistics unavailable: {0}")]
    Allocator(String),
}

impl IntoResponse for ProfileError {
    fn into_response(self) -> Response {
        let status = match self {
            ProfileError::Busy => StatusCode::CONFLICT,
            ProfileError::Unsupported => StatusCode::NOT_IMPLEMENTED,
            ProfileError::Profiler(_) | ProfileError::Allocator(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfileParams {
    #[serde(default = "default_profile_secs")]
    pub seconds: u64,
}

fn default_profile_secs() -> u64 {
    DEFAULT_PROFILE_SECS
}

/// Allocator counters in bytes.
#[derive(Debug, Serialize)]
pub struct HeapStats {
    pub allocated_bytes: usize,
    pub active_bytes: usize,
    pub resident_bytes: usize,
    pub mapped_bytes: usize,
    pub retained_bytes: usize,
}

/// Sample the process for `?seconds=N` and answer with an SVG flamegraph.
pub async fn get_cpu_profile(Query(params): Query<ProfileParams>) -> Response {
    let seconds = params.seconds.clamp(1, MAX_PROFILE_SECS);
    tracing::info!(seconds, "CPU profile requested");

    match tokio::task::spawn_blocking(move || cpu_profile(Duration::from_secs(seconds))).await {
        Ok(Ok(svg)) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Ok(Err(error)) => {
            tracing::warn!(error = %error, "CPU profile failed");
            error.into_response()
        }
        Err(join) => ProfileError::Profiler(join.to_string()).into_response(),
    }
}

pub async fn get_heap_profile() -> Response {
    match heap_stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(error) => error.into_response(),
    }
}

#[cfg(unix)]
fn cpu_profile(duration: Duration) -> Result<Vec<u8>, ProfileError> {
    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(99)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()
        .map_err(|e| match e {
            pprof::Error::Running => ProfileError::Busy,
            other => ProfileError::Profiler(other.to_string()),
        })?;

    std::thread::sleep(duration);

    let report = guard
        .report()
        .build()
        .map_err(|e| ProfileError::Profiler(e.to_string()))?;
    let mut svg = Vec::new();
    report
        .flamegraph(&mut svg)
        .map_err(|e| ProfileError::Profiler(e.to_string()))?;
    Ok(svg)
}

#[cfg(not(unix))]
fn cpu_profile(_duration: Duration) -> Result<Vec<u8>, ProfileError> {
    Err(ProfileError::Unsupported)
}

#[cfg(not(target_env = "msvc"))]
fn heap_stats() -> Result<HeapStats, ProfileError> {
    use tikv_jemalloc_ctl::{epoch, stats};

    let read = |result: Result<usize, tikv_jemalloc_ctl::Error>| {
        result.map_err(|e| ProfileError::Allocator(e.to_string()))
    };

    // Counters are cached until the epoch moves.
    epoch::advance().map_err(|e| ProfileError::Allocator(e.to_string()))?;
    Ok(HeapStats {
        allocated_bytes: read(stats::allocated::read())?,
        active_bytes: read(stats::active::read())?,
        resident_bytes: read(stats::resident::read())?,
        mapped_bytes: read(stats::mapped::read())?,
        retained_bytes: read(stats::retained::read())?,
    })
}

#[cfg(target_env = "msvc")]
fn heap_stats() -> Result<HeapStats, ProfileError> {
    Err(ProfileError::Unsupported)
}
