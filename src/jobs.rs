//! Worker-count policy resolution.

/// Turn a signed worker-count policy into a pool size in `[1, available]`.
///
/// - `policy > 0`: `min(policy, available)`; never oversubscribe.
/// - `policy == 0`: a single worker.
/// - `policy == -1`: every available unit.
/// - `policy < -1`: `available + policy + 1`, so `-2` leaves one unit idle.
///
/// ```
/// use molprint::jobs::resolve_jobs;
///
/// assert_eq!(resolve_jobs(-1, 8), 8);
/// assert_eq!(resolve_jobs(-2, 8), 7);
/// assert_eq!(resolve_jobs(20, 8), 8);
/// assert_eq!(resolve_jobs(3, 8), 3);
/// ```
#[must_use]
pub fn resolve_jobs(policy: i64, available: usize) -> usize {
    let available = available.max(1);
    let cap = i64::try_from(available).unwrap_or(i64::MAX);
    let jobs = match policy {
        p if p > 0 => p.min(cap),
        0 => 1,
        -1 => cap,
        p => cap.saturating_add(p).saturating_add(1),
    };
    usize::try_from(jobs.clamp(1, cap)).unwrap_or(1)
}

/// Resolve `policy` against the CPUs this process may run on.
#[must_use]
pub fn resolve_jobs_for_host(policy: i64) -> usize {
    resolve_jobs(policy, num_cpus::get())
}
