use ort::session::builder::SessionBuilder;
use ort::Error;

const DEFAULT_MAX_THREADS: usize = 4;

fn parse_env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse::<usize>().ok()
}

fn default_thread_count() -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_MAX_THREADS);
    available.clamp(1, DEFAULT_MAX_THREADS)
}

/// intra-op 线程数：`VEIL_FACE_THREADS`，未设置时取可用核数（最多 4）
pub fn intra_threads() -> usize {
    parse_env_usize("VEIL_FACE_THREADS")
        .filter(|v| *v > 0)
        .unwrap_or_else(default_thread_count)
}

pub fn apply_session_threads(builder: SessionBuilder) -> Result<SessionBuilder, Error> {
    let intra = intra_threads();
    log::info!("[Face] 线程设置: intra={}", intra);

    let builder = builder.with_intra_threads(intra)?;
    let builder = builder.with_inter_threads(1)?;
    builder.with_parallel_execution(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thread_count_is_bounded() {
        let n = default_thread_count();
        assert!((1..=DEFAULT_MAX_THREADS).contains(&n));
    }
}
