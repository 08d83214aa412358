use std::sync::atomic::{AtomicU64, Ordering};

/// Base backoff unit, milliseconds; linear backoff is `base * (attempt + 1)`.
static BACKOFF_BASE_MS: AtomicU64 = AtomicU64::new(200);

pub fn set_backoff_ms(ms: u64) {
    BACKOFF_BASE_MS.store(ms, Ordering::SeqCst);
}

pub fn get_backoff_ms() -> u64 {
    BACKOFF_BASE_MS.load(Ordering::SeqCst)
}

/// Run `op` up to `max_attempts` times, sleeping a linearly increasing
/// backoff between attempts, retrying only while `is_retriable` holds for
/// the returned error. Returns the last error if every attempt failed.
pub fn retry_operation<F, T, E>(
    max_attempts: u32,
    is_retriable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
{
    let mut attempt = 0u32;
    loop {
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts || !is_retriable(&e) {
                    return Err(e);
                }
                let backoff = get_backoff_ms() * attempt as u64;
                std::thread::sleep(std::time::Duration::from_millis(backoff));
            }
        }
    }
}

/// Human-readable byte count, used by log summaries and the CLI.
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GiB", b / GB)
    } else if b >= MB {
        format!("{:.2} MiB", b / MB)
    } else if b >= KB {
        format!("{:.2} KiB", b / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Current time as seconds since epoch, the unit every timestamp in the
/// data model (`mtime`, `ctime`, `last_retry_time`, ...) is kept in.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn retry_operation_stops_on_non_retriable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &'static str> = retry_operation(
            5,
            |_e: &&str| false,
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("nope")
            },
        );
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_operation_retries_until_success() {
        set_backoff_ms(1);
        let calls = AtomicU32::new(0);
        let result: Result<u32, &'static str> = retry_operation(
            5,
            |_e: &&str| true,
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                if attempt < 2 { Err("transient") } else { Ok(attempt) }
            },
        );
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn human_bytes_formats_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KiB");
    }
}
