use futures::{stream, StreamExt};

/// Runs `fn` over `items` with at most `limit` inflight at once, preserving
/// input order in the returned `Vec`.
pub async fn map_limit<T, R, Fut, F>(items: Vec<T>, limit: usize, f: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    Fut: std::future::Future<Output = R> + Send,
    F: Fn(T) -> Fut + Send + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let limit = limit.max(1);

    stream::iter(items)
        .map(|item| f(item))
        .buffered(limit)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let result = map_limit(Vec::<u32>::new(), 4, |x| async move { x }).await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn preserves_input_order() {
        let items: Vec<u32> = (0..20).collect();
        let result = map_limit(items.clone(), 3, |x| async move {
            tokio::time::sleep(std::time::Duration::from_millis((20 - x) as u64 % 5)).await;
            x * 2
        })
        .await;
        let expected: Vec<u32> = items.iter().map(|x| x * 2).collect();
        assert_eq!(result, expected);
    }

    #[tokio::test]
    async fn concurrency_equals_item_count_when_limit_is_large() {
        let inflight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = (0..8).collect();
        let n = items.len();

        let inflight_c = inflight.clone();
        let max_seen_c = max_seen.clone();
        let _ = map_limit(items, n, move |x| {
            let inflight = inflight_c.clone();
            let max_seen = max_seen_c.clone();
            async move {
                let cur = inflight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(cur, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                inflight.fetch_sub(1, Ordering::SeqCst);
                x
            }
        })
        .await;

        assert_eq!(max_seen.load(Ordering::SeqCst), n);
    }
}
