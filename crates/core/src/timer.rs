use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
pub use tokio::time::Instant;

#[cfg(target_arch = "wasm32")]
pub use instant::Instant;

#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep_until(deadline: Instant) {
    tokio::time::sleep_until(deadline).await;
}

#[cfg(target_arch = "wasm32")]
pub async fn sleep_until(deadline: Instant) {
    let remaining = deadline.saturating_duration_since(Instant::now());
    let ms = remaining.as_millis().min(u32::MAX as u128) as u32;
    gloo_timers::future::TimeoutFuture::new(ms).await;
}

pub async fn sleep(duration: Duration) {
    sleep_until(Instant::now() + duration).await;
}
