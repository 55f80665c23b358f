use async_trait::async_trait;
use soltix_wallet_core::transport::LinkOpener;
use tracing::debug;

/// Opens wallet links from the page. Custom schemes navigate the current
/// tab so the OS can hand off to the app; web URLs get a new tab.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowOpener;

#[async_trait(?Send)]
impl LinkOpener for WindowOpener {
    async fn open(&self, url: &str) -> Result<(), String> {
        let window = web_sys::window().ok_or_else(|| "no window".to_string())?;
        debug!("[wallet] opening {}", url);

        if url.starts_with("https://") || url.starts_with("http://") {
            match window.open_with_url_and_target(url, "_blank") {
                Ok(Some(_)) => Ok(()),
                Ok(None) => Err("popup blocked".to_string()),
                Err(e) => Err(format!("{e:?}")),
            }
        } else {
            window
                .location()
                .set_href(url)
                .map_err(|e| format!("{e:?}"))
        }
    }
}
