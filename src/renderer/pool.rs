use super::{ChromiumRenderer, NoopRenderer, RenderContext, Renderer};
use crate::config::BrowserConfig;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};

type Launcher = Box<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Renderer>>> + Send + Sync>;

/// Shared browser with a bounded number of open pages
///
/// The renderer is launched on the first lease, not at construction, so
/// engines that never render never start a browser. A failed launch is not
/// cached; the next lease tries again.
pub struct BrowserPool {
    renderer: OnceCell<Arc<dyn Renderer>>,
    launcher: Launcher,
    slots: Arc<Semaphore>,
    max_contexts: usize,
}

impl BrowserPool {
    /// Pool that launches headless Chromium on demand
    ///
    /// Falls back to a [`NoopRenderer`] pool when the browser is disabled.
    pub fn chromium(config: &BrowserConfig, user_agent: impl Into<String>) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let executable: Option<PathBuf> = config.executable.clone();
        let user_agent = user_agent.into();
        let launcher: Launcher = Box::new(move || -> BoxFuture<'static, Result<Arc<dyn Renderer>>> {
            let executable = executable.clone();
            let user_agent = user_agent.clone();
            Box::pin(async move {
                let renderer =
                    ChromiumRenderer::launch(executable.as_deref(), &user_agent).await?;
                Ok(Arc::new(renderer) as Arc<dyn Renderer>)
            })
        });

        Self::with_launcher(launcher, config.max_contexts)
    }

    /// Pool over an already running renderer
    pub fn with_renderer(renderer: Arc<dyn Renderer>, max_contexts: usize) -> Self {
        let pool = Self::with_launcher(
            Box::new(|| -> BoxFuture<'static, Result<Arc<dyn Renderer>>> {
                Box::pin(async { Err(anyhow::anyhow!("renderer not launchable")) })
            }),
            max_contexts,
        );
        Self {
            renderer: OnceCell::new_with(Some(renderer)),
            ..pool
        }
    }

    /// Pool whose leases always fail
    pub fn disabled() -> Self {
        Self::with_renderer(Arc::new(NoopRenderer), 1)
    }

    fn with_launcher(launcher: Launcher, max_contexts: usize) -> Self {
        let max_contexts = max_contexts.max(1);
        Self {
            renderer: OnceCell::new(),
            launcher,
            slots: Arc::new(Semaphore::new(max_contexts)),
            max_contexts,
        }
    }

    /// Waits for a free slot and opens a page
    ///
    /// The slot is held until the lease is released or dropped.
    pub async fn lease(&self) -> Result<PageLease> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .context("browser pool closed")?;

        let renderer = self
            .renderer
            .get_or_try_init(|| (self.launcher)())
            .await?;

        let context = renderer.new_context().await?;

        Ok(PageLease {
            context: Some(context),
            permit: Some(permit),
        })
    }

    /// Pages currently leased
    pub fn in_use(&self) -> usize {
        self.max_contexts - self.slots.available_permits()
    }

    pub fn max_contexts(&self) -> usize {
        self.max_contexts
    }

    /// Shuts the renderer down if it was ever launched
    pub async fn shutdown(&self) -> Result<()> {
        self.slots.close();
        if let Some(renderer) = self.renderer.get() {
            renderer.shutdown().await?;
        }
        Ok(())
    }
}

/// An open browser page holding one pool slot
///
/// Call [`PageLease::release`] to close the page in line. A lease dropped
/// without release (timeout, cancellation, early return) closes its page on a
/// background task and frees the slot once the page is closed.
pub struct PageLease {
    context: Option<Box<dyn RenderContext>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PageLease {
    pub fn page(&mut self) -> Result<&mut (dyn RenderContext + 'static)> {
        self.context
            .as_deref_mut()
            .context("browser page already released")
    }

    /// Closes the page and frees the slot
    pub async fn release(mut self) {
        if let Some(context) = self.context.take() {
            if let Err(e) = context.close().await {
                tracing::debug!("Failed to close browser page: {}", e);
            }
        }
        self.permit.take();
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        let permit = self.permit.take();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = context.close().await;
                    drop(permit);
                });
            }
            Err(_) => drop(permit),
        }
    }
}
