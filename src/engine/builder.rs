use super::{Engine, Inner};
use crate::cache::{ResultCache, SingleFlight};
use crate::config::Config;
use crate::fetch::{Fetcher, RenderedFetcher, StaticFetcher};
use crate::model::FetchMethod;
use crate::output::{JsonlSink, NullSink, ResultSink};
use crate::renderer::{BrowserPool, Renderer};
use crate::scheduler::Scheduler;
use crate::strategy::StrategySelector;
use crate::HarvestError;
use std::sync::Arc;

/// Assembles an [`Engine`] from configuration plus optional overrides
///
/// Without overrides the engine uses headless Chromium for rendered fetches
/// and the JSON-lines sink when `output.results-path` is set.
pub struct EngineBuilder {
    config: Config,
    renderer: Option<Arc<dyn Renderer>>,
    sink: Option<Arc<dyn ResultSink>>,
    static_fetcher: Option<Arc<dyn Fetcher>>,
    rendered_fetcher: Option<Arc<dyn Fetcher>>,
}

impl EngineBuilder {
    pub(super) fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            sink: None,
            static_fetcher: None,
            rendered_fetcher: None,
        }
    }

    /// Browser used for rendered fetches instead of launching Chromium
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replaces the fetcher for the method it reports
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        match fetcher.method() {
            FetchMethod::Static => self.static_fetcher = Some(fetcher),
            FetchMethod::Rendered => self.rendered_fetcher = Some(fetcher),
        }
        self
    }

    pub fn build(self) -> Result<Engine, HarvestError> {
        let config = self.config;
        let user_agent = config.user_agent.clone();

        let http = Arc::new(StaticFetcher::new(
            user_agent.clone(),
            config.engine.max_redirects,
        ));

        let rendering_enabled =
            config.browser.enabled || self.renderer.is_some() || self.rendered_fetcher.is_some();

        let pool = Arc::new(match self.renderer {
            Some(renderer) => BrowserPool::with_renderer(renderer, config.browser.max_contexts),
            None => BrowserPool::chromium(&config.browser, user_agent.header_value()),
        });

        let static_fetcher = self
            .static_fetcher
            .unwrap_or_else(|| Arc::clone(&http) as Arc<dyn Fetcher>);
        let rendered_fetcher = self.rendered_fetcher.unwrap_or_else(|| {
            Arc::new(RenderedFetcher::new(
                Arc::clone(&pool),
                config.browser.screenshot_dir.clone(),
            ))
        });

        let sink: Arc<dyn ResultSink> = match (self.sink, &config.output.results_path) {
            (Some(sink), _) => sink,
            (None, Some(path)) => Arc::new(JsonlSink::open(path)?),
            (None, None) => Arc::new(NullSink),
        };

        let scheduler = Arc::new(Scheduler::from_config(&config.engine, &config.proxy));
        let selector = StrategySelector::new(
            Arc::clone(&http),
            Arc::clone(&scheduler),
            config.engine.sniff,
        );

        tracing::debug!(
            "Engine ready: concurrency {}, cache TTL {}s, rendering {}",
            config.engine.concurrency,
            config.engine.cache_ttl_secs,
            if rendering_enabled { "on" } else { "off" }
        );

        Ok(Engine {
            inner: Arc::new(Inner {
                cache: ResultCache::new(config.engine.cache_ttl()),
                flights: SingleFlight::new(),
                scheduler,
                selector,
                http,
                static_fetcher,
                rendered_fetcher,
                pool,
                rendering_enabled,
                sink,
                config: config.engine,
            }),
        })
    }
}
