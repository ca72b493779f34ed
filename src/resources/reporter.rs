use super::sampler::{MetricsSource, ResourceSampler, SysinfoSource};
use super::{ResourceSnapshot, SampleOptions};
use crate::error::Result;
use crate::logging::Logger;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Samples resources and writes them as one INFO record:
/// `cpu | mem used | mem total | disk used | disk total | net sent | net recv`.
pub struct ResourceLogger<S = SysinfoSource> {
    sampler: ResourceSampler<S>,
    options: SampleOptions,
    logger: Option<Logger>,
}

impl<S: MetricsSource> ResourceLogger<S> {
    pub fn new(source: S) -> Self {
        Self {
            sampler: ResourceSampler::new(source),
            options: SampleOptions::default(),
            logger: None,
        }
    }

    pub fn with_options(mut self, options: SampleOptions) -> Self {
        self.options = options;
        self
    }

    /// Emit into `logger` instead of the current default dispatcher.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn options(&self) -> &SampleOptions {
        &self.options
    }

    pub fn sampler_mut(&mut self) -> &mut ResourceSampler<S> {
        &mut self.sampler
    }

    pub fn log_once(&mut self) -> Result<ResourceSnapshot> {
        let Self {
            sampler,
            options,
            logger,
        } = self;

        scoped(logger.as_ref(), || {
            let snapshot = sampler.sample_with(options)?;
            info!("{}", snapshot.to_log_line());
            Ok(snapshot)
        })
    }

    /// Logs a resource line every `interval` until the future is dropped.
    /// Failed samples are logged at ERROR and do not stop the loop.
    /// A zero interval logs once and returns.
    pub async fn run(&mut self, interval: Duration) {
        if interval.is_zero() {
            self.report();
            return;
        }

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.report();
        }
    }

    fn report(&mut self) {
        if let Err(e) = self.log_once() {
            scoped(self.logger.as_ref(), || {
                error!("Failed to sample resources: {}", e)
            });
        }
    }
}

fn scoped<T>(logger: Option<&Logger>, f: impl FnOnce() -> T) -> T {
    match logger {
        Some(logger) => logger.in_scope(f),
        None => f(),
    }
}
