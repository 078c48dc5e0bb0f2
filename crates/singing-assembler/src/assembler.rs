use std::sync::Arc;

use serde_json::Value;
use singing_core::{config::AssemblerConfig, RenderContext};
use singing_dispatch::{Message, Payload};
use tracing::{debug, error, info};

use crate::{
    channel::Channel,
    collector::Collector,
    composer::Composer,
    error::{AssembleError, Result},
    formatter::FormatterRegistry,
    item::{FormattedItem, Item},
    subscription::{Data, Subscription},
    transform::{TransformCache, TransformRegistry},
};

/// Options for one [`Assembler::assemble`] call.
#[derive(Debug, Clone)]
pub struct AssembleRequest {
    /// Items included for every subscription, after the collector's.
    pub extra_items: Vec<Item>,
    /// Ask the channel's collector for items.
    pub use_collector: bool,
    /// Pass the stored cue to the collector; otherwise pass `None`.
    pub use_cue: bool,
    /// Store the cue the collector returns.
    pub update_cue: bool,
    /// Per-run composer variables (e.g. `subject`).
    pub override_vars: Data,
}

impl AssembleRequest {
    pub fn new() -> Self {
        Self {
            extra_items: Vec::new(),
            use_collector: true,
            use_cue: true,
            update_cue: true,
            override_vars: Data::new(),
        }
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = Item>) -> Self {
        self.extra_items.extend(items);
        self
    }

    pub fn use_collector(mut self, yes: bool) -> Self {
        self.use_collector = yes;
        self
    }

    pub fn use_cue(mut self, yes: bool) -> Self {
        self.use_cue = yes;
        self
    }

    pub fn update_cue(mut self, yes: bool) -> Self {
        self.update_cue = yes;
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.override_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_vars(mut self, vars: Data) -> Self {
        self.override_vars.extend(vars);
        self
    }
}

impl Default for AssembleRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns collector output and explicit items into one message per
/// subscription of a channel.
///
/// For each subscription, in channel order: skip it while pending; resolve
/// its composer (an unknown format fails the whole call); gather collector
/// items after its cue, then the request's extra items; format and
/// transform every item; render when at least one unit remains. Rendered
/// messages are queued on the channel with status `new`.
pub struct Assembler {
    formatters: Arc<FormatterRegistry>,
    transforms: Arc<TransformRegistry>,
    /// Confine collector/composer failures to their subscription.
    isolate_failures: bool,
}

impl Assembler {
    pub fn new(formatters: Arc<FormatterRegistry>, transforms: Arc<TransformRegistry>) -> Self {
        Self {
            formatters,
            transforms,
            isolate_failures: false,
        }
    }

    pub fn from_config(
        config: &AssemblerConfig,
        formatters: Arc<FormatterRegistry>,
        transforms: Arc<TransformRegistry>,
    ) -> Self {
        Self::new(formatters, transforms).isolate_failures(config.isolate_failures)
    }

    pub fn isolate_failures(mut self, yes: bool) -> Self {
        self.isolate_failures = yes;
        self
    }

    pub fn formatters(&self) -> &Arc<FormatterRegistry> {
        &self.formatters
    }

    pub fn transforms(&self) -> &Arc<TransformRegistry> {
        &self.transforms
    }

    /// Assemble messages for every eligible subscription of `channel`.
    ///
    /// Returns how many messages were queued.
    pub fn assemble(
        &self,
        ctx: &RenderContext,
        channel: &mut Channel,
        request: &AssembleRequest,
    ) -> Result<usize> {
        let composers = channel.composers().clone();
        let collector = channel.collector().cloned();
        let channel_name = channel.name.clone();
        // Fresh per call: registrations may change between runs.
        let mut cache = self.transforms.cache();

        let mut produced = 0;
        let mut pending = 0;
        let mut empty = 0;
        let mut failed = 0;

        for sub in channel.subscriptions.iter_mut() {
            if sub.metadata.pending {
                pending += 1;
                debug!(channel = %channel_name, subscription = %sub.id, "skipping pending subscription");
                continue;
            }

            let composer =
                composers
                    .get(&sub.metadata.format)
                    .ok_or_else(|| AssembleError::UnknownFormat {
                        channel: channel_name.clone(),
                        subscription: sub.id.clone(),
                        format: sub.metadata.format.clone(),
                    })?;

            let outcome = self.assemble_one(
                ctx,
                collector.as_deref(),
                composer.as_ref(),
                sub,
                request,
                &mut cache,
            );
            match outcome {
                Ok(Some(payload)) => {
                    channel.queue.push(Message::new(payload, sub.id.clone()));
                    produced += 1;
                }
                Ok(None) => {
                    empty += 1;
                    debug!(channel = %channel_name, subscription = %sub.id, "nothing to send");
                }
                Err(e) if self.isolate_failures && e.is_isolatable() => {
                    failed += 1;
                    error!(
                        channel = %channel_name,
                        subscription = %sub.id,
                        error = %e,
                        "subscription skipped after failure"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            channel = %channel_name,
            produced,
            pending,
            empty,
            failed,
            "assembly complete"
        );
        Ok(produced)
    }

    fn assemble_one(
        &self,
        ctx: &RenderContext,
        collector: Option<&dyn Collector>,
        composer: &dyn Composer,
        sub: &mut Subscription,
        request: &AssembleRequest,
        cache: &mut TransformCache<'_>,
    ) -> Result<Option<Payload>> {
        let mut raw: Vec<Item> = Vec::new();
        // Outer Some: the collector ran and its cue is pending a write.
        let mut returned_cue = None;

        if let Some(collector) = collector.filter(|_| request.use_collector) {
            let cue = if request.use_cue {
                sub.metadata.cue.as_ref()
            } else {
                None
            };
            let (items, next_cue) =
                collector
                    .get_items(cue, sub)
                    .map_err(|source| AssembleError::Collector {
                        subscription: sub.id.clone(),
                        source,
                    })?;
            raw.extend(items);
            returned_cue = Some(next_cue);
        }
        raw.extend(request.extra_items.iter().cloned());

        let mut units: Vec<FormattedItem> = Vec::with_capacity(raw.len());
        for item in &raw {
            let unit = self.formatters.format(item, ctx);
            units.push(cache.apply(unit, sub));
        }

        let payload = if units.is_empty() {
            None
        } else {
            let payload = composer
                .render(sub, &units, &request.override_vars, ctx)
                .map_err(|source| AssembleError::Composer {
                    subscription: sub.id.clone(),
                    source,
                })?;
            Some(payload)
        };

        // Written only once the subscription's run succeeded, so a failed
        // render does not skip past undelivered content.
        if request.update_cue {
            if let Some(cue) = returned_cue {
                debug!(subscription = %sub.id, ?cue, "cue updated");
                sub.metadata.cue = cue;
            }
        }

        Ok(payload)
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(
            Arc::new(FormatterRegistry::new()),
            Arc::new(TransformRegistry::new()),
        )
    }
}
