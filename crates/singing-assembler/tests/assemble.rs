// Behaviour of Assembler::assemble against a channel with scripted collaborators.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use singing_assembler::{
    AssembleError, AssembleRequest, Assembler, Channel, Collector, CollectorError, Composer,
    ComposerError, ComposerSchema, Data, FnTransform, FormattedItem, Item, PlainTextComposer,
    Subscription, Transform, TEXT_PLAIN,
};
use singing_core::{Cue, RenderContext};
use singing_dispatch::{MessageStatus, Payload};

/// Returns `items` and `next_cue` on every call and records the cue it was given.
struct Recording {
    items: Vec<&'static str>,
    next_cue: Option<Cue>,
    seen: Mutex<Vec<Option<Cue>>>,
}

impl Recording {
    fn new(items: Vec<&'static str>, next_cue: Option<Cue>) -> Arc<Self> {
        Arc::new(Self {
            items,
            next_cue,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Option<Cue>> {
        self.seen.lock().expect("lock").clone()
    }
}

impl Collector for Recording {
    fn name(&self) -> &str {
        "recording"
    }

    fn get_items(
        &self,
        cue: Option<&Cue>,
        _subscription: &Subscription,
    ) -> Result<(Vec<Item>, Option<Cue>), CollectorError> {
        self.seen.lock().expect("lock").push(cue.cloned());
        let items = self.items.iter().map(|s| Item::new(s.to_string())).collect();
        Ok((items, self.next_cue.clone()))
    }
}

struct BrokenCollector;

impl Collector for BrokenCollector {
    fn name(&self) -> &str {
        "broken"
    }

    fn get_items(
        &self,
        _cue: Option<&Cue>,
        _subscription: &Subscription,
    ) -> Result<(Vec<Item>, Option<Cue>), CollectorError> {
        Err(CollectorError::new("broken", "feed unreachable"))
    }
}

/// Fails for one recipient, renders the rest like the plain composer.
struct Picky {
    inner: PlainTextComposer,
    refuses: &'static str,
}

impl Composer for Picky {
    fn name(&self) -> &str {
        "picky"
    }

    fn schema(&self) -> &ComposerSchema {
        self.inner.schema()
    }

    fn render(
        &self,
        subscription: &Subscription,
        items: &[FormattedItem],
        vars: &Data,
        ctx: &RenderContext,
    ) -> Result<Payload, ComposerError> {
        if subscription.key == self.refuses {
            return Err(ComposerError::new("picky", "template error"));
        }
        self.inner.render(subscription, items, vars, ctx)
    }
}

fn data(value: Value) -> Data {
    value.as_object().cloned().unwrap_or_default()
}

fn channel() -> Channel {
    Channel::new("news", "News").with_composer("plain", Arc::new(PlainTextComposer::new("News")))
}

fn subscribe(ch: &mut Channel, email: &str, pending: bool) {
    ch.subscribe("plain", data(json!({ "email": email })), Data::new(), "salt", pending)
        .expect("subscribe");
}

fn cues(ch: &Channel) -> Vec<Option<Cue>> {
    ch.subscriptions.iter().map(|s| s.metadata.cue.clone()).collect()
}

fn bodies(ch: &Channel) -> Vec<String> {
    ch.queue
        .messages(MessageStatus::New)
        .into_iter()
        .map(|m| m.payload.body)
        .collect()
}

#[test]
fn one_message_per_active_subscription() {
    let collector = Recording::new(vec!["story"], Some(json!(1)));
    let mut ch = channel().with_collector(collector.clone());
    subscribe(&mut ch, "a@x.org", false);
    subscribe(&mut ch, "b@x.org", false);

    let n = Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &AssembleRequest::new())
        .expect("assemble");

    assert_eq!(n, 2);
    assert_eq!(ch.queue.len(MessageStatus::New), 2);
    assert_eq!(collector.calls(), vec![None, None]);
    assert_eq!(cues(&ch), vec![Some(json!(1)), Some(json!(1))]);
}

#[test]
fn pending_subscription_is_never_counted() {
    let collector = Recording::new(vec!["story"], Some(json!(1)));
    let mut ch = channel().with_collector(collector.clone());
    subscribe(&mut ch, "pending@x.org", true);
    subscribe(&mut ch, "live@x.org", false);

    let n = Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &AssembleRequest::new())
        .expect("assemble");

    assert_eq!(n, 1);
    // The collector is not even asked on behalf of the pending subscription.
    assert_eq!(collector.calls().len(), 1);
    let pending = ch.subscriptions.by_key("pending@x.org").expect("present");
    assert_eq!(pending.metadata.cue, None);
}

#[test]
fn unknown_format_fails_the_call() {
    let collector = Recording::new(vec!["story"], Some(json!(1)));
    let mut ch = channel().with_collector(collector.clone());
    subscribe(&mut ch, "a@x.org", false);
    let sub = ch.subscriptions.iter_mut().next().expect("one subscription");
    sub.metadata.format = "html".to_string();

    let err = Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &AssembleRequest::new())
        .unwrap_err();

    assert!(matches!(err, AssembleError::UnknownFormat { ref format, .. } if format == "html"));
    assert!(collector.calls().is_empty());
    assert_eq!(cues(&ch), vec![None]);
}

#[test]
fn without_collector_flag_collector_is_never_called() {
    let collector = Recording::new(vec!["story"], Some(json!(1)));
    let mut ch = channel().with_collector(collector.clone());
    subscribe(&mut ch, "a@x.org", false);

    let request = AssembleRequest::new()
        .use_collector(false)
        .with_items([Item::new("explicit".to_string())]);
    let n = Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &request)
        .expect("assemble");

    assert_eq!(n, 1);
    assert!(collector.calls().is_empty());
    assert_eq!(cues(&ch), vec![None]);
    assert_eq!(bodies(&ch), vec!["explicit".to_string()]);
}

#[test]
fn ignoring_cue_still_stores_returned_cue() {
    let collector = Recording::new(vec!["story"], Some(json!("next")));
    let mut ch = channel().with_collector(collector.clone());
    subscribe(&mut ch, "a@x.org", false);
    ch.subscriptions.iter_mut().for_each(|s| s.metadata.cue = Some(json!("old")));

    Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &AssembleRequest::new().use_cue(false))
        .expect("assemble");

    assert_eq!(collector.calls(), vec![None]);
    assert_eq!(cues(&ch), vec![Some(json!("next"))]);
}

#[test]
fn stored_cue_is_passed_back() {
    let collector = Recording::new(vec!["story"], Some(json!("next")));
    let mut ch = channel().with_collector(collector.clone());
    subscribe(&mut ch, "a@x.org", false);
    ch.subscriptions.iter_mut().for_each(|s| s.metadata.cue = Some(json!("old")));

    Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &AssembleRequest::new())
        .expect("assemble");

    assert_eq!(collector.calls(), vec![Some(json!("old"))]);
}

#[test]
fn keep_cue_leaves_metadata_untouched() {
    let collector = Recording::new(vec!["story"], Some(json!("next")));
    let mut ch = channel().with_collector(collector.clone());
    subscribe(&mut ch, "a@x.org", false);
    ch.subscriptions.iter_mut().for_each(|s| s.metadata.cue = Some(json!("old")));

    let n = Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &AssembleRequest::new().update_cue(false))
        .expect("assemble");

    assert_eq!(n, 1);
    assert_eq!(cues(&ch), vec![Some(json!("old"))]);
}

#[test]
fn empty_collector_is_idempotent() {
    let collector = Recording::new(vec![], None);
    let mut ch = channel().with_collector(collector.clone());
    subscribe(&mut ch, "a@x.org", false);
    let before: Vec<Subscription> = ch.subscriptions.iter().cloned().collect();

    let assembler = Assembler::default();
    for _ in 0..2 {
        let n = assembler
            .assemble(&RenderContext::new(), &mut ch, &AssembleRequest::new())
            .expect("assemble");
        assert_eq!(n, 0);
    }

    let after: Vec<Subscription> = ch.subscriptions.iter().cloned().collect();
    assert_eq!(before, after);
    assert!(ch.queue.is_empty());
}

#[test]
fn extra_items_follow_collector_items() {
    let collector = Recording::new(vec!["first", "second"], None);
    let mut ch = channel().with_collector(collector);
    subscribe(&mut ch, "a@x.org", false);

    let request = AssembleRequest::new().with_items([Item::new("third".to_string())]);
    Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &request)
        .expect("assemble");

    assert_eq!(bodies(&ch), vec!["first\n\nsecond\n\nthird".to_string()]);
}

#[test]
fn formatters_and_transforms_shape_the_units() {
    let collector = Recording::new(vec!["release"], None);
    let mut ch = channel().with_collector(collector);
    subscribe(&mut ch, "a@x.org", false);

    let assembler = Assembler::default();
    assembler
        .formatters()
        .register::<String, _>(None, |s, _| FormattedItem::plain(format!("* {s}")));
    let upper: Arc<dyn Transform> = Arc::new(FnTransform::new(
        "shout",
        TEXT_PLAIN,
        |text: &str, _: &Subscription| text.to_uppercase(),
    ));
    assembler.transforms().register(upper);

    assembler
        .assemble(&RenderContext::new(), &mut ch, &AssembleRequest::new())
        .expect("assemble");
    assert_eq!(bodies(&ch), vec!["* RELEASE".to_string()]);
}

#[test]
fn transforms_registered_between_calls_are_picked_up() {
    let mut ch = channel();
    subscribe(&mut ch, "a@x.org", false);
    let assembler = Assembler::default();
    let request = AssembleRequest::new().with_items([Item::new("hello".to_string())]);

    assembler
        .assemble(&RenderContext::new(), &mut ch, &request)
        .expect("assemble");
    assembler.transforms().register(Arc::new(FnTransform::new(
        "exclaim",
        TEXT_PLAIN,
        |text: &str, _: &Subscription| format!("{text}!"),
    )));
    assembler
        .assemble(&RenderContext::new(), &mut ch, &request)
        .expect("assemble");

    assert_eq!(bodies(&ch), vec!["hello".to_string(), "hello!".to_string()]);
}

#[test]
fn override_vars_reach_the_composer() {
    let mut ch = channel();
    subscribe(&mut ch, "a@x.org", false);
    let request = AssembleRequest::new()
        .with_items([Item::new("x".to_string())])
        .with_var("subject", "Special edition");

    Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &request)
        .expect("assemble");
    let messages = ch.queue.messages(MessageStatus::New);
    assert_eq!(messages[0].payload.subject, "Special edition");
}

#[test]
fn collector_failure_propagates_by_default() {
    let mut ch = channel().with_collector(Arc::new(BrokenCollector));
    subscribe(&mut ch, "a@x.org", false);

    let err = Assembler::default()
        .assemble(&RenderContext::new(), &mut ch, &AssembleRequest::new())
        .unwrap_err();
    assert!(matches!(err, AssembleError::Collector { .. }));
    assert!(ch.queue.is_empty());
}

#[test]
fn composer_failure_can_be_isolated() {
    let picky = Arc::new(Picky {
        inner: PlainTextComposer::new("News"),
        refuses: "bad@x.org",
    });
    let collector = Recording::new(vec!["story"], Some(json!(7)));
    let build = || {
        let mut ch = Channel::new("news", "News")
            .with_composer("plain", picky.clone())
            .with_collector(collector.clone());
        subscribe(&mut ch, "good@x.org", false);
        subscribe(&mut ch, "bad@x.org", false);
        subscribe(&mut ch, "also-good@x.org", false);
        ch
    };

    let mut strict = build();
    let err = Assembler::default()
        .assemble(&RenderContext::new(), &mut strict, &AssembleRequest::new())
        .unwrap_err();
    assert!(matches!(err, AssembleError::Composer { .. }));

    let mut lenient = build();
    let n = Assembler::default()
        .isolate_failures(true)
        .assemble(&RenderContext::new(), &mut lenient, &AssembleRequest::new())
        .expect("assemble");
    assert_eq!(n, 2);
    // The failed subscription keeps its cue so its content is retried.
    let bad = lenient.subscriptions.by_key("bad@x.org").expect("present");
    assert_eq!(bad.metadata.cue, None);
    let good = lenient.subscriptions.by_key("good@x.org").expect("present");
    assert_eq!(good.metadata.cue, Some(json!(7)));
}

#[test]
fn unknown_format_is_never_isolated() {
    let mut ch = channel();
    subscribe(&mut ch, "a@x.org", false);
    ch.subscriptions
        .iter_mut()
        .for_each(|s| s.metadata.format = "gone".to_string());

    let err = Assembler::default()
        .isolate_failures(true)
        .assemble(
            &RenderContext::new(),
            &mut ch,
            &AssembleRequest::new().with_items([Item::new("x".to_string())]),
        )
        .unwrap_err();
    assert!(matches!(err, AssembleError::UnknownFormat { .. }));
}
