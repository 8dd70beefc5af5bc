use modlink::{
    DeclarationError, MessageDispatcher, ModHandle, ModRecord, ModRegistry, ModuleRef, Payload, ReceiverBuilder,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
struct Delivery {
    receiver: String,
    caller: String,
    message: String,
    payload: Vec<Value>,
}

type Log = Arc<Mutex<Vec<Delivery>>>;

fn recorder(log: &Log, receiver: &str) -> impl Fn(&ModRecord, &str, &[Value]) -> anyhow::Result<()> + Send + Sync + 'static {
    let log = Arc::clone(log);
    let receiver = receiver.to_string();
    move |caller, message, payload| {
        log.lock().push(Delivery {
            receiver: receiver.clone(),
            caller: caller.id.to_string(),
            message: message.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

struct Harness {
    registry: Arc<ModRegistry>,
    dispatcher: MessageDispatcher,
    log: Log,
}

impl Harness {
    /// 发现并排序给定的 mod
    fn new(ids: &[&str]) -> Self {
        let _ = tracing_subscriber::fmt::try_init();
        let registry = Arc::new(ModRegistry::new());
        for id in ids {
            let id = registry
                .register_found(&modlink::ModManifest::new(id, id, "1.0.0"))
                .unwrap();
            registry.mark_sorted(&id).unwrap();
        }
        Self {
            dispatcher: MessageDispatcher::new(Arc::clone(&registry)),
            registry,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn load(
        &self,
        id: &str,
        declare: impl FnOnce(&mut ReceiverBuilder<'_>) -> Result<(), DeclarationError>,
    ) -> ModHandle {
        let id = self.registry.normalize(id).unwrap();
        let mut builder = ReceiverBuilder::new(&self.registry, id.clone());
        declare(&mut builder).unwrap();
        self.registry
            .mark_loaded(&id, ModuleRef::new(), builder.build())
            .unwrap()
    }

    fn deliveries(&self) -> Vec<Delivery> {
        self.log.lock().clone()
    }
}

#[test]
fn test_targeted_send_only_reaches_accepted_sender() {
    let h = Harness::new(&["a", "b", "c"]);
    let log = Arc::clone(&h.log);
    h.load("a", |r| {
        r.receive_from("b", "on_b", recorder(&log, "a.on_b"))?;
        Ok(())
    });
    let b = h.load("b", |_| Ok(()));
    let c = h.load("c", |_| Ok(()));

    let report = h.dispatcher.send(&c, "a", "ping", vec![json!(42)]);
    assert_eq!(report.delivered, 0);
    assert!(h.deliveries().is_empty());

    let report = h.dispatcher.send(&b, "a", "ping", vec![json!(42)]);
    assert_eq!(report.delivered, 1);
    assert!(report.is_clean());
    assert_eq!(
        h.deliveries(),
        vec![Delivery {
            receiver: "a.on_b".to_string(),
            caller: "b".to_string(),
            message: "ping".to_string(),
            payload: vec![json!(42)],
        }]
    );
}

#[test]
fn test_target_can_be_record_module_or_id() {
    let h = Harness::new(&["a", "b"]);
    let log = Arc::clone(&h.log);
    h.load("a", |r| {
        r.receive_from("b", "on_b", recorder(&log, "a"))?;
        Ok(())
    });
    let b = h.load("b", |_| Ok(()));

    let record = h.registry.get_mod("a", false, false).unwrap();
    let module = record.module.unwrap();
    h.dispatcher.send(&b, &record, "by_record", ());
    h.dispatcher.send(&b, &module, "by_module", ());
    h.dispatcher.send(&b, "A", "by_id", ());

    let messages: Vec<_> = h.deliveries().into_iter().map(|d| d.message).collect();
    assert_eq!(messages, vec!["by_record", "by_module", "by_id"]);
}

#[test]
fn test_send_to_unresolvable_target_is_silent() {
    let h = Harness::new(&["a"]);
    let a = h.load("a", |_| Ok(()));

    for report in [
        h.dispatcher.send(&a, "ghost", "ping", ()),
        h.dispatcher.send(&a, "", "ping", ()),
        h.dispatcher.send(&a, &ModuleRef::new(), "ping", ()),
    ] {
        assert_eq!(report.delivered, 0);
        assert!(report.is_clean());
    }
}

#[test]
fn test_unknown_caller_is_dropped() {
    let h = Harness::new(&["a", "b"]);
    let log = Arc::clone(&h.log);
    h.load("a", |r| {
        r.receive_from("b", "on_b", recorder(&log, "a"))?;
        r.receive_global("on_any", recorder(&log, "a.global"))?;
        Ok(())
    });
    h.load("b", |_| Ok(()));

    let stranger = Harness::new(&["b"]);
    let foreign = stranger.load("b", |_| Ok(()));

    assert_eq!(h.dispatcher.send(&foreign, "a", "ping", ()).delivered, 0);
    assert_eq!(h.dispatcher.broadcast(&foreign, "evt", ()).delivered, 0);
    assert!(h.deliveries().is_empty());
}

#[test]
fn test_broadcast_reaches_every_global_receiver_in_load_order() {
    let h = Harness::new(&["a", "b", "c"]);
    let log = Arc::clone(&h.log);
    h.load("b", |r| {
        r.receive_global("first", recorder(&log, "b.first"))?;
        r.receive_global("second", recorder(&log, "b.second"))?;
        Ok(())
    });
    h.load("a", |r| {
        r.receive_global("on_any", recorder(&log, "a.on_any"))?;
        r.receive_from("c", "on_c", recorder(&log, "a.on_c"))?;
        Ok(())
    });
    let c = h.load("c", |_| Ok(()));

    let report = h.dispatcher.broadcast(&c, "evt", vec![json!("x")]);
    assert_eq!(report.delivered, 3);

    let deliveries = h.deliveries();
    let receivers: Vec<_> = deliveries.iter().map(|d| d.receiver.as_str()).collect();
    assert_eq!(receivers, vec!["b.first", "b.second", "a.on_any"]);
    assert!(deliveries.iter().all(|d| d.caller == "c" && d.message == "evt"));
    assert!(deliveries.iter().all(|d| d.payload == vec![json!("x")]));
}

#[test]
fn test_broadcast_includes_sender_own_global_receiver() {
    let h = Harness::new(&["a", "b"]);
    let log = Arc::clone(&h.log);
    let a = h.load("a", |r| {
        r.receive_global("on_any", recorder(&log, "a"))?;
        Ok(())
    });
    h.load("b", |r| {
        r.receive_global("on_any", recorder(&log, "b"))?;
        Ok(())
    });

    let report = h.dispatcher.broadcast(&a, "hello", ());
    assert_eq!(report.delivered, 2);
    let receivers: Vec<_> = h.deliveries().into_iter().map(|d| (d.receiver, d.caller)).collect();
    assert_eq!(
        receivers,
        vec![("a".to_string(), "a".to_string()), ("b".to_string(), "a".to_string())]
    );
}

#[test]
fn test_broadcast_skips_errored_mods() {
    let h = Harness::new(&["a", "b", "c"]);
    let log = Arc::clone(&h.log);
    h.load("a", |r| {
        r.receive_global("on_any", recorder(&log, "a"))?;
        Ok(())
    });
    let b = h.load("b", |r| {
        r.receive_global("on_any", recorder(&log, "b"))?;
        Ok(())
    });
    let c = h.load("c", |_| Ok(()));

    h.registry.mark_errored(&b);
    let report = h.dispatcher.broadcast(&c, "evt", ());
    assert_eq!(report.delivered, 1);
    assert_eq!(h.deliveries()[0].receiver, "a");
}

#[test]
fn test_broadcast_without_global_receivers_is_noop() {
    let h = Harness::new(&["a", "b"]);
    let log = Arc::clone(&h.log);
    let a = h.load("a", |r| {
        r.receive_from("b", "on_b", recorder(&log, "a"))?;
        Ok(())
    });
    h.load("b", |_| Ok(()));

    let report = h.dispatcher.broadcast(&a, "evt", ());
    assert_eq!(report.delivered, 0);
    assert!(h.deliveries().is_empty());
}

#[test]
fn test_targeted_send_still_reaches_errored_mod() {
    let h = Harness::new(&["a", "b"]);
    let log = Arc::clone(&h.log);
    let a = h.load("a", |r| {
        r.receive_from("b", "on_b", recorder(&log, "a"))?;
        Ok(())
    });
    let b = h.load("b", |_| Ok(()));

    h.registry.mark_errored(&a);
    assert!(h.registry.get_mod("a", false, false).is_none());
    assert_eq!(h.dispatcher.send(&b, "a", "still_there", ()).delivered, 1);
}

#[test]
fn test_handler_failures_are_isolated_and_collected() {
    let h = Harness::new(&["a", "b"]);
    let log = Arc::clone(&h.log);
    h.load("a", |r| {
        r.receive_from("b", "fails", |_, _, _| anyhow::bail!("bad payload"))?;
        r.receive_from("b", "panics", |_, _, _| panic!("handler exploded"))?;
        r.receive_from("b", "works", recorder(&log, "a.works"))?;
        Ok(())
    });
    let b = h.load("b", |_| Ok(()));

    let report = h.dispatcher.send(&b, "a", "ping", vec![json!(1)]);
    assert_eq!(report.delivered, 3);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].entry_point, "fails");
    assert!(report.failures[0].reason.contains("bad payload"));
    assert_eq!(report.failures[1].entry_point, "panics");
    assert!(report.failures[1].reason.contains("handler exploded"));
    assert_eq!(report.failures[1].receiver.as_str(), "a");

    assert_eq!(h.deliveries().len(), 1);
    assert_eq!(h.registry.get_all_mods(false, false).len(), 2);

    let err = report.into_result().unwrap_err().to_string();
    assert!(err.contains("2 of 3 receivers failed"));
}

#[test]
fn test_missing_payload_is_delivered_empty() {
    let h = Harness::new(&["a", "b"]);
    let log = Arc::clone(&h.log);
    h.load("a", |r| {
        r.receive_from("b", "on_b", recorder(&log, "a"))?;
        Ok(())
    });
    let b = h.load("b", |_| Ok(()));

    h.dispatcher.send(&b, "a", "none", Payload::from(None::<Vec<Value>>));
    h.dispatcher.send(&b, "a", "unit", ());
    h.dispatcher.send(&b, "a", "array", [json!(1), json!({"k": "v"})]);

    let payloads: Vec<_> = h.deliveries().into_iter().map(|d| d.payload).collect();
    assert_eq!(payloads, vec![vec![], vec![], vec![json!(1), json!({"k": "v"})]]);
}

#[test]
fn test_handlers_can_reply_during_dispatch() {
    let h = Harness::new(&["a", "b"]);
    let log = Arc::clone(&h.log);
    let a_handle: Arc<OnceCell<ModHandle>> = Arc::new(OnceCell::new());

    let dispatcher = h.dispatcher.clone();
    let me = Arc::clone(&a_handle);
    let a = h.load("a", move |r| {
        r.receive_from("b", "on_ping", move |caller, _, payload| {
            let me = me.get().ok_or_else(|| anyhow::anyhow!("not loaded"))?;
            dispatcher.send(me, caller, "pong", payload.to_vec()).into_result()?;
            Ok(())
        })?;
        Ok(())
    });
    a_handle.set(a).unwrap();

    let b = h.load("b", |r| {
        r.receive_from("a", "on_pong", recorder(&log, "b"))?;
        Ok(())
    });

    let report = h.dispatcher.send(&b, "a", "ping", vec![json!(7)]);
    assert!(report.is_clean());
    let deliveries = h.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].message, "pong");
    assert_eq!(deliveries[0].caller, "a");
    assert_eq!(deliveries[0].payload, vec![json!(7)]);
}
