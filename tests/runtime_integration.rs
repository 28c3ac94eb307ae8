//! End-to-end runtime core test: a test clock drives named timers, the
//! caller interleaves the returned handler batch with bus publication, and
//! subscribers receive every event in deterministic priority order.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;

use chronobus::registry::{
    clear_component_clocks, get_component_clocks, is_backtest_force_stop,
    register_component_clock, remove_instance_component_clocks, set_backtest_force_stop,
};
use chronobus::time::NANOS_PER_SEC;
use chronobus::{
    Clock, ComponentId, MessageBus, MessageBusConfig, MessageHandler, Request, Response,
    TestClock, TimeEvent, TimerCallback, TraderId, UUID4,
};

fn new_bus(clock: Rc<RefCell<TestClock>>) -> MessageBus {
    MessageBus::new(
        TraderId::new("BACKTESTER-001").unwrap(),
        UUID4::new(),
        clock,
        MessageBusConfig::default(),
    )
}

/// Subscriber that records `(own id, ts_event)` for every time event seen.
fn time_event_recorder(
    id: &str,
    log: &Rc<RefCell<Vec<(String, u64)>>>,
) -> MessageHandler {
    let id_owned = id.to_string();
    let log = log.clone();
    MessageHandler::new(id, move |msg: &dyn Any| {
        let event = msg.downcast_ref::<TimeEvent>().expect("expected TimeEvent");
        log.borrow_mut().push((id_owned.clone(), event.ts_event));
    })
}

#[test]
fn test_timer_events_fan_out_over_bus() -> Result<()> {
    let clock = Rc::new(RefCell::new(TestClock::new()));
    let mut bus = new_bus(clock.clone());

    // Risk checks run before the strategy on every time event; the
    // strategy only follows the bar timer.
    let log = Rc::new(RefCell::new(Vec::new()));
    bus.subscribe("events.time.*", time_event_recorder("risk", &log), 10)?;
    bus.subscribe("events.time.bar-1s", time_event_recorder("strategy", &log), 0)?;

    let fired = Arc::new(AtomicU32::new(0));
    let fired_in_cb = fired.clone();
    let on_fire = TimerCallback::new(move |_| {
        fired_in_cb.fetch_add(1, Ordering::SeqCst);
    });

    {
        let mut clock = clock.borrow_mut();
        clock.set_timer_ns(
            "bar-1s",
            NANOS_PER_SEC,
            0,
            None,
            Some(on_fire.clone()),
            false,
            false,
        )?;
        clock.set_time_alert_ns("session-close", 3 * NANOS_PER_SEC, Some(on_fire), false, false)?;
    }

    // Drive the clock; the caller owns the interleaving of callback
    // dispatch and bus publication
    let handlers = clock.borrow_mut().advance_time(3_500_000_000, true)?;
    assert_eq!(handlers.len(), 4);

    for handler in handlers {
        let topic = format!("events.time.{}", handler.event.name);
        bus.publish(&topic, &handler.event)?;
        handler.handle();
    }

    assert_eq!(fired.load(Ordering::SeqCst), 4);
    assert_eq!(bus.pub_count(), 4);

    // Bars at 1s/2s/3s each reach risk then strategy; the 3s alert
    // (installed after the bar timer) lands last and reaches risk only
    let delivered = log.borrow();
    let expected: Vec<(String, u64)> = vec![
        ("risk".to_string(), NANOS_PER_SEC),
        ("strategy".to_string(), NANOS_PER_SEC),
        ("risk".to_string(), 2 * NANOS_PER_SEC),
        ("strategy".to_string(), 2 * NANOS_PER_SEC),
        ("risk".to_string(), 3 * NANOS_PER_SEC),
        ("strategy".to_string(), 3 * NANOS_PER_SEC),
        ("risk".to_string(), 3 * NANOS_PER_SEC),
    ];
    assert_eq!(delivered.as_slice(), expected.as_slice());

    // The one-shot alert is gone; the bar timer keeps running
    assert_eq!(clock.borrow().timer_count(), 1);
    assert_eq!(clock.borrow().timer_names(), vec!["bar-1s".to_string()]);
    assert_eq!(bus.timestamp_ns(), 3_500_000_000);
    Ok(())
}

#[test]
fn test_request_response_between_components() -> Result<()> {
    let clock = Rc::new(RefCell::new(TestClock::new()));
    let mut bus = new_bus(clock);

    // The data engine answers instrument requests
    let served = Rc::new(RefCell::new(Vec::<String>::new()));
    let served_in_handler = served.clone();
    bus.register(
        "DataEngine.request",
        MessageHandler::new("data-engine", move |msg: &dyn Any| {
            let req = msg.downcast_ref::<Request>().expect("expected Request");
            let query = req.payload.downcast_ref::<String>().unwrap();
            served_in_handler.borrow_mut().push(query.clone());
        }),
    )?;

    let answered = Rc::new(RefCell::new(Vec::<String>::new()));
    let answered_in_cb = answered.clone();
    let req = Request {
        id: UUID4::new(),
        ts_init: 0,
        payload: Rc::new("instruments.BINANCE".to_string()),
        callback: Some(MessageHandler::new("strategy-response", move |msg| {
            let resp = msg.downcast_ref::<Response>().expect("expected Response");
            let body = resp.payload.downcast_ref::<String>().unwrap();
            answered_in_cb.borrow_mut().push(body.clone());
        })),
    };
    let correlation_id = req.id;
    bus.request("DataEngine.request", &req);

    assert_eq!(served.borrow().as_slice(), ["instruments.BINANCE"]);
    assert!(bus.is_pending_request(&correlation_id));

    bus.response(&Response {
        correlation_id,
        id: UUID4::new(),
        ts_init: 1,
        payload: Rc::new("BTCUSDT,ETHUSDT".to_string()),
    });
    assert_eq!(answered.borrow().as_slice(), ["BTCUSDT,ETHUSDT"]);
    assert!(!bus.is_pending_request(&correlation_id));

    assert_eq!(bus.req_count(), 1);
    assert_eq!(bus.res_count(), 1);
    Ok(())
}

#[test]
fn test_shutdown_command_over_endpoint() -> Result<()> {
    use chronobus::ShutdownSystem;

    let clock = Rc::new(RefCell::new(TestClock::new()));
    clock.borrow_mut().set_time(7 * NANOS_PER_SEC);
    let mut bus = new_bus(clock);

    let received = Rc::new(RefCell::new(Vec::<String>::new()));
    let received_in_handler = received.clone();
    bus.register(
        "SystemController.execute",
        MessageHandler::new("controller", move |msg: &dyn Any| {
            let cmd = msg.downcast_ref::<ShutdownSystem>().expect("expected ShutdownSystem");
            received_in_handler
                .borrow_mut()
                .push(cmd.reason.clone().unwrap_or_default());
        }),
    )?;

    let cmd = ShutdownSystem::new(
        TraderId::new("BACKTESTER-001").unwrap(),
        ComponentId::new("RiskEngine").unwrap(),
        Some("max drawdown breached".to_string()),
        UUID4::new(),
        bus.timestamp_ns(),
    );
    assert_eq!(cmd.ts_init, 7 * NANOS_PER_SEC);

    bus.send("SystemController.execute", &cmd);
    assert_eq!(received.borrow().as_slice(), ["max drawdown breached"]);
    assert_eq!(bus.sent_count(), 1);
    Ok(())
}

#[test]
fn test_component_clock_registry_and_force_stop() {
    clear_component_clocks();
    let instance_id = UUID4::new();
    let clock: Rc<RefCell<dyn Clock>> = Rc::new(RefCell::new(TestClock::new()));

    register_component_clock(instance_id, clock.clone());
    let clocks = get_component_clocks(instance_id);
    assert_eq!(clocks.len(), 1);

    // The returned copy stays usable while the registry changes
    remove_instance_component_clocks(instance_id);
    assert_eq!(clocks.len(), 1);
    assert!(get_component_clocks(instance_id).is_empty());
    assert_eq!(clocks[0].borrow().timestamp_ns(), 0);

    set_backtest_force_stop(true);
    assert!(is_backtest_force_stop());
    set_backtest_force_stop(false);
    assert!(!is_backtest_force_stop());
}
