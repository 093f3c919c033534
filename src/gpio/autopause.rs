//! Auto-Pause Detector (C9, spec.md §4.9): debounces the ponderal and
//! etiqueta pins through independent timers with mutual exclusion, cooldown,
//! and reconciliation against manual operator actions.
//!
//! Modeled as a single-task actor owning all detector state (no shared
//! mutex): pin transitions, timer fires, and watchdog ticks are all funneled
//! through one `mpsc` channel and handled sequentially, the same
//! one-task-owns-state shape the teacher uses for its WS subscription
//! command loop (`scrapers/polymarket_ws.rs`).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::PauseEngine;
use crate::error::CoreResult;
use crate::models::{ClosePauseDto, OpenPauseDto, TipoPausa};
use crate::store::{orders, pauses, Store};

use super::link::GpioLink;

const SYNTHETIC_OPERATOR: &str = "AUTO_PAUSE_DETECTOR";

pub struct AutoPauseConfig {
    pub ponderal_pin: u32,
    pub etiqueta_pin: u32,
    pub t_open: Duration,
    pub t_close: Duration,
    pub t_cooldown: Duration,
    pub reconcile_interval: Duration,
    pub rearm_watchdog_interval: Duration,
}

#[derive(Debug)]
enum DetectorMsg {
    PinTransition { pin: u32, previous: u8, value: u8 },
    OpenTimerFired { pin: u32, generation: u64 },
    CloseTimerFired { pin: u32, generation: u64 },
    CooldownElapsed { generation: u64 },
    Reconcile,
    RearmCheck,
}

struct Outstanding {
    pause_id: i64,
    pin: u32,
}

struct TimerHandle {
    pin: u32,
    generation: u64,
    cancel: CancellationToken,
}

pub fn spawn(
    gpio: Arc<GpioLink>,
    store: Arc<Store>,
    pauses_engine: Arc<PauseEngine>,
    config: AutoPauseConfig,
    shutdown: CancellationToken,
) {
    let (tx, rx) = mpsc::channel(256);

    // Feed pin transitions from the GPIO link into the actor's inbox.
    {
        let tx = tx.clone();
        let mut events = gpio.subscribe();
        let ponderal = config.ponderal_pin;
        let etiqueta = config.etiqueta_pin;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    event = events.recv() => {
                        let event = match event {
                            Ok(e) => e,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "auto-pause detector lagged behind gpio link");
                                continue;
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                        };
                        if event.pin != ponderal && event.pin != etiqueta {
                            continue;
                        }
                        let _ = tx
                            .send(DetectorMsg::PinTransition {
                                pin: event.pin,
                                previous: event.previous,
                                value: event.value,
                            })
                            .await;
                    }
                }
            }
        });
    }

    // Reconciliation watchdog (spec.md §4.9: "≤ 5 s cadence").
    spawn_interval(tx.clone(), config.reconcile_interval, || DetectorMsg::Reconcile, shutdown.clone());
    // Rearm watchdog (spec.md §5: "≤ 3 s" order-EN_PROCESO observer).
    spawn_interval(tx.clone(), config.rearm_watchdog_interval, || DetectorMsg::RearmCheck, shutdown.clone());

    tokio::spawn(run_actor(tx, rx, gpio, store, pauses_engine, config, shutdown));
}

fn spawn_interval(
    tx: mpsc::Sender<DetectorMsg>,
    period: Duration,
    make_msg: impl Fn() -> DetectorMsg + Send + 'static,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    if tx.send(make_msg()).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
}

struct Actor {
    gpio: Arc<GpioLink>,
    store: Arc<Store>,
    pauses: Arc<PauseEngine>,
    config: AutoPauseConfig,
    self_tx: mpsc::Sender<DetectorMsg>,
    open_timer: Option<TimerHandle>,
    close_timer: Option<TimerHandle>,
    outstanding: Option<Outstanding>,
    cooling_down: bool,
    cooldown_generation: Option<u64>,
    next_generation: u64,
}

async fn run_actor(
    self_tx: mpsc::Sender<DetectorMsg>,
    mut rx: mpsc::Receiver<DetectorMsg>,
    gpio: Arc<GpioLink>,
    store: Arc<Store>,
    pauses: Arc<PauseEngine>,
    config: AutoPauseConfig,
    shutdown: CancellationToken,
) {
    let mut actor = Actor {
        gpio,
        store,
        pauses,
        config,
        self_tx,
        open_timer: None,
        close_timer: None,
        outstanding: None,
        cooling_down: false,
        cooldown_generation: None,
        next_generation: 0,
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                actor.cancel_all_timers();
                return;
            }
            msg = rx.recv() => {
                let Some(msg) = msg else { return };
                if let Err(e) = actor.handle(msg).await {
                    warn!(error = %e, "auto-pause detector cleared state after uncaught failure");
                    actor.cancel_all_timers();
                    actor.outstanding = None;
                    actor.cooling_down = true;
                    actor.schedule_cooldown();
                }
            }
        }
    }
}

impl Actor {
    fn tipo_for_pin(&self, pin: u32) -> TipoPausa {
        if pin == self.config.ponderal_pin {
            TipoPausa::AveriaPonderal
        } else {
            TipoPausa::AveriaEtiqueta
        }
    }

    fn cancel_all_timers(&mut self) {
        if let Some(t) = self.open_timer.take() {
            t.cancel.cancel();
        }
        if let Some(t) = self.close_timer.take() {
            t.cancel.cancel();
        }
    }

    /// spec.md §4.9: open allowed only with no outstanding pause, no
    /// cooldown active, and the order currently EN_PROCESO.
    fn current_order_en_proceso(&self) -> CoreResult<Option<i64>> {
        self.store
            .with_transaction(|tx| Ok(orders::most_recently_started_en_proceso(tx)?.map(|o| o.id)))
    }

    async fn handle(&mut self, msg: DetectorMsg) -> CoreResult<()> {
        match msg {
            DetectorMsg::PinTransition { pin, previous, value } => self.on_transition(pin, previous, value),
            DetectorMsg::OpenTimerFired { pin, generation } => self.on_open_fire(pin, generation).await,
            DetectorMsg::CloseTimerFired { pin, generation } => self.on_close_fire(pin, generation).await,
            DetectorMsg::CooldownElapsed { generation } => {
                if self.cooldown_generation == Some(generation) {
                    self.cooling_down = false;
                    self.cooldown_generation = None;
                    self.rearm()?;
                }
                Ok(())
            }
            DetectorMsg::Reconcile => self.reconcile(),
            DetectorMsg::RearmCheck => self.rearm(),
        }
    }

    fn on_transition(&mut self, pin: u32, previous: u8, value: u8) -> CoreResult<()> {
        if previous == value {
            return Ok(());
        }
        if value == 0 {
            // 1 -> 0: fault starting.
            if self.close_timer.as_ref().is_some_and(|t| t.pin == pin) {
                if let Some(t) = self.close_timer.take() {
                    t.cancel.cancel();
                }
            }
            if self.open_timer.is_some() {
                debug!(pin, "another pin already has a scheduled open-timer, not scheduling");
                return Ok(());
            }
            if self.outstanding.is_none() && !self.cooling_down {
                self.try_schedule_open(pin)?;
            }
        } else {
            // 0 -> 1: fault clearing.
            if self.open_timer.as_ref().is_some_and(|t| t.pin == pin) {
                if let Some(t) = self.open_timer.take() {
                    t.cancel.cancel();
                }
            }
            if self.outstanding.as_ref().is_some_and(|o| o.pin == pin) && self.close_timer.is_none() {
                self.schedule_close(pin);
            }
        }
        Ok(())
    }

    fn try_schedule_open(&mut self, pin: u32) -> CoreResult<()> {
        if self.current_order_en_proceso()?.is_none() {
            debug!(pin, "no order EN_PROCESO, not scheduling auto-pause open-timer");
            return Ok(());
        }
        self.schedule_open(pin);
        Ok(())
    }

    fn schedule_open(&mut self, pin: u32) {
        let generation = self.next_generation();
        let cancel = CancellationToken::new();
        spawn_timer(self.config.t_open, cancel.clone(), self.self_tx.clone(), move || {
            DetectorMsg::OpenTimerFired { pin, generation }
        });
        self.open_timer = Some(TimerHandle { pin, generation, cancel });
    }

    fn schedule_close(&mut self, pin: u32) {
        let generation = self.next_generation();
        let cancel = CancellationToken::new();
        spawn_timer(self.config.t_close, cancel.clone(), self.self_tx.clone(), move || {
            DetectorMsg::CloseTimerFired { pin, generation }
        });
        self.close_timer = Some(TimerHandle { pin, generation, cancel });
    }

    fn schedule_cooldown(&mut self) {
        let generation = self.next_generation();
        self.cooldown_generation = Some(generation);
        let cancel = CancellationToken::new();
        spawn_timer(self.config.t_cooldown, cancel, self.self_tx.clone(), move || {
            DetectorMsg::CooldownElapsed { generation }
        });
    }

    fn next_generation(&mut self) -> u64 {
        let g = self.next_generation;
        self.next_generation += 1;
        g
    }

    async fn on_open_fire(&mut self, pin: u32, generation: u64) -> CoreResult<()> {
        let matches = self.open_timer.as_ref().is_some_and(|t| t.pin == pin && t.generation == generation);
        if !matches {
            return Ok(());
        }
        self.open_timer = None;

        if self.cooling_down || self.outstanding.is_some() {
            return Ok(());
        }
        if self.gpio.pin_state(pin) != Some(0) {
            return Ok(());
        }
        let Some(id_order) = self.current_order_en_proceso()? else {
            return Ok(());
        };

        let tipo = self.tipo_for_pin(pin);
        let dto = OpenPauseDto {
            tipo: Some(tipo.as_str().to_string()),
            descripcion: Some("automatically opened by field signal".to_string()),
            operario: Some(SYNTHETIC_OPERATOR.to_string()),
        };
        let pause = self.pauses.open_pause(id_order, dto).await?;
        info!(pin, pause_id = pause.id, tipo = tipo.as_str(), "auto-pause opened");
        self.outstanding = Some(Outstanding { pause_id: pause.id, pin });
        Ok(())
    }

    async fn on_close_fire(&mut self, pin: u32, generation: u64) -> CoreResult<()> {
        let matches = self.close_timer.as_ref().is_some_and(|t| t.pin == pin && t.generation == generation);
        if !matches {
            return Ok(());
        }
        self.close_timer = None;

        let Some(outstanding) = self.outstanding.take() else {
            return Ok(());
        };
        if outstanding.pin != pin {
            self.outstanding = Some(outstanding);
            return Ok(());
        }

        let still_open = self
            .store
            .with_transaction(|tx| Ok(pauses::get_by_id(tx, outstanding.pause_id)?.is_open()))?;
        if !still_open {
            debug!(pause_id = outstanding.pause_id, "auto-pause already closed manually, entering cooldown");
            self.enter_cooldown();
            return Ok(());
        }
        if self.gpio.pin_state(pin) != Some(1) {
            // Pin flipped back to fault; the 1->0 transition should already
            // have cancelled this timer, but guard defensively.
            self.outstanding = Some(outstanding);
            return Ok(());
        }

        let id_order = self
            .store
            .with_transaction(|tx| Ok(pauses::get_by_id(tx, outstanding.pause_id)?.id_order))?;
        self.pauses
            .close_pause(id_order, ClosePauseDto::default())
            .await?;
        info!(pin, pause_id = outstanding.pause_id, "auto-pause closed");
        self.enter_cooldown();
        Ok(())
    }

    fn enter_cooldown(&mut self) {
        self.cooling_down = true;
        self.schedule_cooldown();
    }

    /// spec.md §4.9 reconciliation: "if its horaFin is set by someone else,
    /// cancel the close-timer, clear state, and enter cooldown."
    fn reconcile(&mut self) -> CoreResult<()> {
        let Some(outstanding) = &self.outstanding else {
            return Ok(());
        };
        let pause_id = outstanding.pause_id;
        let still_open = self
            .store
            .with_transaction(|tx| Ok(pauses::get_by_id(tx, pause_id)?.is_open()))?;
        if !still_open {
            info!(pause_id, "auto-pause reconciled as closed by manual action");
            if let Some(t) = self.close_timer.take() {
                t.cancel.cancel();
            }
            self.outstanding = None;
            self.enter_cooldown();
        }
        Ok(())
    }

    /// Re-evaluates both pins and arms the first at fault with no scheduled
    /// open-timer (spec.md §4.9 cooldown-expiry / re-arm-after-manual-pause
    /// rule: "first-match wins").
    fn rearm(&mut self) -> CoreResult<()> {
        if self.cooling_down || self.outstanding.is_some() || self.open_timer.is_some() {
            return Ok(());
        }
        for pin in [self.config.ponderal_pin, self.config.etiqueta_pin] {
            if self.gpio.pin_state(pin) == Some(0) {
                self.try_schedule_open(pin)?;
                return Ok(());
            }
        }
        Ok(())
    }
}

fn spawn_timer(
    delay: Duration,
    cancel: CancellationToken,
    tx: mpsc::Sender<DetectorMsg>,
    make_msg: impl FnOnce() -> DetectorMsg + Send + 'static,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                let _ = tx.send(make_msg()).await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::models::OrderSpec;
    use crate::time::now;

    const PONDERAL: u32 = 1;
    const ETIQUETA: u32 = 2;

    fn test_config() -> AutoPauseConfig {
        AutoPauseConfig {
            ponderal_pin: PONDERAL,
            etiqueta_pin: ETIQUETA,
            t_open: Duration::from_secs(20),
            t_close: Duration::from_secs(5),
            t_cooldown: Duration::from_secs(30),
            reconcile_interval: Duration::from_secs(5),
            rearm_watchdog_interval: Duration::from_secs(3),
        }
    }

    async fn setup_en_proceso_order() -> (Arc<Store>, i64) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let id = store
            .with_transaction(|tx| {
                let spec = OrderSpec {
                    cod_order: "OF-1".to_string(),
                    operario: "A".to_string(),
                    lote: "L1".to_string(),
                    articulo: "X".to_string(),
                    descripcion: String::new(),
                    cantidad: 1000.0,
                    botes_caja: 10.0,
                    std_referencia: 20.0,
                    formato_bote: "500ml".to_string(),
                    tipo: "Conserva".to_string(),
                    uds_bote: 500.0,
                    repercap: false,
                };
                let order = orders::insert_order(tx, &spec, now())?;
                orders::iniciar(tx, order.id, now())?;
                Ok(order.id)
            })
            .unwrap();
        (store, id)
    }

    fn new_actor(
        store: Arc<Store>,
        gpio: Arc<GpioLink>,
        self_tx: mpsc::Sender<DetectorMsg>,
    ) -> Actor {
        let bus = Arc::new(EventBus::new());
        let locks = Arc::new(crate::locks::OrderLocks::new());
        let pauses = Arc::new(PauseEngine::new(store.clone(), bus, locks));
        Actor {
            gpio,
            store,
            pauses,
            config: test_config(),
            self_tx,
            open_timer: None,
            close_timer: None,
            outstanding: None,
            cooling_down: false,
            cooldown_generation: None,
            next_generation: 0,
        }
    }

    /// spec.md §4.9 / S4: a fault shorter than T_OPEN never opens a pause; a
    /// fault held past T_OPEN opens one, clearing past T_CLOSE closes it,
    /// and the cooldown that follows blocks re-arming until it elapses.
    #[tokio::test(start_paused = true)]
    async fn s4_debounced_open_close_cooldown() {
        let (store, _order_id) = setup_en_proceso_order().await;
        let gpio = GpioLink::new_for_test();
        let (tx, mut rx) = mpsc::channel(32);
        let mut actor = new_actor(store.clone(), gpio.clone(), tx);

        // Fault for 15s, then clears: shorter than T_OPEN, never opens.
        gpio.set_pin_for_test(PONDERAL, 0);
        actor.on_transition(PONDERAL, 1, 0).unwrap();
        assert!(actor.open_timer.is_some());

        tokio::time::advance(Duration::from_secs(15)).await;
        gpio.set_pin_for_test(PONDERAL, 1);
        actor.on_transition(PONDERAL, 0, 1).unwrap();
        assert!(actor.open_timer.is_none());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err(), "cancelled timer must not fire");
        assert!(actor.outstanding.is_none());

        // Fault held past T_OPEN: opens an auto-pause.
        gpio.set_pin_for_test(PONDERAL, 0);
        actor.on_transition(PONDERAL, 1, 0).unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        let msg = rx.recv().await.unwrap();
        actor.handle(msg).await.unwrap();
        assert!(actor.outstanding.is_some());

        // Clears and stays clear past T_CLOSE: closes the pause.
        gpio.set_pin_for_test(PONDERAL, 1);
        actor.on_transition(PONDERAL, 0, 1).unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        let msg = rx.recv().await.unwrap();
        actor.handle(msg).await.unwrap();
        assert!(actor.outstanding.is_none());
        assert!(actor.cooling_down);

        // A fault during cooldown does not schedule an open-timer.
        gpio.set_pin_for_test(PONDERAL, 0);
        actor.on_transition(PONDERAL, 1, 0).unwrap();
        assert!(actor.open_timer.is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        let msg = rx.recv().await.unwrap();
        actor.handle(msg).await.unwrap();
        assert!(!actor.cooling_down);
    }

    /// spec.md §4.9: "if another pin already has a scheduled open-timer, do
    /// not schedule one for this pin."
    #[tokio::test(start_paused = true)]
    async fn mutual_exclusion_across_pins() {
        let (store, _order_id) = setup_en_proceso_order().await;
        let gpio = GpioLink::new_for_test();
        let (tx, _rx) = mpsc::channel(32);
        let mut actor = new_actor(store, gpio.clone(), tx);

        gpio.set_pin_for_test(PONDERAL, 0);
        actor.on_transition(PONDERAL, 1, 0).unwrap();
        assert!(actor.open_timer.is_some());

        gpio.set_pin_for_test(ETIQUETA, 0);
        actor.on_transition(ETIQUETA, 1, 0).unwrap();
        assert_eq!(actor.open_timer.as_ref().unwrap().pin, PONDERAL);
    }

    /// spec.md §4.9 reconciliation: a manually-closed outstanding auto-pause
    /// clears the detector's state and enters cooldown.
    #[tokio::test(start_paused = true)]
    async fn reconcile_clears_manually_closed_outstanding_pause() {
        let (store, order_id) = setup_en_proceso_order().await;
        let gpio = GpioLink::new_for_test();
        let (tx, mut rx) = mpsc::channel(32);
        let mut actor = new_actor(store.clone(), gpio.clone(), tx);

        gpio.set_pin_for_test(PONDERAL, 0);
        actor.on_transition(PONDERAL, 1, 0).unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        let msg = rx.recv().await.unwrap();
        actor.handle(msg).await.unwrap();
        let pause_id = actor.outstanding.as_ref().unwrap().pause_id;

        // An operator closes it manually through the Pause Engine.
        store
            .with_transaction(|tx| {
                pauses::close(
                    tx,
                    &pauses::get_by_id(tx, pause_id)?,
                    None,
                    None,
                    None,
                    now(),
                )?;
                orders::set_estado(tx, order_id, crate::models::EstadoOrden::EnProceso)
            })
            .unwrap();

        actor.reconcile().unwrap();
        assert!(actor.outstanding.is_none());
        assert!(actor.cooling_down);
    }
}
