use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::{BoxFuture, join_all};
use grace_train_back::{
    dao::record_store::{MemoryStore, RecordStore},
    engine::{
        GraceTrainMachine, HypeBoard, HypeTrainTracker, TrainEvent, TrainListener,
        depot::{Car, CarDepot, DepotClient, DepotConfig, TrainEndOutcome},
        events::{AddPayload, EndPayload, StartPayload},
        grace::{GraceSettings, HYPE_TRAIN_ENDER},
        hype::{HypeEnd, HypeProgress, PointsPerSub, RawContribution, RawContributionKind},
        train::{GraceEvent, GraceKind, GraceUser, TrainId},
    },
};

#[derive(Default)]
struct Collector(Mutex<Vec<TrainEvent>>);

impl TrainListener for Collector {
    fn on_train_event(&self, event: &TrainEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

impl Collector {
    fn events(&self) -> Vec<TrainEvent> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&TrainEvent) -> bool) -> usize {
        self.events().iter().filter(|event| pred(event)).count()
    }
}

/// Depot whose latency shrinks with each call, so later calls would overtake earlier ones.
struct ScriptedDepot {
    calls: Mutex<u64>,
}

impl ScriptedDepot {
    fn new() -> Self {
        Self {
            calls: Mutex::new(0),
        }
    }

    fn next_delay(&self) -> Duration {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        Duration::from_millis(200u64.saturating_sub(*calls * 20))
    }
}

impl CarDepot for ScriptedDepot {
    fn assign_car(
        &self,
        _train_id: TrainId,
        _score: u64,
        participant: &GraceUser,
        index: usize,
    ) -> BoxFuture<'static, Car> {
        let delay = self.next_delay();
        let mut car = Car::solid(participant.color.clone());
        car.attributes.insert("index".into(), index.into());
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            car
        })
    }

    fn start_batch(
        &self,
        _train_id: TrainId,
        _score: u64,
        participants: &[GraceUser],
    ) -> BoxFuture<'static, Vec<Car>> {
        let delay = self.next_delay();
        let cars: Vec<Car> = participants
            .iter()
            .map(|user| Car::solid(user.color.clone()))
            .collect();
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            cars
        })
    }

    fn end_train(&self, _train_id: TrainId, _score: u64) -> BoxFuture<'static, TrainEndOutcome> {
        Box::pin(async { TrainEndOutcome { debut_count: 1 } })
    }
}

fn grace(index: usize) -> GraceEvent {
    GraceEvent {
        timestamp_ms: index as i64,
        user: GraceUser {
            id: format!("user-{index}"),
            display_name: format!("User{index}"),
            color: format!("#{index:06x}"),
        },
        kind: GraceKind::Normal,
    }
}

fn machine_with(depot: Arc<dyn CarDepot>, store: MemoryStore) -> (GraceTrainMachine, HypeBoard, Arc<Collector>) {
    let collector = Arc::new(Collector::default());
    let board = HypeBoard::default();
    let machine = GraceTrainMachine::builder(depot, RecordStore::new(Arc::new(store)))
        .settings(GraceSettings::default())
        .hype_board(board.clone())
        .listener(collector.clone())
        .build();
    (machine, board, collector)
}

#[tokio::test(start_paused = true)]
async fn committed_order_matches_submission_order_despite_latency() {
    let (machine, _, collector) = machine_with(Arc::new(ScriptedDepot::new()), MemoryStore::default());

    let submissions: Vec<_> = (0..9).map(|index| machine.on_grace(grace(index))).collect();
    for result in join_all(submissions).await {
        result.unwrap();
    }

    let events = collector.events();
    assert_eq!(collector.count(|event| matches!(event, TrainEvent::Start(_))), 1);

    let mut colors = Vec::new();
    for event in &events {
        match event {
            TrainEvent::Start(start) => match &start.payload {
                StartPayload::Grace { cars } => {
                    assert_eq!(cars.len(), 5);
                    colors.extend(cars.iter().map(|car| car.color.clone()));
                }
                other => panic!("unexpected start payload {other:?}"),
            },
            TrainEvent::Add(add) => match &add.payload {
                AddPayload::Grace { car } => colors.push(car.color.clone()),
                other => panic!("unexpected add payload {other:?}"),
            },
            other => panic!("unexpected event {other:?}"),
        }
    }
    let expected: Vec<String> = (0..9).map(|index| format!("#{index:06x}")).collect();
    assert_eq!(colors, expected);

    let snapshot = machine.current_train().await.unwrap().unwrap();
    match snapshot.payload {
        StartPayload::Grace { cars } => {
            let indices: Vec<_> = cars[5..]
                .iter()
                .map(|car| car.attributes["index"].as_u64().unwrap())
                .collect();
            assert_eq!(indices, vec![5, 6, 7, 8]);
        }
        other => panic!("unexpected snapshot payload {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_depot_falls_back_to_user_colors() {
    let depot = DepotClient::new(DepotConfig {
        base_url: Some("http://127.0.0.1:1".into()),
        token: Some("secret".into()),
        timeout: Duration::from_millis(200),
    })
    .unwrap();
    let store = MemoryStore::default();
    let (machine, _, collector) = machine_with(Arc::new(depot), store.clone());

    for index in 0..6 {
        machine.on_grace(grace(index)).await.unwrap();
    }
    machine.break_train("Breaker", None).await.unwrap();

    let events = collector.events();
    match &events[0] {
        TrainEvent::Start(start) => match &start.payload {
            StartPayload::Grace { cars } => {
                for (index, car) in cars.iter().enumerate() {
                    assert_eq!(car, &Car::solid(format!("#{index:06x}")));
                }
            }
            other => panic!("unexpected start payload {other:?}"),
        },
        other => panic!("expected a start, got {other:?}"),
    }
    match events.last() {
        Some(TrainEvent::Report(report)) => assert_eq!(report.debut_count, 0),
        other => panic!("expected a report, got {other:?}"),
    }
    assert_eq!(store.snapshot().grace_records.len(), 1);
}

fn hype_progress(total: u64, contribution: Option<RawContribution>) -> HypeProgress {
    HypeProgress {
        id: "hype-1".into(),
        level: 1,
        total,
        progress: total,
        goal: 1000,
        last_contribution: contribution,
    }
}

#[tokio::test]
async fn hype_train_takes_over_a_buffering_train() {
    let store = MemoryStore::default();
    let (machine, board, collector) = machine_with(Arc::new(DepotClient::offline()), store.clone());
    let tracker = HypeTrainTracker::new(board, machine.clone(), Arc::new(PointsPerSub(500)));

    machine.on_grace(grace(0)).await.unwrap();
    machine.on_grace(grace(1)).await.unwrap();
    assert!(collector.events().is_empty());

    tracker
        .progress(hype_progress(
            300,
            Some(RawContribution {
                user_id: "cheerer".into(),
                color: "#9146ff".into(),
                kind: RawContributionKind::Bits,
                total: 300,
            }),
        ))
        .await
        .unwrap();

    match &collector.events()[0] {
        TrainEvent::Start(start) => {
            assert_eq!(start.combo_count, 2);
            match &start.payload {
                StartPayload::Hype(totals) => assert_eq!(totals.graces, 2),
                other => panic!("expected a hype start, got {other:?}"),
            }
        }
        other => panic!("expected a start, got {other:?}"),
    }

    for index in 2..8 {
        machine.on_grace(grace(index)).await.unwrap();
    }
    machine.break_train("Chatter", None).await.unwrap();
    assert!(machine.current_train().await.unwrap().is_some());

    tracker
        .end(HypeEnd {
            id: "hype-1".into(),
            level: 2,
            total: 1200,
        })
        .await
        .unwrap();

    let events = collector.events();
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, TrainEvent::Start(_)))
            .count(),
        1
    );
    let ends: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            TrainEvent::End(end) => Some(end),
            _ => None,
        })
        .collect();
    assert_eq!(ends.len(), 1);
    match &ends[0].payload {
        EndPayload::Hype(totals) => {
            assert_eq!(totals.level, 2);
            assert_eq!(totals.total, 1200);
            assert_eq!(totals.graces, 8);
        }
        other => panic!("expected a hype end, got {other:?}"),
    }
    match events.last() {
        Some(TrainEvent::Report(report)) => {
            assert!(report.hyped);
            assert_eq!(report.ended_by, HYPE_TRAIN_ENDER);
            assert_eq!(report.record.length, 8);
        }
        other => panic!("expected a report, got {other:?}"),
    }

    let document = store.snapshot();
    assert_eq!(document.hyped_records.len(), 1);
    assert!(document.grace_records.is_empty());
    assert!(machine.current_train().await.unwrap().is_none());
}

#[tokio::test]
async fn signals_for_an_ended_hype_train_do_not_revive_it() {
    let store = MemoryStore::default();
    let (machine, board, collector) = machine_with(Arc::new(DepotClient::offline()), store.clone());
    let tracker = HypeTrainTracker::new(board.clone(), machine.clone(), Arc::new(PointsPerSub(500)));

    tracker.progress(hype_progress(300, None)).await.unwrap();
    let end = HypeEnd {
        id: "hype-1".into(),
        level: 1,
        total: 300,
    };
    tracker.end(end.clone()).await.unwrap();
    assert!(machine.current_train().await.unwrap().is_none());

    tracker.progress(hype_progress(700, None)).await.unwrap();
    tracker.end(end).await.unwrap();
    assert!(!board.is_live());

    for index in 0..6 {
        machine.on_grace(grace(index)).await.unwrap();
    }
    machine.break_train("Chatter", None).await.unwrap();
    assert!(machine.current_train().await.unwrap().is_none());

    let starts = collector.count(|event| matches!(event, TrainEvent::Start(_)));
    let ends = collector.count(|event| matches!(event, TrainEvent::End(_)));
    assert_eq!((starts, ends), (2, 2));
    match collector.events().last() {
        Some(TrainEvent::Report(report)) => {
            assert!(!report.hyped);
            assert_eq!(report.ended_by, "Chatter");
        }
        other => panic!("expected a report, got {other:?}"),
    }
    assert_eq!(store.snapshot().grace_records.len(), 1);
    assert_eq!(store.snapshot().hyped_records.len(), 1);
}

#[tokio::test]
async fn records_beat_and_tie_against_the_previous_best() {
    let store = MemoryStore::default();
    let (machine, _, collector) = machine_with(Arc::new(DepotClient::offline()), store.clone());

    for _ in 0..2 {
        for index in 0..5 {
            machine.on_grace(grace(index)).await.unwrap();
        }
        machine.break_train("Breaker", Some("msg".into())).await.unwrap();
    }

    let outcomes: Vec<_> = collector
        .events()
        .into_iter()
        .filter_map(|event| match event {
            TrainEvent::Report(report) => Some(report.outcome),
            _ => None,
        })
        .collect();
    use grace_train_back::dao::record_store::RecordOutcome;
    assert_eq!(outcomes, vec![RecordOutcome::Broken, RecordOutcome::Tied]);
    assert_eq!(store.snapshot().grace_records.len(), 2);
}
