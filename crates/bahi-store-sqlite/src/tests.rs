//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use bahi_core::{
  challan::{DispatchRequest, NewChallan, NewChallanLine},
  ledger::{LedgerFilter, LedgerRecord},
  order::{Demand, DispatchStatus, NewDemand, NewOrder, NewOrderLine, Order},
  piece::{NewPiece, PieceFilter, PieceStatus, StockPiece},
  production::{MatchingCount, NewProduction, ProductionEvent, ProductionPayload},
  store::InventoryStore,
  validator::ShortageUnit,
};

use crate::{Error, SqliteStore, encode::encode_uuid};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn day() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 4, 1).unwrap() }

fn d(v: i64) -> Decimal { Decimal::from(v) }

fn core(e: Error) -> bahi_core::Error {
  match e {
    Error::Core(e) => e,
    other => panic!("expected a core error, got {other:?}"),
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

async fn supply_takas(
  s: &SqliteStore,
  fabric: Uuid,
  factory: Uuid,
  lengths: &[i64],
) -> ProductionEvent {
  let pieces = lengths
    .iter()
    .enumerate()
    .map(|(i, l)| NewPiece { label: format!("T-{}", i + 1), length: d(*l) })
    .collect();
  s.record_production(NewProduction {
    date:       day(),
    factory_id: factory,
    fabric_id:  fabric,
    design_id:  None,
    payload:    ProductionPayload::Taka { pieces },
  })
  .await
  .unwrap()
}

fn taka_line(fabric: Uuid, length: i64) -> NewOrderLine {
  NewOrderLine {
    fabric_id:  fabric,
    design_id:  None,
    factory_id: None,
    demand:     NewDemand::Taka { length: Some(d(length)), units: None },
  }
}

fn order_of(lines: Vec<NewOrderLine>) -> NewOrder {
  NewOrder { order_no: "ORD-1".into(), party_id: None, date: day(), lines }
}

fn challan_of(order: &Order, request: DispatchRequest) -> NewChallan {
  NewChallan {
    challan_no: "CH-1".into(),
    order_id:   order.order_id,
    date:       day(),
    lines:      vec![NewChallanLine {
      order_line_id: order.lines[0].line_id,
      factory_id:    None,
      request,
    }],
  }
}

fn fifo(length: i64) -> DispatchRequest {
  DispatchRequest::Taka { length: Some(d(length)), pieces: Vec::new() }
}

async fn only_record(s: &SqliteStore, fabric: Uuid) -> LedgerRecord {
  let mut records = s
    .list_ledger(&LedgerFilter { fabric_id: Some(fabric), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(records.len(), 1, "expected exactly one ledger record");
  records.remove(0)
}

async fn pieces_of(s: &SqliteStore, fabric: Uuid, status: PieceStatus) -> Vec<StockPiece> {
  s.list_pieces(&PieceFilter {
    fabric_id: Some(fabric),
    status: Some(status),
    ..Default::default()
  })
  .await
  .unwrap()
}

async fn record_at(s: &SqliteStore, fabric: Uuid, factory: Option<Uuid>) -> LedgerRecord {
  s.list_ledger(&LedgerFilter { fabric_id: Some(fabric), ..Default::default() })
    .await
    .unwrap()
    .into_iter()
    .find(|r| r.key.factory_id == factory)
    .expect("ledger record for factory")
}

/// Reserved length and pieces summed over every record of `fabric`.
async fn reserved_total(s: &SqliteStore, fabric: Uuid) -> (Decimal, i64) {
  s.list_ledger(&LedgerFilter { fabric_id: Some(fabric), ..Default::default() })
    .await
    .unwrap()
    .iter()
    .fold((Decimal::ZERO, 0), |(l, p), r| {
      (l + r.counters.reserved_length, p + r.counters.reserved_pieces)
    })
}

async fn supply_sarees(
  s: &SqliteStore,
  fabric: Uuid,
  factory: Uuid,
  matching: Uuid,
  cut: Decimal,
  count: i64,
) -> ProductionEvent {
  s.record_production(NewProduction {
    date:       day(),
    factory_id: factory,
    fabric_id:  fabric,
    design_id:  None,
    payload:    ProductionPayload::Saree {
      cut,
      matchings: vec![MatchingCount { matching_id: matching, count }],
    },
  })
  .await
  .unwrap()
}

/// Re-attribute a production to another fabric behind the store's back, the
/// way an out-of-band data fix would.
async fn move_production(s: &SqliteStore, event: &ProductionEvent, fabric: Uuid) {
  let (fabric, production) = (encode_uuid(fabric), encode_uuid(event.production_id));
  s.conn
    .call(move |conn| {
      conn.execute(
        "UPDATE productions SET fabric_id = ?1 WHERE production_id = ?2",
        [fabric.as_str(), production.as_str()],
      )?;
      Ok(())
    })
    .await
    .unwrap();
}

fn assert_non_negative(records: &[LedgerRecord]) {
  for r in records {
    let c = &r.counters;
    assert!(
      c.supplied_length >= Decimal::ZERO
        && c.reserved_length >= Decimal::ZERO
        && c.supplied_pieces >= 0
        && c.reserved_pieces >= 0,
      "negative counters on {}: {c:?}",
      r.ledger_id
    );
  }
}

fn dispatched_length(order: &Order) -> Decimal {
  match &order.lines[0].demand {
    Demand::Taka { dispatched_length, .. } => *dispatched_length,
    Demand::Saree { .. } => panic!("not a taka line"),
  }
}

/// 310 m in three rolls, 250 m reserved by one order.
async fn reserved_fabric(s: &SqliteStore) -> (Uuid, Order) {
  let fabric = Uuid::new_v4();
  supply_takas(s, fabric, Uuid::new_v4(), &[100, 120, 90]).await;
  let order = s.place_order(order_of(vec![taka_line(fabric, 250)]), false).await.unwrap();
  (fabric, order)
}

// ─── Production intake ───────────────────────────────────────────────────────

#[tokio::test]
async fn production_supplies_ledger_and_pieces() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let factory = Uuid::new_v4();
  let event = supply_takas(&s, fabric, factory, &[100, 120, 90]).await;

  let record = only_record(&s, fabric).await;
  assert_eq!(record.key.factory_id, Some(factory));
  assert_eq!(record.counters.supplied_length, d(310));
  assert_eq!(record.counters.supplied_pieces, 3);
  assert_eq!(record.counters.reserved_length, Decimal::ZERO);

  let pieces = pieces_of(&s, fabric, PieceStatus::Available).await;
  let labels: Vec<_> = pieces.iter().map(|p| p.label.as_str()).collect();
  assert_eq!(labels, ["T-1", "T-2", "T-3"]);
  assert!(pieces.iter().all(|p| p.production_id == event.production_id));

  let fetched = s.get_production(event.production_id).await.unwrap().unwrap();
  assert_eq!(fetched.payload, event.payload);
}

#[tokio::test]
async fn repeated_production_lands_on_same_record() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let factory = Uuid::new_v4();
  supply_takas(&s, fabric, factory, &[100]).await;
  supply_takas(&s, fabric, factory, &[50, 50]).await;

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(200));
  assert_eq!(record.counters.supplied_pieces, 3);
}

#[tokio::test]
async fn amending_production_replaces_its_supply() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let factory = Uuid::new_v4();
  let event = supply_takas(&s, fabric, factory, &[100, 120, 90]).await;

  let amended = s
    .update_production(event.production_id, NewProduction {
      date:       day(),
      factory_id: factory,
      fabric_id:  fabric,
      design_id:  None,
      payload:    ProductionPayload::Taka {
        pieces: vec![
          NewPiece { label: "A".into(), length: d(50) },
          NewPiece { label: "B".into(), length: d(60) },
        ],
      },
    })
    .await
    .unwrap();
  assert_eq!(amended.recorded_at, event.recorded_at);

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(110));
  assert_eq!(record.counters.supplied_pieces, 2);
  assert_eq!(pieces_of(&s, fabric, PieceStatus::Available).await.len(), 2);
}

#[tokio::test]
async fn deleting_production_removes_supply() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let event = supply_takas(&s, fabric, Uuid::new_v4(), &[100, 20]).await;

  s.delete_production(event.production_id).await.unwrap();

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, Decimal::ZERO);
  assert_eq!(record.counters.supplied_pieces, 0);
  assert!(pieces_of(&s, fabric, PieceStatus::Available).await.is_empty());
  assert!(s.get_production(event.production_id).await.unwrap().is_none());
}

#[tokio::test]
async fn production_with_sold_pieces_cannot_be_removed() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let event = supply_takas(&s, fabric, Uuid::new_v4(), &[100, 120]).await;
  let order = s.place_order(order_of(vec![taka_line(fabric, 100)]), false).await.unwrap();
  s.create_challan(challan_of(&order, fifo(100))).await.unwrap();

  let err = core(s.delete_production(event.production_id).await.unwrap_err());
  assert!(matches!(err, bahi_core::Error::PiecesInUse(id) if id == event.production_id));

  // Nothing moved.
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(120));
}

#[tokio::test]
async fn empty_production_is_rejected() {
  let s = store().await;
  let err = s
    .record_production(NewProduction {
      date:       day(),
      factory_id: Uuid::new_v4(),
      fabric_id:  Uuid::new_v4(),
      design_id:  None,
      payload:    ProductionPayload::Taka { pieces: Vec::new() },
    })
    .await
    .unwrap_err();
  assert!(matches!(core(err), bahi_core::Error::InvalidInput(_)));
}

// ─── Orders & availability ───────────────────────────────────────────────────

#[tokio::test]
async fn placing_order_reserves_stock() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.reserved_length, d(250));
  assert_eq!(record.counters.reserved_pieces, 3);
  assert_eq!(record.counters.available_length(), d(60));
  assert_eq!(order.status, DispatchStatus::Pending);

  let Demand::Taka { ledger_id, .. } = &order.lines[0].demand else { panic!("taka line") };
  assert_eq!(*ledger_id, Some(record.ledger_id));

  let fetched = s.get_order(order.order_id).await.unwrap().unwrap();
  assert_eq!(fetched.order_no, "ORD-1");
}

#[tokio::test]
async fn unchecked_order_may_overcommit() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  supply_takas(&s, fabric, Uuid::new_v4(), &[100]).await;

  s.place_order(order_of(vec![taka_line(fabric, 400)]), false).await.unwrap();

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.reserved_length, d(400));
  assert_eq!(record.counters.available_length(), d(-300));
}

#[tokio::test]
async fn enforced_order_is_refused_without_writes() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  supply_takas(&s, fabric, Uuid::new_v4(), &[100, 120, 90]).await;

  let err = core(
    s.place_order(order_of(vec![taka_line(fabric, 400)]), true)
      .await
      .unwrap_err(),
  );
  let bahi_core::Error::InsufficientStock(shortages) = err else {
    panic!("expected a shortage, got {err:?}");
  };
  assert_eq!(shortages.len(), 1);
  assert_eq!(shortages[0].required, d(400));
  assert_eq!(shortages[0].available, d(310));
  assert_eq!(shortages[0].shortage, d(90));

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.reserved_length, Decimal::ZERO);
}

#[tokio::test]
async fn malformed_order_is_refused_without_writes() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  supply_takas(&s, fabric, Uuid::new_v4(), &[100]).await;

  for enforce in [false, true] {
    let err = core(
      s.place_order(order_of(vec![taka_line(fabric, 50), taka_line(fabric, -250)]), enforce)
        .await
        .unwrap_err(),
    );
    assert!(
      matches!(&err, bahi_core::Error::InvalidInput(msg) if msg.starts_with("line 1:")),
      "{err:?}"
    );
  }
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.reserved_length, Decimal::ZERO);
  assert_eq!(record.counters.reserved_pieces, 0);

  let zero_units = NewOrderLine {
    demand: NewDemand::Taka { length: None, units: Some(0) },
    ..taka_line(fabric, 1)
  };
  let empty_saree = NewOrderLine {
    demand: NewDemand::Saree { cut: None, matchings: Vec::new() },
    ..taka_line(fabric, 1)
  };
  for line in [zero_units, empty_saree] {
    let err = core(s.check(vec![line]).await.unwrap_err());
    assert!(matches!(err, bahi_core::Error::InvalidInput(_)), "{err:?}");
  }
}

#[tokio::test]
async fn check_reports_every_short_line() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  supply_takas(&s, fabric, Uuid::new_v4(), &[100]).await;

  let availability = s
    .check(vec![
      taka_line(fabric, 60),
      taka_line(fabric, 60),       // cumulative: 120 > 100
      taka_line(Uuid::new_v4(), 10), // no stock at all
    ])
    .await
    .unwrap();

  assert!(!availability.valid);
  let lines: Vec<usize> = availability.shortages.iter().map(|s| s.line).collect();
  assert_eq!(lines, [1, 2]);
  assert_eq!(availability.shortages[0].available, d(40));
  assert_eq!(availability.shortages[1].available, Decimal::ZERO);
}

#[tokio::test]
async fn cancelling_releases_reservation_once() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;

  let cancelled = s.cancel_order(order.order_id).await.unwrap();
  assert_eq!(cancelled.status, DispatchStatus::Cancelled);
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.reserved_length, Decimal::ZERO);
  assert_eq!(record.counters.reserved_pieces, 0);

  // Second cancel is a no-op.
  s.cancel_order(order.order_id).await.unwrap();
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.reserved_length, Decimal::ZERO);

  let err = core(s.create_challan(challan_of(&order, fifo(100))).await.unwrap_err());
  assert!(matches!(err, bahi_core::Error::OrderClosed(_)));
}

#[tokio::test]
async fn missing_order_is_not_found() {
  let s = store().await;
  assert!(s.get_order(Uuid::new_v4()).await.unwrap().is_none());
  let err = core(s.cancel_order(Uuid::new_v4()).await.unwrap_err());
  assert!(err.is_not_found());
}

// ─── Dispatch ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dispatch_scenario_round_trip() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;

  let challan = s.create_challan(challan_of(&order, fifo(220))).await.unwrap();

  let sold = pieces_of(&s, fabric, PieceStatus::Sold).await;
  let sold_lengths: Vec<Decimal> = sold.iter().map(|p| p.length).collect();
  assert_eq!(sold_lengths, [d(100), d(120)]);
  assert!(sold.iter().all(|p| p.challan_id == Some(challan.challan_id)));
  let left = pieces_of(&s, fabric, PieceStatus::Available).await;
  assert_eq!(left.len(), 1);
  assert_eq!(left[0].length, d(90));

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(90));
  assert_eq!(record.counters.reserved_length, d(30));
  assert_eq!(record.counters.available_length(), d(60));

  let after = s.get_order(order.order_id).await.unwrap().unwrap();
  assert_eq!(dispatched_length(&after), d(220));
  assert_eq!(after.status, DispatchStatus::Partial);

  s.delete_challan(challan.challan_id).await.unwrap();

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(310));
  assert_eq!(record.counters.reserved_length, d(250));
  assert_eq!(record.counters.supplied_pieces, 3);
  assert_eq!(record.counters.reserved_pieces, 3);
  assert_eq!(pieces_of(&s, fabric, PieceStatus::Available).await.len(), 3);

  let after = s.get_order(order.order_id).await.unwrap().unwrap();
  assert_eq!(dispatched_length(&after), Decimal::ZERO);
  assert_eq!(after.status, DispatchStatus::Pending);
  assert!(s.get_challan(challan.challan_id).await.unwrap().is_none());
}

#[tokio::test]
async fn validated_dispatch_commits() {
  let s = store().await;
  let (_, order) = reserved_fabric(&s).await;
  let request = challan_of(&order, fifo(250));

  let availability = s.validate_dispatch(request.clone()).await.unwrap();
  assert!(availability.valid);
  s.create_challan(request).await.unwrap();
}

#[tokio::test]
async fn dispatch_may_exceed_order_when_stock_allows() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;

  // Reservation 250 plus free 60 covers all three rolls.
  let challan = s.create_challan(challan_of(&order, fifo(310))).await.unwrap();
  assert_eq!(challan.lines[0].dispatched_length(), d(310));

  // Only the reserved 250 is released; the free 60 leaves supply alone.
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, Decimal::ZERO);
  assert_eq!(record.counters.reserved_length, Decimal::ZERO);
  assert_eq!(record.counters.reserved_pieces, 0);
  let after = s.get_order(order.order_id).await.unwrap().unwrap();
  assert_eq!(after.status, DispatchStatus::Completed);

  // And the reversal puts back exactly that split.
  s.delete_challan(challan.challan_id).await.unwrap();
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(310));
  assert_eq!(record.counters.reserved_length, d(250));
}

#[tokio::test]
async fn overshooting_rolls_must_fit_capacity() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  supply_takas(&s, fabric, Uuid::new_v4(), &[100, 120]).await;
  let order = s.place_order(order_of(vec![taka_line(fabric, 150)]), false).await.unwrap();
  // A second order holds the rest, leaving no free stock.
  s.place_order(order_of(vec![taka_line(fabric, 70)]), false).await.unwrap();

  // 150 needs both rolls (220), but only the 150 held is usable.
  let availability = s.validate_dispatch(challan_of(&order, fifo(150))).await.unwrap();
  assert!(!availability.valid);
  assert_eq!(availability.shortages[0].required, d(220));
  assert_eq!(availability.shortages[0].available, d(150));
}

#[tokio::test]
async fn short_dispatch_is_refused_without_writes() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;
  let request = challan_of(&order, fifo(400));

  let availability = s.validate_dispatch(request.clone()).await.unwrap();
  assert!(!availability.valid);
  assert_eq!(availability.shortages[0].unit, ShortageUnit::Length);

  let err = core(s.create_challan(request).await.unwrap_err());
  assert!(matches!(err, bahi_core::Error::InsufficientStock(_)));
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(310));
  assert_eq!(pieces_of(&s, fabric, PieceStatus::Sold).await.len(), 0);
}

#[tokio::test]
async fn explicit_pieces_are_dispatched_and_reported_when_sold() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;
  let pieces = pieces_of(&s, fabric, PieceStatus::Available).await;
  let third = pieces[2].piece_id;

  let select = |ids: Vec<Uuid>| DispatchRequest::Taka { length: None, pieces: ids };
  s.create_challan(challan_of(&order, select(vec![third]))).await.unwrap();
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(220));
  assert_eq!(record.counters.reserved_length, d(160));

  let availability = s
    .validate_dispatch(challan_of(&order, select(vec![third])))
    .await
    .unwrap();
  assert!(!availability.valid);
  assert_eq!(availability.shortages[0].piece_id, Some(third));
}

#[tokio::test]
async fn editing_challan_recommits_or_rolls_back() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;
  let challan = s.create_challan(challan_of(&order, fifo(220))).await.unwrap();

  // Too much: the whole edit is refused and the old challan stands.
  let err = core(
    s.update_challan(challan.challan_id, challan_of(&order, fifo(400)))
      .await
      .unwrap_err(),
  );
  assert!(matches!(err, bahi_core::Error::InsufficientStock(_)));
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(90));
  assert_eq!(record.counters.reserved_length, d(30));
  assert_eq!(pieces_of(&s, fabric, PieceStatus::Sold).await.len(), 2);

  // Smaller: old allocation reverted, first roll taken again.
  let edited = s
    .update_challan(challan.challan_id, challan_of(&order, fifo(100)))
    .await
    .unwrap();
  assert_eq!(edited.challan_id, challan.challan_id);
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(210));
  assert_eq!(record.counters.reserved_length, d(150));
  let sold = pieces_of(&s, fabric, PieceStatus::Sold).await;
  assert_eq!(sold.len(), 1);
  assert_eq!(sold[0].length, d(100));

  let after = s.get_order(order.order_id).await.unwrap().unwrap();
  assert_eq!(dispatched_length(&after), d(100));
}

#[tokio::test]
async fn order_placed_before_production_releases_its_placeholder() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let order = s.place_order(order_of(vec![taka_line(fabric, 250)]), false).await.unwrap();
  let placeholder = only_record(&s, fabric).await;
  assert_eq!(placeholder.key.factory_id, None);
  assert_eq!(placeholder.counters.reserved_length, d(250));

  let factory = Uuid::new_v4();
  supply_takas(&s, fabric, factory, &[100, 120, 90]).await;

  let challan = s.create_challan(challan_of(&order, fifo(220))).await.unwrap();
  let a = &challan.lines[0].allocations[0];
  assert_eq!(a.ledger_id, record_at(&s, fabric, Some(factory)).await.ledger_id);
  assert_eq!(a.held_ledger_id, Some(placeholder.ledger_id));
  assert_eq!((a.reserved_length, a.reserved_pieces), (d(220), 2));

  // Only the undispatched 30 m stays reserved, on the placeholder.
  assert_eq!(reserved_total(&s, fabric).await, (d(30), 1));
  let stocked = record_at(&s, fabric, Some(factory)).await;
  assert_eq!(stocked.counters.supplied_length, d(90));
  assert_eq!(stocked.counters.reserved_length, Decimal::ZERO);
  assert!(s.recompute_all().await.unwrap().corrections.is_empty());

  // Reverting puts the hold back where it came from.
  s.delete_challan(challan.challan_id).await.unwrap();
  let placeholder_after = record_at(&s, fabric, None).await;
  assert_eq!(placeholder_after.counters, placeholder.counters);
  assert_eq!(record_at(&s, fabric, Some(factory)).await.counters.supplied_length, d(310));
  assert!(s.recompute_all().await.unwrap().corrections.is_empty());

  s.create_challan(challan_of(&order, fifo(220))).await.unwrap();
  s.cancel_order(order.order_id).await.unwrap();
  assert_eq!(reserved_total(&s, fabric).await, (Decimal::ZERO, 0));

  let report = s.recompute_all().await.unwrap();
  assert!(report.corrections.is_empty(), "{:?}", report.corrections);
  assert_eq!(report.orders_repointed, 0);
}

#[tokio::test]
async fn pinned_line_cannot_ship_from_another_factory() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let (home, other) = (Uuid::new_v4(), Uuid::new_v4());
  supply_takas(&s, fabric, home, &[100]).await;
  supply_takas(&s, fabric, other, &[100]).await;
  let order = s
    .place_order(order_of(vec![NewOrderLine { factory_id: Some(home), ..taka_line(fabric, 100) }]), true)
    .await
    .unwrap();

  let mut elsewhere = challan_of(&order, fifo(100));
  elsewhere.lines[0].factory_id = Some(other);
  let err = core(s.validate_dispatch(elsewhere.clone()).await.unwrap_err());
  assert!(matches!(err, bahi_core::Error::InvalidInput(_)), "{err:?}");
  let err = core(s.create_challan(elsewhere).await.unwrap_err());
  assert!(matches!(err, bahi_core::Error::InvalidInput(_)), "{err:?}");
  assert_eq!(record_at(&s, fabric, Some(other)).await.counters.supplied_length, d(100));

  let mut at_home = challan_of(&order, fifo(100));
  at_home.lines[0].factory_id = Some(home);
  s.create_challan(at_home).await.unwrap();
  assert_eq!(record_at(&s, fabric, Some(home)).await.counters.supplied_length, Decimal::ZERO);
  assert_eq!(record_at(&s, fabric, Some(other)).await.counters.supplied_length, d(100));
}

#[tokio::test]
async fn reverting_on_cancelled_order_restores_supply_only() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;
  let challan = s.create_challan(challan_of(&order, fifo(220))).await.unwrap();
  s.cancel_order(order.order_id).await.unwrap();

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.reserved_length, Decimal::ZERO);

  s.delete_challan(challan.challan_id).await.unwrap();
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(310));
  assert_eq!(record.counters.reserved_length, Decimal::ZERO);
  assert_eq!(pieces_of(&s, fabric, PieceStatus::Available).await.len(), 3);
}

#[tokio::test]
async fn saree_matchings_reserve_and_dispatch_by_unit() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let matching = Uuid::new_v4();
  let cut: Decimal = "5.5".parse().unwrap();
  s.record_production(NewProduction {
    date:       day(),
    factory_id: Uuid::new_v4(),
    fabric_id:  fabric,
    design_id:  None,
    payload:    ProductionPayload::Saree {
      cut,
      matchings: vec![MatchingCount { matching_id: matching, count: 10 }],
    },
  })
  .await
  .unwrap();

  let order = s
    .place_order(
      order_of(vec![NewOrderLine {
        fabric_id:  fabric,
        design_id:  None,
        factory_id: None,
        demand:     NewDemand::Saree {
          cut:       Some(cut),
          matchings: vec![MatchingCount { matching_id: matching, count: 4 }],
        },
      }]),
      true,
    )
    .await
    .unwrap();

  let record = only_record(&s, fabric).await;
  assert_eq!(record.key.matching_id, Some(matching));
  assert_eq!(record.counters.reserved_pieces, 4);
  assert_eq!(record.counters.reserved_length, d(22));

  let send = |count| DispatchRequest::Saree {
    matchings: vec![MatchingCount { matching_id: matching, count }],
  };
  s.create_challan(challan_of(&order, send(3))).await.unwrap();
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_pieces, 7);
  assert_eq!(record.counters.reserved_pieces, 1);
  assert_eq!(record.counters.supplied_length, "38.5".parse::<Decimal>().unwrap());
  let after = s.get_order(order.order_id).await.unwrap().unwrap();
  assert_eq!(after.status, DispatchStatus::Partial);

  s.create_challan(challan_of(&after, send(1))).await.unwrap();
  let after = s.get_order(order.order_id).await.unwrap().unwrap();
  assert_eq!(after.status, DispatchStatus::Completed);
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.reserved_pieces, 0);
  assert_eq!(record.counters.available_pieces(), 6);
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn recompute_is_idempotent() {
  let s = store().await;
  let (_, order) = reserved_fabric(&s).await;
  s.create_challan(challan_of(&order, fifo(220))).await.unwrap();

  let first = s.recompute_all().await.unwrap();
  assert!(first.corrections.is_empty(), "consistent ledger needs no corrections");
  assert_eq!(first.records_created, 0);

  let second = s.recompute_all().await.unwrap();
  assert!(second.corrections.is_empty());
  assert_eq!(second.pieces_resynced, 0);
  assert_eq!(second.challan_lines_repointed, 0);
  assert_eq!(second.orders_repointed, 0);
}

#[tokio::test]
async fn recompute_overwrites_drifted_counters() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;
  s.create_challan(challan_of(&order, fifo(220))).await.unwrap();

  s.conn
    .call(|conn| {
      conn.execute(
        "UPDATE ledger_records SET supplied_length = '999', reserved_pieces = 7",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let report = s.recompute_all().await.unwrap();
  assert_eq!(report.corrections.len(), 1);
  assert_eq!(report.corrections[0].before.supplied_length, d(999));

  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(90));
  assert_eq!(record.counters.reserved_length, d(30));
  assert_eq!(record.counters.supplied_pieces, 1);
  assert_eq!(record.counters.reserved_pieces, 1);

  // Available rolls account for every supplied piece.
  let available = pieces_of(&s, fabric, PieceStatus::Available).await;
  assert_eq!(available.len() as i64, record.counters.supplied_pieces);
}

#[tokio::test]
async fn recompute_rebuilds_deleted_record_and_repoints() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;
  let challan = s.create_challan(challan_of(&order, fifo(220))).await.unwrap();
  let old = only_record(&s, fabric).await;

  s.delete_ledger_record(old.ledger_id).await.unwrap();
  let err = core(s.delete_ledger_record(old.ledger_id).await.unwrap_err());
  assert!(matches!(err, bahi_core::Error::LedgerNotFound(_)));

  let report = s.recompute_all().await.unwrap();
  assert_eq!(report.records_created, 1);
  assert_eq!(report.challan_lines_repointed, 1);
  assert_eq!(report.orders_repointed, 1);

  let rebuilt = only_record(&s, fabric).await;
  assert_ne!(rebuilt.ledger_id, old.ledger_id);
  assert_eq!(rebuilt.key, old.key);
  assert_eq!(rebuilt.counters, old.counters);

  let challan = s.get_challan(challan.challan_id).await.unwrap().unwrap();
  assert!(challan.lines[0].allocations.iter().all(|a| a.ledger_id == rebuilt.ledger_id));
  assert_eq!(challan.lines[0].piece_ids().count(), 2);

  // The repointed challan still reverts cleanly.
  s.delete_challan(challan.challan_id).await.unwrap();
  let record = only_record(&s, fabric).await;
  assert_eq!(record.counters.supplied_length, d(310));
  assert_eq!(record.counters.reserved_length, d(250));
  assert_eq!(pieces_of(&s, fabric, PieceStatus::Available).await.len(), 3);
}

#[tokio::test]
async fn recompute_spreads_orphaned_taka_dispatch_across_records() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let order = s.place_order(order_of(vec![taka_line(fabric, 220)]), false).await.unwrap();
  let placeholder = only_record(&s, fabric).await;

  let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  let moved = supply_takas(&s, fabric, a, &[100, 120]).await;
  supply_takas(&s, fabric, b, &[80, 80]).await;
  supply_takas(&s, fabric, c, &[60, 60, 60]).await;

  let challan = s.create_challan(challan_of(&order, fifo(220))).await.unwrap();
  let drawn = record_at(&s, fabric, Some(a)).await;
  assert_eq!(challan.lines[0].allocations[0].ledger_id, drawn.ledger_id);

  // The drawn record's supply now belongs to another fabric, and the record
  // itself is gone.
  move_production(&s, &moved, Uuid::new_v4()).await;
  s.delete_ledger_record(drawn.ledger_id).await.unwrap();

  let report = s.recompute_all().await.unwrap();
  assert_eq!(report.challan_lines_repointed, 1);
  assert!(report.corrections.iter().all(|c| c.ledger_id != placeholder.ledger_id));

  // 220 m comes out of the most-stocked records first: 180 m from C, 40 m
  // from B. Rolls follow length, rounded and capped.
  let (rec_b, rec_c) = (record_at(&s, fabric, Some(b)).await, record_at(&s, fabric, Some(c)).await);
  let challan = s.get_challan(challan.challan_id).await.unwrap().unwrap();
  let split: Vec<_> = challan.lines[0]
    .allocations
    .iter()
    .map(|a| (a.ledger_id, a.length, a.pieces, a.hold_ledger_id()))
    .collect();
  assert_eq!(split, [
    (rec_c.ledger_id, d(180), 2, placeholder.ledger_id),
    (rec_b.ledger_id, d(40), 0, placeholder.ledger_id),
  ]);
  assert_eq!(challan.lines[0].piece_ids().count(), 2);
  assert_eq!((rec_c.counters.supplied_length, rec_c.counters.supplied_pieces), (Decimal::ZERO, 1));
  assert_eq!((rec_b.counters.supplied_length, rec_b.counters.supplied_pieces), (d(120), 2));
  assert_non_negative(
    &s.list_ledger(&LedgerFilter { fabric_id: Some(fabric), ..Default::default() }).await.unwrap(),
  );

  // Reverting the rewritten allocations is still exact.
  s.delete_challan(challan.challan_id).await.unwrap();
  let (rec_b, rec_c) = (record_at(&s, fabric, Some(b)).await, record_at(&s, fabric, Some(c)).await);
  assert_eq!((rec_c.counters.supplied_length, rec_c.counters.supplied_pieces), (d(180), 3));
  assert_eq!((rec_b.counters.supplied_length, rec_b.counters.supplied_pieces), (d(160), 2));
  assert_eq!(record_at(&s, fabric, None).await.counters, placeholder.counters);
  assert!(s.recompute_all().await.unwrap().corrections.is_empty());
}

#[tokio::test]
async fn recompute_spreads_orphaned_saree_dispatch_by_unit() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let matching = Uuid::new_v4();
  let cut: Decimal = "5.5".parse().unwrap();
  let order = s
    .place_order(
      order_of(vec![NewOrderLine {
        fabric_id:  fabric,
        design_id:  None,
        factory_id: None,
        demand:     NewDemand::Saree {
          cut:       Some(cut),
          matchings: vec![MatchingCount { matching_id: matching, count: 6 }],
        },
      }]),
      false,
    )
    .await
    .unwrap();
  let placeholder = only_record(&s, fabric).await;
  assert_eq!(placeholder.counters.reserved_length, d(33));

  let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  let moved = supply_sarees(&s, fabric, a, matching, cut, 6).await;
  supply_sarees(&s, fabric, b, matching, cut, 3).await;
  supply_sarees(&s, fabric, c, matching, cut, 4).await;

  let send = DispatchRequest::Saree { matchings: vec![MatchingCount { matching_id: matching, count: 6 }] };
  let challan = s.create_challan(challan_of(&order, send)).await.unwrap();
  let drawn = record_at(&s, fabric, Some(a)).await;
  assert_eq!(challan.lines[0].allocations[0].ledger_id, drawn.ledger_id);
  assert_eq!(reserved_total(&s, fabric).await, (Decimal::ZERO, 0));

  move_production(&s, &moved, Uuid::new_v4()).await;
  s.delete_ledger_record(drawn.ledger_id).await.unwrap();
  s.recompute_all().await.unwrap();

  let (rec_b, rec_c) = (record_at(&s, fabric, Some(b)).await, record_at(&s, fabric, Some(c)).await);
  let challan = s.get_challan(challan.challan_id).await.unwrap().unwrap();
  let split: Vec<_> = challan.lines[0]
    .allocations
    .iter()
    .map(|a| (a.ledger_id, a.pieces, a.length, a.reserved_pieces))
    .collect();
  assert_eq!(split, [(rec_c.ledger_id, 4, d(22), 4), (rec_b.ledger_id, 2, d(11), 2)]);
  assert_eq!(rec_c.counters.supplied_pieces, 0);
  assert_eq!(rec_b.counters.supplied_pieces, 1);

  s.delete_challan(challan.challan_id).await.unwrap();
  assert_eq!(record_at(&s, fabric, Some(c)).await.counters.supplied_pieces, 4);
  assert_eq!(record_at(&s, fabric, Some(b)).await.counters.supplied_pieces, 3);
  assert_eq!(record_at(&s, fabric, None).await.counters, placeholder.counters);
  assert!(s.recompute_all().await.unwrap().corrections.is_empty());
}

#[tokio::test]
async fn recompute_drops_unexplained_dispatch_and_clamps() {
  let s = store().await;
  let fabric = Uuid::new_v4();
  let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
  let moved = supply_takas(&s, fabric, a, &[100, 120, 90]).await;
  supply_takas(&s, fabric, b, &[60]).await;
  let order = s.place_order(order_of(vec![taka_line(fabric, 250)]), false).await.unwrap();
  s.create_challan(challan_of(&order, fifo(220))).await.unwrap();
  let drawn = record_at(&s, fabric, Some(a)).await;

  move_production(&s, &moved, Uuid::new_v4()).await;
  s.delete_ledger_record(drawn.ledger_id).await.unwrap();

  // Only B's 60 m can explain the 220 m that left; the rest is dropped.
  let report = s.recompute_all().await.unwrap();
  assert_eq!(report.orders_repointed, 1);
  let rec_b = record_at(&s, fabric, Some(b)).await;
  assert_eq!(rec_b.counters.supplied_length, Decimal::ZERO);
  assert_eq!(rec_b.counters.supplied_pieces, 0);
  assert_eq!(rec_b.counters.reserved_length, d(30));
  assert_non_negative(
    &s.list_ledger(&LedgerFilter { fabric_id: Some(fabric), ..Default::default() }).await.unwrap(),
  );

  let second = s.recompute_all().await.unwrap();
  assert!(second.corrections.is_empty());
  assert_eq!(second.challan_lines_repointed, 0);
  assert_eq!(second.orders_repointed, 0);
}

#[tokio::test]
async fn resync_restores_piece_status_from_challans() {
  let s = store().await;
  let (fabric, order) = reserved_fabric(&s).await;
  let challan = s.create_challan(challan_of(&order, fifo(220))).await.unwrap();

  s.conn
    .call(|conn| {
      conn.execute("UPDATE pieces SET status = 'available', challan_id = NULL", [])?;
      Ok(())
    })
    .await
    .unwrap();
  assert_eq!(pieces_of(&s, fabric, PieceStatus::Available).await.len(), 3);

  assert_eq!(s.resync_pieces().await.unwrap(), 2);
  let sold = pieces_of(&s, fabric, PieceStatus::Sold).await;
  assert_eq!(sold.len(), 2);
  assert!(sold.iter().all(|p| p.challan_id == Some(challan.challan_id)));
  assert_eq!(s.resync_pieces().await.unwrap(), 0);
}

// ─── Transactions ────────────────────────────────────────────────────────────

#[tokio::test]
async fn retries_are_configurable() {
  let s = store().await.with_retries(0);
  let fabric = Uuid::new_v4();
  supply_takas(&s, fabric, Uuid::new_v4(), &[10]).await;
  assert_eq!(only_record(&s, fabric).await.counters.supplied_length, d(10));
}
