use chrono::NaiveDate;
use forward_factor_core::db::Db;
use forward_factor_core::model::decision::DecisionKind;
use forward_factor_core::model::policy::VolPoint;
use forward_factor_core::model::signal::Signal;
use forward_factor_core::store::{DecisionExtras, SignalStore, SqlxSignalStore};
use uuid::Uuid;

/// Isolated in-memory DB per test, mirroring the SQLite-in-memory harness
/// the rest of the persistence layer is built and tested against.
async fn setup_store() -> SqlxSignalStore {
    sqlx::any::install_default_drivers();
    let db_name = Uuid::new_v4().to_string();
    let conn = format!("sqlite:file:{db_name}?mode=memory&cache=shared");
    let db = Db::connect(&conn).await.expect("connect sqlite memory db");
    db.migrate().await.expect("run migrations");
    SqlxSignalStore::new((*db.pool).clone())
}

fn make_signal(ticker: &str, dedupe_key: &str) -> Signal {
    Signal {
        signal_id: Uuid::nil(),
        ticker: ticker.to_string(),
        as_of_ts: 1_700_000_000_000,
        front_expiry: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
        back_expiry: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
        front_dte: 30,
        back_dte: 60,
        front_iv: 0.22,
        back_iv: 0.12,
        sigma_fwd: 0.14,
        ff_value: 0.45,
        vol_point: VolPoint::Atm,
        quality_score: 1.0,
        reason_codes: vec![],
        dedupe_key: dedupe_key.to_string(),
    }
}

#[tokio::test]
async fn duplicate_dedupe_key_is_rejected_by_the_unique_constraint() {
    let store = setup_store().await;

    let first = store.create(make_signal("SPY", "k1")).await.unwrap();
    assert!(first.is_some());

    let second = store.create(make_signal("SPY", "k1")).await.unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn get_round_trips_a_persisted_signal() {
    let store = setup_store().await;
    let persisted = store.create(make_signal("QQQ", "k2")).await.unwrap().unwrap();

    let fetched = store.get(persisted.signal_id).await.unwrap().unwrap();
    assert_eq!(fetched.ticker, "QQQ");
    assert_eq!(fetched.dedupe_key, "k2");
    assert_eq!(fetched.ff_value, 0.45);
}

#[tokio::test]
async fn get_is_none_for_an_unknown_signal_id() {
    let store = setup_store().await;
    assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn record_decision_upserts_on_signal_user_conflict() {
    let store = setup_store().await;
    let persisted = store.create(make_signal("SPY", "k3")).await.unwrap().unwrap();
    let user = Uuid::new_v4();

    let first = store
        .record_decision(persisted.signal_id, user, DecisionKind::Ignored, DecisionExtras::default())
        .await
        .unwrap();
    assert_eq!(first.kind, DecisionKind::Ignored);

    let second = store
        .record_decision(
            persisted.signal_id,
            user,
            DecisionKind::Placed,
            DecisionExtras {
                entry_price: Some(2.65),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(second.kind, DecisionKind::Placed);
    assert_eq!(second.entry_price, Some(2.65));
}
