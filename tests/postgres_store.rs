//! PostgreSQL adapter tests.
//!
//! These run against the database named by `TEST_DATABASE_URL` and are skipped
//! when it is unset. Migrations are applied once per run. Every test works on
//! fresh owner and user ids, so tests share the database safely.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use jwt_simple::prelude::Ed25519KeyPair;
use mockable::DefaultClock;
use once_cell::sync::Lazy;
use uuid::Uuid;

use office_hours::{
    auth::{jwt::JwtConfig, SessionEngine, SessionError},
    create_db_pool,
    models::{NewRefreshCredential, Role},
    reservation::{ReservationError, ReservationManager, ReservationPolicy},
    schema::users,
    store::{CredentialStore, PgCredentialStore, PgSlotStore, PgUserStore, UserStore},
    Config, DbPool,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Migrated pool for `TEST_DATABASE_URL`, or `None` when it is unset.
static TEST_POOL: Lazy<Option<DbPool>> = Lazy::new(|| {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;

    let mut config = Config::default_for_testing();
    config.database.url = url;
    config.database.max_connections = 16;
    let pool = create_db_pool(&config);

    let mut conn = pool.get().expect("Failed to get connection");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run migrations");

    Some(pool)
});

fn test_pool() -> Option<DbPool> {
    let pool = TEST_POOL.clone();
    if pool.is_none() {
        eprintln!("TEST_DATABASE_URL not set, skipping PostgreSQL test");
    }
    pool
}

fn far_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 6, 1).unwrap()
}

fn manager(pool: &DbPool) -> ReservationManager {
    ReservationManager::new(
        Arc::new(PgSlotStore::new(pool.clone())),
        ReservationPolicy::default(),
        Arc::new(DefaultClock),
    )
}

fn slot_ids(manager: &ReservationManager, owner: Uuid) -> Vec<Uuid> {
    manager
        .list_slots(Some(owner), Uuid::nil())
        .unwrap()
        .into_iter()
        .map(|v| v.slot.id)
        .collect()
}

fn seed_user(pool: &DbPool, email: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    let mut conn = pool.get().unwrap();
    diesel::insert_into(users::table)
        .values((
            users::id.eq(id),
            users::full_name.eq("Pg Test User"),
            users::email.eq(email),
            users::password_hash.eq(""),
            users::role.eq(role.as_str()),
            users::verified.eq(true),
        ))
        .execute(&mut conn)
        .unwrap();
    id
}

fn unique_email() -> String {
    format!("pg_{}@example.com", Uuid::new_v4())
}

// ============================================================================
// Slots
// ============================================================================

#[test]
fn generate_is_idempotent_per_unit() {
    let Some(pool) = test_pool() else { return };
    let manager = manager(&pool);
    let owner = Uuid::new_v4();

    let first = manager
        .generate_slots(owner, far_day(), "09:00", "10:00")
        .unwrap();
    let second = manager
        .generate_slots(owner, far_day(), "09:30", "10:30")
        .unwrap();

    assert_eq!(first, 4);
    assert_eq!(second, 2);
    assert_eq!(slot_ids(&manager, owner).len(), 6);
}

#[test]
fn concurrent_claims_have_one_winner() {
    let Some(pool) = test_pool() else { return };
    let manager = Arc::new(manager(&pool));
    let owner = Uuid::new_v4();
    manager
        .generate_slots(owner, far_day(), "09:00", "09:15")
        .unwrap();
    let slot_id = slot_ids(&manager, owner)[0];

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let manager = manager.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                manager.claim(slot_id, Uuid::new_v4())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().all(|r| matches!(
        r,
        Ok(_) | Err(ReservationError::AlreadyReserved) | Err(ReservationError::RaceLost)
    )));

    let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
    let stored = manager.list_slots(Some(owner), Uuid::nil()).unwrap();
    assert_eq!(stored[0].slot.claimant_id, winner.claimant_id);
}

#[test]
fn quota_scenario_holds_on_postgres() {
    let Some(pool) = test_pool() else { return };
    let manager = manager(&pool);
    let (owner, consumer) = (Uuid::new_v4(), Uuid::new_v4());
    manager
        .generate_slots(owner, far_day(), "09:00", "10:15")
        .unwrap();
    let ids = slot_ids(&manager, owner);

    for id in &ids[..4] {
        manager.claim(*id, consumer).unwrap();
    }

    assert_eq!(
        manager.claim(ids[4], consumer),
        Err(ReservationError::QuotaExceeded { limit: 4 })
    );
}

#[test]
fn release_requires_claimant_on_postgres() {
    let Some(pool) = test_pool() else { return };
    let manager = manager(&pool);
    let (owner, alice, bob) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    manager
        .generate_slots(owner, far_day(), "14:00", "14:15")
        .unwrap();
    let id = slot_ids(&manager, owner)[0];
    manager.claim(id, alice).unwrap();

    assert_eq!(manager.release(id, bob), Err(ReservationError::NotOwner));

    let released = manager.release(id, alice).unwrap();
    assert!(!released.booked);
    assert_eq!(released.claimant_id, None);
    assert_eq!(manager.release(id, alice), Err(ReservationError::NotOwner));
}

// ============================================================================
// Credentials and users
// ============================================================================

#[test]
fn rotation_is_single_use() {
    let Some(pool) = test_pool() else { return };
    let user_id = seed_user(&pool, &unique_email(), Role::Consumer);
    let engine = SessionEngine::new(
        Arc::new(JwtConfig::from_key_pair(Ed25519KeyPair::generate())),
        Arc::new(PgCredentialStore::new(pool.clone())),
        Arc::new(PgUserStore::new(pool.clone())),
    );

    let r0 = engine.issue(user_id, Role::Consumer, true).unwrap();
    let r1 = engine.rotate(&r0.refresh_token).unwrap();

    assert_eq!(
        engine.rotate(&r0.refresh_token).unwrap_err(),
        SessionError::InvalidToken
    );
    assert!(engine.rotate(&r1.refresh_token).is_ok());

    let rows = PgCredentialStore::new(pool).list_for_user(user_id).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn replace_of_consumed_row_returns_none() {
    let Some(pool) = test_pool() else { return };
    let user_id = seed_user(&pool, &unique_email(), Role::Consumer);
    let store = PgCredentialStore::new(pool);
    let expires_at = (Utc::now() + Duration::days(7)).naive_utc();
    let row = store
        .insert(NewRefreshCredential {
            user_id,
            secret_hash: "a".repeat(64),
            expires_at,
        })
        .unwrap();
    let replacement = NewRefreshCredential {
        user_id,
        secret_hash: "b".repeat(64),
        expires_at,
    };

    assert!(store.replace(row.id, replacement.clone()).unwrap().is_some());
    assert!(store.replace(row.id, replacement).unwrap().is_none());
    assert_eq!(store.list_for_user(user_id).unwrap().len(), 1);
}

#[test]
fn purge_expired_keeps_live_rows() {
    let Some(pool) = test_pool() else { return };
    let user_id = seed_user(&pool, &unique_email(), Role::Consumer);
    let other_id = seed_user(&pool, &unique_email(), Role::Consumer);
    let store = PgCredentialStore::new(pool);
    let past = (Utc::now() - Duration::days(1)).naive_utc();
    let future = (Utc::now() + Duration::days(1)).naive_utc();

    for (owner, expires_at) in [(user_id, past), (user_id, future), (other_id, past)] {
        store
            .insert(NewRefreshCredential {
                user_id: owner,
                secret_hash: "c".repeat(64),
                expires_at,
            })
            .unwrap();
    }

    let purged = store.purge_expired(user_id, Utc::now().naive_utc()).unwrap();

    assert_eq!(purged, 1);
    let remaining = store.list_for_user(user_id).unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].expires_at > Utc::now().naive_utc());
    assert_eq!(store.list_for_user(other_id).unwrap().len(), 1);
}

#[test]
fn user_lookup_parses_role_and_ignores_email_case() {
    let Some(pool) = test_pool() else { return };
    let local = Uuid::new_v4().simple().to_string();
    let stored = format!("Mixed.{local}@Example.com");
    let user_id = seed_user(&pool, &stored, Role::Owner);
    let store = PgUserStore::new(pool);

    let found = store
        .find_by_email(&stored.to_uppercase())
        .unwrap()
        .expect("user should be found");

    assert_eq!(found.id, user_id);
    assert_eq!(found.role, Role::Owner);
    assert_eq!(store.find_by_id(user_id).unwrap().unwrap().email, stored);
}
