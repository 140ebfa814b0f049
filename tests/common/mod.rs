//! Shared setup for integration tests.
//!
//! Each `TestApp` serves the full router on an ephemeral port over in-memory
//! stores, seeded with one account per role.

#![allow(dead_code)]

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use jwt_simple::prelude::Ed25519KeyPair;
use mockable::Clock;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

use office_hours::{
    auth::{jwt::JwtConfig, password::PasswordService},
    create_router,
    models::{Role, User},
    store::MemoryUserStore,
    AppState, Config, Stores,
};

pub const PASSWORD: &str = "correct-horse-battery";

/// Argon2 hash of `PASSWORD`, computed once at the cheapest cost.
static PASSWORD_HASH: Lazy<String> = Lazy::new(|| {
    PasswordService::hash_password_with_cost(PASSWORD, 4).expect("Failed to hash test password")
});

/// Clock pinned to 2030-01-07 08:00 server-local time.
pub struct FixedClock(DateTime<Local>);

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        self.0
    }

    fn utc(&self) -> DateTime<Utc> {
        self.0.with_timezone(&Utc)
    }
}

/// The day `FixedClock` reports; slots on it fall inside the release cutoff.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

/// A day far enough ahead that releases are always allowed.
pub fn next_week() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 14).unwrap()
}

fn fixed_clock() -> Arc<FixedClock> {
    let now = today().and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    Arc::new(FixedClock(
        Local.from_local_datetime(&now).earliest().unwrap(),
    ))
}

/// A seeded account and the tokens from its login.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotBody {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub day: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub booked: bool,
    pub claimant_id: Option<Uuid>,
    #[serde(default)]
    pub mine: bool,
}

pub struct TestApp {
    pub client: Client,
    pub base_url: String,
    pub users: Arc<MemoryUserStore>,
    pub admin: TestUser,
    pub owner: TestUser,
    pub consumer: TestUser,
    pub unverified: TestUser,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(Config::default_for_testing()).await
    }

    pub async fn spawn_with(config: Config) -> Self {
        let users = Arc::new(MemoryUserStore::new());
        let jwt = JwtConfig::from_key_pair(Ed25519KeyPair::generate()).with_settings(&config.jwt);
        let state = AppState::with_stores(
            Stores::in_memory(users.clone()),
            jwt,
            &config,
            fixed_clock(),
        );
        let app = create_router(state, &config);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = Client::new();
        let base_url = format!("http://127.0.0.1:{}", port);

        let admin_email = seed(&users, "Grace Admin", Role::Admin, true);
        let owner_email = seed(&users, "Olga Owner", Role::Owner, true);
        let consumer_email = seed(&users, "Cato Consumer", Role::Consumer, true);
        let unverified_email = seed(&users, "Uma Unverified", Role::Consumer, false);

        let mut app = Self {
            client,
            base_url,
            users,
            admin: placeholder(),
            owner: placeholder(),
            consumer: placeholder(),
            unverified: placeholder(),
        };

        app.admin = app.login(&admin_email).await;
        app.owner = app.login(&owner_email).await;
        app.consumer = app.login(&consumer_email).await;
        app.unverified = app.login(&unverified_email).await;
        app
    }

    /// Seeds another verified consumer and logs it in.
    pub async fn another_consumer(&self) -> TestUser {
        let email = seed(&self.users, "Nico Neighbour", Role::Consumer, true);
        self.login(&email).await
    }

    pub async fn login(&self, email: &str) -> TestUser {
        let response = self
            .post_public("/auth/login", json!({ "email": email, "password": PASSWORD }))
            .await;
        assert_eq!(response.status().as_u16(), 200, "login failed for {email}");

        let auth: AuthResponse = response.json().await.expect("Failed to parse login");
        TestUser {
            id: auth.user.id,
            email: auth.user.email,
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
        }
    }

    /// Publishes a window for the seeded owner and returns its slots in order.
    pub async fn publish(&self, day: NaiveDate, start: &str, end: &str) -> Vec<SlotBody> {
        let response = self
            .post(
                "/slots/generate",
                &self.admin.access_token,
                json!({
                    "owner_id": self.owner.id,
                    "day": day,
                    "window_start": start,
                    "window_end": end,
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);

        self.slots_of(self.owner.id, &self.consumer.access_token)
            .await
            .into_iter()
            .filter(|s| s.day == day)
            .collect()
    }

    pub async fn slots_of(&self, owner_id: Uuid, token: &str) -> Vec<SlotBody> {
        let response = self
            .get(&format!("/slots?owner_id={}", owner_id), token)
            .await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.expect("Failed to parse slots")
    }

    pub async fn claim(&self, slot_id: Uuid, token: &str) -> reqwest::Response {
        self.post(&format!("/slots/{}/claim", slot_id), token, json!({}))
            .await
    }

    pub async fn release(&self, slot_id: Uuid, token: &str) -> reqwest::Response {
        self.post(&format!("/slots/{}/release", slot_id), token, json!({}))
            .await
    }

    /// Makes an authenticated GET request.
    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to send GET request")
    }

    /// Makes an authenticated POST request with JSON body.
    pub async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to send POST request")
    }

    pub async fn get_public(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to send GET request")
    }

    pub async fn post_public(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send POST request")
    }
}

fn seed(users: &MemoryUserStore, full_name: &str, role: Role, verified: bool) -> String {
    let email = format!("{}_{}@example.com", role, Uuid::new_v4());
    users
        .insert(User {
            id: Uuid::new_v4(),
            full_name: full_name.to_string(),
            email: email.clone(),
            password_hash: PASSWORD_HASH.clone(),
            role,
            verified,
            created_at: Utc::now().naive_utc(),
        })
        .expect("Failed to seed user");
    email
}

fn placeholder() -> TestUser {
    TestUser {
        id: Uuid::nil(),
        email: String::new(),
        access_token: String::new(),
        refresh_token: String::new(),
    }
}

/// Reads the `code` field of an error body.
pub async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("Failed to parse error body");
    body["code"].as_str().unwrap_or_default().to_string()
}
