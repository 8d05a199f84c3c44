use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use heliosync_server::configs::schema::SchemaManager;
use heliosync_server::configs::settings::{Auth, Database};
use heliosync_server::configs::storage::Storage;
use heliosync_server::handles::{
    auth_router, device_router, energy_router, mode_router, schedule_router, AuthState,
    DeviceState, EnergyState, ModeState, ScheduleState,
};
use heliosync_server::middlewares::TokenState;
use heliosync_server::models::{Device, User};
use heliosync_server::repositories::{
    DeviceRepository, EnergyDataRepository, EnergyModeRepository, ScheduleRepository,
    UserRepository,
};
use heliosync_server::services::dispatcher::CommandSink;
use heliosync_server::services::{AuthService, Clock, DeviceCache, TokenService};

pub const TEST_ZONE: Tz = chrono_tz::Europe::Kyiv;

/// Captures every published command instead of touching a broker.
#[derive(Default)]
pub struct RecordingSink {
    commands: Mutex<Vec<(String, Value)>>,
}

impl RecordingSink {
    pub fn commands(&self) -> Vec<(String, Value)> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn publish_command(&self, device_id: &str, payload: Value) -> anyhow::Result<()> {
        self.commands
            .lock()
            .unwrap()
            .push((device_id.to_string(), payload));
        Ok(())
    }
}

/// Settable time source so ticks can be driven minute by minute.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub struct MockApp {
    pub router: Router,
    pub storage: Arc<Storage>,
    pub auth_service: Arc<AuthService>,
    pub token_service: Arc<TokenService>,
    pub user_repository: Arc<UserRepository>,
    pub device_repository: Arc<DeviceRepository>,
    pub schedule_repository: Arc<ScheduleRepository>,
    pub mode_repository: Arc<EnergyModeRepository>,
    pub energy_repository: Arc<EnergyDataRepository>,
    pub cache: Arc<DeviceCache>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
}

impl MockApp {
    pub async fn new() -> Self {
        let storage = Arc::new(
            Storage::new(
                Database {
                    clean_start: true,
                    url: String::from("sqlite::memory:"),
                },
                SchemaManager::default(),
            )
            .await
            .unwrap(),
        );

        let auth_service = Arc::new(AuthService::new());
        let token_service = Arc::new(TokenService::new(Auth {
            secret: String::from("test"),
            expiration: 1000,
        }));

        Self {
            router: Router::new(),
            user_repository: Arc::new(UserRepository::new(storage.clone())),
            device_repository: Arc::new(DeviceRepository::new(storage.clone())),
            schedule_repository: Arc::new(ScheduleRepository::new(storage.clone())),
            mode_repository: Arc::new(EnergyModeRepository::new(storage.clone())),
            energy_repository: Arc::new(EnergyDataRepository::new(storage.clone())),
            cache: Arc::new(DeviceCache::new()),
            sink: Arc::new(RecordingSink::default()),
            clock: Arc::new(ManualClock::new(Utc::now())),
            storage,
            auth_service,
            token_service,
        }
    }

    fn token_state(&self) -> TokenState {
        TokenState {
            token_service: self.token_service.clone(),
        }
    }

    pub fn with_auth_router(mut self) -> Self {
        let token_state = self.token_state();
        self.router = self.router.merge(auth_router(
            AuthState {
                auth_service: self.auth_service.clone(),
                token_service: self.token_service.clone(),
                user_repository: self.user_repository.clone(),
            },
            token_state,
        ));
        self
    }

    pub fn with_device_router(mut self) -> Self {
        let token_state = self.token_state();
        self.router = self.router.merge(device_router(
            DeviceState {
                device_repository: self.device_repository.clone(),
                user_repository: self.user_repository.clone(),
                schedule_repository: self.schedule_repository.clone(),
                mode_repository: self.mode_repository.clone(),
                energy_repository: self.energy_repository.clone(),
                cache: self.cache.clone(),
                dispatcher: self.sink.clone(),
            },
            token_state,
        ));
        self
    }

    pub fn with_schedule_router(mut self) -> Self {
        let token_state = self.token_state();
        self.router = self.router.merge(schedule_router(
            ScheduleState {
                schedule_repository: self.schedule_repository.clone(),
                device_repository: self.device_repository.clone(),
                clock: self.clock.clone(),
                zone: TEST_ZONE,
            },
            token_state,
        ));
        self
    }

    pub fn with_mode_router(mut self) -> Self {
        let token_state = self.token_state();
        self.router = self.router.merge(mode_router(
            ModeState {
                mode_repository: self.mode_repository.clone(),
                device_repository: self.device_repository.clone(),
                dispatcher: self.sink.clone(),
                clock: self.clock.clone(),
            },
            token_state,
        ));
        self
    }

    pub fn with_energy_router(mut self) -> Self {
        let token_state = self.token_state();
        self.router = self.router.merge(energy_router(
            EnergyState {
                energy_repository: self.energy_repository.clone(),
                device_repository: self.device_repository.clone(),
                clock: self.clock.clone(),
            },
            token_state,
        ));
        self
    }

    pub async fn create_test_user(&self, email: &str) -> User {
        let hash = self.auth_service.hash("password123").unwrap();
        self.user_repository
            .create(email, &hash, "Test User")
            .await
            .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        self.token_service.generate_token(user).unwrap().token
    }

    pub async fn create_test_device(&self, device_id: &str, owner: &User) -> Device {
        let mut tx = self.storage.get_pool().begin().await.unwrap();
        let device = self
            .device_repository
            .create(device_id, "Test Controller", &mut tx)
            .await
            .unwrap();
        self.device_repository
            .link_user(owner.id, device.id, true, &mut tx)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        device
    }
}
