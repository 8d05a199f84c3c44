use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::configs::{SchemaManager, Settings, Storage};
use crate::handles::{
    auth_router, device_router, energy_router, health_router, mode_router, schedule_router,
    AuthState, DeviceState, EnergyState, HealthState, ModeState, ScheduleState,
};
use crate::middlewares::TokenState;
use crate::repositories::{
    DeviceRepository, EnergyDataRepository, EnergyModeRepository, ScheduleRepository,
    UserRepository,
};
use crate::services::{
    AuthService, Clock, DeviceCache, MqttDispatcher, RetentionService, SchedulerService,
    SystemClock, TelemetryService, TokenService,
};

pub async fn create_app(settings: &Arc<Settings>) -> Router {
    let storage = Arc::new(
        Storage::new(settings.database.clone(), SchemaManager::default())
            .await
            .expect("Failed to initialize storage."),
    );

    let user_repository = Arc::new(UserRepository::new(storage.clone()));
    let device_repository = Arc::new(DeviceRepository::new(storage.clone()));
    let schedule_repository = Arc::new(ScheduleRepository::new(storage.clone()));
    let mode_repository = Arc::new(EnergyModeRepository::new(storage.clone()));
    let energy_repository = Arc::new(EnergyDataRepository::new(storage.clone()));

    let auth_service = Arc::new(AuthService::new());
    let token_service = Arc::new(TokenService::new(settings.auth.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let cache = Arc::new(DeviceCache::new());
    cache.start_sweeps();

    let (dispatcher, event_loop) = MqttDispatcher::new(&settings.gateway);
    let client = dispatcher.client();
    let connected = dispatcher.connected_flag();
    let dispatcher = Arc::new(dispatcher);

    let telemetry = Arc::new(TelemetryService::new(
        client,
        cache.clone(),
        energy_repository.clone(),
        settings.gateway.topic_prefix.clone(),
        connected,
    ));
    tokio::spawn(telemetry.run(event_loop));

    let zone = settings
        .scheduler
        .zone()
        .expect("Scheduler timezone was validated at boot.");

    let scheduler = Arc::new(SchedulerService::new(
        schedule_repository.clone(),
        mode_repository.clone(),
        dispatcher.clone(),
        clock.clone(),
        zone,
        Duration::from_secs(settings.scheduler.tick_interval_secs),
    ));
    tokio::spawn(scheduler.run());

    let retention = Arc::new(RetentionService::new(
        energy_repository.clone(),
        cache.clone(),
        dispatcher.clone(),
        clock.clone(),
        zone,
    ));
    tokio::spawn(retention.run());

    let token_state = TokenState {
        token_service: token_service.clone(),
    };

    Router::new()
        .merge(auth_router(
            AuthState {
                auth_service,
                token_service,
                user_repository: user_repository.clone(),
            },
            token_state.clone(),
        ))
        .merge(device_router(
            DeviceState {
                device_repository: device_repository.clone(),
                user_repository,
                schedule_repository: schedule_repository.clone(),
                mode_repository: mode_repository.clone(),
                energy_repository: energy_repository.clone(),
                cache: cache.clone(),
                dispatcher: dispatcher.clone(),
            },
            token_state.clone(),
        ))
        .merge(schedule_router(
            ScheduleState {
                schedule_repository,
                device_repository: device_repository.clone(),
                clock: clock.clone(),
                zone,
            },
            token_state.clone(),
        ))
        .merge(mode_router(
            ModeState {
                mode_repository,
                device_repository: device_repository.clone(),
                dispatcher: dispatcher.clone(),
                clock: clock.clone(),
            },
            token_state.clone(),
        ))
        .merge(energy_router(
            EnergyState {
                energy_repository,
                device_repository,
                clock,
            },
            token_state,
        ))
        .merge(health_router(HealthState { cache, dispatcher }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
