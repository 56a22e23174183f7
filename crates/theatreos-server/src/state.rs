// SPDX-License-Identifier: Apache-2.0
//! [`AppState`]: every engine wired over one [`Storage`] backend, shared
//! through axum's `State` extractor as an `Arc<AppState>`.

use std::sync::Arc;
use theatreos_crew::CrewEngine;
use theatreos_evidence::EvidenceEngine;
use theatreos_gate::GateEngine;
use theatreos_kernel::WorldKernel;
use theatreos_realtime::RealtimeHub;
use theatreos_rumor::RumorEngine;
use theatreos_scheduler::Scheduler;
use theatreos_storage::Storage;
use theatreos_themepack::ThemePackRegistry;
use theatreos_trace::TraceEngine;

use crate::settings::Settings;

/// Every engine and the storage/registry they share, constructed once in
/// `main` and handed to the transport layer and background drivers alike.
pub struct AppState<S: Storage> {
    /// Process configuration.
    pub settings: Settings,
    /// Storage backend, shared by every engine.
    pub storage: Arc<S>,
    /// Theme-pack binding/content registry.
    pub registry: Arc<ThemePackRegistry>,
    /// World Kernel.
    pub kernel: Arc<WorldKernel<S>>,
    /// Hourly Scheduler.
    pub scheduler: Arc<Scheduler<S>>,
    /// Gate Engine.
    pub gate: Arc<GateEngine<S>>,
    /// Evidence Engine.
    pub evidence: Arc<EvidenceEngine<S>>,
    /// Rumor Engine.
    pub rumor: Arc<RumorEngine<S>>,
    /// Trace Engine.
    pub trace: Arc<TraceEngine<S>>,
    /// Crew Engine.
    pub crew: Arc<CrewEngine<S>>,
    /// Realtime Fanout registry; also the shared [`theatreos_storage::EventSink`]
    /// every engine above publishes through.
    pub realtime: RealtimeHub,
}

impl<S: Storage> AppState<S> {
    /// Wire every engine over `storage`, loading theme packs from
    /// `settings.packs_dir`.
    #[must_use]
    pub fn new(settings: Settings, storage: Arc<S>) -> Self {
        let registry = Arc::new(ThemePackRegistry::new(
            settings.packs_dir.clone(),
            settings.default_pack_id.clone(),
        ));
        let realtime = RealtimeHub::new();
        let events: Arc<dyn theatreos_storage::EventSink> = Arc::new(realtime.clone());

        let kernel = Arc::new(WorldKernel::new(storage.clone(), registry.clone()));
        let scheduler = Arc::new(Scheduler::new(
            storage.clone(),
            registry.clone(),
            settings.scheduler_config(),
        ));
        let gate = Arc::new(GateEngine::new(
            storage.clone(),
            registry.clone(),
            kernel.clone(),
            events.clone(),
        ));
        let evidence = Arc::new(EvidenceEngine::new(
            storage.clone(),
            registry.clone(),
            events.clone(),
        ));
        let rumor = Arc::new(RumorEngine::new(storage.clone(), events.clone()));
        let trace = Arc::new(TraceEngine::new(storage.clone(), events.clone()));
        let crew = Arc::new(CrewEngine::new(storage.clone(), events));

        Self {
            settings,
            storage,
            registry,
            kernel,
            scheduler,
            gate,
            evidence,
            rumor,
            trace,
            crew,
            realtime,
        }
    }
}
