//! Sync session: the scope that owns a set of synchronizers.
//!
//! A session holds the result cache, the fetch error aggregator and the cancellation token
//! shared by every synchronizer it creates. Tearing the session down (explicitly or by
//! dropping it) stops all of them at once.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::SyncSettings;
use crate::entities::{Assignment, FromRecord, Membership, Submission, User, UserRole};
use crate::notifications::{
    Notification, NotificationScanEngine, NotificationService, ScannerIdentity,
};
use crate::store::{DocumentStore, QueryDescriptor, QueryKey};
use crate::sync::{
    queries, FetchErrorAggregator, PeriodicTask, PollingSynchronizer, ResultCache, SyncContext,
    SyncError, SyncOptions, SyncSnapshot,
};

pub struct SyncSession {
    ctx: SyncContext,
    settings: SyncSettings,
}

impl SyncSession {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, settings: SyncSettings) -> Self {
        let ctx = SyncContext::new(
            CancellationToken::new(),
            store,
            Arc::new(ResultCache::new()),
            Arc::new(FetchErrorAggregator::new(settings.error_surface_threshold)),
            clock,
        );
        Self { ctx, settings }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.ctx.cache
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.ctx.cancellation_token
    }

    /// Synchronizer with the session's default options.
    pub fn synchronizer<T: FromRecord>(&self, query: Option<QueryDescriptor>) -> PollingSynchronizer<T> {
        self.synchronizer_with(self.settings.sync_options(), query)
    }

    pub fn synchronizer_with<T: FromRecord>(
        &self,
        options: SyncOptions,
        query: Option<QueryDescriptor>,
    ) -> PollingSynchronizer<T> {
        PollingSynchronizer::with_query(self.ctx.clone(), options, query)
    }

    /// Uncached synchronizer over the notification list of `user_id`.
    pub fn watch_notifications(&self, user_id: &str) -> PollingSynchronizer<Notification> {
        self.synchronizer_with(
            self.settings.notification_options(),
            Some(queries::notifications_for_user(user_id)),
        )
    }

    /// Aggregated error to show the user, if enough sources are failing.
    pub fn user_facing_error(&self) -> Option<SyncError> {
        self.ctx.errors.user_facing_error()
    }

    pub fn failing_sources(&self) -> Vec<QueryKey> {
        self.ctx.errors.failing_sources()
    }

    /// Stop every synchronizer and loop started from this session.
    pub fn teardown(&self) {
        if !self.ctx.is_cancelled() {
            debug!("Tearing down sync session");
            self.ctx.cancellation_token.cancel();
            self.ctx.cache.clear();
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.ctx.is_cancelled()
    }

    /// Start the live dashboard of `user`.
    pub fn dashboard(&self, user: &User) -> UserDashboard {
        UserDashboard::start(self, user)
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Everything a signed-in user's dashboard keeps live.
///
/// Upstream queries feed the ids of downstream ones: a student's memberships select the
/// assignments, a teacher's assignments select the submissions. The scan engine watches
/// both assignment and submission snapshots.
pub struct UserDashboard {
    pub notifications: PollingSynchronizer<Notification>,
    pub service: Arc<NotificationService>,
    pub engine: Arc<NotificationScanEngine>,
    assignments: watch::Receiver<SyncSnapshot<Assignment>>,
    submissions: watch::Receiver<SyncSnapshot<Submission>>,
    _driver: PeriodicTask,
    _scanner: PeriodicTask,
}

impl UserDashboard {
    fn start(session: &SyncSession, user: &User) -> Self {
        let user_id = user.id.as_str();
        let notifications = session.watch_notifications(user_id);
        let service = Arc::new(
            NotificationService::new(session.ctx.store.clone(), session.ctx.clock.clone())
                .with_refresh(notifications.refresh_handle()),
        );
        let engine = Arc::new(NotificationScanEngine::new(
            ScannerIdentity::new(user_id, user.role),
            service.clone(),
            session.ctx.clock.clone(),
            session.settings.scan_settings(),
        ));

        let memberships: PollingSynchronizer<Membership> = session.synchronizer(match user.role {
            UserRole::Student => Some(queries::memberships_for_student(user_id)),
            _ => None,
        });
        let assignments: PollingSynchronizer<Assignment> = session.synchronizer(match user.role {
            UserRole::Teacher => Some(queries::assignments_for_teacher(user_id)),
            _ => None,
        });
        let submissions: PollingSynchronizer<Submission> = session.synchronizer(match user.role {
            UserRole::Student => Some(queries::submissions_by_student(user_id)),
            _ => None,
        });

        let assignments_rx = assignments.subscribe();
        let submissions_rx = submissions.subscribe();
        let role = user.role;
        let driver = PeriodicTask::spawn(session.cancellation_token(), move |cancel| {
            derive_dependent_queries(role, memberships, assignments, submissions, cancel)
        });
        let scanner = engine.spawn_watch(
            assignments_rx.clone(),
            submissions_rx.clone(),
            session.cancellation_token(),
        );

        info!("Started {} dashboard for {}", role.as_str(), user_id);
        Self {
            notifications,
            service,
            engine,
            assignments: assignments_rx,
            submissions: submissions_rx,
            _driver: driver,
            _scanner: scanner,
        }
    }

    pub fn assignments(&self) -> watch::Receiver<SyncSnapshot<Assignment>> {
        self.assignments.clone()
    }

    pub fn submissions(&self) -> watch::Receiver<SyncSnapshot<Submission>> {
        self.submissions.clone()
    }

    pub fn unread_count(&self) -> usize {
        let snapshot = self.notifications.snapshot();
        NotificationService::unread_count(snapshot.items())
    }
}

/// Owns the dashboard's data synchronizers and re-points the dependent ones whenever their
/// upstream snapshot changes. Dropping the synchronizers on exit stops their polling.
async fn derive_dependent_queries(
    role: UserRole,
    memberships: PollingSynchronizer<Membership>,
    mut assignments: PollingSynchronizer<Assignment>,
    mut submissions: PollingSynchronizer<Submission>,
    cancel: CancellationToken,
) {
    let mut memberships_rx = memberships.subscribe();
    let mut assignments_rx = assignments.subscribe();

    loop {
        match role {
            UserRole::Student => {
                let class_ids: Vec<String> = memberships_rx
                    .borrow_and_update()
                    .items()
                    .iter()
                    .map(|m| m.class_id.clone())
                    .collect();
                assignments.set_query(queries::assignments_for_classes(&class_ids));
            }
            UserRole::Teacher => {
                let assignment_ids: Vec<String> = assignments_rx
                    .borrow_and_update()
                    .items()
                    .iter()
                    .map(|a| a.id.clone())
                    .collect();
                submissions.set_query(queries::submissions_for_assignments(&assignment_ids));
            }
            UserRole::Admin => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            changed = memberships_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = assignments_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
