// handlers/crm/mod.rs - staff CRM: sync actions, daily automation, activity feed, tasks and projects

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app::AppState;

pub mod activities;
pub mod sync;
pub mod tasks;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/crm/sync", post(sync::run))
        .route("/api/crm/automation/run", post(sync::automation))
        .route("/api/crm/activities/recent", get(activities::recent))
        .route("/api/crm/tasks", get(tasks::list).post(tasks::create))
        .route("/api/crm/tasks/:id", patch(tasks::update))
        .route("/api/crm/projects", get(tasks::list_projects).post(tasks::create_project))
}
