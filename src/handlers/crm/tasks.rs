// handlers/crm/tasks.rs - CRM tasks and projects

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{NewTask, Project, Task, TaskFilter, TaskUpdate};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

#[derive(Debug, Default, Deserialize)]
pub struct TaskQuery {
    pub project_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: Option<String>,
}

impl From<TaskQuery> for TaskFilter {
    fn from(query: TaskQuery) -> Self {
        TaskFilter {
            project_id: query.project_id,
            assignee_id: query.assignee_id,
            customer_id: query.customer_id,
            status: query.status,
        }
    }
}

/// GET /api/crm/tasks
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Vec<Task>> {
    user.require_admin()?;
    let tasks = state.crm().list_tasks(&query.into()).await?;
    Ok(ApiResponse::success(tasks))
}

/// POST /api/crm/tasks
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> ApiResult<Task> {
    user.require_admin()?;
    let Json(task) = body?;
    let task = state.crm().create_task(task).await?;
    Ok(ApiResponse::created(task))
}

/// PATCH /api/crm/tasks/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Result<Json<TaskUpdate>, JsonRejection>,
) -> ApiResult<Task> {
    user.require_admin()?;
    let Json(update) = body?;
    let task = state.crm().update_task(id, update).await?;
    Ok(ApiResponse::success(task))
}

/// GET /api/crm/projects
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<Project>> {
    user.require_admin()?;
    Ok(ApiResponse::success(state.crm().list_projects().await?))
}

#[derive(Debug, Deserialize)]
pub struct NewProject {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
}

/// POST /api/crm/projects
pub async fn create_project(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<NewProject>, JsonRejection>,
) -> ApiResult<Project> {
    user.require_admin()?;
    let Json(project) = body?;
    let project = state
        .crm()
        .create_project(&project.name, project.description.as_deref())
        .await?;
    Ok(ApiResponse::created(project))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use crate::types::UserRole;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn task_lifecycle() {
        let app = TestApp::new();
        let (_, admin) = app.user(UserRole::Admin).await;

        let (status, project) = app
            .post("/api/crm/projects", Some(&admin), json!({ "name": "Q3 onboarding" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let project_id = project["data"]["id"].as_str().unwrap().to_string();

        let (status, task) = app
            .post(
                "/api/crm/tasks",
                Some(&admin),
                json!({ "title": "Call new borrowers", "project_id": project_id }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["data"]["status"], "todo");
        let task_uri = format!("/api/crm/tasks/{}", task["data"]["id"].as_str().unwrap());

        let (status, body) = app.patch(&task_uri, Some(&admin), json!({ "status": "done" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "done");

        let (status, body) = app.patch(&task_uri, Some(&admin), json!({ "status": "blocked" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid task status. Must be todo, in_progress, or done");

        let (_, body) = app
            .get(&format!("/api/crm/tasks?project_id={}&status=done", project_id), Some(&admin))
            .await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn required_names() {
        let app = TestApp::new();
        let (_, admin) = app.user(UserRole::Admin).await;

        let (status, body) = app.post("/api/crm/tasks", Some(&admin), json!({ "title": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Task title is required");

        let (status, body) = app.post("/api/crm/projects", Some(&admin), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Project name is required");

        let (status, body) = app
            .patch(&format!("/api/crm/tasks/{}", uuid::Uuid::new_v4()), Some(&admin), json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Task not found");
    }

    #[tokio::test]
    async fn tasks_are_staff_only() {
        let app = TestApp::new();
        let (_, user) = app.user(UserRole::User).await;
        let (status, _) = app.get("/api/crm/tasks", Some(&user)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
