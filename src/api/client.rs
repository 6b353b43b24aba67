use super::wire::{
    ClientOptions, CreateTaskData, DataBody, Envelope, ErrorEnvelope, WireTask, WireUser,
    WireWorkspace,
};
use super::{ApiError, Session, TaskService};
use crate::model::{NewTask, Task, TaskChanges, User, Workspace};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://app.asana.com/api/1.0";

/// Tasks per listing; the server caps it and we do not paginate.
const TASK_LIMIT: &str = "100";

/// Fields echoed back by create and update calls.
const MUTATION_FIELDS: &str = "name,due_on,due_at,completed,workspace";

/// Identifier sent with every request so the service can attribute traffic.
pub fn client_name(instance_id: &str) -> String {
    [
        "asanatabs",
        instance_id,
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_NAME"),
    ]
    .join(":")
}

/// reqwest-backed client for the Asana REST API.
///
/// Authentication is the session's `ticket` cookie, checked before every call.
pub struct AsanaClient {
    http: Client,
    base_url: String,
    session: Session,
    client_name: String,
}

impl AsanaClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Session,
        client_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            client_name: client_name.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let ticket = self.session.ticket().await.ok_or(ApiError::Auth)?;
        let url = format!("{}{}", self.base_url, path);
        debug!("[api] {} {}", method, url);
        Ok(self
            .http
            .request(method, url)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-Allow-Asana-Client", "1")
            .header(reqwest::header::COOKIE, format!("ticket={}", ticket)))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let resp = self
            .request(Method::GET, path)
            .await?
            .query(params)
            .query(&[("opt_client_name", self.client_name.as_str())])
            .send()
            .await?;
        decode(resp).await
    }

    async fn send_data<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        data: B,
    ) -> Result<T, ApiError> {
        let body = DataBody {
            data,
            options: ClientOptions {
                client_name: &self.client_name,
            },
        };
        let resp = self
            .request(method, path)
            .await?
            .query(&[("opt_fields", MUTATION_FIELDS)])
            .json(&body)
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Auth);
    }
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .ok()
            .and_then(|e| e.errors.into_iter().next())
            .map(|e| e.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }
    let envelope: Envelope<T> = resp
        .json()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(envelope.data)
}

#[async_trait]
impl TaskService for AsanaClient {
    async fn is_authenticated(&self) -> bool {
        self.session.ticket().await.is_some()
    }

    async fn list_workspaces(&self) -> Result<Vec<Workspace>, ApiError> {
        let wire: Vec<WireWorkspace> = self.get("/workspaces", &[]).await?;
        wire.into_iter()
            .map(|w| Workspace::try_from(w).map_err(ApiError::from))
            .collect()
    }

    async fn list_tasks(&self, workspace_id: &str, fields: &[&str]) -> Result<Vec<Task>, ApiError> {
        let opt_fields = fields.join(",");
        let wire: Vec<WireTask> = self
            .get(
                "/tasks",
                &[
                    ("assignee", "me"),
                    ("completed_since", "now"),
                    ("limit", TASK_LIMIT),
                    ("workspace", workspace_id),
                    ("opt_fields", opt_fields.as_str()),
                ],
            )
            .await?;
        wire.into_iter()
            .map(|t| t.into_task(workspace_id).map_err(ApiError::from))
            .collect()
    }

    async fn create_task(&self, workspace_id: &str, fields: &NewTask) -> Result<Task, ApiError> {
        let data = CreateTaskData {
            fields,
            assignee: "me",
            workspace: workspace_id,
        };
        let path = format!("/workspaces/{}/tasks", workspace_id);
        let wire: WireTask = self.send_data(Method::POST, &path, data).await?;
        Ok(wire.into_task(workspace_id)?)
    }

    async fn update_task(&self, task_id: &str, changes: &TaskChanges) -> Result<Task, ApiError> {
        let path = format!("/tasks/{}", task_id);
        let wire: WireTask = self.send_data(Method::PUT, &path, changes).await?;
        Ok(wire.into_task("")?)
    }

    async fn current_user(&self) -> Result<User, ApiError> {
        let wire: WireUser = self.get("/users/me", &[]).await?;
        Ok(wire.into())
    }
}
