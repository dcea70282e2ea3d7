use crate::{
    client::ApiClient,
    error::Result,
    models::user::{CreateUserRequest, MessageResponse, UpdateUserRequest, User, UsersListResponse, UsersQuery},
};

/// Admin-only account management. Authorization is enforced by the backend.
pub struct UserService;

impl UserService {
    pub async fn list(client: &ApiClient, query: &UsersQuery) -> Result<UsersListResponse> {
        client.get_with_query("/users", query).await
    }

    pub async fn get(client: &ApiClient, id: i64) -> Result<User> {
        client.get(&format!("/users/{id}")).await
    }

    pub async fn create(client: &ApiClient, req: &CreateUserRequest) -> Result<User> {
        client.post("/users", req).await
    }

    pub async fn update(client: &ApiClient, id: i64, req: &UpdateUserRequest) -> Result<User> {
        client.put(&format!("/users/{id}"), req).await
    }

    pub async fn delete(client: &ApiClient, id: i64) -> Result<()> {
        client.delete(&format!("/users/{id}")).await
    }

    /// Clear a lockout caused by repeated failed logins.
    pub async fn unlock(client: &ApiClient, id: i64) -> Result<MessageResponse> {
        client.post_empty(&format!("/users/{id}/unlock")).await
    }

    pub async fn reset_password(
        client: &ApiClient,
        id: i64,
        new_password: &str,
    ) -> Result<MessageResponse> {
        client
            .post_with_query(
                &format!("/users/{id}/reset-password"),
                &[("new_password", new_password)],
            )
            .await
    }
}
