use crate::{
    client::ApiClient,
    error::Result,
    models::{
        auth::{LoginRequest, LoginResponse, RefreshTokenRequest, SessionsResponse},
        user::{MessageResponse, ProfileUpdate, User},
    },
};

pub struct AuthService;

impl AuthService {
    /// Exchange credentials for a token pair and persist it.
    pub async fn login(client: &ApiClient, email: &str, password: &str) -> Result<LoginResponse> {
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let res: LoginResponse = client.post("/auth/login", &req).await?;
        client.tokens().save(&res.tokens);
        tracing::info!("logged in as {email}");
        Ok(res)
    }

    /// Force a refresh outside the request path.
    pub async fn refresh(client: &ApiClient) -> Result<String> {
        client.refresh_access_token().await
    }

    /// Revoke the current refresh token on the server, then drop local tokens.
    ///
    /// The server call is best effort: its failure is logged and swallowed.
    /// Without stored tokens there is nothing to revoke and no call is made.
    pub async fn logout(client: &ApiClient) {
        if !client.tokens().is_authenticated() {
            return;
        }
        let result = match client.tokens().refresh() {
            Some(refresh_token) => {
                client
                    .post::<MessageResponse, _>("/auth/logout", &RefreshTokenRequest { refresh_token })
                    .await
            }
            None => client.post_empty::<MessageResponse>("/auth/logout").await,
        };
        if let Err(e) = result {
            tracing::warn!("logout request failed, clearing local session anyway: {e}");
        }
        client.tokens().clear();
    }

    /// Revoke every session of the current user, then drop local tokens.
    pub async fn logout_all(client: &ApiClient) -> Result<MessageResponse> {
        let res = client.post_empty("/auth/logout-all").await;
        client.tokens().clear();
        res
    }

    pub async fn me(client: &ApiClient) -> Result<User> {
        client.get("/auth/me").await
    }

    pub async fn update_profile(client: &ApiClient, update: &ProfileUpdate) -> Result<User> {
        client.patch("/auth/profile", update).await
    }

    pub async fn sessions(client: &ApiClient) -> Result<SessionsResponse> {
        client.get("/auth/sessions").await
    }
}
