//! Authoritative in-memory application state and the commands that change it.
//!
//! [`Store`] is constructed once and handed to every consumer. Consumers read
//! via [`Store::snapshot`] or watch [`Store::subscribe`]; only the commands
//! below mutate state. Commands never return `Err`: failures of user-initiated
//! actions land in `error`, failures of background reads in `last_load_error`.

pub mod filter;
pub mod state;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;

use crate::{
    client::{ApiClient, SessionEvent},
    error::{ApiError, SESSION_EXPIRED_MESSAGE},
    models::{
        auth::Session,
        photo::UploadFile,
        stop::{BusStop, NewStop, StopPatch},
        user::{CreateUserRequest, UpdateUserRequest, User, UsersQuery},
    },
    services::{AuthService, PhotoService, StopService, UserService},
};
pub use state::{AppState, FilterPatch, Filters, Page, UiFlags};

pub const LOGIN_FAILED_MESSAGE: &str = "Login failed";
pub const DELETE_FAILED_MESSAGE: &str = "Could not delete the stop";
pub const SAVE_FAILED_MESSAGE: &str = "Could not save the stop";
pub const PHOTO_FAILED_MESSAGE: &str = "Photo operation failed";
pub const INSPECTION_FAILED_MESSAGE: &str = "Could not record the inspection";
pub const ADMIN_ONLY_MESSAGE: &str = "You do not have access to the administration section";

/// Backend-supplied message if there is one, otherwise `fallback`.
fn message_or(e: &ApiError, fallback: &str) -> String {
    match e {
        ApiError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
        ApiError::SessionExpired => SESSION_EXPIRED_MESSAGE.to_string(),
        _ => fallback.to_string(),
    }
}

#[derive(Clone)]
pub struct Store {
    client: ApiClient,
    state: Arc<watch::Sender<AppState>>,
    load_generation: Arc<AtomicU64>,
}

impl Store {
    pub fn new(client: ApiClient) -> Self {
        let (state, _) = watch::channel(AppState::default());
        Self {
            client,
            state: Arc::new(state),
            load_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn snapshot(&self) -> AppState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut AppState)) {
        self.state.send_modify(f);
    }

    fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.state.borrow())
    }

    // Any load started before this call will be discarded when it lands.
    fn invalidate_loads(&self) {
        self.load_generation.fetch_add(1, Ordering::SeqCst);
    }

    // ---- session ----

    /// Sign in. On success the asset load is started in the background.
    pub async fn login(&self, email: &str, password: &str) -> bool {
        self.update(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let session = match AuthService::login(&self.client, email, password).await {
            Ok(res) => match res.user {
                Some(user) => Ok(Session::from(user)),
                None => AuthService::me(&self.client).await.map(Session::from).inspect_err(|_| {
                    // Tokens without a session would make a later restore look viable.
                    self.client.tokens().clear();
                }),
            },
            Err(e) => Err(e),
        };

        match session {
            Ok(session) => {
                self.update(|s| {
                    s.session = Some(session);
                    s.page = Page::Dashboard;
                    s.is_loading = false;
                });
                let store = self.clone();
                tokio::spawn(async move {
                    store.load_assets().await;
                });
                true
            }
            Err(e) => {
                tracing::info!("login failed for {email}: {e}");
                let message = message_or(&e, LOGIN_FAILED_MESSAGE);
                self.update(|s| {
                    s.error = Some(message);
                    s.is_loading = false;
                });
                false
            }
        }
    }

    /// Always ends logged out, whatever the server says.
    pub async fn logout(&self) {
        AuthService::logout(&self.client).await;
        self.invalidate_loads();
        self.update(AppState::reset_to_logged_out);
        tracing::info!("logged out");
    }

    /// Recover a session from stored tokens. Returns whether one was restored.
    pub async fn restore_session(&self) -> bool {
        if !self.client.tokens().is_authenticated() {
            self.update(|s| s.page = Page::Login);
            return false;
        }

        match AuthService::me(&self.client).await {
            Ok(user) => {
                self.update(|s| {
                    s.session = Some(Session::from(user));
                    s.page = Page::Dashboard;
                });
                self.load_assets().await;
                true
            }
            Err(e) => {
                tracing::warn!("session restore failed: {e}");
                self.client.tokens().clear();
                self.invalidate_loads();
                self.update(AppState::reset_to_logged_out);
                false
            }
        }
    }

    /// Reset to logged out whenever the client gives up on the session.
    pub fn spawn_session_watcher(&self) -> JoinHandle<()> {
        let mut events = self.client.subscribe();
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Expired) => {
                        // Nothing to expire once the user is already signed out.
                        if store.read(|s| s.session.is_none()) {
                            continue;
                        }
                        tracing::info!("session expired, returning to login");
                        store.invalidate_loads();
                        store.update(|s| {
                            s.reset_to_logged_out();
                            s.error = Some(SESSION_EXPIRED_MESSAGE.to_string());
                        });
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("session watcher skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    // ---- assets ----

    /// Replace the collection with the full inventory.
    ///
    /// A response is committed only if no newer load was started meanwhile.
    /// On failure the previous collection stays and the reason goes to
    /// `last_load_error`.
    pub async fn load_assets(&self) {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.update(|s| s.is_loading = true);

        let result = StopService::all(&self.client).await;

        if self.load_generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("discarding superseded asset load #{generation}");
            return;
        }

        match result {
            Ok(assets) => {
                tracing::debug!("loaded {} stops", assets.len());
                self.update(|s| {
                    s.assets = assets;
                    s.is_loading = false;
                    s.last_load_error = None;
                });
            }
            Err(e) => {
                tracing::warn!("asset load failed, keeping previous data: {e}");
                let message = e.user_message();
                self.update(|s| {
                    s.is_loading = false;
                    s.last_load_error = Some(message);
                });
            }
        }
    }

    /// Merge `patch` into the asset addressed by `key` (id or code).
    pub fn update_asset_local(&self, key: &str, patch: &StopPatch) -> bool {
        let mut found = false;
        self.update(|s| {
            for asset in s.assets.iter_mut().filter(|a| a.matches_key(key)) {
                asset.apply_patch(patch);
                found = true;
            }
        });
        found
    }

    /// Replace the asset with the same id, or append it if unknown.
    pub fn replace_asset_local(&self, stop: BusStop) {
        self.update(|s| match s.assets.iter_mut().find(|a| a.id == stop.id) {
            Some(existing) => *existing = stop,
            None => s.assets.push(stop),
        });
    }

    /// Delete on the server, then drop it locally. Nothing changes locally
    /// unless the server confirmed.
    pub async fn remove_asset(&self, key: &str) -> bool {
        match StopService::delete(&self.client, key).await {
            Ok(()) => {
                self.update(|s| {
                    let was_selected = s.selected_asset_id.as_deref().is_some_and(|sel| {
                        sel == key
                            || s
                                .assets
                                .iter()
                                .any(|a| a.matches_key(key) && a.matches_key(sel))
                    });
                    s.assets.retain(|a| !a.matches_key(key));
                    if was_selected {
                        s.selected_asset_id = None;
                    }
                });
                tracing::info!("deleted stop {key}");
                true
            }
            Err(e) => {
                let message = message_or(&e, DELETE_FAILED_MESSAGE);
                self.update(|s| s.error = Some(message));
                false
            }
        }
    }

    pub fn filtered_assets(&self) -> Vec<BusStop> {
        self.read(AppState::filtered_assets)
    }

    pub fn set_filters(&self, patch: FilterPatch) {
        self.update(|s| s.filters.merge(patch));
    }

    pub fn reset_filters(&self) {
        self.update(|s| s.filters = Filters::default());
    }

    /// Record the selection. A selection also requests the detail page.
    pub fn select_asset(&self, key: Option<String>) {
        self.update(|s| {
            if key.is_some() {
                s.page = Page::StopDetail;
            }
            s.selected_asset_id = key;
        });
    }

    pub async fn create_asset(&self, stop: &NewStop) -> Option<BusStop> {
        match StopService::create(&self.client, stop).await {
            Ok(created) => {
                self.replace_asset_local(created.clone());
                Some(created)
            }
            Err(e) => {
                let message = message_or(&e, SAVE_FAILED_MESSAGE);
                self.update(|s| s.error = Some(message));
                None
            }
        }
    }

    /// Send the update and adopt the server's copy of the record.
    pub async fn save_asset(&self, key: &str, patch: &StopPatch) -> bool {
        match StopService::update(&self.client, key, patch).await {
            Ok(saved) => {
                self.replace_asset_local(saved);
                true
            }
            Err(e) => {
                let message = message_or(&e, SAVE_FAILED_MESSAGE);
                self.update(|s| s.error = Some(message));
                false
            }
        }
    }

    pub async fn upload_photo(&self, key: &str, file: &UploadFile, is_main: bool) -> bool {
        match PhotoService::upload(&self.client, key, file, is_main).await {
            Ok(photo) => {
                self.update(|s| {
                    if let Some(asset) = s.assets.iter_mut().find(|a| a.matches_key(key)) {
                        let photo_id = photo.id;
                        let main = photo.is_main;
                        asset.photos.push(photo);
                        if main {
                            asset.mark_main_photo(photo_id);
                        }
                    }
                });
                true
            }
            Err(e) => {
                let message = message_or(&e, PHOTO_FAILED_MESSAGE);
                self.update(|s| s.error = Some(message));
                false
            }
        }
    }

    pub async fn delete_photo(&self, key: &str, photo_id: i64) -> bool {
        match PhotoService::delete(&self.client, photo_id).await {
            Ok(()) => {
                self.update(|s| {
                    if let Some(asset) = s.assets.iter_mut().find(|a| a.matches_key(key)) {
                        asset.photos.retain(|p| p.id != photo_id);
                    }
                });
                true
            }
            Err(e) => {
                let message = message_or(&e, PHOTO_FAILED_MESSAGE);
                self.update(|s| s.error = Some(message));
                false
            }
        }
    }

    /// After success exactly one photo of the asset is main.
    pub async fn set_main_photo(&self, key: &str, photo_id: i64) -> bool {
        match PhotoService::set_main(&self.client, photo_id).await {
            Ok(_) => {
                let mut marked = false;
                self.update(|s| {
                    if let Some(asset) = s.assets.iter_mut().find(|a| a.matches_key(key)) {
                        marked = asset.mark_main_photo(photo_id);
                    }
                });
                if !marked {
                    // Local copy does not know the photo; adopt the server's record.
                    self.reload_asset(key).await;
                }
                true
            }
            Err(e) => {
                let message = message_or(&e, PHOTO_FAILED_MESSAGE);
                self.update(|s| s.error = Some(message));
                false
            }
        }
    }

    pub async fn record_inspection(&self, key: &str, next_inspection_date: Option<NaiveDateTime>) -> bool {
        if let Err(e) = StopService::record_inspection(&self.client, key, next_inspection_date).await {
            let message = message_or(&e, INSPECTION_FAILED_MESSAGE);
            self.update(|s| s.error = Some(message));
            return false;
        }

        self.reload_asset(key).await;
        true
    }

    async fn reload_asset(&self, key: &str) {
        match StopService::get(&self.client, key).await {
            Ok(stop) => self.replace_asset_local(stop),
            Err(e) => {
                tracing::warn!("could not reload stop {key}: {e}");
                let message = e.user_message();
                self.update(|s| s.last_load_error = Some(message));
            }
        }
    }

    // ---- admin users ----
    //
    // Failures here are logged and recorded in `last_load_error`; they never
    // set `error`.

    fn record_user_failure(&self, action: &str, e: &ApiError) {
        tracing::warn!("{action} failed: {e}");
        let message = e.user_message();
        self.update(|s| {
            s.is_loading = false;
            s.last_load_error = Some(message);
        });
    }

    pub async fn load_users(&self) {
        self.update(|s| s.is_loading = true);
        match UserService::list(&self.client, &UsersQuery::default()).await {
            Ok(res) => self.update(|s| {
                s.users = res.users;
                s.users_total = res.total;
                s.is_loading = false;
            }),
            Err(e) => self.record_user_failure("user list", &e),
        }
    }

    pub async fn add_user(&self, req: &CreateUserRequest) -> bool {
        self.update(|s| s.is_loading = true);
        match UserService::create(&self.client, req).await {
            Ok(user) => {
                self.update(|s| {
                    s.users.insert(0, user);
                    s.users_total += 1;
                    s.is_loading = false;
                });
                true
            }
            Err(e) => {
                self.record_user_failure("user create", &e);
                false
            }
        }
    }

    pub async fn update_user(&self, id: i64, req: &UpdateUserRequest) -> bool {
        self.update(|s| s.is_loading = true);
        match UserService::update(&self.client, id, req).await {
            Ok(updated) => {
                self.update(|s| {
                    if let Some(user) = s.users.iter_mut().find(|u| u.id == id) {
                        *user = updated;
                    }
                    s.is_loading = false;
                });
                true
            }
            Err(e) => {
                self.record_user_failure("user update", &e);
                false
            }
        }
    }

    pub async fn delete_user(&self, id: i64) -> bool {
        self.update(|s| s.is_loading = true);
        match UserService::delete(&self.client, id).await {
            Ok(()) => {
                self.update(|s| {
                    s.users.retain(|u: &User| u.id != id);
                    s.users_total = s.users_total.saturating_sub(1);
                    s.is_loading = false;
                });
                true
            }
            Err(e) => {
                self.record_user_failure("user delete", &e);
                false
            }
        }
    }

    // ---- navigation and ui ----

    /// Move to `page`. Admin pages need an admin session; this check is a
    /// convenience for the UI, the backend authorizes every request itself.
    pub fn set_page(&self, page: Page) {
        self.update(|s| {
            if page.is_admin_only() && !s.is_admin() {
                s.error = Some(ADMIN_ONLY_MESSAGE.to_string());
                return;
            }
            s.page = page;
            s.error = None;
        });
    }

    pub fn set_error(&self, message: Option<String>) {
        self.update(|s| s.error = message);
    }

    pub fn toggle_sidebar(&self) {
        self.update(|s| s.ui.sidebar_open = !s.ui.sidebar_open);
    }

    pub fn close_sidebar(&self) {
        self.update(|s| s.ui.sidebar_open = false);
    }

    pub fn toggle_dark_mode(&self) {
        self.update(|s| s.ui.dark_mode = !s.ui.dark_mode);
    }
}
