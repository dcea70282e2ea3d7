use serde::{Deserialize, Serialize};

use super::filter;
use crate::models::{
    auth::Session,
    stop::{BusStop, Condition, StopStatus},
    user::User,
};

/// Top-level screen the presentation layer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Page {
    Map,
    List,
    Dashboard,
    StopDetail,
    #[default]
    Login,
    Admin,
    Reports,
    Help,
}

impl Page {
    pub fn is_admin_only(&self) -> bool {
        matches!(self, Page::Admin)
    }
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Page::Map => "map",
            Page::List => "list",
            Page::Dashboard => "dashboard",
            Page::StopDetail => "stop-detail",
            Page::Login => "login",
            Page::Admin => "admin",
            Page::Reports => "reports",
            Page::Help => "help",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Page {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "map" => Ok(Page::Map),
            "list" => Ok(Page::List),
            "dashboard" => Ok(Page::Dashboard),
            "stop-detail" => Ok(Page::StopDetail),
            "login" => Ok(Page::Login),
            "admin" => Ok(Page::Admin),
            "reports" => Ok(Page::Reports),
            "help" => Ok(Page::Help),
            _ => Err(anyhow::anyhow!("Unknown page: {s}")),
        }
    }
}

/// Client-side view filter. Empty search and `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub search: String,
    pub district: Option<String>,
    pub status: Option<StopStatus>,
    pub condition: Option<Condition>,
}

/// Partial update for [`Filters`]. Outer `None` leaves a field alone,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct FilterPatch {
    pub search: Option<String>,
    pub district: Option<Option<String>>,
    pub status: Option<Option<StopStatus>>,
    pub condition: Option<Option<Condition>>,
}

impl FilterPatch {
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn district(mut self, district: Option<String>) -> Self {
        self.district = Some(district);
        self
    }

    pub fn status(mut self, status: Option<StopStatus>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn condition(mut self, condition: Option<Condition>) -> Self {
        self.condition = Some(condition);
        self
    }
}

impl Filters {
    pub fn merge(&mut self, patch: FilterPatch) {
        if let Some(search) = patch.search {
            self.search = search;
        }
        if let Some(district) = patch.district {
            self.district = district;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(condition) = patch.condition {
            self.condition = condition;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Filters::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiFlags {
    pub sidebar_open: bool,
    pub dark_mode: bool,
}

/// Everything the presentation layer renders from.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub session: Option<Session>,
    pub assets: Vec<BusStop>,
    pub users: Vec<User>,
    pub users_total: u64,
    pub filters: Filters,
    /// Numeric id or stop code, whichever the caller selected by.
    pub selected_asset_id: Option<String>,
    pub page: Page,
    pub ui: UiFlags,
    pub is_loading: bool,
    /// User-visible message from the last failed user-initiated action.
    pub error: Option<String>,
    /// Diagnostic from the last failed background read; never shown by default.
    pub last_load_error: Option<String>,
}

impl AppState {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.role.is_admin())
    }

    pub fn filtered_assets(&self) -> Vec<BusStop> {
        filter::filter_assets(&self.assets, &self.filters)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn selected_asset(&self) -> Option<&BusStop> {
        let key = self.selected_asset_id.as_deref()?;
        self.assets.iter().find(|a| a.matches_key(key))
    }

    pub(crate) fn reset_to_logged_out(&mut self) {
        self.session = None;
        self.assets.clear();
        self.users.clear();
        self.users_total = 0;
        self.selected_asset_id = None;
        self.page = Page::Login;
        self.is_loading = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_round_trips_through_str() {
        for page in [Page::Map, Page::StopDetail, Page::Admin, Page::Help] {
            assert_eq!(page.to_string().parse::<Page>().unwrap(), page);
        }
        assert!("settings".parse::<Page>().is_err());
    }

    #[test]
    fn test_filter_patch_merges_shallowly() {
        let mut filters = Filters {
            search: "lenin".into(),
            district: Some("North".into()),
            ..Default::default()
        };
        filters.merge(FilterPatch::default().status(Some(StopStatus::Repair)));
        assert_eq!(filters.search, "lenin");
        assert_eq!(filters.district.as_deref(), Some("North"));
        assert_eq!(filters.status, Some(StopStatus::Repair));

        filters.merge(FilterPatch::default().district(None).search(""));
        assert!(filters.district.is_none());
        assert!(filters.search.is_empty());
        assert!(!filters.is_empty());
    }

    #[test]
    fn test_reset_keeps_ui_flags_and_filters() {
        let mut state = AppState {
            assets: vec![BusStop::default()],
            selected_asset_id: Some("1".into()),
            page: Page::StopDetail,
            ui: UiFlags {
                sidebar_open: true,
                dark_mode: true,
            },
            filters: Filters {
                search: "x".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        state.reset_to_logged_out();
        assert!(state.assets.is_empty());
        assert!(state.selected_asset_id.is_none());
        assert_eq!(state.page, Page::Login);
        assert!(state.ui.dark_mode);
        assert_eq!(state.filters.search, "x");
    }
}
