use crate::dashboard::prefs::DynPreferenceStore;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use tokio::sync::Mutex;

const THEME_KEY: &str = "theme";
const SORT_KEY: &str = "sort";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    /// Parse a stored theme. Anything but `dark` is light.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("dark") {
            Theme::Dark
        } else {
            Theme::Light
        }
    }

    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

/// A sortable dashboard column.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Domain,
    Ip,
    Updated,
    Expiration,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "domain" => Ok(SortKey::Domain),
            "ip" => Ok(SortKey::Ip),
            "updated" => Ok(SortKey::Updated),
            "expiration" => Ok(SortKey::Expiration),
            other => Err(Error::UnknownSortKey(other.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortState {
    /// The sort after a click on `key`: the same key flips direction, a new key starts
    /// ascending.
    pub fn next(current: Option<SortState>, key: SortKey) -> SortState {
        match current {
            Some(current) if current.key == key => SortState {
                key,
                direction: current.direction.reversed(),
            },
            _ => SortState {
                key,
                direction: SortDirection::Asc,
            },
        }
    }
}

/// Where a click landed relative to the bulk-actions dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// The button that opens and closes the dropdown.
    Toggle,
    /// Anywhere inside the dropdown's content.
    Inside,
    /// Anywhere else on the page.
    Outside,
}

impl FromStr for ClickTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toggle" => Ok(ClickTarget::Toggle),
            "inside" => Ok(ClickTarget::Inside),
            "outside" => Ok(ClickTarget::Outside),
            other => Err(Error::UnknownClickTarget(other.to_string())),
        }
    }
}

/// Whether the dropdown is open after `click`.
pub fn menu_after_click(open: bool, click: ClickTarget) -> bool {
    match click {
        ClickTarget::Toggle => !open,
        ClickTarget::Inside => open,
        ClickTarget::Outside => false,
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Info,
    Success,
    Warning,
    Danger,
}

/// A one-time message shown on the next dashboard render.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

/// The presentation state a dashboard render needs.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UiView {
    pub theme: Theme,
    pub sort: Option<SortState>,
    pub expanded: BTreeSet<String>,
    pub menu_open: bool,
}

#[derive(Default)]
struct UiState {
    view: UiView,
    flashes: Vec<Flash>,
}

/// Dashboard interaction state. Theme and sort order are persisted through a
/// [`PreferenceStore`][crate::dashboard::prefs::PreferenceStore]; row expansion, the dropdown and
/// flash messages live only in memory.
pub struct Ui {
    prefs: DynPreferenceStore,
    state: Mutex<UiState>,
}

impl Ui {
    /// Restore the persisted preferences. A stored sort order that can't be parsed is logged
    /// and ignored.
    pub async fn load(prefs: DynPreferenceStore) -> Self {
        let mut view = UiView::default();
        {
            let prefs = prefs.read().await;
            if let Some(theme) = prefs.get(THEME_KEY) {
                view.theme = Theme::parse(&theme);
            }
            if let Some(sort) = prefs.get(SORT_KEY) {
                match serde_json::from_str::<SortState>(&sort) {
                    Ok(sort) => view.sort = Some(sort),
                    Err(err) => tracing::warn!("could not restore sort order {sort:?}: {err}"),
                }
            }
        }
        Self {
            prefs,
            state: Mutex::new(UiState {
                view,
                flashes: vec![],
            }),
        }
    }

    pub async fn view(&self) -> UiView {
        self.state.lock().await.view.clone()
    }

    /// # Errors
    ///
    /// Returns the preference store's error if the theme can't be persisted. The theme is
    /// still applied for this process.
    pub async fn set_theme(&self, theme: Theme) -> Result<(), Error> {
        self.state.lock().await.view.theme = theme;
        self.prefs
            .write()
            .await
            .set(THEME_KEY, theme.as_str().to_string())
            .await
    }

    /// Flip between light and dark. Returns the new theme.
    ///
    /// # Errors
    ///
    /// See [`Ui::set_theme`].
    pub async fn toggle_theme(&self) -> Result<Theme, Error> {
        let theme = self.state.lock().await.view.theme.toggled();
        self.set_theme(theme).await?;
        Ok(theme)
    }

    /// Apply a click on the `key` column header. Returns the new sort order.
    ///
    /// # Errors
    ///
    /// Returns the preference store's error if the sort order can't be persisted.
    pub async fn sort_by(&self, key: SortKey) -> Result<SortState, Error> {
        let sort = {
            let mut state = self.state.lock().await;
            let sort = SortState::next(state.view.sort, key);
            state.view.sort = Some(sort);
            sort
        };
        let value = serde_json::to_string(&sort)?;
        self.prefs.write().await.set(SORT_KEY, value).await?;
        Ok(sort)
    }

    /// Expand a collapsed row or collapse an expanded one. Returns whether it is now expanded.
    pub async fn toggle_row(&self, domain: &str) -> bool {
        let expanded = &mut self.state.lock().await.view.expanded;
        if expanded.remove(domain) {
            false
        } else {
            expanded.insert(domain.to_string());
            true
        }
    }

    /// Returns whether the bulk-actions dropdown is open after `click`.
    pub async fn menu_click(&self, click: ClickTarget) -> bool {
        let view = &mut self.state.lock().await.view;
        view.menu_open = menu_after_click(view.menu_open, click);
        view.menu_open
    }

    pub async fn flash(&self, level: FlashLevel, message: impl Into<String>) {
        self.state.lock().await.flashes.push(Flash {
            level,
            message: message.into(),
        });
    }

    /// Remove and return the pending flash messages.
    pub async fn take_flashes(&self) -> Vec<Flash> {
        std::mem::take(&mut self.state.lock().await.flashes)
    }
}
