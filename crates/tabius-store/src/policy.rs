//! When a read served from storage should trigger a background refresh.

use tabius_types::RefreshMode;

/// Pure refresh decision.
///
/// No fetcher means nothing to refresh from. `RefreshOncePerSession` refreshes
/// only keys that have not completed a fetch in this session.
pub fn should_refresh(mode: RefreshMode, has_fetcher: bool, already_refreshed: bool) -> bool {
    if !has_fetcher {
        return false;
    }
    match mode {
        RefreshMode::DoNotRefresh => false,
        RefreshMode::RefreshOncePerSession => !already_refreshed,
        RefreshMode::Refresh => true,
    }
}
