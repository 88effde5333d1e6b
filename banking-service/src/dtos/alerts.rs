use crate::models::AlertFilter;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct ListAlertsQuery {
    pub connection_id: Option<Uuid>,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub include_dismissed: bool,
}

impl From<ListAlertsQuery> for AlertFilter {
    fn from(q: ListAlertsQuery) -> Self {
        Self {
            connection_id: q.connection_id,
            unread_only: q.unread_only,
            include_dismissed: q.include_dismissed,
        }
    }
}
