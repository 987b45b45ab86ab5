use serde::Deserialize;
use utoipa::IntoParams;

/// Offset/limit query parameters shared by all admin listings.
///
/// `limit = 0` (or absent) uses the server default; values above the cap
/// are clamped, not rejected.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListParams {
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}
