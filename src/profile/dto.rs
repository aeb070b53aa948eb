use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: i32,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: Profile,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UpdatedProfile {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateProfileResponse {
    pub message: &'static str,
    pub profile: UpdatedProfile,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Stats {
    pub total_debt: f64,
    pub total_income: f64,
    pub debt_count: i64,
    pub income_sources_count: i64,
    pub debt_to_income_ratio: f64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: Stats,
}
