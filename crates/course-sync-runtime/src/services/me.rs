//! The signed-in user's profile.

use auth_gated_client::ApiRequest;
use observable_store::{CacheKey, HydrationState, Record, RecordStream};
use serde_json::{json, Value};
use tracing::debug;

use super::to_records;
use crate::{AppContext, ServiceResult};

const USER_SERVICE: &str = "acourse.UserService";

pub struct MeService {
    ctx: AppContext,
}

impl MeService {
    pub(crate) fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    fn key() -> CacheKey {
        CacheKey::new(HydrationState::ME_KEY)
    }

    /// Fetch the profile and merge it under `me`. When nobody is signed in
    /// the cached profile is cleared and `None` returned.
    pub async fn fetch(&self) -> ServiceResult<Option<Record>> {
        let _busy = self.ctx.busy().guard("me");
        let request = ApiRequest::rpc(USER_SERVICE, "GetMe", json!({})).authenticated();
        let reply = self.ctx.client().invoke(request).await?;
        if reply.is_skipped() {
            debug!("signed out, cached profile cleared");
            self.ctx.store().replace(&Self::key(), None);
            return Ok(None);
        }
        match reply.into_value().and_then(|reply| reply.get("user").cloned()) {
            Some(user @ Value::Object(_)) => {
                let user = Record::try_from(user)?;
                Ok(Some(self.ctx.store().merge(&Self::key(), user)))
            }
            _ => Ok(None),
        }
    }

    pub fn get(&self) -> RecordStream {
        self.ctx.store().get(&Self::key())
    }

    /// Save profile fields and merge them into the cached profile.
    pub async fn update(&self, fields: Record) -> ServiceResult<Record> {
        let _busy = self.ctx.busy().guard("me-update");
        let request = ApiRequest::rpc(USER_SERVICE, "UpdateMe", json!({"user": fields.fields()}))
            .authenticated();
        self.ctx.client().invoke(request).await?;
        Ok(self.ctx.store().merge(&Self::key(), fields))
    }

    /// Courses owned by `user_id`, newest first.
    pub async fn own_courses(&self, user_id: &str) -> ServiceResult<Vec<Record>> {
        self.courses_where("owner", user_id).await
    }

    /// Courses `user_id` is enrolled in, newest first.
    pub async fn enrolled_courses(&self, user_id: &str) -> ServiceResult<Vec<Record>> {
        self.courses_where("student", user_id).await
    }

    async fn courses_where(&self, relation: &str, user_id: &str) -> ServiceResult<Vec<Record>> {
        let _busy = self.ctx.busy().guard("me-courses");
        let request = ApiRequest::get("/course")
            .query(relation, user_id)
            .authenticated();
        let mut courses = match self.ctx.client().invoke(request).await?.into_value() {
            Some(Value::Array(items)) => to_records(items, "course"),
            _ => Vec::new(),
        };
        courses.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
        Ok(courses)
    }
}

fn created_at(course: &Record) -> &str {
    course
        .get("createdAt")
        .and_then(Value::as_str)
        .unwrap_or_default()
}
