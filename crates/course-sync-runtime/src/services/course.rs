//! Courses: list and detail fetches through the API, live course documents
//! and attendance through the realtime database.

use auth_gated_client::{replies, ApiRequest, Invocation};
use observable_store::{CacheKey, CollectionStream, HydrationState, Record, RecordStream};
use realtime_multiplexer::{server_timestamp, CollectionSubscription, EventKind, RemotePath};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{to_records, LiveFollow};
use crate::{AppContext, ServiceError, ServiceResult};

const COURSE_SERVICE: &str = "acourse.CourseService";
const KIND: &str = HydrationState::COURSE_KIND;

/// Course operations.
pub struct CourseService {
    ctx: AppContext,
}

impl CourseService {
    pub(crate) fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    fn key(id: &str) -> CacheKey {
        CacheKey::entity(KIND, id)
    }

    /// Fetch the public course list with owners and student counts joined,
    /// and publish it as the `course` list view.
    pub async fn fetch_list(&self) -> ServiceResult<Vec<Record>> {
        let _busy = self.ctx.busy().guard("courses");
        let request = ApiRequest::rpc(COURSE_SERVICE, "ListCourses", json!({"enrollCount": true}));
        let Some(reply) = self.ctx.client().invoke(request).await?.into_value() else {
            return Ok(Vec::new());
        };
        let courses = to_records(replies::courses(&reply), KIND);
        self.ctx.store().replace_all(KIND, courses.clone());
        info!(count = courses.len(), "course list fetched");
        Ok(courses)
    }

    /// Every course, public or not. Needs a signed-in admin; not cached.
    pub async fn fetch_all(&self) -> ServiceResult<Vec<Record>> {
        let _busy = self.ctx.busy().guard("courses");
        let request = ApiRequest::rpc(COURSE_SERVICE, "ListCourses", json!({"public": false}))
            .authenticated();
        Ok(match self.ctx.client().invoke(request).await?.into_value() {
            Some(reply) => to_records(replies::courses(&reply), KIND),
            None => Vec::new(),
        })
    }

    /// Reader of the course list view. Does not fetch.
    pub fn list(&self) -> CollectionStream {
        self.ctx.store().collection(KIND)
    }

    /// Fetch one course by id or url slug and merge it into the cache under
    /// its id.
    pub async fn fetch(&self, id_or_url: &str) -> ServiceResult<Record> {
        let _busy = self.ctx.busy().guard("course");
        let request = ApiRequest::get("/course").segment(id_or_url);
        let course = self
            .ctx
            .client()
            .invoke(request)
            .await?
            .into_value()
            .and_then(|reply| replies::course(&reply))
            .ok_or_else(|| ServiceError::not_found(KIND, id_or_url))?;

        let record = Record::try_from(course)?;
        let id = record.id().unwrap_or(id_or_url).to_string();
        debug!(course_id = %id, "course fetched");
        Ok(self.ctx.store().merge(&Self::key(&id), record))
    }

    /// Reader of one cached course.
    pub fn get(&self, id: &str) -> RecordStream {
        self.ctx.store().get(&Self::key(id))
    }

    /// Cached course by id, falling back to a list member whose `url`
    /// matches.
    pub fn find(&self, id_or_url: &str) -> Option<Record> {
        let store = self.ctx.store();
        store.snapshot(&Self::key(id_or_url)).or_else(|| {
            store
                .collection_snapshot(KIND)?
                .into_iter()
                .find(|course| course.get("url").and_then(Value::as_str) == Some(id_or_url))
        })
    }

    /// Follow `course/{id}` live, merging each push into the cached course.
    pub fn watch(&self, id: &str) -> ServiceResult<LiveFollow> {
        let subscription = self
            .ctx
            .hub()
            .observe(RemotePath::from(KIND).child(id), EventKind::Value);
        LiveFollow::spawn(
            self.ctx.store().clone(),
            Self::key(id),
            id.to_string(),
            subscription,
        )
    }

    /// Create a course; returns its id and refreshes the cache from the API.
    pub async fn create(&self, data: Value) -> ServiceResult<String> {
        let reply = {
            let _busy = self.ctx.busy().guard("course-create");
            self.ctx
                .client()
                .invoke(ApiRequest::post("/course", data).authenticated())
                .await?
        };
        let id = reply
            .value()
            .and_then(|reply| reply.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ServiceError::not_found("course id", "create reply"))?;
        self.fetch(&id).await?;
        Ok(id)
    }

    /// Patch a course and refresh the cache from the API.
    pub async fn save(&self, id: &str, data: Value) -> ServiceResult<Record> {
        {
            let _busy = self.ctx.busy().guard("course-save");
            self.ctx
                .client()
                .invoke(ApiRequest::patch("/course", data).segment(id))
                .await?;
        }
        self.fetch(id).await
    }

    /// Enroll the signed-in user. `Skipped` when signed out.
    pub async fn enroll(
        &self,
        id: &str,
        code: &str,
        url: &str,
        price: Option<f64>,
    ) -> ServiceResult<Invocation> {
        let _busy = self.ctx.busy().guard("enroll");
        let request = ApiRequest::put(
            "/course",
            json!({"code": code, "url": url, "price": price}),
        )
        .segment(id)
        .segment("enroll")
        .authenticated();
        Ok(self.ctx.client().invoke(request).await?)
    }

    /// Queue a manual enrollment request with proof-of-payment `url`.
    pub async fn request_enroll(
        &self,
        course_id: &str,
        user_id: &str,
        url: &str,
    ) -> ServiceResult<()> {
        let path = RemotePath::from("queue-enroll").child(course_id).child(user_id);
        self.ctx
            .writer()
            .set(&path, json!({"url": url, "timestamp": server_timestamp()}))
            .await?;
        info!(course_id, user_id, "enrollment request queued");
        Ok(())
    }

    /// Record the user's enrollment code where only the rules engine can
    /// read it back.
    pub async fn submit_enroll_code(
        &self,
        course_id: &str,
        user_id: &str,
        code: &str,
    ) -> ServiceResult<()> {
        let path = RemotePath::from("course-private")
            .child(course_id)
            .child("enroll")
            .child(user_id);
        self.ctx
            .writer()
            .set(&path, Value::String(code.to_string()))
            .await?;
        Ok(())
    }

    /// Mark `user_id` present for the session identified by `code`.
    pub async fn attend(&self, course_id: &str, code: &str, user_id: &str) -> ServiceResult<()> {
        let path = RemotePath::from("attend")
            .child(course_id)
            .child(code)
            .child(user_id);
        self.ctx.writer().set(&path, server_timestamp()).await?;
        debug!(course_id, code, user_id, "attendance recorded");
        Ok(())
    }

    /// Attendance sessions of a course, one item per code, in code order.
    pub fn attendance(&self, course_id: &str) -> CollectionSubscription {
        self.ctx
            .hub()
            .observe_collection(RemotePath::from("attend").child(course_id))
    }

    /// Open a new attendance session on the course document.
    pub async fn set_attend_code(&self, course_id: &str, code: &str) -> ServiceResult<()> {
        let mut fields = Map::new();
        fields.insert("attend".to_string(), Value::String(code.to_string()));
        self.ctx
            .writer()
            .update(&RemotePath::from(KIND).child(course_id), fields)
            .await?;
        Ok(())
    }
}
