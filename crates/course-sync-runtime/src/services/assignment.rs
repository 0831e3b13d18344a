//! Assignments: definitions and submissions live in the realtime database.

use auth_gated_client::{replies, ApiRequest};
use observable_store::Record;
use realtime_multiplexer::{
    server_timestamp, CollectionSubscription, EventKind, RemotePath, Subscription,
};
use serde_json::json;
use tracing::info;

use super::to_records;
use crate::{AppContext, ServiceResult};

const ASSIGNMENT_SERVICE: &str = "acourse.AssignmentService";

pub struct AssignmentService {
    ctx: AppContext,
}

impl AssignmentService {
    pub(crate) fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    fn root(course_id: &str) -> RemotePath {
        RemotePath::from("assignment").child(course_id)
    }

    /// Everything under the course's assignment node.
    pub fn all(&self, course_id: &str) -> Subscription {
        self.ctx.hub().observe(Self::root(course_id), EventKind::Value)
    }

    /// Assignment definitions, id-tagged, in creation order.
    pub fn codes(&self, course_id: &str) -> CollectionSubscription {
        self.ctx
            .hub()
            .observe_collection(Self::root(course_id).child("code"))
    }

    /// One user's submissions, keyed by assignment id.
    pub fn user_submissions(&self, course_id: &str, user_id: &str) -> Subscription {
        self.ctx.hub().observe(
            Self::root(course_id).child("user").child(user_id),
            EventKind::Value,
        )
    }

    /// Create an open assignment; returns its generated id.
    pub async fn add_code(&self, course_id: &str, title: &str) -> ServiceResult<String> {
        let id = self
            .ctx
            .writer()
            .push(
                &Self::root(course_id).child("code"),
                json!({"title": title, "open": true}),
            )
            .await?;
        info!(course_id, assignment_id = %id, "assignment created");
        Ok(id)
    }

    pub async fn open(
        &self,
        course_id: &str,
        assignment_id: &str,
        open: bool,
    ) -> ServiceResult<()> {
        let path = Self::root(course_id)
            .child("code")
            .child(assignment_id)
            .child("open");
        self.ctx.writer().set(&path, json!(open)).await?;
        Ok(())
    }

    /// Append a submission; returns its generated key.
    pub async fn submit(
        &self,
        course_id: &str,
        user_id: &str,
        assignment_id: &str,
        url: &str,
    ) -> ServiceResult<String> {
        let path = Self::root(course_id)
            .child("user")
            .child(user_id)
            .child(assignment_id);
        let key = self
            .ctx
            .writer()
            .push(&path, json!({"url": url, "timestamp": server_timestamp()}))
            .await?;
        info!(course_id, assignment_id, "assignment submitted");
        Ok(key)
    }

    /// Assignment list of a course through the API.
    pub async fn list(&self, course_id: &str) -> ServiceResult<Vec<Record>> {
        let _busy = self.ctx.busy().guard("assignments");
        let request = ApiRequest::rpc(
            ASSIGNMENT_SERVICE,
            "ListAssignments",
            json!({"courseId": course_id}),
        );
        Ok(match self.ctx.client().invoke(request).await?.into_value() {
            Some(reply) => to_records(replies::assignments(&reply), "assignment"),
            None => Vec::new(),
        })
    }
}
