//! Server-rendered initial state.

use serde::Deserialize;

use crate::Record;

/// Initial state shipped with the first page render. Every part is optional;
/// unknown parts are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HydrationState {
    pub course: Option<Record>,
    pub courses: Option<Vec<Record>>,
    pub me: Option<Record>,
}

impl HydrationState {
    /// Entity kind under which hydrated courses are cached.
    pub const COURSE_KIND: &'static str = "course";
    /// Key of the signed-in user's profile.
    pub const ME_KEY: &'static str = "me";

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn is_empty(&self) -> bool {
        self.course.is_none() && self.courses.is_none() && self.me.is_none()
    }
}
