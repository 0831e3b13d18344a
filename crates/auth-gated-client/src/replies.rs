//! Re-joining denormalized API replies.
//!
//! Replies carry primary entities plus side tables (`users`, `courses`,
//! `enrollCounts`) referenced by id. These helpers fold the side tables back
//! onto the entities.

use serde_json::{Map, Value};

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn items<'a>(reply: &'a Value, table: &str) -> &'a [Value] {
    reply
        .get(table)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn find_by<'a>(table: &'a [Value], field: &str, wanted: Option<&Value>) -> Option<&'a Value> {
    let wanted = wanted?;
    table.iter().find(|row| row.get(field) == Some(wanted))
}

fn with_fields(entity: &Value, extra: Vec<(&str, Option<Value>)>) -> Value {
    let mut fields = entity.as_object().cloned().unwrap_or_else(Map::new);
    for (field, value) in extra {
        if let Some(value) = value {
            fields.insert(field.to_string(), value);
        }
    }
    Value::Object(fields)
}

fn flag(reply: &Value, name: &str) -> Option<Value> {
    Some(Value::Bool(truthy(reply.get(name))))
}

/// Single-course reply: the course with its owner and the caller's
/// relationship flags. `None` when the reply has no course. Without a `user`
/// record the course keeps whatever `owner` it carried.
pub fn course(reply: &Value) -> Option<Value> {
    let course = reply.get("course").filter(|course| course.is_object())?;
    Some(with_fields(
        course,
        vec![
            ("owner", reply.get("user").filter(|user| user.is_object()).cloned()),
            ("owned", flag(reply, "owned")),
            ("purchase", flag(reply, "purchase")),
            ("enrolled", flag(reply, "enrolled")),
            ("attended", flag(reply, "attended")),
        ],
    ))
}

/// Course-list reply: each course with its owner record and student count
/// (0 when the reply carries no count for it). An owner id with no `users`
/// row is left as the id.
pub fn courses(reply: &Value) -> Vec<Value> {
    let users = items(reply, "users");
    let counts = items(reply, "enrollCounts");
    items(reply, "courses")
        .iter()
        .map(|course| {
            let owner = find_by(users, "id", course.get("owner")).cloned();
            let student = find_by(counts, "courseId", course.get("id"))
                .and_then(|row| row.get("count"))
                .filter(|count| truthy(Some(*count)))
                .cloned()
                .unwrap_or(Value::from(0));
            with_fields(course, vec![("owner", owner), ("student", Some(student))])
        })
        .collect()
}

/// Payment-list reply: each payment with its user and course records, where
/// the side tables have them.
pub fn payments(reply: &Value) -> Vec<Value> {
    let users = items(reply, "users");
    let courses = items(reply, "courses");
    items(reply, "payments")
        .iter()
        .map(|payment| {
            let user = find_by(users, "id", payment.get("userId")).cloned();
            let course = find_by(courses, "id", payment.get("courseId")).cloned();
            with_fields(payment, vec![("user", user), ("course", course)])
        })
        .collect()
}

pub fn assignments(reply: &Value) -> Vec<Value> {
    items(reply, "assignments").to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_single_course() {
        let reply = json!({
            "course": {"id": "c1", "title": "Intro", "owner": "u1"},
            "user": {"id": "u1", "name": "Ann"},
            "owned": false,
            "enrolled": 1,
        });
        assert_eq!(
            course(&reply),
            Some(json!({
                "id": "c1",
                "title": "Intro",
                "owner": {"id": "u1", "name": "Ann"},
                "owned": false,
                "purchase": false,
                "enrolled": true,
                "attended": false,
            }))
        );
        assert_eq!(course(&json!({"course": null})), None);
    }

    #[test]
    fn missing_side_rows_never_write_null() {
        let single = course(&json!({"course": {"id": "c1", "owner": "u1"}})).unwrap();
        assert_eq!(single["owner"], json!("u1"));

        let bare = course(&json!({"course": {"id": "c1"}, "user": null})).unwrap();
        assert!(bare.get("owner").is_none());

        let joined = payments(&json!({"payments": [{"id": "p1", "userId": "u1"}]}));
        assert!(joined[0].get("user").is_none());
        assert!(joined[0].get("course").is_none());
        assert!(joined[0].as_object().unwrap().values().all(|v| !v.is_null()));
    }

    #[test]
    fn joins_course_list() {
        let reply = json!({
            "courses": [
                {"id": "c1", "owner": "u1"},
                {"id": "c2", "owner": "u9"},
            ],
            "users": [{"id": "u1", "name": "Ann"}],
            "enrollCounts": [{"courseId": "c1", "count": 12}],
        });
        let joined = courses(&reply);
        assert_eq!(joined[0]["owner"], json!({"id": "u1", "name": "Ann"}));
        assert_eq!(joined[0]["student"], json!(12));
        assert_eq!(joined[1]["owner"], json!("u9"));
        assert_eq!(joined[1]["student"], json!(0));
    }

    #[test]
    fn joins_payments() {
        let reply = json!({
            "payments": [{"id": "p1", "userId": "u1", "courseId": "c1"}],
            "users": [{"id": "u1"}],
            "courses": [{"id": "c1", "title": "Intro"}],
        });
        let joined = payments(&reply);
        assert_eq!(joined[0]["user"], json!({"id": "u1"}));
        assert_eq!(joined[0]["course"]["title"], json!("Intro"));
    }

    #[test]
    fn missing_tables_are_empty() {
        assert!(courses(&Value::Null).is_empty());
        assert!(assignments(&json!({"assignments": [{"id": "a1"}]})).len() == 1);
    }
}
