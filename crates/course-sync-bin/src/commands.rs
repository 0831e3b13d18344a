//! Subcommand bodies.

use course_sync_runtime::{AppContext, ServiceResult};
use sync_config_and_utils::{Config, Paths};
use tracing::info;

fn connect(config: Config, token: Option<String>) -> ServiceResult<AppContext> {
    let context = AppContext::connect(config)?;
    match token {
        Some(token) => context.credentials().sign_in(token),
        None => context.credentials().sign_out(),
    }
    Ok(context)
}

pub async fn courses(config: Config, token: Option<String>) -> ServiceResult<()> {
    let context = connect(config, token)?;
    for course in context.courses().fetch_list().await? {
        println!("{}", serde_json::Value::from(course));
    }
    context.shutdown();
    Ok(())
}

pub async fn course(config: Config, token: Option<String>, id: &str) -> ServiceResult<()> {
    let context = connect(config, token)?;
    let course = context.courses().fetch(id).await?;
    println!("{}", serde_json::Value::from(course));
    context.shutdown();
    Ok(())
}

pub async fn watch_course(config: Config, token: Option<String>, id: &str) -> ServiceResult<()> {
    let context = connect(config, token)?;
    let courses = context.courses();
    let _follow = courses.watch(id)?;
    let mut reader = courses.get(id);
    info!(course_id = id, "following course, Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            snapshot = reader.next_defined() => match snapshot {
                Some(course) => println!("{}", serde_json::Value::from(course)),
                None => break,
            },
        }
    }

    context.shutdown();
    Ok(())
}

pub fn print_config(config: &Config, paths: &Paths) -> Result<(), serde_json::Error> {
    println!("# {}", paths.config_file().display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
