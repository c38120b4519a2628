use super::*;
use tempfile::TempDir;

fn write_job(jobs_dir: &std::path::Path, name: &str, config: &str, script: &str) {
    let dir = jobs_dir.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.yml"), config).unwrap();
    std::fs::write(dir.join("execute.rb"), script).unwrap();
}

async fn scheduler_over(tmp: &TempDir) -> Arc<Scheduler> {
    Scheduler::new(
        "https://example.com/jobs.git",
        tmp.path().join("jobs"),
        tmp.path().join("history.json"),
        tmp.path().join("secrets.json.enc"),
        tmp.path().join("secrets.key"),
        "/bin/sh",
        crate::config::DEFAULT_SYNC_INTERVAL,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn reload_registers_valid_jobs_and_skips_incomplete_ones() {
    let tmp = TempDir::new().unwrap();
    let jobs_dir = tmp.path().join("jobs");
    std::fs::create_dir_all(&jobs_dir).unwrap();
    write_job(&jobs_dir, "sample", "schedule: \"* * * * *\"\n", "echo hi\n");

    let incomplete = jobs_dir.join("incomplete");
    std::fs::create_dir_all(&incomplete).unwrap();
    std::fs::write(incomplete.join("config.yml"), "schedule: \"* * * * *\"\n").unwrap();

    let scheduler = scheduler_over(&tmp).await;
    scheduler.reload().await.unwrap();

    assert_eq!(scheduler.entries.lock().unwrap().len(), 1);
    assert!(scheduler.entries.lock().unwrap().contains_key("sample"));
}

#[tokio::test]
async fn reload_preserves_reserved_entry_across_passes() {
    let tmp = TempDir::new().unwrap();
    let jobs_dir = tmp.path().join("jobs");
    std::fs::create_dir_all(&jobs_dir).unwrap();

    let scheduler = scheduler_over(&tmp).await;
    scheduler.register_reserved_entry().await.unwrap();
    let reserved_before = *scheduler.reserved_entry_id.lock().unwrap();
    assert!(reserved_before.is_some());

    scheduler.reload().await.unwrap();
    let reserved_after = *scheduler.reserved_entry_id.lock().unwrap();
    assert_eq!(reserved_before, reserved_after);
}

#[tokio::test]
async fn reload_skips_job_with_invalid_config_but_continues() {
    let tmp = TempDir::new().unwrap();
    let jobs_dir = tmp.path().join("jobs");
    std::fs::create_dir_all(&jobs_dir).unwrap();
    write_job(&jobs_dir, "good", "schedule: \"* * * * *\"\n", "echo hi\n");
    write_job(&jobs_dir, "bad", "schedule: \"BOGUS\"\n", "echo hi\n");

    let scheduler = scheduler_over(&tmp).await;
    scheduler.reload().await.unwrap();

    let entries = scheduler.entries.lock().unwrap();
    assert!(entries.contains_key("good"));
    assert!(!entries.contains_key("bad"));
}

#[tokio::test]
async fn health_check_reports_not_cloned_repository() {
    let tmp = TempDir::new().unwrap();
    let scheduler = scheduler_over(&tmp).await;
    let health = scheduler.health_check().await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.active_jobs, 0);
    assert_eq!(health.repository_status, RepositoryStatus::NotCloned);
}

#[test]
fn five_field_schedule_gets_seconds_prefix() {
    assert_eq!(to_scheduler_cron("0 */6 * * *"), "0 0 */6 * * *");
}

#[test]
fn six_field_schedule_is_passed_through() {
    assert_eq!(to_scheduler_cron("0 0 */6 * * *"), "0 0 */6 * * *");
}

#[test]
fn default_sync_interval_renders_as_every_15_minutes() {
    assert_eq!(
        interval_to_cron(crate::config::DEFAULT_SYNC_INTERVAL),
        "0 */15 * * * *"
    );
}

#[test]
fn sub_minute_interval_rounds_up_to_one_minute() {
    assert_eq!(
        interval_to_cron(std::time::Duration::from_secs(10)),
        "0 */1 * * * *"
    );
}
