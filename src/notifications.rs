/// Desktop notifications (macOS only, a no-op elsewhere)

#[cfg(target_os = "macos")]
use std::process::Command;

/// Notify that a focus task was swiped done
pub fn notify_task_done(task_title: &str, bucket_cleared: bool) {
    #[cfg(target_os = "macos")]
    {
        let heading = if bucket_cleared {
            "Dayflow - Bucket cleared"
        } else {
            "Dayflow - Task done"
        };
        let script = format!(
            r#"display notification "{}" with title "{}""#,
            task_title.replace('"', "\\\""),
            heading
        );

        let _ = Command::new("osascript").arg("-e").arg(&script).output();
    }

    #[cfg(not(target_os = "macos"))]
    {
        let _ = (task_title, bucket_cleared);
    }
}
